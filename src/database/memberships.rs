use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{info, instrument};

use crate::auth::Role;
use crate::error::AppError;
use crate::models::{DbSchoolMembership, SchoolMembership};

#[instrument(skip(pool))]
pub async fn add_membership(
    pool: &SqlitePool,
    user_id: &str,
    school_id: &str,
    role: Role,
) -> Result<SchoolMembership, AppError> {
    info!("Adding school membership");

    if get_membership(pool, user_id, school_id).await?.is_some() {
        return Err(AppError::Conflict(
            "You are already a member of this school".to_string(),
        ));
    }

    let joined_at = Utc::now();

    let result = sqlx::query(
        "INSERT INTO school_memberships (user_id, school_id, role, joined_at) VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(school_id)
    .bind(role.as_str())
    .bind(joined_at)
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(SchoolMembership {
            user_id: user_id.to_string(),
            school_id: school_id.to_string(),
            role,
            joined_at,
        }),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
            AppError::Conflict("You are already a member of this school".to_string()),
        ),
        Err(e) => Err(e.into()),
    }
}

#[instrument(skip(pool))]
pub async fn get_membership(
    pool: &SqlitePool,
    user_id: &str,
    school_id: &str,
) -> Result<Option<SchoolMembership>, AppError> {
    let row = sqlx::query_as::<_, DbSchoolMembership>(
        "SELECT user_id, school_id, role, joined_at FROM school_memberships
         WHERE user_id = ? AND school_id = ?",
    )
    .bind(user_id)
    .bind(school_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(SchoolMembership::from))
}

#[instrument(skip(pool))]
pub async fn list_memberships_for_user(
    pool: &SqlitePool,
    user_id: &str,
) -> Result<Vec<SchoolMembership>, AppError> {
    info!("Listing memberships for user");
    let rows = sqlx::query_as::<_, DbSchoolMembership>(
        "SELECT user_id, school_id, role, joined_at FROM school_memberships
         WHERE user_id = ?
         ORDER BY joined_at, rowid",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(SchoolMembership::from).collect())
}

#[instrument(skip(pool))]
pub async fn list_members(
    pool: &SqlitePool,
    school_id: &str,
) -> Result<Vec<SchoolMembership>, AppError> {
    info!("Listing school members");
    let rows = sqlx::query_as::<_, DbSchoolMembership>(
        "SELECT user_id, school_id, role, joined_at FROM school_memberships
         WHERE school_id = ?
         ORDER BY joined_at, rowid",
    )
    .bind(school_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(SchoolMembership::from).collect())
}

#[instrument(skip(pool))]
pub async fn update_member_role(
    pool: &SqlitePool,
    user_id: &str,
    school_id: &str,
    role: Role,
) -> Result<SchoolMembership, AppError> {
    info!("Updating member role");

    let result =
        sqlx::query("UPDATE school_memberships SET role = ? WHERE user_id = ? AND school_id = ?")
            .bind(role.as_str())
            .bind(user_id)
            .bind(school_id)
            .execute(pool)
            .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "User {} is not a member of this school",
            user_id
        )));
    }

    get_membership(pool, user_id, school_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Membership for user {} not found", user_id)))
}
