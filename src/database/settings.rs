use sqlx::SqlitePool;
use tracing::{info, instrument};

use crate::error::AppError;
use crate::gate::GateSettings;

#[derive(sqlx::FromRow)]
struct DbSchoolSettings {
    min_contributions: Option<i64>,
    student_cooldown_hours: Option<i64>,
}

/// Returns the school's gate settings, or `defaults` when none were saved.
#[instrument(skip(pool))]
pub async fn get_school_settings(
    pool: &SqlitePool,
    school_id: &str,
    defaults: &GateSettings,
) -> Result<GateSettings, AppError> {
    let row = sqlx::query_as::<_, DbSchoolSettings>(
        "SELECT min_contributions, student_cooldown_hours FROM school_settings WHERE school_id = ?",
    )
    .bind(school_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(defaults.clone());
    };

    let min_contributions = row
        .min_contributions
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(defaults.min_contributions);
    let student_cooldown_hours = row
        .student_cooldown_hours
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(defaults.student_cooldown_hours);

    // Rows written before a bounds change fall back rather than fail.
    Ok(GateSettings::new(min_contributions, student_cooldown_hours)
        .unwrap_or_else(|_| defaults.clone()))
}

#[instrument(skip(pool))]
pub async fn upsert_school_settings(
    pool: &SqlitePool,
    school_id: &str,
    settings: &GateSettings,
) -> Result<(), AppError> {
    info!("Saving school generation settings");

    sqlx::query(
        "INSERT INTO school_settings (school_id, min_contributions, student_cooldown_hours)
         VALUES (?, ?, ?)
         ON CONFLICT(school_id) DO UPDATE SET
             min_contributions = excluded.min_contributions,
             student_cooldown_hours = excluded.student_cooldown_hours",
    )
    .bind(school_id)
    .bind(i64::from(settings.min_contributions))
    .bind(i64::from(settings.student_cooldown_hours))
    .execute(pool)
    .await?;

    Ok(())
}
