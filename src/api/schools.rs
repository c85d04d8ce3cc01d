use chrono::{DateTime, Utc};
use rocket::State;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{info, warn};
use validator::Validate;

use crate::auth::{Permission, Role, SessionUser, check_role_change, require_member};
use crate::database::{
    add_membership, get_school_settings, list_members, list_memberships_for_user,
    update_member_role, upsert_school_settings,
};
use crate::env::AppConfig;
use crate::error::AppError;
use crate::gate::GateSettings;
use crate::mapping::{ForumRepository, NewSchool, NewSubject, normalize_join_key};
use crate::models::{School, SchoolMembership, Subject};
use crate::validation::{ApiCreated, ApiResult, JsonBody, JsonValidateExt, created, data};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolView {
    pub id: String,
    pub name: String,
    pub description: String,
    pub join_key: Option<String>,
    pub is_demo: bool,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

impl SchoolView {
    /// Join keys are only shown to members who can see the roster.
    pub fn new(school: School, membership: &SchoolMembership) -> Self {
        let join_key = membership
            .has_permission(Permission::ViewMembers)
            .then_some(school.join_key);

        Self {
            id: school.id,
            name: school.name,
            description: school.description,
            join_key,
            is_demo: school.is_demo,
            role: membership.role,
            joined_at: membership.joined_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JoinSchoolRequest {
    #[validate(length(min = 1, message = "Join key is required"))]
    pub join_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleUpdateRequest {
    pub role: Role,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdateRequest {
    #[validate(range(
        min = 1,
        max = 50,
        message = "Minimum contributions must be between 1 and 50"
    ))]
    pub min_contributions: u32,
    #[validate(range(
        min = 0,
        max = 24,
        message = "Student cooldown must be between 0 and 24 hours"
    ))]
    pub student_cooldown_hours: u32,
}

#[get("/schools")]
pub async fn api_get_my_schools(
    user: SessionUser,
    db: &State<SqlitePool>,
    repo: &State<ForumRepository>,
) -> ApiResult<Vec<SchoolView>> {
    let memberships = list_memberships_for_user(db, &user.id).await?;

    let mut schools = Vec::with_capacity(memberships.len());
    for membership in &memberships {
        match repo.get_school(&membership.school_id).await {
            Ok(school) => schools.push(SchoolView::new(school, membership)),
            Err(AppError::NotFound(_)) => {
                warn!(school_id = %membership.school_id, "Membership points at a missing school");
            }
            Err(e) => return Err(e),
        }
    }

    Ok(data(schools))
}

#[post("/schools", data = "<school>")]
pub async fn api_create_school(
    school: JsonBody<'_, NewSchool>,
    user: SessionUser,
    db: &State<SqlitePool>,
    repo: &State<ForumRepository>,
) -> ApiCreated<SchoolView> {
    let validated = school.validate_custom()?;

    let school = repo.create_school(validated, &user).await?;
    let membership = add_membership(db, &user.id, &school.id, Role::Admin).await?;

    info!(school_id = %school.id, user_id = %user.id, "School created");
    Ok(created(SchoolView::new(school, &membership)))
}

#[post("/schools/join", data = "<request>")]
pub async fn api_join_school(
    request: JsonBody<'_, JoinSchoolRequest>,
    user: SessionUser,
    db: &State<SqlitePool>,
    repo: &State<ForumRepository>,
) -> ApiResult<SchoolView> {
    let validated = request.validate_custom()?;
    let key = normalize_join_key(&validated.join_key)?;

    let school = repo
        .find_school_by_join_key(&key)
        .await?
        .ok_or_else(|| AppError::NotFound("No school found for that join key".to_string()))?;

    let membership = add_membership(db, &user.id, &school.id, Role::Student).await?;

    info!(school_id = %school.id, user_id = %user.id, "User joined school");
    Ok(data(SchoolView::new(school, &membership)))
}

#[get("/schools/<id>")]
pub async fn api_get_school(
    id: &str,
    user: SessionUser,
    db: &State<SqlitePool>,
    repo: &State<ForumRepository>,
) -> ApiResult<SchoolView> {
    let membership = require_member(db, &user, id).await?;
    let school = repo.get_school(id).await?;
    Ok(data(SchoolView::new(school, &membership)))
}

#[get("/schools/<id>/members")]
pub async fn api_get_members(
    id: &str,
    user: SessionUser,
    db: &State<SqlitePool>,
) -> ApiResult<Vec<SchoolMembership>> {
    let membership = require_member(db, &user, id).await?;
    membership.require_permission(Permission::ViewMembers)?;

    Ok(data(list_members(db, id).await?))
}

#[put("/schools/<id>/members/<member_id>", data = "<update>")]
pub async fn api_update_member_role(
    id: &str,
    member_id: &str,
    update: JsonBody<'_, RoleUpdateRequest>,
    user: SessionUser,
    db: &State<SqlitePool>,
) -> ApiResult<SchoolMembership> {
    let membership = require_member(db, &user, id).await?;
    let update = update?;
    check_role_change(&membership, member_id, update.role)?;

    let updated = update_member_role(db, member_id, id, update.role).await?;
    Ok(data(updated))
}

#[get("/schools/<id>/settings")]
pub async fn api_get_settings(
    id: &str,
    user: SessionUser,
    db: &State<SqlitePool>,
    config: &State<AppConfig>,
) -> ApiResult<GateSettings> {
    require_member(db, &user, id).await?;
    Ok(data(
        get_school_settings(db, id, &config.gate_defaults).await?,
    ))
}

#[put("/schools/<id>/settings", data = "<update>")]
pub async fn api_update_settings(
    id: &str,
    update: JsonBody<'_, SettingsUpdateRequest>,
    user: SessionUser,
    db: &State<SqlitePool>,
) -> ApiResult<GateSettings> {
    let membership = require_member(db, &user, id).await?;
    membership.require_permission(Permission::EditSettings)?;

    let validated = update.validate_custom()?;
    let settings = GateSettings::new(
        validated.min_contributions,
        validated.student_cooldown_hours,
    )?;

    upsert_school_settings(db, id, &settings).await?;
    Ok(data(settings))
}

#[get("/schools/<id>/subjects")]
pub async fn api_get_subjects(
    id: &str,
    user: SessionUser,
    db: &State<SqlitePool>,
    repo: &State<ForumRepository>,
) -> ApiResult<Vec<Subject>> {
    require_member(db, &user, id).await?;
    Ok(data(repo.list_subjects(id).await?))
}

#[post("/schools/<id>/subjects", data = "<subject>")]
pub async fn api_create_subject(
    id: &str,
    subject: JsonBody<'_, NewSubject>,
    user: SessionUser,
    db: &State<SqlitePool>,
    repo: &State<ForumRepository>,
) -> ApiCreated<Subject> {
    let membership = require_member(db, &user, id).await?;
    membership.require_permission(Permission::ManageCatalog)?;

    let validated = subject.validate_custom()?;
    Ok(created(repo.create_subject(id, validated, &user).await?))
}
