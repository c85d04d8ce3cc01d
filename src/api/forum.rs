use chrono::Utc;
use rocket::State;
use rocket::http::Status;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::info;

use crate::auth::{Permission, SessionUser, require_member};
use crate::database::{get_last_generation, get_school_settings, record_generation};
use crate::env::AppConfig;
use crate::error::AppError;
use crate::gate::{GenerationDecision, GenerationLocks, can_generate};
use crate::mapping::{
    ForumRepository, NewChapter, NewContribution, NewCourse, NewImage, NewReply, StatusUpdate,
};
use crate::models::{
    Chapter, ChapterStatus, Contribution, Course, GenerationRecord, ImageAsset, Reply,
    SchoolMembership, UnifiedNotes,
};
use crate::notes::compile_sections;
use crate::validation::{ApiCreated, ApiResult, JsonBody, JsonValidateExt, created, data};

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterView {
    #[serde(flatten)]
    pub chapter: Chapter,
    pub status_label: &'static str,
    pub contribution_count: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationStatus {
    #[serde(flatten)]
    pub decision: GenerationDecision,
    pub contribution_count: u32,
    pub min_contributions: u32,
    pub last_generation: Option<GenerationRecord>,
}

async fn chapter_membership(
    db: &SqlitePool,
    repo: &ForumRepository,
    user: &SessionUser,
    chapter_id: &str,
) -> Result<(Chapter, SchoolMembership), AppError> {
    let chapter = repo.get_chapter(chapter_id).await?;
    let membership = require_member(db, user, &chapter.school_id).await?;
    Ok((chapter, membership))
}

async fn contribution_membership(
    db: &SqlitePool,
    repo: &ForumRepository,
    user: &SessionUser,
    contribution_id: &str,
) -> Result<SchoolMembership, AppError> {
    let (_, school_id) = repo.post_school(contribution_id).await?;
    require_member(db, user, &school_id).await
}

#[get("/forum/subjects/<id>/courses")]
pub async fn api_get_courses(
    id: &str,
    user: SessionUser,
    db: &State<SqlitePool>,
    repo: &State<ForumRepository>,
) -> ApiResult<Vec<Course>> {
    let subject = repo.get_subject(id).await?;
    require_member(db, &user, &subject.school_id).await?;
    Ok(data(repo.list_courses(id).await?))
}

#[post("/forum/subjects/<id>/courses", data = "<course>")]
pub async fn api_create_course(
    id: &str,
    course: JsonBody<'_, NewCourse>,
    user: SessionUser,
    db: &State<SqlitePool>,
    repo: &State<ForumRepository>,
) -> ApiCreated<Course> {
    let subject = repo.get_subject(id).await?;
    let membership = require_member(db, &user, &subject.school_id).await?;
    membership.require_permission(Permission::ManageCatalog)?;

    let validated = course.validate_custom()?;
    Ok(created(repo.create_course(id, validated, &user).await?))
}

#[get("/forum/courses/<id>/chapters")]
pub async fn api_get_chapters(
    id: &str,
    user: SessionUser,
    db: &State<SqlitePool>,
    repo: &State<ForumRepository>,
) -> ApiResult<Vec<Chapter>> {
    let course = repo.get_course(id).await?;
    require_member(db, &user, &course.school_id).await?;
    Ok(data(repo.list_chapters(id).await?))
}

#[post("/forum/courses/<id>/chapters", data = "<chapter>")]
pub async fn api_create_chapter(
    id: &str,
    chapter: JsonBody<'_, NewChapter>,
    user: SessionUser,
    db: &State<SqlitePool>,
    repo: &State<ForumRepository>,
) -> ApiCreated<Chapter> {
    let course = repo.get_course(id).await?;
    let membership = require_member(db, &user, &course.school_id).await?;
    membership.require_permission(Permission::ManageCatalog)?;

    let validated = chapter.validate_custom()?;
    Ok(created(repo.create_chapter(id, validated, &user).await?))
}

#[get("/forum/chapters/<id>")]
pub async fn api_get_chapter(
    id: &str,
    user: SessionUser,
    db: &State<SqlitePool>,
    repo: &State<ForumRepository>,
) -> ApiResult<ChapterView> {
    let (chapter, _) = chapter_membership(db, repo, &user, id).await?;
    let contribution_count = repo.count_contributions(id).await?;

    Ok(data(ChapterView {
        status_label: chapter.status.label(),
        chapter,
        contribution_count,
    }))
}

#[put("/forum/chapters/<id>/status", data = "<update>")]
pub async fn api_update_chapter_status(
    id: &str,
    update: JsonBody<'_, StatusUpdate>,
    user: SessionUser,
    db: &State<SqlitePool>,
    repo: &State<ForumRepository>,
) -> ApiResult<Chapter> {
    let (_, membership) = chapter_membership(db, repo, &user, id).await?;
    membership.require_permission(Permission::ManageCatalog)?;

    let update = update?;
    Ok(data(repo.update_chapter_status(id, update.status).await?))
}

#[get("/forum/chapters/<id>/contributions")]
pub async fn api_get_contributions(
    id: &str,
    user: SessionUser,
    db: &State<SqlitePool>,
    repo: &State<ForumRepository>,
) -> ApiResult<Vec<Contribution>> {
    chapter_membership(db, repo, &user, id).await?;
    Ok(data(repo.list_contributions(id).await?))
}

#[post("/forum/chapters/<id>/contributions", data = "<contribution>")]
pub async fn api_create_contribution(
    id: &str,
    contribution: JsonBody<'_, NewContribution>,
    user: SessionUser,
    db: &State<SqlitePool>,
    repo: &State<ForumRepository>,
    config: &State<AppConfig>,
) -> ApiCreated<Contribution> {
    let (chapter, membership) = chapter_membership(db, repo, &user, id).await?;
    membership.require_permission(Permission::Contribute)?;

    let validated = contribution.validate_custom()?;
    let created_contribution = repo.create_contribution(id, validated, &user).await?;

    if chapter.status == ChapterStatus::Collecting {
        let settings = get_school_settings(db, &chapter.school_id, &config.gate_defaults).await?;
        let count = repo.count_contributions(id).await?;
        if count >= settings.min_contributions {
            info!(chapter_id = %id, count, "Chapter reached contribution threshold");
            repo.update_chapter_status(id, ChapterStatus::AiReady)
                .await?;
        }
    }

    Ok(created(created_contribution))
}

#[post("/forum/chapters/<id>/images", data = "<image>")]
pub async fn api_create_image(
    id: &str,
    image: JsonBody<'_, NewImage>,
    user: SessionUser,
    db: &State<SqlitePool>,
    repo: &State<ForumRepository>,
) -> ApiCreated<ImageAsset> {
    let (_, membership) = chapter_membership(db, repo, &user, id).await?;
    membership.require_permission(Permission::Contribute)?;

    let validated = image.validate_custom()?;
    Ok(created(repo.create_image(id, validated, &user).await?))
}

#[post("/forum/contributions/<id>/helpful")]
pub async fn api_mark_helpful(
    id: &str,
    user: SessionUser,
    db: &State<SqlitePool>,
    repo: &State<ForumRepository>,
) -> ApiResult<Contribution> {
    contribution_membership(db, repo, &user, id).await?;
    Ok(data(repo.mark_helpful(id, &user).await?))
}

#[delete("/forum/contributions/<id>/helpful")]
pub async fn api_unmark_helpful(
    id: &str,
    user: SessionUser,
    db: &State<SqlitePool>,
    repo: &State<ForumRepository>,
) -> ApiResult<Contribution> {
    contribution_membership(db, repo, &user, id).await?;
    Ok(data(repo.unmark_helpful(id, &user).await?))
}

#[post("/forum/contributions/<id>/replies", data = "<reply>")]
pub async fn api_add_reply(
    id: &str,
    reply: JsonBody<'_, NewReply>,
    user: SessionUser,
    db: &State<SqlitePool>,
    repo: &State<ForumRepository>,
) -> ApiCreated<Reply> {
    let membership = contribution_membership(db, repo, &user, id).await?;
    membership.require_permission(Permission::Contribute)?;

    let validated = reply.validate_custom()?;
    Ok(created(repo.add_reply(id, &validated.content, &user).await?))
}

#[delete("/forum/posts/<id>")]
pub async fn api_delete_post(
    id: &str,
    user: SessionUser,
    db: &State<SqlitePool>,
    repo: &State<ForumRepository>,
) -> Result<Status, AppError> {
    let (post, school_id) = repo.post_school(id).await?;
    let membership = require_member(db, &user, &school_id).await?;

    let is_author = post.user_id.as_deref() == Some(user.id.as_str());
    if !is_author {
        membership.require_permission(Permission::ModerateContent)?;
    }

    repo.delete_post(id).await?;
    Ok(Status::NoContent)
}

#[get("/forum/chapters/<id>/notes")]
pub async fn api_get_notes_versions(
    id: &str,
    user: SessionUser,
    db: &State<SqlitePool>,
    repo: &State<ForumRepository>,
) -> ApiResult<Vec<UnifiedNotes>> {
    chapter_membership(db, repo, &user, id).await?;
    Ok(data(repo.unified_notes_versions(id).await?))
}

#[get("/forum/chapters/<id>/notes/latest")]
pub async fn api_get_latest_notes(
    id: &str,
    user: SessionUser,
    db: &State<SqlitePool>,
    repo: &State<ForumRepository>,
) -> ApiResult<UnifiedNotes> {
    chapter_membership(db, repo, &user, id).await?;

    let latest = repo
        .latest_unified_notes(id)
        .await?
        .ok_or_else(|| AppError::NotFound("No unified notes for this chapter yet".to_string()))?;

    Ok(data(latest))
}

#[get("/forum/chapters/<id>/generation")]
pub async fn api_get_generation_status(
    id: &str,
    user: SessionUser,
    db: &State<SqlitePool>,
    repo: &State<ForumRepository>,
    config: &State<AppConfig>,
) -> ApiResult<GenerationStatus> {
    let (chapter, membership) = chapter_membership(db, repo, &user, id).await?;

    let settings = get_school_settings(db, &chapter.school_id, &config.gate_defaults).await?;
    let contribution_count = repo.count_contributions(id).await?;
    let decision = can_generate(
        db,
        &settings,
        id,
        membership.role,
        contribution_count,
        now_ms(),
    )
    .await?;

    Ok(data(GenerationStatus {
        decision,
        contribution_count,
        min_contributions: settings.min_contributions,
        last_generation: get_last_generation(db, id).await?,
    }))
}

#[post("/forum/chapters/<id>/generate")]
pub async fn api_generate_notes(
    id: &str,
    user: SessionUser,
    db: &State<SqlitePool>,
    repo: &State<ForumRepository>,
    config: &State<AppConfig>,
    locks: &State<GenerationLocks>,
) -> ApiCreated<UnifiedNotes> {
    let (chapter, membership) = chapter_membership(db, repo, &user, id).await?;
    let _generation = locks.acquire(id).await;

    let settings = get_school_settings(db, &chapter.school_id, &config.gate_defaults).await?;
    let contributions = repo.list_contributions(id).await?;
    let contribution_count = u32::try_from(contributions.len()).unwrap_or(u32::MAX);

    let now = now_ms();
    let decision = can_generate(
        db,
        &settings,
        id,
        membership.role,
        contribution_count,
        now,
    )
    .await?;

    if !decision.allowed {
        return Err(AppError::Authorization(decision.reason.unwrap_or_else(|| {
            "Unified notes cannot be generated right now".to_string()
        })));
    }

    let sections = compile_sections(&chapter, &contributions);
    let notes = repo
        .create_unified_notes(&chapter, sections, &user, contribution_count, now)
        .await?;

    record_generation(
        db,
        id,
        &user.id,
        membership.role,
        contribution_count,
        now,
    )
    .await?;

    repo.update_chapter_status(id, ChapterStatus::Compiled)
        .await?;

    info!(chapter_id = %id, version = notes.version, "Unified notes generated");
    Ok(created(notes))
}
