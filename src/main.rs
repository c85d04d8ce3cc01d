#[macro_use]
extern crate rocket;

mod api;
mod auth;
mod database;
mod env;
mod error;
mod forum;
mod gate;
mod mapping;
mod models;
mod notes;
mod telemetry;
mod validation;
#[cfg(test)]
mod test;

use api::{
    api_add_reply, api_create_chapter, api_create_contribution, api_create_course,
    api_create_image, api_create_school, api_create_subject, api_delete_post, api_generate_notes,
    api_get_chapter, api_get_chapters, api_get_contributions, api_get_courses,
    api_get_generation_status, api_get_latest_notes, api_get_members, api_get_my_schools,
    api_get_notes_versions, api_get_school, api_get_settings, api_get_subjects, api_join_school,
    api_mark_helpful, api_unmark_helpful, api_update_chapter_status, api_update_member_role,
    api_update_settings, health,
};
use auth::{
    bad_request_api, forbidden_api, internal_error_api, not_found_api, unauthorized_api,
    unprocessable_api,
};
use env::{AppConfig, load_environment};
use error::AppError;
use forum::{ForumStore, HttpForumClient, InMemoryForum};
use gate::GenerationLocks;
use mapping::ForumRepository;
use rocket::fairing::AdHoc;
use rocket::{Build, Rocket};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use telemetry::{TelemetryFairing, init_tracing, shutdown_telemetry};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Application error: {0}")]
    App(#[from] AppError),
}

fn forum_store(config: &AppConfig) -> Result<Arc<dyn ForumStore>, Error> {
    match &config.forums_api_key {
        Some(api_key) => {
            info!(url = %config.forums_api_url, "Using remote forum store");
            let client =
                HttpForumClient::new(&config.forums_api_url, api_key, config.forums_timeout)
                    .map_err(AppError::from)?;
            Ok(Arc::new(client))
        }
        None => {
            warn!("FORUMS_API_KEY not set, using in-memory forum store");
            Ok(Arc::new(InMemoryForum::new()))
        }
    }
}

async fn bootstrap() -> Result<(SqlitePool, ForumRepository, AppConfig), Error> {
    let config = AppConfig::from_env()?;

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;

    database::init_schema(&pool).await?;

    let repository = ForumRepository::new(forum_store(&config)?);

    Ok((pool, repository, config))
}

#[launch]
async fn rocket() -> _ {
    if let Err(e) = load_environment() {
        eprintln!("Failed to load environment files: {}", e);
    }

    init_tracing();

    let (pool, repository, config) = match bootstrap().await {
        Ok(parts) => parts,
        Err(e) => {
            tracing::error!("Failed to start class memory rooms: {}", e);
            panic!("Startup failed: {}", e);
        }
    };

    init_rocket(pool, repository, config).await
}

pub async fn init_rocket(
    pool: SqlitePool,
    repository: ForumRepository,
    config: AppConfig,
) -> Rocket<Build> {
    info!("Starting class memory rooms");

    rocket::build()
        .manage(pool)
        .manage(repository)
        .manage(config)
        .manage(GenerationLocks::default())
        .mount(
            "/api",
            routes![
                api_get_my_schools,
                api_create_school,
                api_join_school,
                api_get_school,
                api_get_members,
                api_update_member_role,
                api_get_settings,
                api_update_settings,
                api_get_subjects,
                api_create_subject,
                api_get_courses,
                api_create_course,
                api_get_chapters,
                api_create_chapter,
                api_get_chapter,
                api_update_chapter_status,
                api_get_contributions,
                api_create_contribution,
                api_create_image,
                api_mark_helpful,
                api_unmark_helpful,
                api_add_reply,
                api_delete_post,
                api_get_notes_versions,
                api_get_latest_notes,
                api_get_generation_status,
                api_generate_notes,
            ],
        )
        .register(
            "/api",
            catchers![
                bad_request_api,
                unauthorized_api,
                forbidden_api,
                not_found_api,
                unprocessable_api,
                internal_error_api,
            ],
        )
        .mount("/api", routes![health])
        .attach(TelemetryFairing)
        .attach(AdHoc::on_shutdown("Telemetry shutdown", |_| {
            Box::pin(async { shutdown_telemetry() })
        }))
}
