use sqlx::SqlitePool;
use tracing::{info, instrument};

use crate::auth::Role;
use crate::error::AppError;
use crate::models::{DbGenerationRecord, GenerationRecord};

#[instrument(skip(pool))]
pub async fn get_last_generation(
    pool: &SqlitePool,
    chapter_id: &str,
) -> Result<Option<GenerationRecord>, AppError> {
    let row = sqlx::query_as::<_, DbGenerationRecord>(
        "SELECT chapter_id, generated_at, generated_by, role, contribution_count
         FROM generation_records WHERE chapter_id = ?",
    )
    .bind(chapter_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(GenerationRecord::from))
}

/// Replaces the chapter's generation record in a single statement.
#[instrument(skip(pool))]
pub async fn record_generation(
    pool: &SqlitePool,
    chapter_id: &str,
    generated_by: &str,
    role: Role,
    contribution_count: u32,
    generated_at: i64,
) -> Result<GenerationRecord, AppError> {
    info!("Recording unified notes generation");

    sqlx::query(
        "INSERT INTO generation_records
             (chapter_id, generated_at, generated_by, role, contribution_count)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT(chapter_id) DO UPDATE SET
             generated_at = excluded.generated_at,
             generated_by = excluded.generated_by,
             role = excluded.role,
             contribution_count = excluded.contribution_count",
    )
    .bind(chapter_id)
    .bind(generated_at)
    .bind(generated_by)
    .bind(role.as_str())
    .bind(i64::from(contribution_count))
    .execute(pool)
    .await?;

    Ok(GenerationRecord {
        chapter_id: chapter_id.to_string(),
        generated_at,
        generated_by: generated_by.to_string(),
        role,
        contribution_count,
    })
}
