use sqlx::SqlitePool;
use tracing::{info, instrument};

use crate::error::AppError;

pub const CURRENT_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS school_memberships (
    user_id TEXT NOT NULL,
    school_id TEXT NOT NULL,
    role TEXT NOT NULL,
    joined_at TIMESTAMP NOT NULL,
    PRIMARY KEY (user_id, school_id)
);

CREATE INDEX IF NOT EXISTS idx_school_memberships_school
    ON school_memberships (school_id);

CREATE TABLE IF NOT EXISTS generation_records (
    chapter_id TEXT PRIMARY KEY,
    generated_at INTEGER NOT NULL,
    generated_by TEXT NOT NULL,
    role TEXT NOT NULL,
    contribution_count INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS school_settings (
    school_id TEXT PRIMARY KEY,
    min_contributions INTEGER NOT NULL,
    student_cooldown_hours INTEGER NOT NULL
);
"#;

#[instrument(skip(pool))]
pub async fn init_schema(pool: &SqlitePool) -> Result<(), AppError> {
    info!("Applying database schema");
    sqlx::raw_sql(CURRENT_SCHEMA).execute(pool).await?;
    Ok(())
}
