//! Threshold and cooldown policy deciding when a chapter's unified notes may
//! be regenerated.
//!
//! The cooldown is chosen by the role of the user *asking now*, not the role
//! of whoever generated last, so a teacher or admin can regenerate inside a
//! student-triggered cooldown.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::auth::Role;
use crate::database::get_last_generation;
use crate::error::AppError;
use crate::models::GenerationRecord;

pub const DEFAULT_MIN_CONTRIBUTIONS: u32 = 5;
pub const DEFAULT_STUDENT_COOLDOWN_HOURS: u32 = 2;
pub const MIN_CONTRIBUTIONS_RANGE: (u32, u32) = (1, 50);
pub const STUDENT_COOLDOWN_HOURS_RANGE: (u32, u32) = (0, 24);
pub const TEACHER_COOLDOWN_MS: i64 = 30 * 60 * 1000;

const HOUR_MS: i64 = 60 * 60 * 1000;
const MINUTE_MS: i64 = 60 * 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateSettings {
    pub min_contributions: u32,
    pub student_cooldown_hours: u32,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            min_contributions: DEFAULT_MIN_CONTRIBUTIONS,
            student_cooldown_hours: DEFAULT_STUDENT_COOLDOWN_HOURS,
        }
    }
}

impl GateSettings {
    /// Builds settings, rejecting values outside the configurable bounds.
    pub fn new(min_contributions: u32, student_cooldown_hours: u32) -> Result<Self, AppError> {
        let (min_lo, min_hi) = MIN_CONTRIBUTIONS_RANGE;
        if !(min_lo..=min_hi).contains(&min_contributions) {
            return Err(AppError::Validation(format!(
                "Minimum contributions must be between {} and {}",
                min_lo, min_hi
            )));
        }

        let (hours_lo, hours_hi) = STUDENT_COOLDOWN_HOURS_RANGE;
        if !(hours_lo..=hours_hi).contains(&student_cooldown_hours) {
            return Err(AppError::Validation(format!(
                "Student cooldown must be between {} and {} hours",
                hours_lo, hours_hi
            )));
        }

        Ok(Self {
            min_contributions,
            student_cooldown_hours,
        })
    }

    pub fn cooldown_ms(&self, role: Role) -> i64 {
        match role {
            Role::Student => i64::from(self.student_cooldown_hours) * HOUR_MS,
            Role::Teacher => TEACHER_COOLDOWN_MS,
            Role::Admin => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl GenerationDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn deny(reason: String) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }
}

/// Whole minutes left, rounded up so a few seconds still reads as "1min".
pub fn remaining_minutes(remaining_ms: i64) -> i64 {
    if remaining_ms <= 0 {
        0
    } else {
        (remaining_ms + MINUTE_MS - 1) / MINUTE_MS
    }
}

pub fn evaluate(
    settings: &GateSettings,
    role: Role,
    contribution_count: u32,
    last: Option<&GenerationRecord>,
    now_ms: i64,
) -> GenerationDecision {
    if contribution_count < settings.min_contributions {
        return GenerationDecision::deny(format!(
            "Need {} contributions",
            settings.min_contributions
        ));
    }

    let Some(last) = last else {
        return GenerationDecision::allow();
    };

    let cooldown = settings.cooldown_ms(role);
    if cooldown == 0 {
        return GenerationDecision::allow();
    }

    let elapsed = now_ms - last.generated_at;
    if elapsed < cooldown {
        let minutes = remaining_minutes(cooldown - elapsed);
        return GenerationDecision::deny(format!(
            "Please wait {}min before generating again",
            minutes
        ));
    }

    GenerationDecision::allow()
}

/// Looks up the chapter's last generation and evaluates the gate at `now_ms`.
/// The threshold is checked first, without touching the store.
pub async fn can_generate(
    pool: &SqlitePool,
    settings: &GateSettings,
    chapter_id: &str,
    role: Role,
    contribution_count: u32,
    now_ms: i64,
) -> Result<GenerationDecision, AppError> {
    if contribution_count < settings.min_contributions {
        return Ok(evaluate(settings, role, contribution_count, None, now_ms));
    }

    let last = get_last_generation(pool, chapter_id).await?;
    let decision = evaluate(settings, role, contribution_count, last.as_ref(), now_ms);

    tracing::debug!(
        chapter_id = %chapter_id,
        role = %role,
        contribution_count,
        allowed = decision.allowed,
        "Evaluated generation gate"
    );

    Ok(decision)
}

/// Per-chapter locks held across a whole generation: gate check, version
/// numbering and record replacement.
#[derive(Debug, Default)]
pub struct GenerationLocks {
    chapters: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl GenerationLocks {
    pub async fn acquire(&self, chapter_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut chapters = self.chapters.lock().await;
            chapters
                .entry(chapter_id.to_string())
                .or_default()
                .clone()
        };
        lock.lock_owned().await
    }
}
