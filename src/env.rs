use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::AppError;
use crate::gate::{DEFAULT_MIN_CONTRIBUTIONS, DEFAULT_STUDENT_COOLDOWN_HOURS, GateSettings};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://class_memory_rooms.db?mode=rwc";
pub const DEFAULT_FORUMS_API_URL: &str = "https://foru.ms/api/v1";
pub const DEFAULT_FORUMS_TIMEOUT_SECS: u64 = 15;

pub fn load_environment() -> Result<(), Box<dyn std::error::Error>> {
    let is_production =
        dotenvy::var("ROCKET_PROFILE").unwrap_or("development".to_string()) == "production";

    let env_files = if is_production {
        vec!["config/common.env", "config/prod.env", ".secrets.env"]
    } else {
        vec!["config/common.env", "config/dev.env", ".secrets.env"]
    };

    for env_file in env_files {
        load_env_file(env_file)?;
    }

    Ok(())
}

fn load_env_file(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !Path::new(path).exists() {
        warn!("Warning: Environment file {} not found, skipping", path);
        return Ok(());
    }

    dotenvy::from_filename_override(path)?;
    info!("Loaded environment from: {}", path);
    Ok(())
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub forums_api_url: String,
    pub forums_api_key: Option<String>,
    pub forums_timeout: Duration,
    pub gate_defaults: GateSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            forums_api_url: DEFAULT_FORUMS_API_URL.to_string(),
            forums_api_key: None,
            forums_timeout: Duration::from_secs(DEFAULT_FORUMS_TIMEOUT_SECS),
            gate_defaults: GateSettings::default(),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, AppError> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|_| {
            AppError::Validation(format!("{} has an invalid value: {}", name, raw))
        }),
        _ => Ok(default),
    }
}

impl AppConfig {
    /// Reads configuration from the process environment. Gate defaults outside
    /// their bounds are rejected here, never at evaluation time.
    pub fn from_env() -> Result<Self, AppError> {
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());
        let forums_api_url = std::env::var("FORUMS_API_URL")
            .unwrap_or_else(|_| DEFAULT_FORUMS_API_URL.to_string());
        let forums_api_key = std::env::var("FORUMS_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());

        let timeout_secs = parse_var("FORUMS_TIMEOUT_SECS", DEFAULT_FORUMS_TIMEOUT_SECS)?;
        let min_contributions = parse_var("MIN_CONTRIBUTIONS", DEFAULT_MIN_CONTRIBUTIONS)?;
        let student_cooldown_hours =
            parse_var("STUDENT_COOLDOWN_HOURS", DEFAULT_STUDENT_COOLDOWN_HOURS)?;

        Ok(Self {
            database_url,
            forums_api_url,
            forums_api_key,
            forums_timeout: Duration::from_secs(timeout_secs),
            gate_defaults: GateSettings::new(min_contributions, student_cooldown_hours)?,
        })
    }
}
