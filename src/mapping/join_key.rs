use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use std::collections::HashSet;
use tracing::warn;

use crate::error::AppError;

/// Join key characters; I, O, 0 and 1 are left out so keys read unambiguously.
pub const JOIN_KEY_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const JOIN_KEY_LENGTH: usize = 6;
pub const MAX_JOIN_KEY_ATTEMPTS: usize = 10;

pub static JOIN_KEY_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9]{6}$").expect("join key pattern is valid"));

pub fn random_join_key<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..JOIN_KEY_LENGTH)
        .map(|_| JOIN_KEY_ALPHABET[rng.random_range(0..JOIN_KEY_ALPHABET.len())] as char)
        .collect()
}

/// Draws keys until one misses `existing`. After the attempt budget runs out
/// the last draw is returned anyway, possibly duplicating an existing key.
pub fn generate_unique_join_key<R: Rng + ?Sized>(
    existing: &HashSet<String>,
    rng: &mut R,
) -> String {
    let mut candidate = random_join_key(rng);

    for attempt in 1..MAX_JOIN_KEY_ATTEMPTS {
        if !existing.contains(&candidate) {
            return candidate;
        }
        tracing::debug!(attempt, "Join key collision, retrying");
        candidate = random_join_key(rng);
    }

    if existing.contains(&candidate) {
        warn!(
            attempts = MAX_JOIN_KEY_ATTEMPTS,
            "Could not generate a unique join key, using a duplicate"
        );
    }

    candidate
}

/// Uppercases and checks a user-supplied join key.
pub fn normalize_join_key(raw: &str) -> Result<String, AppError> {
    let key = raw.trim().to_ascii_uppercase();

    if !JOIN_KEY_FORMAT.is_match(&key) {
        return Err(AppError::Validation(
            "Join key must be 6 letters or digits".to_string(),
        ));
    }

    Ok(key)
}
