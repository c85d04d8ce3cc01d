use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Reads an explicit `null` as the type's default, the same as a missing field.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Raw thread payload as returned by the forum store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ForumThread {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub body: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<Value>,
    #[serde(default)]
    pub extended_data: Value,
    #[serde(default, deserialize_with = "null_as_default")]
    pub participants: Vec<Value>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Raw post payload as returned by the forum store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ForumPost {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub thread_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub body: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub extended_data: Value,
    #[serde(default, deserialize_with = "null_as_default")]
    pub likes: Vec<Value>,
    #[serde(default)]
    pub likes_count: Option<u64>,
    #[serde(default)]
    pub user: Option<ForumUser>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl ForumPost {
    pub fn helpful_count(&self) -> u64 {
        self.likes_count.unwrap_or(self.likes.len() as u64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ForumUser {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl ForumUser {
    pub fn name(&self) -> String {
        match &self.display_name {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => self.username.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewThread {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub tags: Vec<String>,
    pub extended_data: Value,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    pub thread_id: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub extended_data: Value,
}

#[derive(Debug, Clone, Serialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ThreadUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extended_data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PostUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extended_data: Option<Value>,
}

#[derive(Debug, Error)]
pub enum ForumError {
    #[error("{0} not found in forum store")]
    NotFound(String),

    #[error("Forum store unreachable: {0}")]
    Unavailable(String),

    #[error("Forum store returned HTTP {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Unexpected forum payload: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ForumError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            ForumError::Decode(error.to_string())
        } else {
            ForumError::Unavailable(error.to_string())
        }
    }
}

/// Reads the `type` discriminator out of an extended data bag.
pub fn extended_type(extended_data: &Value) -> Option<&str> {
    extended_data.get("type").and_then(Value::as_str)
}
