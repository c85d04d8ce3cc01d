use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::auth::Role;
use crate::forum::null_as_default;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct School {
    pub id: String,
    pub name: String,
    pub description: String,
    pub join_key: String,
    pub is_demo: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub school_id: String,
    pub name: String,
    pub color_tag: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub school_id: String,
    pub subject_id: String,
    pub code: String,
    pub title: String,
    pub teacher: String,
    pub term: String,
    pub section: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChapterStatus {
    #[default]
    Collecting,
    AiReady,
    Compiled,
}

impl ChapterStatus {
    fn rank(self) -> u8 {
        match self {
            ChapterStatus::Collecting => 0,
            ChapterStatus::AiReady => 1,
            ChapterStatus::Compiled => 2,
        }
    }

    /// Status only ever moves forward: Collecting, AI Ready, Compiled.
    pub fn can_transition_to(self, next: ChapterStatus) -> bool {
        next.rank() >= self.rank()
    }

    pub fn label(&self) -> &'static str {
        match self {
            ChapterStatus::Collecting => "Collecting",
            ChapterStatus::AiReady => "AI Ready",
            ChapterStatus::Compiled => "Compiled",
        }
    }
}

impl fmt::Display for ChapterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: String,
    pub school_id: String,
    pub course_id: String,
    pub label: String,
    pub title: String,
    pub status: ChapterStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContributionType {
    #[default]
    Takeaway,
    NotesPhoto,
    Resource,
    SolvedExample,
    Confusion,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub id: String,
    pub author_id: Option<String>,
    pub author_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Contribution {
    pub id: String,
    pub chapter_id: String,
    #[serde(rename = "type")]
    pub contribution_type: ContributionType,
    pub title: String,
    pub content: String,
    pub link: Option<String>,
    pub image_url: Option<String>,
    pub anonymous: bool,
    pub author_id: Option<String>,
    pub author_name: String,
    pub helpful_count: u64,
    pub replies: Vec<Reply>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Definition {
    pub term: String,
    pub definition: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLink {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct NoteSections {
    #[serde(deserialize_with = "null_as_default")]
    pub overview: String,
    #[serde(deserialize_with = "null_as_default")]
    pub key_concepts: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub definitions: Vec<Definition>,
    #[serde(deserialize_with = "null_as_default")]
    pub formulas: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub steps: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub examples: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub mistakes: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub resources: Vec<ResourceLink>,
    #[serde(deserialize_with = "null_as_default")]
    pub revision: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedNotes {
    pub id: String,
    pub chapter_id: String,
    pub version: u32,
    pub generated_at: DateTime<Utc>,
    pub generated_by: Option<String>,
    pub contribution_count: u32,
    pub sections: NoteSections,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageAsset {
    pub id: String,
    pub chapter_id: String,
    pub url: String,
    pub caption: String,
    pub uploaded_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SchoolMembership {
    pub user_id: String,
    pub school_id: String,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbSchoolMembership {
    pub user_id: Option<String>,
    pub school_id: Option<String>,
    pub role: Option<String>,
    pub joined_at: Option<DateTime<Utc>>,
}

impl From<DbSchoolMembership> for SchoolMembership {
    fn from(row: DbSchoolMembership) -> Self {
        Self {
            user_id: row.user_id.unwrap_or_default(),
            school_id: row.school_id.unwrap_or_default(),
            role: row
                .role
                .as_deref()
                .and_then(|r| r.parse().ok())
                .unwrap_or(Role::Student),
            joined_at: row.joined_at.unwrap_or_else(Utc::now),
        }
    }
}

/// The last unified-notes generation for a chapter. Timestamps are epoch milliseconds.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRecord {
    pub chapter_id: String,
    pub generated_at: i64,
    pub generated_by: String,
    pub role: Role,
    pub contribution_count: u32,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbGenerationRecord {
    pub chapter_id: Option<String>,
    pub generated_at: Option<i64>,
    pub generated_by: Option<String>,
    pub role: Option<String>,
    pub contribution_count: Option<i64>,
}

impl From<DbGenerationRecord> for GenerationRecord {
    fn from(row: DbGenerationRecord) -> Self {
        Self {
            chapter_id: row.chapter_id.unwrap_or_default(),
            generated_at: row.generated_at.unwrap_or_default(),
            generated_by: row.generated_by.unwrap_or_default(),
            role: row
                .role
                .as_deref()
                .and_then(|r| r.parse().ok())
                .unwrap_or(Role::Student),
            contribution_count: row
                .contribution_count
                .and_then(|c| u32::try_from(c).ok())
                .unwrap_or_default(),
        }
    }
}
