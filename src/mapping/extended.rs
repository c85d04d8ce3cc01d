use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::forum::null_as_default;
use crate::models::{ChapterStatus, ContributionType, NoteSections};

/// Discriminator stored under `extendedData.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    School,
    Subject,
    Course,
    Chapter,
    Contribution,
    UnifiedNotes,
    Image,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::School => "school",
            EntityKind::Subject => "subject",
            EntityKind::Course => "course",
            EntityKind::Chapter => "chapter",
            EntityKind::Contribution => "contribution",
            EntityKind::UnifiedNotes => "unified_notes",
            EntityKind::Image => "image",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SchoolData {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(deserialize_with = "null_as_default")]
    pub join_key: String,
    #[serde(deserialize_with = "null_as_default")]
    pub is_demo: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SubjectData {
    #[serde(deserialize_with = "null_as_default")]
    pub school_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub color_tag: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CourseData {
    #[serde(deserialize_with = "null_as_default")]
    pub school_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub subject_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub code: String,
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(deserialize_with = "null_as_default")]
    pub teacher: String,
    #[serde(deserialize_with = "null_as_default")]
    pub term: String,
    #[serde(deserialize_with = "null_as_default")]
    pub section: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ChapterData {
    #[serde(deserialize_with = "null_as_default")]
    pub school_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub course_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub label: String,
    #[serde(deserialize_with = "null_as_default")]
    pub status: ChapterStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ContributionData {
    #[serde(deserialize_with = "null_as_default")]
    pub school_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub chapter_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub contribution_type: ContributionType,
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    pub link: Option<String>,
    pub image_url: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub anonymous: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct UnifiedNotesData {
    #[serde(deserialize_with = "null_as_default")]
    pub school_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub chapter_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub version: u32,
    #[serde(deserialize_with = "null_as_default")]
    pub generated_at: i64,
    pub generated_by: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub contribution_count: u32,
    #[serde(deserialize_with = "null_as_default")]
    pub sections: NoteSections,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageData {
    #[serde(deserialize_with = "null_as_default")]
    pub school_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub chapter_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub caption: String,
}

/// Typed view of a thread or post's extended data bag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntityData {
    School(SchoolData),
    Subject(SubjectData),
    Course(CourseData),
    Chapter(ChapterData),
    Contribution(ContributionData),
    UnifiedNotes(UnifiedNotesData),
    Image(ImageData),
}

impl EntityData {
    /// Parses an extended data bag; unknown or malformed payloads yield `None`.
    pub fn parse(value: &Value) -> Option<EntityData> {
        if !value.is_object() {
            return None;
        }

        match serde_json::from_value(value.clone()) {
            Ok(data) => Some(data),
            Err(e) => {
                if value.get("type").is_some() {
                    tracing::debug!(error = %e, "Ignoring malformed extended data");
                }
                None
            }
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            EntityData::School(_) => EntityKind::School,
            EntityData::Subject(_) => EntityKind::Subject,
            EntityData::Course(_) => EntityKind::Course,
            EntityData::Chapter(_) => EntityKind::Chapter,
            EntityData::Contribution(_) => EntityKind::Contribution,
            EntityData::UnifiedNotes(_) => EntityKind::UnifiedNotes,
            EntityData::Image(_) => EntityKind::Image,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
