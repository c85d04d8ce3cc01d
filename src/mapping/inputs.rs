use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use validator::Validate;

use crate::models::{ChapterStatus, ContributionType};

pub static COLOR_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("color tag pattern is valid"));

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewSchool {
    #[validate(length(min = 1, max = 120, message = "School name is required"))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 1000, message = "Description is too long"))]
    pub description: String,
    #[serde(default)]
    pub join_key: Option<String>,
    #[serde(default)]
    pub is_demo: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewSubject {
    #[validate(length(min = 1, max = 120, message = "Subject name is required"))]
    pub name: String,
    #[validate(regex(path = *COLOR_TAG, message = "Color must be a hex code like #3B82F6"))]
    pub color: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewCourse {
    #[validate(length(min = 1, max = 40, message = "Course code is required"))]
    pub code: String,
    #[validate(length(min = 1, max = 200, message = "Course title is required"))]
    pub title: String,
    #[serde(default)]
    pub teacher: String,
    #[serde(default)]
    pub term: String,
    #[serde(default)]
    pub section: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewChapter {
    #[validate(length(min = 1, max = 40, message = "Chapter label is required"))]
    pub label: String,
    #[validate(length(min = 1, max = 200, message = "Chapter title is required"))]
    pub title: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewContribution {
    #[serde(rename = "type")]
    pub contribution_type: ContributionType,
    #[serde(default)]
    #[validate(length(max = 200, message = "Title is too long"))]
    pub title: String,
    #[serde(default)]
    #[validate(length(max = 20000, message = "Content is too long"))]
    pub content: String,
    #[serde(default)]
    #[validate(url(message = "Link must be a valid URL"))]
    pub link: Option<String>,
    #[serde(default)]
    #[validate(url(message = "Image URL must be a valid URL"))]
    pub image_url: Option<String>,
    #[serde(default)]
    pub anonymous: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewReply {
    #[validate(length(min = 1, max = 5000, message = "Reply cannot be empty"))]
    pub content: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewImage {
    #[validate(url(message = "Image URL must be a valid URL"))]
    pub url: String,
    #[serde(default)]
    #[validate(length(max = 300, message = "Caption is too long"))]
    pub caption: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub status: ChapterStatus,
}
