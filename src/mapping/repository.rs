use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::auth::SessionUser;
use crate::error::AppError;
use crate::forum::{ForumPost, ForumStore, ForumThread, NewPost, NewThread, ThreadUpdate};
use crate::models::{
    Chapter, ChapterStatus, Contribution, ContributionType, Course, ImageAsset, NoteSections,
    Reply, School, Subject, UnifiedNotes,
};

use super::extended::{
    ChapterData, ContributionData, CourseData, EntityData, EntityKind, ImageData, SchoolData,
    SubjectData, UnifiedNotesData,
};
use super::inputs::{NewChapter, NewContribution, NewCourse, NewImage, NewSchool, NewSubject};
use super::join_key::{generate_unique_join_key, normalize_join_key};

pub const UNKNOWN_USER: &str = "Unknown User";
pub const ANONYMOUS_USER: &str = "Anonymous";

fn parse_timestamp(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_default()
}

fn require_reference(value: &str, field: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

pub fn school_from_thread(thread: &ForumThread) -> Option<School> {
    match EntityData::parse(&thread.extended_data)? {
        EntityData::School(data) => Some(School {
            id: thread.id.clone(),
            name: if data.name.is_empty() {
                thread.title.clone()
            } else {
                data.name
            },
            description: if data.description.is_empty() {
                thread.body.clone()
            } else {
                data.description
            },
            join_key: data.join_key,
            is_demo: data.is_demo,
            created_at: parse_timestamp(thread.created_at.as_deref()),
        }),
        _ => None,
    }
}

pub fn subject_from_post(post: &ForumPost) -> Option<Subject> {
    match EntityData::parse(&post.extended_data)? {
        EntityData::Subject(data) => Some(Subject {
            id: post.id.clone(),
            school_id: data.school_id,
            name: if data.name.is_empty() {
                post.body.clone()
            } else {
                data.name
            },
            color_tag: data.color_tag,
        }),
        _ => None,
    }
}

pub fn course_from_post(post: &ForumPost) -> Option<Course> {
    match EntityData::parse(&post.extended_data)? {
        EntityData::Course(data) => Some(Course {
            id: post.id.clone(),
            school_id: data.school_id,
            subject_id: data.subject_id,
            code: data.code,
            title: data.title,
            teacher: data.teacher,
            term: data.term,
            section: data.section,
        }),
        _ => None,
    }
}

pub fn chapter_from_thread(thread: &ForumThread) -> Option<Chapter> {
    match EntityData::parse(&thread.extended_data)? {
        EntityData::Chapter(data) => Some(Chapter {
            id: thread.id.clone(),
            school_id: data.school_id,
            course_id: data.course_id,
            label: data.label,
            title: thread.title.clone(),
            status: data.status,
        }),
        _ => None,
    }
}

pub fn notes_from_post(post: &ForumPost) -> Option<UnifiedNotes> {
    match EntityData::parse(&post.extended_data)? {
        EntityData::UnifiedNotes(data) => Some(UnifiedNotes {
            id: post.id.clone(),
            chapter_id: data.chapter_id,
            version: data.version,
            generated_at: if data.generated_at > 0 {
                millis_to_datetime(data.generated_at)
            } else {
                parse_timestamp(post.created_at.as_deref())
            },
            generated_by: data.generated_by,
            contribution_count: data.contribution_count,
            sections: data.sections,
        }),
        _ => None,
    }
}

pub fn image_from_post(post: &ForumPost) -> Option<ImageAsset> {
    match EntityData::parse(&post.extended_data)? {
        EntityData::Image(data) => Some(ImageAsset {
            id: post.id.clone(),
            chapter_id: data.chapter_id,
            url: data.url,
            caption: data.caption,
            uploaded_by: post.user_id.clone(),
        }),
        _ => None,
    }
}

fn contribution_data(post: &ForumPost) -> Option<ContributionData> {
    match EntityData::parse(&post.extended_data)? {
        EntityData::Contribution(data) => Some(data),
        _ => None,
    }
}

/// Typed repository over the forum store. Every domain entity is one thread
/// or post tagged with `extendedData.type`.
#[derive(Clone)]
pub struct ForumRepository {
    store: Arc<dyn ForumStore>,
}

impl ForumRepository {
    pub fn new(store: Arc<dyn ForumStore>) -> Self {
        Self { store }
    }

    /// Resolves a post author's display name, caching lookups for one call.
    async fn author_name(&self, post: &ForumPost, cache: &mut HashMap<String, String>) -> String {
        if let Some(user) = &post.user {
            let name = user.name();
            if !name.trim().is_empty() {
                return name;
            }
        }

        let Some(user_id) = post.user_id.as_deref() else {
            return UNKNOWN_USER.to_string();
        };

        if let Some(name) = cache.get(user_id) {
            return name.clone();
        }

        let name = match self.store.get_user(user_id).await {
            Ok(user) if !user.name().trim().is_empty() => user.name(),
            Ok(_) => UNKNOWN_USER.to_string(),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Author lookup failed");
                UNKNOWN_USER.to_string()
            }
        };
        cache.insert(user_id.to_string(), name.clone());
        name
    }

    async fn build_contribution(
        &self,
        post: &ForumPost,
        data: ContributionData,
        replies: &[&ForumPost],
        cache: &mut HashMap<String, String>,
    ) -> Contribution {
        let (author_id, author_name) = if data.anonymous {
            (None, ANONYMOUS_USER.to_string())
        } else {
            (post.user_id.clone(), self.author_name(post, cache).await)
        };

        let mut mapped_replies = Vec::with_capacity(replies.len());
        for reply in replies {
            mapped_replies.push(Reply {
                id: reply.id.clone(),
                author_id: reply.user_id.clone(),
                author_name: self.author_name(reply, cache).await,
                content: reply.body.clone(),
                created_at: parse_timestamp(reply.created_at.as_deref()),
            });
        }
        mapped_replies.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        Contribution {
            id: post.id.clone(),
            chapter_id: data.chapter_id,
            contribution_type: data.contribution_type,
            title: data.title,
            content: post.body.clone(),
            link: data.link,
            image_url: data.image_url,
            anonymous: data.anonymous,
            author_id,
            author_name,
            helpful_count: post.helpful_count(),
            replies: mapped_replies,
            created_at: parse_timestamp(post.created_at.as_deref()),
        }
    }

    // Schools

    #[instrument(skip(self))]
    pub async fn list_schools(&self) -> Result<Vec<School>, AppError> {
        let threads = self
            .store
            .get_threads_by_type(EntityKind::School.as_str())
            .await?;
        Ok(threads.iter().filter_map(school_from_thread).collect())
    }

    #[instrument(skip(self))]
    pub async fn get_school(&self, id: &str) -> Result<School, AppError> {
        let thread = self.store.get_thread(id).await?;
        school_from_thread(&thread)
            .ok_or_else(|| AppError::NotFound(format!("School {} not found", id)))
    }

    #[instrument(skip(self))]
    pub async fn find_school_by_join_key(&self, key: &str) -> Result<Option<School>, AppError> {
        let schools = self.list_schools().await?;
        Ok(schools
            .into_iter()
            .find(|s| s.join_key.eq_ignore_ascii_case(key.trim())))
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_school(
        &self,
        input: NewSchool,
        creator: &SessionUser,
    ) -> Result<School, AppError> {
        info!("Creating school");

        let existing: HashSet<String> = self
            .list_schools()
            .await?
            .into_iter()
            .map(|s| s.join_key.to_ascii_uppercase())
            .collect();

        let join_key = match input.join_key.as_deref().filter(|k| !k.trim().is_empty()) {
            Some(raw) => {
                let key = normalize_join_key(raw)?;
                if existing.contains(&key) {
                    return Err(AppError::Conflict("Join key is already in use".to_string()));
                }
                key
            }
            None => generate_unique_join_key(&existing, &mut rand::rng()),
        };

        let data = EntityData::School(SchoolData {
            name: input.name.clone(),
            description: input.description.clone(),
            join_key,
            is_demo: input.is_demo,
        });

        let thread = self
            .store
            .create_thread(NewThread {
                title: input.name,
                body: input.description,
                user_id: Some(creator.id.clone()),
                tags: vec![data.kind().as_str().to_string()],
                extended_data: data.to_value(),
            })
            .await?;

        school_from_thread(&thread)
            .ok_or_else(|| AppError::Internal("Created school could not be read back".to_string()))
    }

    // Subjects

    #[instrument(skip(self, input))]
    pub async fn create_subject(
        &self,
        school_id: &str,
        input: NewSubject,
        author: &SessionUser,
    ) -> Result<Subject, AppError> {
        require_reference(school_id, "schoolId")?;
        let school = self.get_school(school_id).await?;

        let data = EntityData::Subject(SubjectData {
            school_id: school.id.clone(),
            name: input.name.clone(),
            color_tag: input.color,
        });

        let post = self
            .store
            .create_post(NewPost {
                thread_id: school.id,
                body: input.name,
                user_id: Some(author.id.clone()),
                parent_id: None,
                extended_data: data.to_value(),
            })
            .await?;

        subject_from_post(&post)
            .ok_or_else(|| AppError::Internal("Created subject could not be read back".to_string()))
    }

    #[instrument(skip(self))]
    pub async fn list_subjects(&self, school_id: &str) -> Result<Vec<Subject>, AppError> {
        let posts = self.store.get_posts_by_thread(school_id).await?;
        let mut subjects: Vec<Subject> = posts
            .iter()
            .filter_map(subject_from_post)
            .filter(|s| s.school_id == school_id)
            .collect();
        subjects.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(subjects)
    }

    #[instrument(skip(self))]
    pub async fn get_subject(&self, id: &str) -> Result<Subject, AppError> {
        let post = self.store.get_post(id).await?;
        subject_from_post(&post)
            .ok_or_else(|| AppError::NotFound(format!("Subject {} not found", id)))
    }

    // Courses

    #[instrument(skip(self, input))]
    pub async fn create_course(
        &self,
        subject_id: &str,
        input: NewCourse,
        author: &SessionUser,
    ) -> Result<Course, AppError> {
        require_reference(subject_id, "subjectId")?;
        let subject = self.get_subject(subject_id).await?;
        require_reference(&subject.school_id, "schoolId")?;

        let data = EntityData::Course(CourseData {
            school_id: subject.school_id.clone(),
            subject_id: subject.id.clone(),
            code: input.code.clone(),
            title: input.title.clone(),
            teacher: input.teacher,
            term: input.term,
            section: input.section,
        });

        let post = self
            .store
            .create_post(NewPost {
                thread_id: subject.school_id,
                body: format!("{} {}", input.code, input.title),
                user_id: Some(author.id.clone()),
                parent_id: None,
                extended_data: data.to_value(),
            })
            .await?;

        course_from_post(&post)
            .ok_or_else(|| AppError::Internal("Created course could not be read back".to_string()))
    }

    #[instrument(skip(self))]
    pub async fn list_courses(&self, subject_id: &str) -> Result<Vec<Course>, AppError> {
        let subject = self.get_subject(subject_id).await?;
        let posts = self.store.get_posts_by_thread(&subject.school_id).await?;
        let mut courses: Vec<Course> = posts
            .iter()
            .filter_map(course_from_post)
            .filter(|c| c.subject_id == subject_id)
            .collect();
        courses.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(courses)
    }

    #[instrument(skip(self))]
    pub async fn get_course(&self, id: &str) -> Result<Course, AppError> {
        let post = self.store.get_post(id).await?;
        course_from_post(&post).ok_or_else(|| AppError::NotFound(format!("Course {} not found", id)))
    }

    // Chapters

    #[instrument(skip(self, input))]
    pub async fn create_chapter(
        &self,
        course_id: &str,
        input: NewChapter,
        creator: &SessionUser,
    ) -> Result<Chapter, AppError> {
        require_reference(course_id, "courseId")?;
        let course = self.get_course(course_id).await?;
        require_reference(&course.school_id, "schoolId")?;

        let data = EntityData::Chapter(ChapterData {
            school_id: course.school_id,
            course_id: course.id,
            label: input.label,
            status: ChapterStatus::Collecting,
        });

        let thread = self
            .store
            .create_thread(NewThread {
                title: input.title,
                body: String::new(),
                user_id: Some(creator.id.clone()),
                tags: vec![data.kind().as_str().to_string()],
                extended_data: data.to_value(),
            })
            .await?;

        // Separate call with no rollback; the chapter stands even if this fails.
        if let Err(e) = self
            .store
            .add_thread_participant(&thread.id, &creator.id)
            .await
        {
            warn!(chapter_id = %thread.id, error = %e, "Failed to add chapter creator as participant");
        }

        chapter_from_thread(&thread)
            .ok_or_else(|| AppError::Internal("Created chapter could not be read back".to_string()))
    }

    #[instrument(skip(self))]
    pub async fn list_chapters(&self, course_id: &str) -> Result<Vec<Chapter>, AppError> {
        let threads = self
            .store
            .get_threads_by_type(EntityKind::Chapter.as_str())
            .await?;
        let mut chapters: Vec<Chapter> = threads
            .iter()
            .filter_map(chapter_from_thread)
            .filter(|c| c.course_id == course_id)
            .collect();
        chapters.sort_by(|a, b| a.label.cmp(&b.label));
        Ok(chapters)
    }

    #[instrument(skip(self))]
    pub async fn get_chapter(&self, id: &str) -> Result<Chapter, AppError> {
        let thread = self.store.get_thread(id).await?;
        chapter_from_thread(&thread)
            .ok_or_else(|| AppError::NotFound(format!("Chapter {} not found", id)))
    }

    #[instrument(skip(self))]
    pub async fn update_chapter_status(
        &self,
        id: &str,
        status: ChapterStatus,
    ) -> Result<Chapter, AppError> {
        let chapter = self.get_chapter(id).await?;

        if chapter.status == status {
            return Ok(chapter);
        }

        if !chapter.status.can_transition_to(status) {
            return Err(AppError::Validation(format!(
                "Chapter cannot move from {} back to {}",
                chapter.status, status
            )));
        }

        info!(from = %chapter.status, to = %status, "Updating chapter status");

        let data = EntityData::Chapter(ChapterData {
            school_id: chapter.school_id,
            course_id: chapter.course_id,
            label: chapter.label,
            status,
        });

        let thread = self
            .store
            .update_thread(
                id,
                ThreadUpdate {
                    extended_data: Some(data.to_value()),
                    ..ThreadUpdate::default()
                },
            )
            .await?;

        chapter_from_thread(&thread)
            .ok_or_else(|| AppError::Internal("Updated chapter could not be read back".to_string()))
    }

    // Contributions

    #[instrument(skip(self, input), fields(kind = ?input.contribution_type))]
    pub async fn create_contribution(
        &self,
        chapter_id: &str,
        input: NewContribution,
        author: &SessionUser,
    ) -> Result<Contribution, AppError> {
        require_reference(chapter_id, "chapterId")?;

        if input.title.trim().is_empty() && input.content.trim().is_empty() {
            return Err(AppError::Validation(
                "A contribution needs a title or content".to_string(),
            ));
        }
        match input.contribution_type {
            ContributionType::Resource if input.link.is_none() => {
                return Err(AppError::Validation("Resources need a link".to_string()));
            }
            ContributionType::NotesPhoto if input.image_url.is_none() => {
                return Err(AppError::Validation(
                    "Note photos need an image URL".to_string(),
                ));
            }
            _ => {}
        }

        let chapter = self.get_chapter(chapter_id).await?;

        let data = ContributionData {
            school_id: chapter.school_id,
            chapter_id: chapter.id.clone(),
            contribution_type: input.contribution_type,
            title: input.title,
            link: input.link,
            image_url: input.image_url,
            anonymous: input.anonymous,
        };

        let post = self
            .store
            .create_post(NewPost {
                thread_id: chapter.id,
                body: input.content,
                user_id: Some(author.id.clone()),
                parent_id: None,
                extended_data: EntityData::Contribution(data.clone()).to_value(),
            })
            .await?;

        let mut cache = HashMap::from([(author.id.clone(), author.username.clone())]);
        Ok(self.build_contribution(&post, data, &[], &mut cache).await)
    }

    fn contribution_posts<'a>(
        posts: &'a [ForumPost],
        chapter_id: &str,
    ) -> Vec<(&'a ForumPost, ContributionData)> {
        posts
            .iter()
            .filter(|p| p.parent_id.is_none())
            .filter_map(|p| contribution_data(p).map(|d| (p, d)))
            .filter(|(_, d)| d.chapter_id == chapter_id)
            .collect()
    }

    #[instrument(skip(self))]
    pub async fn count_contributions(&self, chapter_id: &str) -> Result<u32, AppError> {
        let posts = self.store.get_posts_by_thread(chapter_id).await?;
        let count = Self::contribution_posts(&posts, chapter_id).len();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    /// Newest first, each with its replies oldest first.
    #[instrument(skip(self))]
    pub async fn list_contributions(&self, chapter_id: &str) -> Result<Vec<Contribution>, AppError> {
        let posts = self.store.get_posts_by_thread(chapter_id).await?;
        let mut cache = HashMap::new();

        let mut contributions = Vec::new();
        for (post, data) in Self::contribution_posts(&posts, chapter_id) {
            let replies: Vec<&ForumPost> = posts
                .iter()
                .filter(|p| p.parent_id.as_deref() == Some(post.id.as_str()))
                .collect();
            contributions.push(
                self.build_contribution(post, data, &replies, &mut cache)
                    .await,
            );
        }

        contributions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(contributions)
    }

    #[instrument(skip(self))]
    pub async fn get_contribution(&self, id: &str) -> Result<Contribution, AppError> {
        let post = self.store.get_post(id).await?;
        let data = contribution_data(&post)
            .ok_or_else(|| AppError::NotFound(format!("Contribution {} not found", id)))?;

        let thread_posts = self.store.get_posts_by_thread(&post.thread_id).await?;
        let replies: Vec<&ForumPost> = thread_posts
            .iter()
            .filter(|p| p.parent_id.as_deref() == Some(id))
            .collect();

        let mut cache = HashMap::new();
        Ok(self
            .build_contribution(&post, data, &replies, &mut cache)
            .await)
    }

    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn mark_helpful(
        &self,
        contribution_id: &str,
        user: &SessionUser,
    ) -> Result<Contribution, AppError> {
        self.get_contribution(contribution_id).await?;
        self.store
            .mark_post_helpful(contribution_id, &user.id)
            .await?;
        self.get_contribution(contribution_id).await
    }

    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn unmark_helpful(
        &self,
        contribution_id: &str,
        user: &SessionUser,
    ) -> Result<Contribution, AppError> {
        self.get_contribution(contribution_id).await?;
        self.store
            .unmark_post_helpful(contribution_id, &user.id)
            .await?;
        self.get_contribution(contribution_id).await
    }

    #[instrument(skip(self, content, author), fields(author_id = %author.id))]
    pub async fn add_reply(
        &self,
        contribution_id: &str,
        content: &str,
        author: &SessionUser,
    ) -> Result<Reply, AppError> {
        let parent = self.store.get_post(contribution_id).await?;
        if contribution_data(&parent).is_none() {
            return Err(AppError::NotFound(format!(
                "Contribution {} not found",
                contribution_id
            )));
        }

        let post = self
            .store
            .create_post(NewPost {
                thread_id: parent.thread_id,
                body: content.to_string(),
                user_id: Some(author.id.clone()),
                parent_id: Some(parent.id),
                extended_data: serde_json::Value::Null,
            })
            .await?;

        let mut cache = HashMap::from([(author.id.clone(), author.username.clone())]);
        Ok(Reply {
            id: post.id.clone(),
            author_id: post.user_id.clone(),
            author_name: self.author_name(&post, &mut cache).await,
            content: post.body.clone(),
            created_at: parse_timestamp(post.created_at.as_deref()),
        })
    }

    /// Returns the post together with the id of the school it belongs to.
    #[instrument(skip(self))]
    pub async fn post_school(&self, post_id: &str) -> Result<(ForumPost, String), AppError> {
        let post = self.store.get_post(post_id).await?;

        let direct = match EntityData::parse(&post.extended_data) {
            Some(EntityData::Subject(d)) => Some(d.school_id),
            Some(EntityData::Course(d)) => Some(d.school_id),
            Some(EntityData::Contribution(d)) => Some(d.school_id),
            Some(EntityData::UnifiedNotes(d)) => Some(d.school_id),
            Some(EntityData::Image(d)) => Some(d.school_id),
            _ => None,
        }
        .filter(|id| !id.is_empty());

        if let Some(school_id) = direct {
            return Ok((post, school_id));
        }

        let thread = self.store.get_thread(&post.thread_id).await?;
        let school_id = match EntityData::parse(&thread.extended_data) {
            Some(EntityData::Chapter(d)) if !d.school_id.is_empty() => d.school_id,
            Some(EntityData::School(_)) => thread.id.clone(),
            _ => {
                return Err(AppError::NotFound(format!(
                    "Post {} does not belong to a school",
                    post_id
                )));
            }
        };

        Ok((post, school_id))
    }

    #[instrument(skip(self))]
    pub async fn delete_post(&self, post_id: &str) -> Result<(), AppError> {
        info!("Deleting post");
        self.store.delete_post(post_id).await?;
        Ok(())
    }

    // Unified notes

    /// Every version for the chapter, highest version first.
    #[instrument(skip(self))]
    pub async fn unified_notes_versions(
        &self,
        chapter_id: &str,
    ) -> Result<Vec<UnifiedNotes>, AppError> {
        let posts = self.store.get_posts_by_thread(chapter_id).await?;
        let mut versions: Vec<UnifiedNotes> = posts
            .iter()
            .filter_map(notes_from_post)
            .filter(|n| n.chapter_id == chapter_id)
            .collect();
        versions.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(versions)
    }

    #[instrument(skip(self))]
    pub async fn latest_unified_notes(
        &self,
        chapter_id: &str,
    ) -> Result<Option<UnifiedNotes>, AppError> {
        Ok(self
            .unified_notes_versions(chapter_id)
            .await?
            .into_iter()
            .next())
    }

    /// Appends the next version; earlier versions are never rewritten.
    #[instrument(skip(self, sections, generated_by), fields(generated_by = %generated_by.id))]
    pub async fn create_unified_notes(
        &self,
        chapter: &Chapter,
        sections: NoteSections,
        generated_by: &SessionUser,
        contribution_count: u32,
        generated_at: i64,
    ) -> Result<UnifiedNotes, AppError> {
        require_reference(&chapter.id, "chapterId")?;

        let version = self
            .latest_unified_notes(&chapter.id)
            .await?
            .map(|n| n.version)
            .unwrap_or(0)
            + 1;

        info!(version, "Appending unified notes version");

        let data = EntityData::UnifiedNotes(UnifiedNotesData {
            school_id: chapter.school_id.clone(),
            chapter_id: chapter.id.clone(),
            version,
            generated_at,
            generated_by: Some(generated_by.id.clone()),
            contribution_count,
            sections,
        });

        let post = self
            .store
            .create_post(NewPost {
                thread_id: chapter.id.clone(),
                body: format!("Unified notes v{} for {}", version, chapter.title),
                user_id: Some(generated_by.id.clone()),
                parent_id: None,
                extended_data: data.to_value(),
            })
            .await?;

        notes_from_post(&post).ok_or_else(|| {
            AppError::Internal("Created unified notes could not be read back".to_string())
        })
    }

    // Images

    #[instrument(skip(self, input, author), fields(author_id = %author.id))]
    pub async fn create_image(
        &self,
        chapter_id: &str,
        input: NewImage,
        author: &SessionUser,
    ) -> Result<ImageAsset, AppError> {
        require_reference(chapter_id, "chapterId")?;
        let chapter = self.get_chapter(chapter_id).await?;

        let data = EntityData::Image(ImageData {
            school_id: chapter.school_id,
            chapter_id: chapter.id.clone(),
            url: input.url,
            caption: input.caption.clone(),
        });

        let post = self
            .store
            .create_post(NewPost {
                thread_id: chapter.id,
                body: input.caption,
                user_id: Some(author.id.clone()),
                parent_id: None,
                extended_data: data.to_value(),
            })
            .await?;

        image_from_post(&post)
            .ok_or_else(|| AppError::Internal("Created image could not be read back".to_string()))
    }
}
