use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use super::client::ForumStore;
use super::types::{
    ForumError, ForumPost, ForumThread, ForumUser, NewPost, NewThread, PostUpdate, ThreadUpdate,
    extended_type,
};

#[derive(Default)]
struct ForumState {
    threads: Vec<ForumThread>,
    posts: Vec<ForumPost>,
    users: HashMap<String, ForumUser>,
    last_created: Option<DateTime<Utc>>,
    offline: bool,
}

impl ForumState {
    // Strictly increasing so that creation order survives sorting by timestamp.
    fn next_timestamp(&mut self) -> String {
        let now = Utc::now();
        let stamp = match self.last_created {
            Some(last) if now <= last => last + Duration::milliseconds(1),
            _ => now,
        };
        self.last_created = Some(stamp);
        stamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    fn check_online(&self) -> Result<(), ForumError> {
        if self.offline {
            Err(ForumError::Unavailable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

/// Process-local forum store used for development and tests.
#[derive(Default)]
pub struct InMemoryForum {
    state: RwLock<ForumState>,
}

impl InMemoryForum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, user: ForumUser) {
        if let Ok(mut state) = self.state.write() {
            state.users.insert(user.id.clone(), user);
        }
    }

    /// Simulates the store being unreachable.
    pub fn set_offline(&self, offline: bool) {
        if let Ok(mut state) = self.state.write() {
            state.offline = offline;
        }
    }

    fn read<T>(
        &self,
        f: impl FnOnce(&ForumState) -> Result<T, ForumError>,
    ) -> Result<T, ForumError> {
        let state = self
            .state
            .read()
            .map_err(|_| ForumError::Unavailable("forum state poisoned".to_string()))?;
        state.check_online()?;
        f(&state)
    }

    fn write<T>(
        &self,
        f: impl FnOnce(&mut ForumState) -> Result<T, ForumError>,
    ) -> Result<T, ForumError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| ForumError::Unavailable("forum state poisoned".to_string()))?;
        state.check_online()?;
        f(&mut state)
    }
}

#[async_trait]
impl ForumStore for InMemoryForum {
    async fn get_thread(&self, id: &str) -> Result<ForumThread, ForumError> {
        self.read(|state| {
            state
                .threads
                .iter()
                .find(|t| t.id == id)
                .cloned()
                .ok_or_else(|| ForumError::NotFound("Thread".to_string()))
        })
    }

    async fn get_post(&self, id: &str) -> Result<ForumPost, ForumError> {
        self.read(|state| {
            state
                .posts
                .iter()
                .find(|p| p.id == id)
                .cloned()
                .ok_or_else(|| ForumError::NotFound("Post".to_string()))
        })
    }

    async fn get_posts_by_thread(&self, thread_id: &str) -> Result<Vec<ForumPost>, ForumError> {
        self.read(|state| {
            if !state.threads.iter().any(|t| t.id == thread_id) {
                return Err(ForumError::NotFound("Thread".to_string()));
            }
            Ok(state
                .posts
                .iter()
                .filter(|p| p.thread_id == thread_id)
                .cloned()
                .collect())
        })
    }

    async fn get_threads_by_type(&self, kind: &str) -> Result<Vec<ForumThread>, ForumError> {
        self.read(|state| {
            Ok(state
                .threads
                .iter()
                .filter(|t| extended_type(&t.extended_data) == Some(kind))
                .cloned()
                .collect())
        })
    }

    async fn create_thread(&self, data: NewThread) -> Result<ForumThread, ForumError> {
        self.write(|state| {
            let thread = ForumThread {
                id: Uuid::new_v4().to_string(),
                title: data.title,
                body: data.body,
                user_id: data.user_id.clone(),
                tags: data.tags.into_iter().map(Value::String).collect(),
                extended_data: data.extended_data,
                participants: data.user_id.into_iter().map(Value::String).collect(),
                created_at: Some(state.next_timestamp()),
            };
            state.threads.push(thread.clone());
            Ok(thread)
        })
    }

    async fn create_post(&self, data: NewPost) -> Result<ForumPost, ForumError> {
        self.write(|state| {
            if !state.threads.iter().any(|t| t.id == data.thread_id) {
                return Err(ForumError::NotFound("Thread".to_string()));
            }
            let user = data
                .user_id
                .as_ref()
                .and_then(|id| state.users.get(id))
                .cloned();
            let post = ForumPost {
                id: Uuid::new_v4().to_string(),
                thread_id: data.thread_id,
                body: data.body,
                user_id: data.user_id,
                parent_id: data.parent_id,
                extended_data: data.extended_data,
                likes: Vec::new(),
                likes_count: None,
                user,
                created_at: Some(state.next_timestamp()),
            };
            state.posts.push(post.clone());
            Ok(post)
        })
    }

    async fn update_thread(
        &self,
        id: &str,
        data: ThreadUpdate,
    ) -> Result<ForumThread, ForumError> {
        self.write(|state| {
            let thread = state
                .threads
                .iter_mut()
                .find(|t| t.id == id)
                .ok_or_else(|| ForumError::NotFound("Thread".to_string()))?;
            if let Some(title) = data.title {
                thread.title = title;
            }
            if let Some(body) = data.body {
                thread.body = body;
            }
            if let Some(extended_data) = data.extended_data {
                thread.extended_data = extended_data;
            }
            Ok(thread.clone())
        })
    }

    async fn update_post(&self, id: &str, data: PostUpdate) -> Result<ForumPost, ForumError> {
        self.write(|state| {
            let post = state
                .posts
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| ForumError::NotFound("Post".to_string()))?;
            if let Some(body) = data.body {
                post.body = body;
            }
            if let Some(extended_data) = data.extended_data {
                post.extended_data = extended_data;
            }
            Ok(post.clone())
        })
    }

    async fn delete_post(&self, id: &str) -> Result<(), ForumError> {
        self.write(|state| {
            let before = state.posts.len();
            state
                .posts
                .retain(|p| p.id != id && p.parent_id.as_deref() != Some(id));
            if state.posts.len() == before {
                return Err(ForumError::NotFound("Post".to_string()));
            }
            Ok(())
        })
    }

    async fn mark_post_helpful(&self, post_id: &str, user_id: &str) -> Result<(), ForumError> {
        self.write(|state| {
            let post = state
                .posts
                .iter_mut()
                .find(|p| p.id == post_id)
                .ok_or_else(|| ForumError::NotFound("Post".to_string()))?;
            let like = Value::String(user_id.to_string());
            if !post.likes.contains(&like) {
                post.likes.push(like);
            }
            Ok(())
        })
    }

    async fn unmark_post_helpful(&self, post_id: &str, user_id: &str) -> Result<(), ForumError> {
        self.write(|state| {
            let post = state
                .posts
                .iter_mut()
                .find(|p| p.id == post_id)
                .ok_or_else(|| ForumError::NotFound("Post".to_string()))?;
            post.likes.retain(|like| like.as_str() != Some(user_id));
            Ok(())
        })
    }

    async fn add_thread_participant(
        &self,
        thread_id: &str,
        user_id: &str,
    ) -> Result<(), ForumError> {
        self.write(|state| {
            let thread = state
                .threads
                .iter_mut()
                .find(|t| t.id == thread_id)
                .ok_or_else(|| ForumError::NotFound("Thread".to_string()))?;
            let participant = Value::String(user_id.to_string());
            if !thread.participants.contains(&participant) {
                thread.participants.push(participant);
            }
            Ok(())
        })
    }

    async fn get_user(&self, id: &str) -> Result<ForumUser, ForumError> {
        self.read(|state| {
            state
                .users
                .get(id)
                .cloned()
                .ok_or_else(|| ForumError::NotFound("User".to_string()))
        })
    }
}
