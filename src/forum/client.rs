use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{instrument, warn};

use super::types::{
    ForumError, ForumPost, ForumThread, ForumUser, NewPost, NewThread, PostUpdate, ThreadUpdate,
    extended_type,
};

/// Operations consumed from the external forum store.
#[async_trait]
pub trait ForumStore: Send + Sync {
    async fn get_thread(&self, id: &str) -> Result<ForumThread, ForumError>;
    async fn get_post(&self, id: &str) -> Result<ForumPost, ForumError>;
    async fn get_posts_by_thread(&self, thread_id: &str) -> Result<Vec<ForumPost>, ForumError>;
    async fn get_threads_by_type(&self, kind: &str) -> Result<Vec<ForumThread>, ForumError>;
    async fn create_thread(&self, data: NewThread) -> Result<ForumThread, ForumError>;
    async fn create_post(&self, data: NewPost) -> Result<ForumPost, ForumError>;
    async fn update_thread(&self, id: &str, data: ThreadUpdate)
    -> Result<ForumThread, ForumError>;
    async fn update_post(&self, id: &str, data: PostUpdate) -> Result<ForumPost, ForumError>;
    async fn delete_post(&self, id: &str) -> Result<(), ForumError>;
    async fn mark_post_helpful(&self, post_id: &str, user_id: &str) -> Result<(), ForumError>;
    async fn unmark_post_helpful(&self, post_id: &str, user_id: &str) -> Result<(), ForumError>;
    async fn add_thread_participant(&self, thread_id: &str, user_id: &str)
    -> Result<(), ForumError>;
    async fn get_user(&self, id: &str) -> Result<ForumUser, ForumError>;
}

pub struct HttpForumClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpForumClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, ForumError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ForumError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Value, ForumError> {
        let response = request
            .header("x-api-key", &self.api_key)
            .header("accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ForumError::NotFound(what.to_string()));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ForumError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_slice(&bytes).map_err(|e| ForumError::Decode(e.to_string()))
    }
}

/// Accepts either the bare entity or an envelope such as `{ "thread": {...} }`.
fn decode_one<T: DeserializeOwned>(value: Value, key: &str) -> Result<T, ForumError> {
    let inner = match value {
        Value::Object(mut map) if map.get(key).is_some_and(Value::is_object) => {
            map.remove(key).unwrap_or(Value::Null)
        }
        other => other,
    };

    serde_json::from_value(inner).map_err(|e| ForumError::Decode(e.to_string()))
}

/// Accepts a bare array or an envelope such as `{ "posts": [...] }`. Entries
/// that do not decode are dropped.
fn decode_list<T: DeserializeOwned>(value: Value, key: &str) -> Result<Vec<T>, ForumError> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove(key) {
            Some(Value::Array(items)) => items,
            Some(_) => return Err(ForumError::Decode(format!("`{}` is not a list", key))),
            None => Vec::new(),
        },
        Value::Null => Vec::new(),
        _ => return Err(ForumError::Decode(format!("expected a list of {}", key))),
    };

    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(error = %e, kind = %key, "Skipping malformed forum entry");
                None
            }
        })
        .collect())
}

#[async_trait]
impl ForumStore for HttpForumClient {
    #[instrument(skip(self))]
    async fn get_thread(&self, id: &str) -> Result<ForumThread, ForumError> {
        let value = self
            .send(self.client.get(self.url(&format!("thread/{}", id))), "Thread")
            .await?;
        decode_one(value, "thread")
    }

    #[instrument(skip(self))]
    async fn get_post(&self, id: &str) -> Result<ForumPost, ForumError> {
        let value = self
            .send(self.client.get(self.url(&format!("post/{}", id))), "Post")
            .await?;
        decode_one(value, "post")
    }

    #[instrument(skip(self))]
    async fn get_posts_by_thread(&self, thread_id: &str) -> Result<Vec<ForumPost>, ForumError> {
        let value = self
            .send(
                self.client
                    .get(self.url(&format!("thread/{}/posts", thread_id))),
                "Thread",
            )
            .await?;
        decode_list(value, "posts")
    }

    #[instrument(skip(self))]
    async fn get_threads_by_type(&self, kind: &str) -> Result<Vec<ForumThread>, ForumError> {
        let value = self
            .send(self.client.get(self.url("threads")), "Threads")
            .await?;
        let threads: Vec<ForumThread> = decode_list(value, "threads")?;

        Ok(threads
            .into_iter()
            .filter(|t| extended_type(&t.extended_data) == Some(kind))
            .collect())
    }

    #[instrument(skip(self, data))]
    async fn create_thread(&self, data: NewThread) -> Result<ForumThread, ForumError> {
        let value = self
            .send(self.client.post(self.url("thread")).json(&data), "Thread")
            .await?;
        decode_one(value, "thread")
    }

    #[instrument(skip(self, data))]
    async fn create_post(&self, data: NewPost) -> Result<ForumPost, ForumError> {
        let value = self
            .send(self.client.post(self.url("post")).json(&data), "Post")
            .await?;
        decode_one(value, "post")
    }

    #[instrument(skip(self, data))]
    async fn update_thread(
        &self,
        id: &str,
        data: ThreadUpdate,
    ) -> Result<ForumThread, ForumError> {
        let value = self
            .send(
                self.client
                    .put(self.url(&format!("thread/{}", id)))
                    .json(&data),
                "Thread",
            )
            .await?;
        decode_one(value, "thread")
    }

    #[instrument(skip(self, data))]
    async fn update_post(&self, id: &str, data: PostUpdate) -> Result<ForumPost, ForumError> {
        let value = self
            .send(
                self.client.put(self.url(&format!("post/{}", id))).json(&data),
                "Post",
            )
            .await?;
        decode_one(value, "post")
    }

    #[instrument(skip(self))]
    async fn delete_post(&self, id: &str) -> Result<(), ForumError> {
        self.send(self.client.delete(self.url(&format!("post/{}", id))), "Post")
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn mark_post_helpful(&self, post_id: &str, user_id: &str) -> Result<(), ForumError> {
        self.send(
            self.client
                .post(self.url(&format!("post/{}/likes", post_id)))
                .json(&json!({ "userId": user_id })),
            "Post",
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn unmark_post_helpful(&self, post_id: &str, user_id: &str) -> Result<(), ForumError> {
        self.send(
            self.client
                .delete(self.url(&format!("post/{}/likes", post_id)))
                .query(&[("userId", user_id)]),
            "Post",
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn add_thread_participant(
        &self,
        thread_id: &str,
        user_id: &str,
    ) -> Result<(), ForumError> {
        self.send(
            self.client
                .post(self.url(&format!("thread/{}/participants", thread_id)))
                .json(&json!({ "userId": user_id })),
            "Thread",
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_user(&self, id: &str) -> Result<ForumUser, ForumError> {
        let value = self
            .send(self.client.get(self.url(&format!("user/{}", id))), "User")
            .await?;
        decode_one(value, "user")
    }
}
