//! Local post service
//!
//! Creates and deletes the local actor's posts and hands them to the
//! outbound dispatcher. Fan-out problems are logged; the local operation
//! still succeeds.

use std::sync::Arc;

use crate::data::{NewPost, Post, PostStore, ProfileStore, Visibility};
use crate::error::AppError;
use crate::federation::OutboundDispatcher;
use crate::metrics::POSTS_TOTAL;

/// A post as written locally, before storage
#[derive(Debug, Clone)]
pub struct LocalDraft {
    pub content: String,
    pub content_warning: Option<String>,
    pub visibility: Visibility,
}

/// Local post service
pub struct LocalPostService {
    posts: Arc<dyn PostStore>,
    profiles: Arc<dyn ProfileStore>,
    dispatcher: Arc<OutboundDispatcher>,
    base_url: String,
    domain: String,
}

impl LocalPostService {
    /// Create new post service
    pub fn new(
        posts: Arc<dyn PostStore>,
        profiles: Arc<dyn ProfileStore>,
        dispatcher: Arc<OutboundDispatcher>,
        base_url: &str,
        domain: &str,
    ) -> Self {
        Self {
            posts,
            profiles,
            dispatcher,
            base_url: base_url.trim_end_matches('/').to_string(),
            domain: domain.to_string(),
        }
    }

    /// Create a local post and publish it to followers
    ///
    /// # Returns
    /// The stored post, with its URI assigned
    ///
    /// # Side Effects
    /// - Inserts into database
    /// - Queues a Create for every follower
    pub async fn create_local(&self, draft: LocalDraft) -> Result<Post, AppError> {
        let content = draft.content.trim().to_string();
        if content.is_empty() {
            return Err(AppError::Parse("post content is required".to_string()));
        }

        let profile = self.profiles.get_profile().await?.ok_or(AppError::NotFound)?;
        let new_post = NewPost {
            uri: None,
            content_warning: draft
                .content_warning
                .map(|cw| cw.trim().to_string())
                .filter(|cw| !cw.is_empty()),
            content,
            author_name: profile.display_name,
            author_handle: profile.handle,
            origin_host: self.domain.clone(),
            visibility: draft.visibility,
            created_at: chrono::Utc::now(),
        };

        let post = self
            .posts
            .insert_local_post(&new_post, &format!("{}/notes", self.base_url))
            .await?;
        POSTS_TOTAL.inc();

        if let Err(error) = self.dispatcher.publish_create(&post).await {
            tracing::error!(post_id = post.id, %error, "Failed to publish Create");
        }

        Ok(post)
    }

    /// Delete a local post and tell followers
    ///
    /// # Errors
    /// `NotFound` if no local post has that id
    pub async fn delete_local(&self, id: i64) -> Result<Post, AppError> {
        let post = self
            .posts
            .delete_local_post(id)
            .await?
            .ok_or(AppError::NotFound)?;
        POSTS_TOTAL.dec();

        if let Err(error) = self.dispatcher.publish_delete(&post).await {
            tracing::error!(post_id = post.id, %error, "Failed to publish Delete");
        }

        Ok(post)
    }
}
