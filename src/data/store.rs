//! Store interfaces consumed by the federation engine
//!
//! The engine never touches SQL directly. `Database` implements every trait;
//! tests substitute mocks to exercise failure paths.

use async_trait::async_trait;

use super::models::{Follower, KeyPair, NewPost, Post, PostCounter, Profile};
use crate::error::AppError;

/// Followers of the local actor
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FollowerStore: Send + Sync {
    /// Insert a follower, refreshing the inbox when the actor already follows
    async fn upsert_follower(&self, actor_iri: &str, inbox_iri: &str) -> Result<(), AppError>;

    /// Remove a follower; returns whether a row was deleted
    async fn remove_follower(&self, actor_iri: &str) -> Result<bool, AppError>;

    async fn list_followers(&self) -> Result<Vec<Follower>, AppError>;

    async fn count_followers(&self) -> Result<i64, AppError>;
}

/// Local and federated posts
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Insert a local post and assign `{notes_base}/{id}` as its URI atomically
    async fn insert_local_post(&self, post: &NewPost, notes_base: &str) -> Result<Post, AppError>;

    /// Insert a federated post keyed by its URI; returns false if it already exists
    async fn insert_federated_post(&self, post: &NewPost) -> Result<bool, AppError>;

    async fn get_post(&self, id: i64) -> Result<Option<Post>, AppError>;

    async fn get_post_by_uri(&self, uri: &str) -> Result<Option<Post>, AppError>;

    /// Replace content of the federated post with the given URI; returns whether it matched
    async fn update_post_content(
        &self,
        uri: &str,
        content: &str,
        content_warning: Option<String>,
    ) -> Result<bool, AppError>;

    /// Delete a local post by id, returning the removed row
    async fn delete_local_post(&self, id: i64) -> Result<Option<Post>, AppError>;

    /// Delete a federated post by URI; local posts are never matched
    async fn delete_federated_post(&self, uri: &str) -> Result<bool, AppError>;

    /// Add `delta` to a counter, never going below zero; returns whether the post exists
    async fn adjust_counter(
        &self,
        uri: &str,
        counter: PostCounter,
        delta: i64,
    ) -> Result<bool, AppError>;

    /// Newest local posts that may appear in the outbox
    async fn list_listed_local_posts(&self, limit: i64) -> Result<Vec<Post>, AppError>;

    async fn count_local_posts(&self) -> Result<i64, AppError>;
}

/// Signing keys of local actors
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyPairStore: Send + Sync {
    async fn get_key_pair(&self, actor_iri: &str) -> Result<Option<KeyPair>, AppError>;

    /// Insert unless a pair already exists for the actor, then return the stored pair
    async fn insert_key_pair_if_absent(&self, key_pair: &KeyPair) -> Result<KeyPair, AppError>;
}

/// The single stored profile
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self) -> Result<Option<Profile>, AppError>;

    /// Store the profile only when none exists yet; returns whether it was inserted
    async fn seed_profile(&self, profile: &Profile) -> Result<bool, AppError>;
}
