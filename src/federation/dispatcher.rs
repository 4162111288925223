//! Outbound dispatcher
//!
//! Turns local events into activities and queues one signed delivery per
//! recipient inbox.

use std::sync::Arc;

use axum::body::Bytes;
use serde_json::Value;

use super::delivery::builder;
use super::queue::{DeliveryJob, DeliveryQueue};
use super::visibility::to_addressing;
use crate::data::{FollowerStore, Post};
use crate::error::AppError;
use crate::metrics::ACTIVITYPUB_ACTIVITIES_SENT;

/// Schedules outbound activities for the local actor
pub struct OutboundDispatcher {
    followers: Arc<dyn FollowerStore>,
    queue: DeliveryQueue,
    base_url: String,
    actor_iri: String,
}

impl OutboundDispatcher {
    pub fn new(followers: Arc<dyn FollowerStore>, queue: DeliveryQueue, base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            followers,
            queue,
            actor_iri: format!("{}/profile", base_url),
            base_url,
        }
    }

    /// Canonical site base URL, without a trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// IRI of the local actor
    pub fn actor_iri(&self) -> &str {
        &self.actor_iri
    }

    /// Fan a Create for a local post out to every follower
    ///
    /// Returns the number of queued deliveries.
    pub async fn publish_create(&self, post: &Post) -> Result<usize, AppError> {
        let note = builder::note(post, &self.base_url).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("post {} has no URI to publish", post.id))
        })?;
        let activity = builder::create(&self.actor_iri, note);
        self.fan_out("Create", &activity).await
    }

    /// Fan a Delete for a local post out to every follower
    pub async fn publish_delete(&self, post: &Post) -> Result<usize, AppError> {
        let uri = post.uri.as_deref().ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("post {} has no URI to delete", post.id))
        })?;
        let (to, cc) = to_addressing(post.visibility, &self.base_url);
        let activity = builder::delete(
            &format!("{}/activities/delete-{}", self.base_url, ulid::Ulid::new()),
            &self.actor_iri,
            uri,
            &to,
            &cc,
        );
        self.fan_out("Delete", &activity).await
    }

    /// Queue an Accept for a Follow
    ///
    /// # Arguments
    /// * `follow_id` - IRI of the Follow, if it had one
    /// * `follower` - Actor IRI of the follower
    /// * `inbox` - The follower's inbox
    pub async fn send_accept(
        &self,
        follow_id: Option<&str>,
        follower: &str,
        inbox: &str,
    ) -> Result<(), AppError> {
        let mut follow = serde_json::json!({
            "type": "Follow",
            "actor": follower,
            "object": self.actor_iri
        });
        if let Some(id) = follow_id {
            follow["id"] = Value::String(id.to_string());
        }

        let accept = builder::accept(
            &format!("{}/activities/accept-{}", self.base_url, ulid::Ulid::new()),
            &self.actor_iri,
            follow,
            follower,
        );

        self.queue
            .enqueue(DeliveryJob {
                inbox: inbox.to_string(),
                body: serialize(&accept)?,
                actor_iri: self.actor_iri.clone(),
                activity_type: "Accept",
            })
            .await?;

        ACTIVITYPUB_ACTIVITIES_SENT
            .with_label_values(&["Accept"])
            .inc();
        tracing::debug!(follower = %follower, inbox = %inbox, "Queued Accept");
        Ok(())
    }

    async fn fan_out(
        &self,
        activity_type: &'static str,
        activity: &Value,
    ) -> Result<usize, AppError> {
        let body = serialize(activity)?;
        let followers = self.followers.list_followers().await?;

        for follower in &followers {
            self.queue
                .enqueue(DeliveryJob {
                    inbox: follower.inbox_iri.clone(),
                    body: body.clone(),
                    actor_iri: self.actor_iri.clone(),
                    activity_type,
                })
                .await?;
        }

        ACTIVITYPUB_ACTIVITIES_SENT
            .with_label_values(&[activity_type])
            .inc_by(followers.len() as u64);
        tracing::info!(
            activity_type,
            recipients = followers.len(),
            "Queued activity for followers"
        );
        Ok(followers.len())
    }
}

fn serialize(activity: &Value) -> Result<Bytes, AppError> {
    serde_json::to_vec(activity)
        .map(Bytes::from)
        .map_err(|e| AppError::Internal(e.into()))
}
