//! Activity processing
//!
//! Handles incoming ActivityPub activities. Once an envelope parses, every
//! branch failure is logged here and never reaches the remote peer.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::content::strip_html;
use super::dispatcher::OutboundDispatcher;
use super::resolver::{ActorResolver, iri_host};
use super::visibility::from_addressing;
use super::vocab::{Activity, ActivityKind, NoteObject, ObjectRef};
use crate::data::{FollowerStore, NewPost, PostCounter, PostStore};
use crate::error::AppError;
use crate::metrics::{ACTIVITYPUB_ACTIVITIES_RECEIVED, FOLLOWERS_TOTAL};

/// Activity processor
///
/// Processes incoming ActivityPub activities from the inbox.
pub struct ActivityProcessor {
    followers: Arc<dyn FollowerStore>,
    posts: Arc<dyn PostStore>,
    resolver: Arc<ActorResolver>,
    dispatcher: Arc<OutboundDispatcher>,
    /// Host of this instance; remote objects may never claim it
    local_host: Option<String>,
}

impl ActivityProcessor {
    /// Create new activity processor
    pub fn new(
        followers: Arc<dyn FollowerStore>,
        posts: Arc<dyn PostStore>,
        resolver: Arc<ActorResolver>,
        dispatcher: Arc<OutboundDispatcher>,
    ) -> Self {
        let local_host = iri_host(dispatcher.base_url());
        Self {
            followers,
            posts,
            resolver,
            dispatcher,
            local_host,
        }
    }

    /// Process an incoming activity
    ///
    /// # Side Effects
    /// - May add or remove followers
    /// - May store, edit or remove federated posts
    /// - May adjust like/share counters
    /// - Queues an Accept for a Follow
    pub async fn process(&self, activity: &Activity) {
        let kind = activity.kind();
        ACTIVITYPUB_ACTIVITIES_RECEIVED
            .with_label_values(&[kind.as_str()])
            .inc();

        let result = match kind {
            ActivityKind::Follow => self.handle_follow(activity).await,
            ActivityKind::Undo => self.handle_undo(activity).await,
            ActivityKind::Create => self.handle_create(activity).await,
            ActivityKind::Update => self.handle_update(activity).await,
            ActivityKind::Delete => self.handle_delete(activity).await,
            ActivityKind::Like => self.adjust_target(activity, PostCounter::Likes, 1).await,
            ActivityKind::Announce => self.adjust_target(activity, PostCounter::Shares, 1).await,
            ActivityKind::Other => {
                tracing::debug!(activity_type = %activity.type_name, "Ignoring activity");
                Ok(())
            }
        };

        if let Err(error) = result {
            tracing::warn!(
                activity_type = %activity.type_name,
                activity_id = activity.id.as_deref().unwrap_or_default(),
                actor = actor_id(activity).unwrap_or_default(),
                kind = error.kind(),
                %error,
                "Failed to process activity"
            );
        }
    }

    /// Handle Follow activity
    async fn handle_follow(&self, activity: &Activity) -> Result<(), AppError> {
        let actor_ref = required(activity.actor.as_ref(), "Follow has no actor")?;
        let (actor, inbox) = self.resolver.resolve_inbox_of(actor_ref).await?;

        self.followers.upsert_follower(&actor.id, &inbox).await?;
        FOLLOWERS_TOTAL.set(self.followers.count_followers().await.unwrap_or_default());
        tracing::info!(actor = %actor.id, inbox = %inbox, "New follower");

        self.dispatcher
            .send_accept(activity.id.as_deref(), &actor.id, &inbox)
            .await
    }

    /// Handle Undo activity
    ///
    /// Only the embedded inner activity can be inspected; a bare link is ignored.
    async fn handle_undo(&self, activity: &Activity) -> Result<(), AppError> {
        let object = required(activity.object.as_ref(), "Undo has no object")?;
        let Some(inner) = object.as_object() else {
            tracing::debug!(object = object.id().unwrap_or_default(), "Undo of a bare link ignored");
            return Ok(());
        };
        let inner = Activity::from_object(inner)?;

        match inner.kind() {
            ActivityKind::Follow => {
                let actor = actor_id(activity)
                    .ok_or_else(|| AppError::Parse("Undo has no actor".to_string()))?;
                if self.followers.remove_follower(actor).await? {
                    FOLLOWERS_TOTAL
                        .set(self.followers.count_followers().await.unwrap_or_default());
                    tracing::info!(actor = %actor, "Follower removed");
                }
                Ok(())
            }
            ActivityKind::Like => self.adjust_target(&inner, PostCounter::Likes, -1).await,
            ActivityKind::Announce => self.adjust_target(&inner, PostCounter::Shares, -1).await,
            _ => {
                tracing::debug!(inner_type = %inner.type_name, "Ignoring Undo");
                Ok(())
            }
        }
    }

    /// Handle Create activity
    async fn handle_create(&self, activity: &Activity) -> Result<(), AppError> {
        let Some(object) = activity.object.as_ref().and_then(ObjectRef::as_object) else {
            tracing::debug!("Create without an embedded object ignored");
            return Ok(());
        };
        let note = NoteObject::from_object(object)?;

        let actor_ref = required(activity.actor.as_ref(), "Create has no actor")?;
        let actor = self.resolver.resolve(actor_ref).await?;
        self.check_ownership(&note.id, &actor.id)?;

        // The Note's own audience wins; fall back to the envelope's.
        let visibility = if note.to.is_empty() && note.cc.is_empty() {
            from_addressing(&activity.to, &activity.cc)
        } else {
            from_addressing(&note.to, &note.cc)
        };

        let post = NewPost {
            uri: Some(note.id.clone()),
            content_warning: note.content_warning(),
            content: strip_html(note.content.as_deref().unwrap_or_default()),
            author_name: actor.display_name(),
            author_handle: actor.handle(),
            origin_host: actor.host(),
            visibility,
            created_at: parse_published(note.published.as_deref()),
        };

        if self.posts.insert_federated_post(&post).await? {
            tracing::info!(uri = %note.id, actor = %actor.id, %visibility, "Stored federated post");
        } else {
            tracing::debug!(uri = %note.id, "Federated post already stored");
        }
        Ok(())
    }

    /// Handle Update activity
    async fn handle_update(&self, activity: &Activity) -> Result<(), AppError> {
        let Some(object) = activity.object.as_ref().and_then(ObjectRef::as_object) else {
            return Ok(());
        };
        if object.get("type").and_then(|t| t.as_str()) != Some("Note") {
            return Ok(());
        }
        let note = NoteObject::from_object(object)?;
        let actor = actor_id(activity)
            .ok_or_else(|| AppError::Parse("Update has no actor".to_string()))?;
        self.check_ownership(&note.id, actor)?;

        let content = strip_html(note.content.as_deref().unwrap_or_default());
        if self
            .posts
            .update_post_content(&note.id, &content, note.content_warning())
            .await?
        {
            tracing::info!(uri = %note.id, "Updated federated post");
        } else {
            tracing::debug!(uri = %note.id, "Update for unknown post ignored");
        }
        Ok(())
    }

    /// Handle Delete activity
    async fn handle_delete(&self, activity: &Activity) -> Result<(), AppError> {
        let uri = target_uri(activity, "Delete")?;
        let actor = actor_id(activity)
            .ok_or_else(|| AppError::Parse("Delete has no actor".to_string()))?;
        self.check_ownership(uri, actor)?;
        if self.posts.delete_federated_post(uri).await? {
            tracing::info!(uri = %uri, "Deleted federated post");
        } else {
            tracing::debug!(uri = %uri, "Delete for unknown post ignored");
        }
        Ok(())
    }

    /// Require a remote object IRI to live on its sender's host
    ///
    /// # Errors
    /// `Security` for IRIs on this instance or on another host
    fn check_ownership(&self, object_iri: &str, actor_iri: &str) -> Result<(), AppError> {
        let object_host = iri_host(object_iri)
            .ok_or_else(|| AppError::Parse(format!("Invalid object IRI: {}", object_iri)))?;

        if self.local_host.as_deref() == Some(object_host.as_str()) {
            return Err(AppError::Security(format!(
                "{} claims local object {}",
                actor_iri, object_iri
            )));
        }
        if iri_host(actor_iri).as_deref() != Some(object_host.as_str()) {
            return Err(AppError::Security(format!(
                "{} does not own {}",
                actor_iri, object_iri
            )));
        }
        Ok(())
    }

    /// Apply a Like/Announce (or its undo) to the target post's counter
    async fn adjust_target(
        &self,
        activity: &Activity,
        counter: PostCounter,
        delta: i64,
    ) -> Result<(), AppError> {
        let uri = target_uri(activity, &activity.type_name)?;
        if !self.posts.adjust_counter(uri, counter, delta).await? {
            tracing::debug!(
                uri = %uri,
                activity_type = %activity.type_name,
                "Target post not found"
            );
        }
        Ok(())
    }
}

fn required<'a>(value: Option<&'a ObjectRef>, message: &str) -> Result<&'a ObjectRef, AppError> {
    value.ok_or_else(|| AppError::Parse(message.to_string()))
}

fn actor_id(activity: &Activity) -> Option<&str> {
    activity.actor.as_ref().and_then(ObjectRef::id)
}

fn target_uri<'a>(activity: &'a Activity, activity_type: &str) -> Result<&'a str, AppError> {
    activity
        .object
        .as_ref()
        .and_then(ObjectRef::id)
        .ok_or_else(|| AppError::Parse(format!("{} has no target", activity_type)))
}

fn parse_published(published: Option<&str>) -> DateTime<Utc> {
    published
        .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
        .map(|value| value.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}
