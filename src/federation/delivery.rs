//! Activity delivery
//!
//! Executes queued delivery jobs as signed POSTs, and builds the outbound
//! protocol documents.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, DATE, HOST};

use super::keys::KeyManager;
use super::queue::{DeliveryExecutor, DeliveryJob};
use super::resolver::check_fetch_target;
use super::signature::sign_request;
use super::vocab::ACTIVITY_JSON;
use crate::error::AppError;

/// Activity delivery service
///
/// Signs each job with its actor's key and POSTs it to the target inbox.
#[derive(Clone)]
pub struct ActivityDelivery {
    http_client: reqwest::Client,
    keys: Arc<KeyManager>,
    dev_mode: bool,
}

impl ActivityDelivery {
    /// Create new delivery service
    pub fn new(http_client: reqwest::Client, keys: Arc<KeyManager>, dev_mode: bool) -> Self {
        Self {
            http_client,
            keys,
            dev_mode,
        }
    }

    /// Build the signed request for a job without sending it
    ///
    /// Headers: Content-Type, Host, Date, Digest, Signature.
    pub async fn build_request(&self, job: &DeliveryJob) -> Result<reqwest::Request, AppError> {
        let inbox = check_fetch_target(&job.inbox, self.dev_mode).await?;
        let key_pair = self.keys.get_or_create(&job.actor_iri).await?;

        let sig_headers = sign_request(
            "POST",
            inbox.as_str(),
            &job.body,
            &key_pair.private_key_pem,
            &key_pair.key_id(),
        )?;

        let request = self
            .http_client
            .post(inbox)
            .header(CONTENT_TYPE, ACTIVITY_JSON)
            .header(HOST, sig_headers.host)
            .header(DATE, sig_headers.date)
            .header("Digest", sig_headers.digest)
            .header("Signature", sig_headers.signature)
            .body(job.body.clone())
            .build()?;

        Ok(request)
    }

    /// Deliver a job to its inbox
    ///
    /// # Errors
    /// Returns error if signing fails, the transport fails, or the inbox
    /// answers with a non-2xx status
    pub async fn deliver(&self, job: &DeliveryJob) -> Result<(), AppError> {
        let request = self.build_request(job).await?;
        let response = self.http_client.execute(request).await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::fetch(status.as_u16(), &body));
        }

        tracing::info!(
            inbox = %job.inbox,
            activity_type = job.activity_type,
            "Successfully delivered activity"
        );
        Ok(())
    }
}

#[async_trait]
impl DeliveryExecutor for ActivityDelivery {
    async fn execute(&self, job: &DeliveryJob) -> Result<(), AppError> {
        self.deliver(job).await
    }
}

/// Build ActivityPub documents
pub mod builder {
    use serde_json::Value;

    use crate::data::{Post, Profile};
    use crate::federation::content::text_to_html;
    use crate::federation::visibility::to_addressing;
    use crate::federation::vocab::{ACTIVITY_STREAMS_CONTEXT, SECURITY_CONTEXT};

    /// Build the local actor document
    ///
    /// # Arguments
    /// * `profile` - Stored profile
    /// * `base_url` - Canonical site base URL
    /// * `public_key_pem` - Published signing key
    pub fn person(profile: &Profile, base_url: &str, public_key_pem: &str) -> Value {
        let actor = format!("{}/profile", base_url);
        let mut document = serde_json::json!({
            "@context": [ACTIVITY_STREAMS_CONTEXT, SECURITY_CONTEXT],
            "id": actor,
            "type": "Person",
            "preferredUsername": profile.handle,
            "name": profile.display_name,
            "summary": profile.bio,
            "url": actor,
            "inbox": format!("{}/inbox", base_url),
            "outbox": format!("{}/outbox", base_url),
            "followers": format!("{}/followers", base_url),
            "manuallyApprovesFollowers": false,
            "publicKey": {
                "id": format!("{}#main-key", actor),
                "owner": actor,
                "publicKeyPem": public_key_pem
            }
        });

        if let Some(avatar_url) = &profile.avatar_url {
            document["icon"] = serde_json::json!({
                "type": "Image",
                "url": avatar_url
            });
        }

        document
    }

    /// Build a Note object for a local post
    ///
    /// Returns `None` if the post has no URI yet.
    pub fn note(post: &Post, base_url: &str) -> Option<Value> {
        let uri = post.uri.as_deref()?;
        let (to, cc) = to_addressing(post.visibility, base_url);

        let mut note = serde_json::json!({
            "@context": ACTIVITY_STREAMS_CONTEXT,
            "id": uri,
            "type": "Note",
            "url": uri,
            "attributedTo": format!("{}/profile", base_url),
            "content": text_to_html(&post.content),
            "published": post.created_at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            "to": to,
            "cc": cc
        });

        if let Some(content_warning) = post.content_warning.as_deref().filter(|cw| !cw.is_empty())
        {
            note["sensitive"] = Value::Bool(true);
            note["summary"] = Value::String(content_warning.to_string());
        }

        Some(note)
    }

    /// Build a Create activity wrapping a Note
    ///
    /// The activity id is `{note id}/activity` and it copies the Note's audience.
    pub fn create(actor: &str, note: Value) -> Value {
        let note_id = note["id"].as_str().unwrap_or_default().to_string();
        serde_json::json!({
            "@context": ACTIVITY_STREAMS_CONTEXT,
            "type": "Create",
            "id": format!("{}/activity", note_id),
            "actor": actor,
            "published": note["published"].clone(),
            "to": note["to"].clone(),
            "cc": note["cc"].clone(),
            "object": note
        })
    }

    /// Build a Delete activity
    ///
    /// # Arguments
    /// * `id` - Activity ID (unique URI)
    /// * `actor` - Actor URI (deleter)
    /// * `object` - Object URI being deleted
    pub fn delete(id: &str, actor: &str, object: &str, to: &[String], cc: &[String]) -> Value {
        serde_json::json!({
            "@context": ACTIVITY_STREAMS_CONTEXT,
            "type": "Delete",
            "id": id,
            "actor": actor,
            "object": {
                "type": "Tombstone",
                "id": object
            },
            "to": to,
            "cc": cc
        })
    }

    /// Build an Accept activity
    ///
    /// # Arguments
    /// * `id` - Activity ID (unique URI)
    /// * `actor` - Actor URI (accepter)
    /// * `object` - The Follow being accepted
    /// * `to` - The follower
    pub fn accept(id: &str, actor: &str, object: Value, to: &str) -> Value {
        serde_json::json!({
            "@context": ACTIVITY_STREAMS_CONTEXT,
            "type": "Accept",
            "id": id,
            "actor": actor,
            "object": object,
            "to": [to]
        })
    }

    /// Build an OrderedCollection
    pub fn ordered_collection(id: &str, items: Vec<Value>) -> Value {
        serde_json::json!({
            "@context": ACTIVITY_STREAMS_CONTEXT,
            "id": id,
            "type": "OrderedCollection",
            "totalItems": items.len(),
            "orderedItems": items
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{MockKeyPairStore, Post, Visibility};
    use crate::federation::signature::verify_signature;
    use crate::federation::vocab::PUBLIC_COLLECTION;
    use axum::body::Bytes;
    use chrono::{TimeZone, Utc};
    use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
    use rsa::pkcs8::EncodePublicKey;

    const ACTOR: &str = "https://local.example/profile";

    fn test_key_pair() -> crate::data::KeyPair {
        let mut rng = rand::thread_rng();
        let private_key = rsa::RsaPrivateKey::new(&mut rng, 1024).expect("key");
        let public_key = rsa::RsaPublicKey::from(&private_key);
        crate::data::KeyPair::new(
            ACTOR,
            public_key.to_public_key_pem(LineEnding::LF).expect("public pem"),
            private_key
                .to_pkcs1_pem(LineEnding::LF)
                .expect("private pem")
                .to_string(),
        )
    }

    fn sample_post(visibility: Visibility, content_warning: Option<&str>) -> Post {
        Post {
            id: 7,
            uri: Some("https://local.example/notes/7".to_string()),
            content_warning: content_warning.map(str::to_string),
            content: "hello & welcome".to_string(),
            author_name: "Alice".to_string(),
            author_handle: "alice".to_string(),
            origin_host: "local.example".to_string(),
            visibility,
            like_count: 0,
            share_count: 0,
            is_local: true,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn build_request_signs_with_stored_key() {
        let key_pair = test_key_pair();
        let public_key_pem = key_pair.public_key_pem.clone();
        let mut store = MockKeyPairStore::new();
        store
            .expect_get_key_pair()
            .returning(move |_| Ok(Some(key_pair.clone())));

        let delivery = ActivityDelivery::new(
            reqwest::Client::new(),
            Arc::new(KeyManager::new(Arc::new(store))),
            true,
        );
        let job = DeliveryJob {
            inbox: "http://127.0.0.1:4567/users/bob/inbox".to_string(),
            body: Bytes::from_static(br#"{"type":"Create"}"#),
            actor_iri: ACTOR.to_string(),
            activity_type: "Create",
        };

        let request = delivery.build_request(&job).await.unwrap();
        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.headers()[CONTENT_TYPE], ACTIVITY_JSON);
        assert_eq!(request.headers()[HOST], "127.0.0.1:4567");

        let signature = request.headers()["signature"].to_str().unwrap();
        assert!(signature.contains(&format!("keyId=\"{}#main-key\"", ACTOR)));

        let body = request.body().and_then(|b| b.as_bytes()).unwrap();
        verify_signature(
            "POST",
            request.url().path(),
            request.headers(),
            Some(body),
            &public_key_pem,
        )
        .expect("signature verifies");
    }

    #[tokio::test]
    async fn build_request_refuses_private_inbox_outside_dev_mode() {
        let store = MockKeyPairStore::new();
        let delivery = ActivityDelivery::new(
            reqwest::Client::new(),
            Arc::new(KeyManager::new(Arc::new(store))),
            false,
        );
        let job = DeliveryJob {
            inbox: "http://10.0.0.5/inbox".to_string(),
            body: Bytes::from_static(b"{}"),
            actor_iri: ACTOR.to_string(),
            activity_type: "Create",
        };

        assert!(matches!(
            delivery.build_request(&job).await,
            Err(AppError::Security(_))
        ));
    }

    #[test]
    fn note_carries_addressing_and_content_warning() {
        let note = builder::note(
            &sample_post(Visibility::Public, Some("spoilers")),
            "https://local.example",
        )
        .unwrap();

        assert_eq!(note["type"], "Note");
        assert_eq!(note["id"], "https://local.example/notes/7");
        assert_eq!(note["attributedTo"], ACTOR);
        assert_eq!(note["content"], "<p>hello &amp; welcome</p>");
        assert_eq!(note["published"], "2024-05-01T12:00:00Z");
        assert_eq!(note["to"], serde_json::json!([PUBLIC_COLLECTION]));
        assert_eq!(note["cc"], serde_json::json!([]));
        assert_eq!(note["sensitive"], true);
        assert_eq!(note["summary"], "spoilers");
    }

    #[test]
    fn note_without_content_warning_omits_sensitive() {
        let note = builder::note(&sample_post(Visibility::Unlisted, None), "https://local.example")
            .unwrap();
        assert!(note.get("sensitive").is_none());
        assert!(note.get("summary").is_none());
        assert_eq!(note["cc"], serde_json::json!([PUBLIC_COLLECTION]));
    }

    #[test]
    fn note_requires_uri() {
        let mut post = sample_post(Visibility::Public, None);
        post.uri = None;
        assert!(builder::note(&post, "https://local.example").is_none());
    }

    #[test]
    fn create_wraps_note_and_copies_audience() {
        let note = builder::note(
            &sample_post(Visibility::FollowersOnly, None),
            "https://local.example",
        )
        .unwrap();
        let create = builder::create(ACTOR, note);

        assert_eq!(create["type"], "Create");
        assert_eq!(create["id"], "https://local.example/notes/7/activity");
        assert_eq!(create["actor"], ACTOR);
        assert_eq!(
            create["cc"],
            serde_json::json!(["https://local.example/followers"])
        );
        assert_eq!(create["object"]["id"], "https://local.example/notes/7");
    }

    #[test]
    fn person_publishes_main_key() {
        let profile = crate::data::Profile {
            handle: "alice".to_string(),
            display_name: "Alice".to_string(),
            bio: "bio".to_string(),
            avatar_url: Some("https://cdn.example/a.png".to_string()),
            updated_at: Utc::now(),
        };
        let person = builder::person(&profile, "https://local.example", "PEM");

        assert_eq!(person["id"], ACTOR);
        assert_eq!(person["type"], "Person");
        assert_eq!(person["preferredUsername"], "alice");
        assert_eq!(person["inbox"], "https://local.example/inbox");
        assert_eq!(person["outbox"], "https://local.example/outbox");
        assert_eq!(person["publicKey"]["id"], "https://local.example/profile#main-key");
        assert_eq!(person["publicKey"]["owner"], ACTOR);
        assert_eq!(person["publicKey"]["publicKeyPem"], "PEM");
        assert_eq!(person["icon"]["url"], "https://cdn.example/a.png");
    }
}
