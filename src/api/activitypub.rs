//! ActivityPub endpoints
//!
//! - Actor profile
//! - Inbox (activity receiving)
//! - Notes
//! - Outbox
//! - Followers collection

use axum::body::Bytes;
use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
};

use crate::AppState;
use crate::data::{FollowerStore, Post, PostStore, Profile, ProfileStore};
use crate::error::AppError;
use crate::federation::builder;
use crate::federation::vocab::{ACTIVITY_JSON, Activity};
use crate::metrics::{FEDERATION_REQUESTS_TOTAL, HTTP_REQUESTS_TOTAL};

/// Number of posts listed in the outbox
const OUTBOX_LIMIT: i64 = 20;

/// Create ActivityPub router
///
/// Routes:
/// - GET /profile - Actor document
/// - POST /inbox - Inbox
/// - GET /notes/:id - Note document
/// - GET /outbox - Outbox
/// - GET /followers - Followers collection
pub fn activitypub_router() -> Router<AppState> {
    Router::new()
        .route("/profile", get(profile))
        .route("/inbox", post(inbox))
        .route("/notes/:id", get(note))
        .route("/outbox", get(outbox))
        .route("/followers", get(followers))
}

/// Whether the client asked for a protocol document rather than HTML
fn wants_activity_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|accept| {
            accept.contains("application/activity+json") || accept.contains("application/ld+json")
        })
}

fn activity_json(document: serde_json::Value) -> Response {
    ([(header::CONTENT_TYPE, ACTIVITY_JSON)], Json(document)).into_response()
}

fn profile_html(profile: &Profile, domain: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><title>{name}</title></head><body><h1>{name}</h1><p>@{handle}@{domain}</p><p>{bio}</p></body></html>",
        name = html_escape::encode_text(&profile.display_name),
        handle = html_escape::encode_text(&profile.handle),
        domain = html_escape::encode_text(domain),
        bio = html_escape::encode_text(&profile.bio),
    )
}

fn note_html(post: &Post) -> String {
    let warning = post
        .content_warning
        .as_deref()
        .map(|cw| format!("<p><strong>{}</strong></p>", html_escape::encode_text(cw)))
        .unwrap_or_default();
    format!(
        "<!DOCTYPE html><html><head><title>{author}</title></head><body><article><h2>{author}</h2>{warning}{content}<time>{published}</time></article></body></html>",
        author = html_escape::encode_text(&post.author_name),
        warning = warning,
        content = crate::federation::content::text_to_html(&post.content),
        published = post.created_at.to_rfc3339(),
    )
}

/// GET /profile
///
/// Returns the actor document, creating the signing key on first request.
async fn profile(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, AppError> {
    let profile = state.db.get_profile().await?.ok_or(AppError::NotFound)?;

    HTTP_REQUESTS_TOTAL
        .with_label_values(&["GET", "/profile", "200"])
        .inc();

    if !wants_activity_json(&headers) {
        return Ok(Html(profile_html(&profile, &state.config.server.domain)).into_response());
    }

    let key_pair = state
        .keys
        .get_or_create(&state.config.server.actor_iri())
        .await?;
    Ok(activity_json(builder::person(
        &profile,
        &state.config.server.base_url(),
        &key_pair.public_key_pem,
    )))
}

/// POST /inbox
///
/// Receives incoming ActivityPub activities. Answers 200 once the body
/// parses; processing failures are logged, not returned.
async fn inbox(State(state): State<AppState>, body: Bytes) -> Result<StatusCode, AppError> {
    let activity = Activity::parse(&body).inspect_err(|_| {
        FEDERATION_REQUESTS_TOTAL
            .with_label_values(&["inbound", "rejected"])
            .inc();
    })?;

    state.processor.process(&activity).await;

    FEDERATION_REQUESTS_TOTAL
        .with_label_values(&["inbound", "success"])
        .inc();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&["POST", "/inbox", "200"])
        .inc();

    Ok(StatusCode::OK)
}

/// GET /notes/:id
///
/// Returns a public or unlisted local post.
async fn note(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let id: i64 = id.parse().map_err(|_| AppError::NotFound)?;
    let post = state
        .db
        .get_post(id)
        .await?
        .filter(|post| post.is_local && post.visibility.is_listed())
        .ok_or(AppError::NotFound)?;

    HTTP_REQUESTS_TOTAL
        .with_label_values(&["GET", "/notes/:id", "200"])
        .inc();

    if !wants_activity_json(&headers) {
        return Ok(Html(note_html(&post)).into_response());
    }

    let note = builder::note(&post, &state.config.server.base_url()).ok_or(AppError::NotFound)?;
    Ok(activity_json(note))
}

/// GET /outbox
///
/// Returns Create activities for the latest public and unlisted posts.
async fn outbox(State(state): State<AppState>) -> Result<Response, AppError> {
    let base_url = state.config.server.base_url();
    let actor_iri = state.config.server.actor_iri();
    let posts = state.db.list_listed_local_posts(OUTBOX_LIMIT).await?;

    let items: Vec<serde_json::Value> = posts
        .iter()
        .filter_map(|post| builder::note(post, &base_url))
        .map(|note| builder::create(&actor_iri, note))
        .collect();

    Ok(activity_json(builder::ordered_collection(
        &format!("{}/outbox", base_url),
        items,
    )))
}

/// GET /followers
///
/// Returns Followers collection of actor IRIs.
async fn followers(State(state): State<AppState>) -> Result<Response, AppError> {
    let base_url = state.config.server.base_url();
    let items = state
        .db
        .list_followers()
        .await?
        .into_iter()
        .map(|follower| serde_json::Value::String(follower.actor_iri))
        .collect();

    Ok(activity_json(builder::ordered_collection(
        &format!("{}/followers", base_url),
        items,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use chrono::Utc;

    #[test]
    fn content_negotiation_recognises_protocol_types() {
        let mut headers = HeaderMap::new();
        assert!(!wants_activity_json(&headers));

        headers.insert(header::ACCEPT, HeaderValue::from_static("text/html"));
        assert!(!wants_activity_json(&headers));

        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static(
                "application/ld+json; profile=\"https://www.w3.org/ns/activitystreams\"",
            ),
        );
        assert!(wants_activity_json(&headers));

        headers.insert(header::ACCEPT, HeaderValue::from_static(ACTIVITY_JSON));
        assert!(wants_activity_json(&headers));
    }

    #[test]
    fn profile_html_escapes_fields() {
        let profile = Profile {
            handle: "alice".to_string(),
            display_name: "<script>x</script>".to_string(),
            bio: "a & b".to_string(),
            avatar_url: None,
            updated_at: Utc::now(),
        };
        let html = profile_html(&profile, "local.example");
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("a &amp; b"));
        assert!(html.contains("@alice@local.example"));
    }
}
