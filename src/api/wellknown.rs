//! Well-known endpoints
//!
//! - /.well-known/webfinger
//! - /.well-known/nodeinfo
//! - /nodeinfo/2.1

use axum::{
    Router,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde::Deserialize;

use crate::AppState;
use crate::data::{PostStore, ProfileStore};
use crate::error::AppError;
use crate::federation::{generate_webfinger_response, match_resource};
use crate::metrics::HTTP_REQUESTS_TOTAL;

const NODEINFO_PROFILE: &str =
    "application/json; profile=\"http://nodeinfo.diaspora.software/ns/schema/2.1#\"";

/// Create well-known router
///
/// Routes:
/// - GET /.well-known/webfinger
/// - GET /.well-known/nodeinfo
/// - GET /nodeinfo/2.1
pub fn wellknown_router() -> Router<AppState> {
    Router::new()
        .route("/.well-known/webfinger", get(webfinger))
        .route("/.well-known/nodeinfo", get(nodeinfo))
        .route("/nodeinfo/2.1", get(nodeinfo))
}

/// WebFinger query parameters
#[derive(Debug, Deserialize)]
struct WebFingerQuery {
    resource: String,
}

/// GET /.well-known/webfinger
///
/// Responds to WebFinger queries for the local actor.
///
/// Query: ?resource=acct:handle@domain
async fn webfinger(
    State(state): State<AppState>,
    Query(query): Query<WebFingerQuery>,
) -> Result<Response, AppError> {
    let profile = state.db.get_profile().await?.ok_or(AppError::NotFound)?;
    let server = &state.config.server;

    match_resource(
        &query.resource,
        &profile.handle,
        &server.domain,
        &server.actor_iri(),
    )?;

    HTTP_REQUESTS_TOTAL
        .with_label_values(&["GET", "/.well-known/webfinger", "200"])
        .inc();

    let response = generate_webfinger_response(&profile.handle, &server.domain, &server.base_url());
    Ok((
        [(header::CONTENT_TYPE, "application/jrd+json")],
        Json(response),
    )
        .into_response())
}

/// GET /.well-known/nodeinfo and /nodeinfo/2.1
///
/// Returns the NodeInfo 2.1 document.
async fn nodeinfo(State(state): State<AppState>) -> Result<Response, AppError> {
    let local_posts = state.db.count_local_posts().await?;
    let instance = &state.config.instance;
    let description = state
        .db
        .get_profile()
        .await?
        .map(|profile| profile.bio)
        .filter(|bio| !bio.trim().is_empty())
        .unwrap_or_else(|| instance.description.clone());

    let document = serde_json::json!({
        "version": "2.1",
        "software": {
            "name": "solofed",
            "version": env!("CARGO_PKG_VERSION"),
            "homepage": state.config.server.base_url()
        },
        "protocols": ["activitypub"],
        "services": {
            "inbound": [],
            "outbound": []
        },
        "openRegistrations": false,
        "usage": {
            "users": {
                "total": 1,
                "activeMonth": 1,
                "activeHalfyear": 1
            },
            "localPosts": local_posts
        },
        "metadata": {
            "nodeName": instance.title,
            "nodeDescription": description
        }
    });

    Ok(([(header::CONTENT_TYPE, NODEINFO_PROFILE)], Json(document)).into_response())
}
