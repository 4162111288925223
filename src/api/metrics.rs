//! Prometheus metrics endpoint
//!
//! Exposes application metrics in Prometheus format for monitoring and observability.

use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus::{Encoder, TextEncoder};

use crate::AppState;
use crate::data::{FollowerStore, PostStore};
use crate::metrics::{FOLLOWERS_TOTAL, POSTS_TOTAL, REGISTRY};

/// Metrics endpoint handler
///
/// Refreshes the stored-count gauges, then returns all metrics in
/// Prometheus text format.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.db.count_followers().await {
        Ok(count) => FOLLOWERS_TOTAL.set(count),
        Err(error) => tracing::warn!(%error, "Failed to count followers"),
    }
    match state.db.count_local_posts().await {
        Ok(count) => POSTS_TOTAL.set(count),
        Err(error) => tracing::warn!(%error, "Failed to count local posts"),
    }

    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    match encoder.encode_to_string(&metric_families) {
        Ok(metrics_text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, encoder.format_type())],
            metrics_text,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}

/// Create metrics router
///
/// Exposes the `/metrics` endpoint.
pub fn metrics_router() -> Router<AppState> {
    Router::new().route("/metrics", get(metrics_handler))
}
