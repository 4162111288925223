//! Solofed - a single-tenant ActivityPub federation endpoint
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - ActivityPub endpoints (profile, inbox, notes)            │
//! │  - WebFinger / NodeInfo                                     │
//! │  - Metrics                                                  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Service / Federation Layer                  │
//! │  - Local post creation and deletion                         │
//! │  - Inbound activity processing                              │
//! │  - Outbound dispatch and paced, signed delivery             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - SQLite (sqlx) behind narrow store traits                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers
//! - `service`: Local post operations
//! - `federation`: ActivityPub federation engine
//! - `data`: Database and store traits
//! - `config`: Configuration management
//! - `error`: Error types
//! - `metrics`: Prometheus instruments

pub mod api;
pub mod config;
pub mod data;
pub mod error;
pub mod federation;
pub mod metrics;
pub mod service;

use std::sync::Arc;

use data::{FollowerStore, PostStore, ProfileStore};

/// Application state shared across all handlers
///
/// Built once at startup; every component is injected explicitly.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Database connection pool
    pub db: Arc<data::Database>,

    /// Signing keys of the local actor
    pub keys: Arc<federation::KeyManager>,

    /// Remote actor lookup
    pub resolver: Arc<federation::ActorResolver>,

    /// Outbound activity fan-out
    pub dispatcher: Arc<federation::OutboundDispatcher>,

    /// Inbox processing
    pub processor: Arc<federation::ActivityProcessor>,

    /// Local post operations
    pub posts: Arc<service::LocalPostService>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Connect to SQLite database
    /// 2. Seed the profile from configuration
    /// 3. Build the shared HTTP client
    /// 4. Start the delivery loop
    /// 5. Wire the federation engine
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        // 1. Connect to SQLite database
        let db = Arc::new(data::Database::connect(&config.database.path).await?);
        tracing::info!("Database connected");

        // 2. Seed profile
        let profile = data::Profile {
            handle: config.profile.handle.clone(),
            display_name: config.profile.display_name.clone(),
            bio: config.profile.bio.clone(),
            avatar_url: config.profile.avatar_url.clone(),
            updated_at: chrono::Utc::now(),
        };
        if db.seed_profile(&profile).await? {
            tracing::info!(handle = %profile.handle, "Profile created");
        }

        // 3. Initialize HTTP client; redirects would sidestep the fetch-target check
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("Solofed/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .timeout(config.federation.delivery_timeout())
            .build()?;

        let federation_config = &config.federation;
        let base_url = config.server.base_url();

        // 4. Start the delivery loop
        let keys = Arc::new(federation::KeyManager::new(db.clone()));
        let (queue, receiver) = federation::DeliveryQueue::bounded(federation_config.queue_capacity);
        let delivery = Arc::new(federation::ActivityDelivery::new(
            http_client.clone(),
            keys.clone(),
            federation_config.dev_mode,
        ));
        receiver.spawn(
            delivery,
            federation::Pacing {
                rate_per_minute: federation_config.delivery_rate_per_minute,
                max_in_flight: federation_config.max_in_flight,
                timeout: federation_config.delivery_timeout(),
            },
        );

        // 5. Wire the engine
        let resolver = Arc::new(federation::ActorResolver::new(
            http_client,
            federation_config.dev_mode,
            federation_config.fetch_timeout(),
        ));
        let dispatcher = Arc::new(federation::OutboundDispatcher::new(
            db.clone(),
            queue,
            &base_url,
        ));
        let processor = Arc::new(federation::ActivityProcessor::new(
            db.clone(),
            db.clone(),
            resolver.clone(),
            dispatcher.clone(),
        ));
        let posts = Arc::new(service::LocalPostService::new(
            db.clone(),
            db.clone(),
            dispatcher.clone(),
            &base_url,
            &config.server.domain,
        ));

        metrics::FOLLOWERS_TOTAL.set(db.count_followers().await?);
        metrics::POSTS_TOTAL.set(db.count_local_posts().await?);

        tracing::info!("Application state initialized successfully");

        Ok(Self {
            config: Arc::new(config),
            db,
            keys,
            resolver,
            dispatcher,
            processor,
            posts,
        })
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use tower_http::{compression::CompressionLayer, trace::TraceLayer};

    let cors_layer = build_cors_layer(&state.config.server);

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(api::wellknown_router())
        .merge(api::activitypub_router())
        .merge(api::metrics_router())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

fn build_cors_layer(server: &config::ServerConfig) -> tower_http::cors::CorsLayer {
    use axum::http::HeaderValue;
    use tower_http::cors::{Any, CorsLayer};

    if !server.protocol.eq_ignore_ascii_case("https") {
        return CorsLayer::permissive();
    }

    let allowed_origin = server.base_url();
    match HeaderValue::from_str(&allowed_origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin([origin])
            .allow_methods(Any)
            .allow_headers(Any),
        Err(error) => {
            tracing::error!(
                %error,
                origin = %allowed_origin,
                "Failed to parse CORS origin from server base URL; denying cross-origin requests"
            );
            CorsLayer::new().allow_methods(Any).allow_headers(Any)
        }
    }
}

async fn health_check() -> &'static str {
    "OK"
}
