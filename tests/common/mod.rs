//! Common test utilities for E2E tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use solofed::{AppState, config};
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance
    ///
    /// Dev mode is on so the server can talk to a [`RemotePeer`] on loopback.
    pub async fn new() -> Self {
        // Create temporary directory for test database
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        // Bind first so the public domain carries the real port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Create test configuration
        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: addr.port(),
                domain: addr.to_string(),
                protocol: "http".to_string(),
            },
            database: config::DatabaseConfig { path: db_path },
            profile: config::ProfileConfig {
                handle: "testuser".to_string(),
                display_name: "Test User".to_string(),
                bio: "Test bio".to_string(),
                avatar_url: None,
            },
            instance: config::InstanceConfig {
                title: "Test Instance".to_string(),
                description: "Test Solofed Instance".to_string(),
            },
            federation: config::FederationConfig {
                dev_mode: true,
                delivery_rate_per_minute: 60_000,
                queue_capacity: 100,
                max_in_flight: 8,
                delivery_timeout_seconds: 5,
                fetch_timeout_seconds: 5,
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        // Initialize app state
        let state = AppState::new(config).await.unwrap();

        // Create HTTP client
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap();

        // Build router
        let app = solofed::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: format!("http://{}", addr),
            state,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// IRI of the local actor
    pub fn actor_iri(&self) -> String {
        self.url("/profile")
    }

    /// Host part of the public domain, as used in `acct:` addresses
    pub fn domain(&self) -> &str {
        &self.state.config.server.domain
    }

    /// POST a JSON activity to the inbox
    pub async fn post_inbox(&self, activity: &serde_json::Value) -> reqwest::Response {
        self.client
            .post(self.url("/inbox"))
            .header("Content-Type", "application/activity+json")
            .body(activity.to_string())
            .send()
            .await
            .unwrap()
    }

    /// Fetch the published actor key
    pub async fn public_key_pem(&self) -> String {
        let actor: serde_json::Value = self
            .client
            .get(self.url("/profile"))
            .header("Accept", "application/activity+json")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        actor["publicKey"]["publicKeyPem"]
            .as_str()
            .unwrap()
            .to_string()
    }
}

/// A request received by a [`RemotePeer`] inbox
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ReceivedRequest {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

#[derive(Clone)]
struct PeerState {
    base: String,
    received: Arc<Mutex<Vec<ReceivedRequest>>>,
}

/// An in-process "remote" server: serves actor documents and records inbox POSTs
pub struct RemotePeer {
    pub base: String,
    received: Arc<Mutex<Vec<ReceivedRequest>>>,
}

impl RemotePeer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let received = Arc::new(Mutex::new(Vec::new()));

        let app = Router::new()
            .route("/users/:name", get(peer_actor))
            .route("/users/:name/inbox", post(peer_inbox))
            .with_state(PeerState {
                base: base.clone(),
                received: received.clone(),
            });

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base, received }
    }

    /// Actor IRI for a user on this peer
    pub fn actor(&self, name: &str) -> String {
        format!("{}/users/{}", self.base, name)
    }

    /// Inbox IRI for a user on this peer
    pub fn inbox(&self, name: &str) -> String {
        format!("{}/users/{}/inbox", self.base, name)
    }

    pub fn received(&self) -> Vec<ReceivedRequest> {
        self.received.lock().unwrap().clone()
    }

    /// Wait until at least `count` inbox POSTs arrived
    pub async fn wait_for(&self, count: usize) -> Vec<ReceivedRequest> {
        for _ in 0..500 {
            let received = self.received();
            if received.len() >= count {
                return received;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!(
            "expected {} deliveries, got {}",
            count,
            self.received().len()
        );
    }
}

async fn peer_actor(
    State(state): State<PeerState>,
    Path(name): Path<String>,
) -> Json<serde_json::Value> {
    let id = format!("{}/users/{}", state.base, name);
    Json(serde_json::json!({
        "@context": "https://www.w3.org/ns/activitystreams",
        "id": id,
        "type": "Person",
        "preferredUsername": name,
        "name": format!("Remote {}", name),
        "inbox": format!("{}/inbox", id)
    }))
}

async fn peer_inbox(
    State(state): State<PeerState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    state.received.lock().unwrap().push(ReceivedRequest {
        path: format!("/users/{}/inbox", name),
        headers,
        body,
    });
    StatusCode::ACCEPTED
}
