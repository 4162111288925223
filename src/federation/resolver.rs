//! Actor resolution with an SSRF-guarded remote fetch

use std::net::IpAddr;
use std::time::{Duration, Instant};

use serde::Deserialize;

use super::vocab::{ACTIVITY_ACCEPT, ObjectRef};
use crate::error::AppError;
use crate::metrics::{FEDERATION_REQUEST_DURATION_SECONDS, FEDERATION_REQUESTS_TOTAL};

/// A remote actor as the engine sees it
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub id: String,
    #[serde(default)]
    pub inbox: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
}

impl Actor {
    /// Host the actor lives on, including any explicit port
    pub fn host(&self) -> String {
        iri_host(&self.id).unwrap_or_default()
    }

    /// Preferred handle, falling back to the last IRI path segment
    pub fn handle(&self) -> String {
        if let Some(handle) = self.preferred_username.as_deref().filter(|h| !h.is_empty()) {
            return handle.to_string();
        }
        self.id
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string()
    }

    /// Display name, falling back to the handle
    pub fn display_name(&self) -> String {
        self.name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.handle())
    }
}

/// Host of an IRI with any non-default port, lowercased
pub fn iri_host(iri: &str) -> Option<String> {
    let url = url::Url::parse(iri).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    })
}

/// Resolves actor references to actor records
pub struct ActorResolver {
    http_client: reqwest::Client,
    dev_mode: bool,
    fetch_timeout: Duration,
}

impl ActorResolver {
    /// Create a resolver
    ///
    /// `dev_mode` disables the private-address check so local test peers
    /// can be reached.
    pub fn new(http_client: reqwest::Client, dev_mode: bool, fetch_timeout: Duration) -> Self {
        Self {
            http_client,
            dev_mode,
            fetch_timeout,
        }
    }

    /// Resolve an actor reference
    ///
    /// An embedded actor object is adopted as-is; a bare IRI is fetched.
    pub async fn resolve(&self, reference: &ObjectRef) -> Result<Actor, AppError> {
        match reference {
            ObjectRef::Object(map) if map.contains_key("id") && map.contains_key("type") => {
                serde_json::from_value(serde_json::Value::Object(map.clone()))
                    .map_err(|e| AppError::Parse(format!("Malformed embedded actor: {}", e)))
            }
            ObjectRef::Object(map) => match map.get("id").and_then(|id| id.as_str()) {
                Some(iri) => self.fetch_actor(iri).await,
                None => Err(AppError::Parse("Actor reference has no id".to_string())),
            },
            ObjectRef::Link(iri) => self.fetch_actor(iri).await,
        }
    }

    /// Resolve an actor and require an inbox
    ///
    /// # Errors
    /// `Protocol` if the actor document has no inbox
    pub async fn resolve_inbox_of(
        &self,
        reference: &ObjectRef,
    ) -> Result<(Actor, String), AppError> {
        let actor = self.resolve(reference).await?;
        match actor.inbox.clone().filter(|inbox| !inbox.is_empty()) {
            Some(inbox) => Ok((actor, inbox)),
            None => Err(AppError::Protocol(format!("Actor {} has no inbox", actor.id))),
        }
    }

    /// Fetch and parse a remote actor document
    pub async fn fetch_actor(&self, iri: &str) -> Result<Actor, AppError> {
        let url = check_fetch_target(iri, self.dev_mode).await?;

        let started = Instant::now();
        let result = self.fetch_actor_document(url).await;
        FEDERATION_REQUEST_DURATION_SECONDS
            .with_label_values(&["fetch"])
            .observe(started.elapsed().as_secs_f64());
        FEDERATION_REQUESTS_TOTAL
            .with_label_values(&["fetch", if result.is_ok() { "success" } else { "failure" }])
            .inc();

        result
    }

    async fn fetch_actor_document(&self, url: url::Url) -> Result<Actor, AppError> {
        let response = self
            .http_client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, ACTIVITY_ACCEPT)
            .timeout(self.fetch_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::fetch(status.as_u16(), &body));
        }

        let body = response.bytes().await?;
        let actor: Actor = serde_json::from_slice(&body)
            .map_err(|e| AppError::Parse(format!("Invalid actor document at {}: {}", url, e)))?;

        tracing::debug!(actor = %actor.id, "Fetched remote actor");
        Ok(actor)
    }
}

/// Validate an outbound fetch target
///
/// Rejects non-HTTP(S) IRIs and, unless `dev_mode` is set, hosts that are
/// or resolve to loopback, private, link-local or unspecified addresses.
pub async fn check_fetch_target(iri: &str, dev_mode: bool) -> Result<url::Url, AppError> {
    let url =
        url::Url::parse(iri).map_err(|e| AppError::Parse(format!("Invalid IRI {}: {}", iri, e)))?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(AppError::Security(format!(
                "Unsupported IRI scheme: {}",
                scheme
            )));
        }
    }

    let host = url
        .host_str()
        .ok_or_else(|| AppError::Parse(format!("Missing host in IRI: {}", iri)))?
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim_end_matches('.')
        .to_ascii_lowercase();

    if dev_mode {
        return Ok(url);
    }

    if is_disallowed_host(&host) {
        return Err(AppError::Security(format!("Refusing to fetch {}", host)));
    }

    let port = url
        .port_or_known_default()
        .ok_or_else(|| AppError::Parse(format!("Missing port in IRI: {}", iri)))?;
    validate_resolved_host_ips(&host, port).await?;

    Ok(url)
}

fn is_disallowed_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_multicast()
                || v4.is_unspecified()
                || v4.is_broadcast()
        }
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_disallowed_ip(IpAddr::V4(mapped));
            }
            v6.is_loopback()
                || v6.is_unique_local()
                || v6.is_unicast_link_local()
                || v6.is_multicast()
                || v6.is_unspecified()
        }
    }
}

fn is_disallowed_host(host: &str) -> bool {
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }

    host.parse::<IpAddr>().map(is_disallowed_ip).unwrap_or(false)
}

async fn validate_resolved_host_ips(host: &str, port: u16) -> Result<(), AppError> {
    let lookup = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| AppError::Protocol(format!("Failed to resolve actor host {}: {}", host, e)))?;

    let mut resolved_any = false;
    for addr in lookup {
        resolved_any = true;
        if is_disallowed_ip(addr.ip()) {
            return Err(AppError::Security(format!(
                "{} resolves to a disallowed address",
                host
            )));
        }
    }

    if !resolved_any {
        return Err(AppError::Protocol(format!("No DNS records for {}", host)));
    }

    Ok(())
}
