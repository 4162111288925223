//! WebFinger protocol implementation
//!
//! Lets remote servers discover the local actor document from an
//! `acct:handle@host` address.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// WebFinger JRD response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebFingerResponse {
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aliases: Option<Vec<String>>,
    pub links: Vec<WebFingerLink>,
}

/// WebFinger link
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebFingerLink {
    pub rel: String,
    #[serde(rename = "type")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

/// Check that a `resource` query names the local actor
///
/// Accepts `acct:handle@domain`, `handle@domain` (case-insensitive) or the
/// actor IRI itself.
///
/// # Errors
/// - `Parse` if the resource is not an account address or IRI
/// - `NotFound` if it names someone else
pub fn match_resource(
    resource: &str,
    handle: &str,
    domain: &str,
    actor_iri: &str,
) -> Result<(), AppError> {
    if resource == actor_iri {
        return Ok(());
    }

    let address = resource.strip_prefix("acct:").unwrap_or(resource);
    let (user, host) = address
        .split_once('@')
        .ok_or_else(|| AppError::Parse(format!("Invalid resource: {}", resource)))?;
    if user.is_empty() || host.is_empty() {
        return Err(AppError::Parse(format!("Invalid resource: {}", resource)));
    }

    if user.eq_ignore_ascii_case(handle) && host.eq_ignore_ascii_case(domain) {
        Ok(())
    } else {
        Err(AppError::NotFound)
    }
}

/// Generate WebFinger response for the local actor.
///
/// # Arguments
/// * `handle` - Local handle
/// * `domain` - Instance domain
/// * `base_url` - Instance base URL (includes protocol)
///
/// # Returns
/// JRD response for the account
pub fn generate_webfinger_response(handle: &str, domain: &str, base_url: &str) -> WebFingerResponse {
    let subject = format!("acct:{}@{}", handle, domain);
    let actor_url = format!("{}/profile", base_url.trim_end_matches('/'));

    WebFingerResponse {
        subject,
        aliases: Some(vec![actor_url.clone()]),
        links: vec![
            WebFingerLink {
                rel: "self".to_string(),
                link_type: Some("application/activity+json".to_string()),
                href: Some(actor_url.clone()),
            },
            WebFingerLink {
                rel: "http://webfinger.net/rel/profile-page".to_string(),
                link_type: Some("text/html".to_string()),
                href: Some(actor_url),
            },
        ],
    }
}
