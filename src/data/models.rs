//! Data models
//!
//! Rust structs representing the rows the federation engine reads and writes.
//! Timestamps use chrono; local post identifiers are SQLite row ids.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Row, sqlite::SqliteRow};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Profile (single local actor)
// =============================================================================

/// The single stored profile the local actor is derived from
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Profile {
    /// Preferred handle (`preferredUsername`)
    pub handle: String,
    pub display_name: String,
    /// Plain-text bio, published as the actor summary
    pub bio: String,
    pub avatar_url: Option<String>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Followers
// =============================================================================

/// A remote actor following the local actor
///
/// Inbox IRI is stored for activity delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Follower {
    /// Remote actor IRI (unique)
    pub actor_iri: String,
    /// Follower's inbox IRI for delivery
    pub inbox_iri: String,
    pub followed_at: DateTime<Utc>,
}

// =============================================================================
// Posts
// =============================================================================

/// Internal post privacy level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Unlisted,
    FollowersOnly,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Unlisted => "unlisted",
            Self::FollowersOnly => "followers_only",
            Self::Private => "private",
        }
    }

    /// Whether the post may be listed in the public outbox
    pub fn is_listed(&self) -> bool {
        matches!(self, Self::Public | Self::Unlisted)
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Self::Public),
            "unlisted" => Ok(Self::Unlisted),
            "followers_only" => Ok(Self::FollowersOnly),
            "private" => Ok(Self::Private),
            other => Err(format!("unknown visibility: {}", other)),
        }
    }
}

/// A stored note, local or federated
///
/// Local posts are inserted before their URI exists; the URI is assigned
/// from the row id inside the same transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    /// ActivityPub URI (globally unique)
    pub uri: Option<String>,
    /// Content warning text, published as `summary`
    pub content_warning: Option<String>,
    /// Plain-text content
    pub content: String,
    pub author_name: String,
    pub author_handle: String,
    /// Host the post originated from
    pub origin_host: String,
    pub visibility: Visibility,
    pub like_count: i64,
    pub share_count: i64,
    /// true if this is the local actor's own post
    pub is_local: bool,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for Post {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let visibility: String = row.try_get("visibility")?;
        let visibility = visibility
            .parse::<Visibility>()
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: "visibility".to_string(),
                source: e.into(),
            })?;

        Ok(Self {
            id: row.try_get("id")?,
            uri: row.try_get("uri")?,
            content_warning: row.try_get("content_warning")?,
            content: row.try_get("content")?,
            author_name: row.try_get("author_name")?,
            author_handle: row.try_get("author_handle")?,
            origin_host: row.try_get("origin_host")?,
            visibility,
            like_count: row.try_get("like_count")?,
            share_count: row.try_get("share_count")?,
            is_local: row.try_get("is_local")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Fields for a post that has not been stored yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    /// Required for federated posts; ignored for local inserts
    pub uri: Option<String>,
    pub content_warning: Option<String>,
    pub content: String,
    pub author_name: String,
    pub author_handle: String,
    pub origin_host: String,
    pub visibility: Visibility,
    pub created_at: DateTime<Utc>,
}

/// Interaction counters kept per post
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostCounter {
    Likes,
    Shares,
}

impl PostCounter {
    pub fn column(&self) -> &'static str {
        match self {
            Self::Likes => "like_count",
            Self::Shares => "share_count",
        }
    }
}

// =============================================================================
// Signing keys
// =============================================================================

/// Signing key pair owned by a local actor
///
/// Keys are stored as PEM text: the private key in PKCS#1, the public key
/// in SubjectPublicKeyInfo form.
#[derive(Clone, FromRow)]
pub struct KeyPair {
    pub actor_iri: String,
    pub public_key_pem: String,
    pub(crate) private_key_pem: String,
    pub created_at: DateTime<Utc>,
}

impl KeyPair {
    pub(crate) fn new(actor_iri: &str, public_key_pem: String, private_key_pem: String) -> Self {
        Self {
            actor_iri: actor_iri.to_string(),
            public_key_pem,
            private_key_pem,
            created_at: Utc::now(),
        }
    }

    /// Key identifier published in the actor document
    pub fn key_id(&self) -> String {
        format!("{}#main-key", self.actor_iri)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("actor_iri", &self.actor_iri)
            .field("public_key_pem", &self.public_key_pem)
            .field("private_key_pem", &"<redacted>")
            .field("created_at", &self.created_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visibility_text_round_trips() {
        for visibility in [
            Visibility::Public,
            Visibility::Unlisted,
            Visibility::FollowersOnly,
            Visibility::Private,
        ] {
            assert_eq!(visibility.as_str().parse::<Visibility>(), Ok(visibility));
        }
        assert!("direct".parse::<Visibility>().is_err());
    }

    #[test]
    fn key_pair_debug_redacts_private_key() {
        let pair = KeyPair::new(
            "https://example.com/profile",
            "PUBLIC".to_string(),
            "SECRET".to_string(),
        );
        let rendered = format!("{:?}", pair);
        assert!(rendered.contains("PUBLIC"));
        assert!(!rendered.contains("SECRET"));
        assert_eq!(pair.key_id(), "https://example.com/profile#main-key");
    }
}
