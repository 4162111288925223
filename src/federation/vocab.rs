//! ActivityStreams vocabulary
//!
//! Typed views over inbound protocol JSON. Only the fields the engine acts
//! on are modelled; everything else is ignored.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::error::AppError;

/// The well-known public collection IRI
pub const PUBLIC_COLLECTION: &str = "https://www.w3.org/ns/activitystreams#Public";

/// JSON-LD context for ActivityStreams documents
pub const ACTIVITY_STREAMS_CONTEXT: &str = "https://www.w3.org/ns/activitystreams";

/// JSON-LD context for `publicKey`
pub const SECURITY_CONTEXT: &str = "https://w3id.org/security/v1";

/// Content type for protocol documents
pub const ACTIVITY_JSON: &str = "application/activity+json";

/// `Accept` header for actor fetches
pub const ACTIVITY_ACCEPT: &str =
    "application/activity+json, application/ld+json; profile=\"https://www.w3.org/ns/activitystreams\"";

/// A reference to an object: either a bare IRI or an embedded object
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ObjectRef {
    Link(String),
    Object(Map<String, Value>),
}

impl ObjectRef {
    /// IRI of the referenced object, if it has one
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Link(iri) => Some(iri.as_str()),
            Self::Object(map) => map.get("id").and_then(Value::as_str),
        }
    }

    /// `type` of an embedded object
    pub fn object_type(&self) -> Option<&str> {
        match self {
            Self::Link(_) => None,
            Self::Object(map) => map.get("type").and_then(Value::as_str),
        }
    }

    pub fn as_object(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Link(_) => None,
            Self::Object(map) => Some(map),
        }
    }

    /// Interpret any JSON shape as a reference
    ///
    /// Arrays yield their first usable member; other scalars yield nothing.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::String(iri) => Some(Self::Link(iri)),
            Value::Object(map) => Some(Self::Object(map)),
            Value::Array(items) => items.into_iter().find_map(Self::from_value),
            _ => None,
        }
    }
}

/// Activity kinds the inbox acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityKind {
    Follow,
    Undo,
    Create,
    Update,
    Delete,
    Like,
    Announce,
    /// Anything else; accepted and ignored
    Other,
}

impl ActivityKind {
    pub fn from_type(value: &str) -> Self {
        match value {
            "Follow" => Self::Follow,
            "Undo" => Self::Undo,
            "Create" => Self::Create,
            "Update" => Self::Update,
            "Delete" => Self::Delete,
            "Like" => Self::Like,
            "Announce" => Self::Announce,
            _ => Self::Other,
        }
    }

    /// Metric label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Follow => "Follow",
            Self::Undo => "Undo",
            Self::Create => "Create",
            Self::Update => "Update",
            Self::Delete => "Delete",
            Self::Like => "Like",
            Self::Announce => "Announce",
            Self::Other => "Other",
        }
    }
}

/// An inbound activity envelope
#[derive(Debug, Clone, Deserialize)]
pub struct Activity {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, deserialize_with = "lenient_ref")]
    pub actor: Option<ObjectRef>,
    #[serde(default, deserialize_with = "lenient_ref")]
    pub object: Option<ObjectRef>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub to: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub cc: Vec<String>,
}

impl Activity {
    /// Parse an inbox body
    ///
    /// The body must be a JSON object carrying a string `type`.
    ///
    /// # Errors
    /// `Parse` for anything else
    pub fn parse(body: &[u8]) -> Result<Self, AppError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| AppError::Parse(format!("Invalid JSON: {}", e)))?;
        Self::from_value(value)
    }

    /// Interpret an embedded object as an activity (e.g. the inner activity of an Undo)
    pub fn from_object(map: &Map<String, Value>) -> Result<Self, AppError> {
        Self::from_value(Value::Object(map.clone()))
    }

    fn from_value(value: Value) -> Result<Self, AppError> {
        if !value.get("type").is_some_and(Value::is_string) {
            return Err(AppError::Parse(
                "Activity must be an object with a string type".to_string(),
            ));
        }

        serde_json::from_value(value)
            .map_err(|e| AppError::Parse(format!("Malformed activity: {}", e)))
    }

    pub fn kind(&self) -> ActivityKind {
        ActivityKind::from_type(&self.type_name)
    }
}

/// An embedded Note object
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteObject {
    pub id: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub published: Option<String>,
    #[serde(default, deserialize_with = "lenient_ref")]
    pub attributed_to: Option<ObjectRef>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub to: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub cc: Vec<String>,
}

impl NoteObject {
    /// Interpret an embedded object as a Note
    ///
    /// # Errors
    /// `Parse` if it is not a Note or lacks an id
    pub fn from_object(map: &Map<String, Value>) -> Result<Self, AppError> {
        let note: Self = serde_json::from_value(Value::Object(map.clone()))
            .map_err(|e| AppError::Parse(format!("Malformed note: {}", e)))?;
        if note.type_name != "Note" {
            return Err(AppError::Parse(format!(
                "Expected Note, got {}",
                note.type_name
            )));
        }
        Ok(note)
    }

    /// Content warning, treating an empty summary as none
    pub fn content_warning(&self) -> Option<String> {
        self.summary
            .as_deref()
            .map(str::trim)
            .filter(|summary| !summary.is_empty())
            .map(str::to_string)
    }
}

/// Accept any shape for `actor`/`object`; an unusable one reads as absent
/// so the handler reports it instead of the whole envelope failing.
fn lenient_ref<'de, D>(deserializer: D) -> Result<Option<ObjectRef>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(ObjectRef::from_value))
}

/// Accept a single string, an array, or null for addressing fields
///
/// Non-string array members (embedded objects) contribute their `id`.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(single)) => vec![single],
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(iri) => Some(iri),
                Value::Object(map) => map.get("id").and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}
