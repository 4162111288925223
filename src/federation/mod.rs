//! ActivityPub federation module
//!
//! Handles:
//! - Activity processing (inbox)
//! - Outbound dispatch and rate-limited delivery
//! - HTTP Signatures
//! - WebFinger
//! - Actor resolution behind an SSRF guard
//! - Visibility to addressing mapping

mod activity;
pub mod content;
mod delivery;
mod dispatcher;
mod keys;
mod queue;
mod resolver;
mod signature;
pub mod visibility;
pub mod vocab;
mod webfinger;

pub use activity::ActivityProcessor;
pub use delivery::{ActivityDelivery, builder};
pub use dispatcher::OutboundDispatcher;
pub use keys::{DEFAULT_KEY_BITS, KeyManager};
pub use queue::{DeliveryExecutor, DeliveryJob, DeliveryQueue, DeliveryReceiver, Pacing};
pub use resolver::{Actor, ActorResolver, check_fetch_target};
pub use signature::{
    ParsedSignature, SIGNED_HEADERS, SignatureHeaders, generate_digest, host_header_value, parse_signature_header,
    sign_request, verify_signature,
};
pub use webfinger::{WebFingerLink, WebFingerResponse, generate_webfinger_response, match_resource};
