//! Service layer
//!
//! Contains business logic separated from HTTP handlers.
//! Services orchestrate storage and federation operations.

mod post;

pub use post::{LocalDraft, LocalPostService};
