//! Data layer module
//!
//! Handles all data persistence:
//! - SQLite database operations
//! - Store traits consumed by the federation engine

mod database;
mod models;
mod store;

pub use database::Database;
pub use models::*;
pub use store::{FollowerStore, KeyPairStore, PostStore, ProfileStore};

#[cfg(test)]
pub use store::{MockFollowerStore, MockKeyPairStore, MockPostStore, MockProfileStore};

#[cfg(test)]
mod database_test;
