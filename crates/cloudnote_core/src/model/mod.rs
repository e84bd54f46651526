//! Client-side domain model for notes and folders.
//!
//! # Responsibility
//! - Define the value records mirrored from the persistence gateway.
//! - Provide identifier newtypes and local placeholder identities.
//!
//! # Invariants
//! - Every entity is identified by an opaque id assigned by the gateway.
//! - A `folder_id` is a lookup key, never an ownership relationship.
//! - Locally created entities carry a placeholder id until the gateway
//!   returns the durable one.

use std::time::{SystemTime, UNIX_EPOCH};

pub mod folder;
pub mod note;

/// Prefix marking ids minted locally before the gateway acknowledged them.
pub const PLACEHOLDER_ID_PREFIX: &str = "local-";

/// Returns the current wall-clock time in epoch milliseconds.
///
/// Clock skew before the unix epoch collapses to `0` instead of panicking.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
