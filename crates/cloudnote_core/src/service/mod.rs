//! Use-case layer between the state store and a persistence gateway.
//!
//! # Responsibility
//! - Turn user actions into optimistic store writes plus remote writes.
//! - Own debounce timers, per-entity write ordering and id aliasing.

pub mod debounce;
pub mod mutation;
mod queue;

pub use debounce::EditField;
pub use mutation::{MutationCoordinator, MutationError, SyncEvent};
