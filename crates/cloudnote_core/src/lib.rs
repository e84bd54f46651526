//! Core domain logic for the cloudnote client.
//! This crate is the single source of truth for note/folder invariants,
//! derived views and the optimistic mutation flow.

pub mod config;
pub mod db;
pub mod export;
pub mod gateway;
pub mod logging;
pub mod model;
pub mod service;
pub mod store;
pub mod view;

pub use config::{ClientConfig, ConfigError, SyncConfig};
pub use export::{export_note, ExportArtifact, ExportError, ExportFormat};
pub use gateway::{
    EntityRef, GatewayError, GatewayResult, MemoryGateway, PersistenceGateway, SqliteGateway,
};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::folder::{Folder, FolderId, FolderRecord};
pub use model::note::{Note, NoteId, NoteRecord, SortOption};
pub use service::{EditField, MutationCoordinator, MutationError, SyncEvent};
pub use store::{ClientState, StateStore};
pub use view::{FolderCounts, ViewQuery};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
