//! Persistence gateway contract and implementations.
//!
//! # Responsibility
//! - Define the async create/read/update/delete contract over notes and
//!   folders that the mutation coordinator talks to.
//! - Provide a durable SQLite implementation and an in-process one.
//!
//! # Invariants
//! - The gateway assigns entity ids; callers never invent durable ids.
//! - `create_note` stamps `last_edit_time`, clears favorite/pinned state and
//!   starts with no tags.
//! - `update_note` refreshes `last_edit_time`.
//! - `delete_folder` clears `folder_id` on every referencing note as part of
//!   the same call.
//! - `duplicate_note` fails with `NotFound` when the source is missing. The
//!   copy keeps the source's folder, tags and content; favorite and pinned
//!   are reset.

use crate::db::DbError;
use crate::model::folder::{FolderId, FolderRecord};
use crate::model::note::{NoteId, NoteRecord};
use async_trait::async_trait;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryGateway;
pub use sqlite::SqliteGateway;

/// Suffix appended to the title of a duplicated note.
pub const DUPLICATE_TITLE_SUFFIX: &str = " (copy)";

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Entity referenced by a gateway error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityRef {
    Note(NoteId),
    Folder(FolderId),
}

impl Display for EntityRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Note(id) => write!(f, "note {id}"),
            Self::Folder(id) => write!(f, "folder {id}"),
        }
    }
}

/// Errors reported by persistence gateways.
#[derive(Debug)]
pub enum GatewayError {
    /// Referenced note/folder does not exist in the durable store.
    NotFound(EntityRef),
    /// Store rejected the request or could not be reached.
    Unavailable(String),
    /// Request did not complete within the configured timeout.
    Timeout,
    /// Persisted data cannot be mapped to a valid record.
    InvalidData(String),
    /// Local SQLite failure.
    Db(DbError),
}

impl GatewayError {
    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable(_) | Self::Timeout => true,
            Self::Db(err) => err.is_busy(),
            Self::NotFound(_) | Self::InvalidData(_) => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Stable code for log lines and sync events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Unavailable(_) => "unavailable",
            Self::Timeout => "timeout",
            Self::InvalidData(_) => "invalid_data",
            Self::Db(_) => "db_error",
        }
    }
}

impl Display for GatewayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(entity) => write!(f, "{entity} not found"),
            Self::Unavailable(message) => write!(f, "persistence unavailable: {message}"),
            Self::Timeout => write!(f, "persistence request timed out"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for GatewayError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for GatewayError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for GatewayError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// System of record for notes and folders.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Lists every note.
    async fn list_notes(&self) -> GatewayResult<Vec<NoteRecord>>;
    /// Loads one note by id.
    async fn get_note(&self, id: &NoteId) -> GatewayResult<Option<NoteRecord>>;
    /// Inserts a note and returns its durable id.
    async fn create_note(&self, title: &str, content: &str) -> GatewayResult<NoteId>;
    async fn delete_note(&self, id: &NoteId) -> GatewayResult<()>;
    /// Replaces title and content and refreshes `last_edit_time`.
    async fn update_note(&self, id: &NoteId, title: &str, content: &str) -> GatewayResult<()>;
    async fn set_favorite(&self, id: &NoteId, value: bool) -> GatewayResult<()>;
    async fn set_pinned(&self, id: &NoteId, value: bool) -> GatewayResult<()>;
    /// Replaces the whole tag sequence.
    async fn set_tags(&self, id: &NoteId, tags: &[String]) -> GatewayResult<()>;
    /// Files a note into `folder_id`, or unfiles it with `None`.
    async fn set_note_folder(&self, id: &NoteId, folder_id: Option<&FolderId>)
        -> GatewayResult<()>;
    /// Copies a note server-side and returns the new id.
    async fn duplicate_note(&self, id: &NoteId) -> GatewayResult<NoteId>;

    async fn list_folders(&self) -> GatewayResult<Vec<FolderRecord>>;
    async fn create_folder(&self, name: &str) -> GatewayResult<FolderId>;
    /// Deletes a folder and unfiles its notes in one step.
    async fn delete_folder(&self, id: &FolderId) -> GatewayResult<()>;
    async fn rename_folder(&self, id: &FolderId, name: &str) -> GatewayResult<()>;
}

/// Builds the title given to a duplicated note.
pub fn duplicate_title(title: &str) -> String {
    format!("{title}{DUPLICATE_TITLE_SUFFIX}")
}
