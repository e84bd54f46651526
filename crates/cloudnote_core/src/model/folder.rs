//! Folder domain model.

use crate::model::PLACEHOLDER_ID_PREFIX;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Opaque folder identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FolderId(String);

impl FolderId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Mints a local id for a folder the gateway has not acknowledged yet.
    pub fn placeholder() -> Self {
        Self(format!("{PLACEHOLDER_ID_PREFIX}{}", Uuid::new_v4()))
    }

    pub fn is_placeholder(&self) -> bool {
        self.0.starts_with(PLACEHOLDER_ID_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for FolderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Named grouping container for notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: FolderId,
    pub name: String,
    /// Unix epoch milliseconds. Immutable after creation.
    pub created_time: i64,
}

/// Gateway record shape for folders.
pub type FolderRecord = Folder;

impl Folder {
    pub fn new(id: FolderId, name: impl Into<String>, created_time: i64) -> Self {
        Self {
            id,
            name: name.into(),
            created_time,
        }
    }

    /// Creates a local folder carrying a placeholder id.
    pub fn new_local(name: impl Into<String>, created_time: i64) -> Self {
        Self::new(FolderId::placeholder(), name, created_time)
    }
}
