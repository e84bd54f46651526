//! Note domain model.
//!
//! # Responsibility
//! - Define the canonical note record shared by store, views and gateways.
//! - Provide field-level mutation helpers used by optimistic updates.
//!
//! # Invariants
//! - `id` is immutable once the gateway assigned it.
//! - `tags` never contains duplicates after passing through `normalize_tags`.
//! - Title/content mutations refresh `last_edit_time`.

use crate::model::folder::FolderId;
use crate::model::PLACEHOLDER_ID_PREFIX;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// Title given to every freshly created note.
pub const DEFAULT_NOTE_TITLE: &str = "Untitled";

/// Opaque note identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(String);

impl NoteId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Mints a local id for a note the gateway has not acknowledged yet.
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

impl Display for NoteId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical note record.
///
/// Serialized with the record naming used by the document store
/// (`lastEditTime`, `isFavorite`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: NoteId,
    pub title: String,
    /// Markdown body.
    pub content: String,
    /// Unix epoch milliseconds of the last title/content change.
    pub last_edit_time: i64,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    /// `None` means unfiled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<FolderId>,
}

/// Gateway record shape for notes.
pub type NoteRecord = Note;

impl Note {
    /// Creates an empty, untitled, unfiled note.
    pub fn new(id: NoteId, last_edit_time: i64) -> Self {
        Self {
            id,
            title: DEFAULT_NOTE_TITLE.to_string(),
            content: String::new(),
            last_edit_time,
            is_favorite: false,
            is_pinned: false,
            tags: Vec::new(),
            folder_id: None,
        }
    }

    /// Creates a local note carrying a placeholder id.
    pub fn new_local(last_edit_time: i64) -> Self {
        Self::new(NoteId::placeholder(), last_edit_time)
    }

    /// Patches title and/or content and refreshes `last_edit_time`.
    pub fn apply_edit(&mut self, title: Option<&str>, content: Option<&str>, now: i64) {
        if let Some(title) = title {
            self.title = title.to_string();
        }
        if let Some(content) = content {
            self.content = content.to_string();
        }
        self.last_edit_time = now;
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|current| current == tag)
    }

    /// Case-insensitive substring match over title and content.
    ///
    /// `lowered_query` must already be lowercased by the caller.
    pub fn matches_text(&self, lowered_query: &str) -> bool {
        self.title.to_lowercase().contains(lowered_query)
            || self.content.to_lowercase().contains(lowered_query)
    }
}

/// Ordering applied after the pinned/favorite tiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortOption {
    /// Most recently edited first.
    #[default]
    #[serde(rename = "lastEditTime")]
    LastEditTime,
    /// Title ascending.
    #[serde(rename = "title")]
    Title,
    /// Oldest first. Notes carry no creation timestamp, so this orders by
    /// `last_edit_time` ascending as an approximation.
    #[serde(rename = "createdTime")]
    CreatedTime,
}

impl SortOption {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LastEditTime => "lastEditTime",
            Self::Title => "title",
            Self::CreatedTime => "createdTime",
        }
    }
}

impl FromStr for SortOption {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "lastEditTime" | "last_edit_time" => Ok(Self::LastEditTime),
            "title" => Ok(Self::Title),
            "createdTime" | "created_time" => Ok(Self::CreatedTime),
            other => Err(format!(
                "unsupported sort option `{other}`; expected lastEditTime|title|createdTime"
            )),
        }
    }
}

impl Display for SortOption {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalizes one tag value. Blank input yields `None`.
pub fn normalize_tag(tag: &str) -> Option<String> {
    let trimmed = tag.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Trims tags, drops blanks and removes exact duplicates.
///
/// Matching is case-sensitive and the first occurrence keeps its position.
pub fn normalize_tags<S: AsRef<str>>(tags: &[S]) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        if let Some(value) = normalize_tag(tag.as_ref()) {
            if !unique.contains(&value) {
                unique.push(value);
            }
        }
    }
    unique
}
