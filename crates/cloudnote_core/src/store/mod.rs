//! Process-wide reactive client state.
//!
//! # Responsibility
//! - Hold the raw note/folder collections and transient UI state.
//! - Apply every write atomically and notify subscribers.
//! - Serve derived views computed from the current state on each read.
//!
//! # Invariants
//! - Writes go through `StateStore::update`; a reader never observes a
//!   half-applied update.
//! - Derived views are recomputed on every read, so they always reflect the
//!   latest write.
//! - Never call `update` from inside a `read` closure.

use crate::model::folder::{Folder, FolderId};
use crate::model::note::{Note, NoteId, SortOption};
use crate::view::{self, FolderCounts, ViewQuery};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

/// Raw collections plus transient selection/filter state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientState {
    /// Insertion order only; display order comes from `filtered_notes`.
    pub notes: Vec<Note>,
    pub folders: Vec<Folder>,
    pub selected_note_id: Option<NoteId>,
    pub search_query: String,
    pub sort_option: SortOption,
    pub selected_tag: Option<String>,
    pub selected_folder_id: Option<FolderId>,
    pub is_dark_mode: bool,
}

impl ClientState {
    /// Borrows the filter/sort inputs for view derivation.
    pub fn view_query(&self) -> ViewQuery<'_> {
        ViewQuery {
            search_query: self.search_query.as_str(),
            selected_tag: self.selected_tag.as_deref(),
            selected_folder_id: self.selected_folder_id.as_ref(),
            sort_option: self.sort_option,
        }
    }

    pub fn all_tags(&self) -> Vec<String> {
        view::all_tags(&self.notes)
    }

    pub fn selected_note(&self) -> Option<&Note> {
        view::selected_note(&self.notes, self.selected_note_id.as_ref())
    }

    pub fn filtered_notes(&self) -> Vec<Note> {
        view::filtered_notes(&self.notes, &self.folders, &self.view_query())
    }

    pub fn folder_note_counts(&self) -> FolderCounts {
        view::folder_note_counts(&self.notes, &self.folders)
    }

    pub fn note(&self, id: &NoteId) -> Option<&Note> {
        self.notes.iter().find(|note| &note.id == id)
    }

    pub fn note_mut(&mut self, id: &NoteId) -> Option<&mut Note> {
        self.notes.iter_mut().find(|note| &note.id == id)
    }

    pub fn folder(&self, id: &FolderId) -> Option<&Folder> {
        self.folders.iter().find(|folder| &folder.id == id)
    }

    pub fn folder_mut(&mut self, id: &FolderId) -> Option<&mut Folder> {
        self.folders.iter_mut().find(|folder| &folder.id == id)
    }
}

/// Reactive cell around `ClientState`.
///
/// Backed by a `tokio::sync::watch` channel: writes are applied in place
/// under the channel lock and wake every subscriber.
#[derive(Debug)]
pub struct StateStore {
    state: watch::Sender<ClientState>,
    revision: AtomicU64,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    pub fn new() -> Self {
        Self::with_state(ClientState::default())
    }

    pub fn with_state(state: ClientState) -> Self {
        let (sender, _) = watch::channel(state);
        Self {
            state: sender,
            revision: AtomicU64::new(0),
        }
    }

    /// Returns a change subscription; it is marked changed after every write.
    pub fn subscribe(&self) -> watch::Receiver<ClientState> {
        self.state.subscribe()
    }

    /// Runs `read` against the current state.
    pub fn read<R>(&self, read: impl FnOnce(&ClientState) -> R) -> R {
        read(&self.state.borrow())
    }

    /// Applies `write` atomically and notifies subscribers.
    pub fn update<R>(&self, write: impl FnOnce(&mut ClientState) -> R) -> R {
        let mut output = None;
        self.state.send_modify(|state| {
            output = Some(write(state));
            self.revision.fetch_add(1, Ordering::AcqRel);
        });
        match output {
            Some(value) => value,
            // send_modify always runs the closure exactly once.
            None => unreachable!("state update closure did not run"),
        }
    }

    /// Like `update`, but a `None` result means nothing changed: the write
    /// is not counted and subscribers are not woken.
    pub fn try_update<R>(&self, write: impl FnOnce(&mut ClientState) -> Option<R>) -> Option<R> {
        let mut output = None;
        self.state.send_if_modified(|state| {
            output = write(state);
            if output.is_some() {
                self.revision.fetch_add(1, Ordering::AcqRel);
            }
            output.is_some()
        });
        output
    }

    /// Number of writes applied so far.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    /// Clones the current state.
    pub fn snapshot(&self) -> ClientState {
        self.read(Clone::clone)
    }

    /// Replaces raw collections with a fresh load from the gateway.
    ///
    /// Transient selection/filter state is preserved.
    pub fn replace_collections(&self, notes: Vec<Note>, folders: Vec<Folder>) {
        self.update(|state| {
            state.notes = notes;
            state.folders = folders;
        });
    }

    pub fn notes(&self) -> Vec<Note> {
        self.read(|state| state.notes.clone())
    }

    pub fn folders(&self) -> Vec<Folder> {
        self.read(|state| state.folders.clone())
    }

    pub fn note(&self, id: &NoteId) -> Option<Note> {
        self.read(|state| state.note(id).cloned())
    }

    pub fn all_tags(&self) -> Vec<String> {
        self.read(ClientState::all_tags)
    }

    pub fn selected_note(&self) -> Option<Note> {
        self.read(|state| state.selected_note().cloned())
    }

    pub fn filtered_notes(&self) -> Vec<Note> {
        self.read(ClientState::filtered_notes)
    }

    pub fn folder_note_counts(&self) -> FolderCounts {
        self.read(ClientState::folder_note_counts)
    }

    pub fn select_note(&self, id: Option<NoteId>) {
        self.update(|state| state.selected_note_id = id);
    }

    pub fn set_search_query(&self, query: impl Into<String>) {
        let query = query.into();
        self.update(|state| state.search_query = query);
    }

    pub fn set_sort_option(&self, sort_option: SortOption) {
        self.update(|state| state.sort_option = sort_option);
    }

    pub fn set_selected_tag(&self, tag: Option<String>) {
        self.update(|state| state.selected_tag = tag);
    }

    /// Selects `tag`, or clears the selection when `tag` is already selected.
    pub fn toggle_selected_tag(&self, tag: &str) {
        self.update(|state| {
            state.selected_tag = match state.selected_tag.as_deref() {
                Some(current) if current == tag => None,
                _ => Some(tag.to_string()),
            };
        });
    }

    pub fn select_folder(&self, id: Option<FolderId>) {
        self.update(|state| state.selected_folder_id = id);
    }

    pub fn set_dark_mode(&self, enabled: bool) {
        self.update(|state| state.is_dark_mode = enabled);
    }

    /// Flips dark mode and returns the new value.
    pub fn toggle_dark_mode(&self) -> bool {
        self.update(|state| {
            state.is_dark_mode = !state.is_dark_mode;
            state.is_dark_mode
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{ClientState, StateStore};
    use crate::model::note::{Note, NoteId, SortOption};

    #[test]
    fn defaults_match_fresh_session() {
        let state = ClientState::default();
        assert!(state.search_query.is_empty());
        assert_eq!(state.sort_option, SortOption::LastEditTime);
        assert!(state.selected_tag.is_none());
        assert!(!state.is_dark_mode);
    }

    #[test]
    fn update_marks_subscribers_changed() {
        let store = StateStore::new();
        let mut receiver = store.subscribe();
        assert!(!receiver.has_changed().unwrap());

        store.set_search_query("draft");
        assert!(receiver.has_changed().unwrap());
        assert_eq!(store.revision(), 1);
        assert_eq!(receiver.borrow_and_update().search_query, "draft");
    }

    #[test]
    fn try_update_without_change_stays_silent() {
        let store = StateStore::new();
        let mut receiver = store.subscribe();

        let missing = store.try_update(|state| state.note_mut(&NoteId::new("n1")).map(|_| ()));
        assert!(missing.is_none());
        assert!(!receiver.has_changed().unwrap());
        assert_eq!(store.revision(), 0);

        store.update(|state| state.notes.push(Note::new(NoteId::new("n1"), 1)));
        let found = store.try_update(|state| {
            state.note_mut(&NoteId::new("n1")).map(|note| {
                note.is_pinned = true;
            })
        });
        assert!(found.is_some());
        assert!(receiver.has_changed().unwrap());
        assert_eq!(store.revision(), 2);
    }

    #[test]
    fn toggle_selected_tag_clears_on_second_click() {
        let store = StateStore::new();
        store.toggle_selected_tag("work");
        assert_eq!(store.snapshot().selected_tag.as_deref(), Some("work"));
        store.toggle_selected_tag("home");
        assert_eq!(store.snapshot().selected_tag.as_deref(), Some("home"));
        store.toggle_selected_tag("home");
        assert!(store.snapshot().selected_tag.is_none());
    }

    #[test]
    fn derived_views_follow_writes_immediately() {
        let store = StateStore::new();
        let id = NoteId::new("n1");
        store.update(|state| state.notes.push(Note::new(id.clone(), 1)));
        store.select_note(Some(id.clone()));
        assert_eq!(store.selected_note().map(|note| note.id), Some(id.clone()));

        store.update(|state| state.notes.clear());
        assert!(store.selected_note().is_none());
        assert!(store.filtered_notes().is_empty());
    }
}
