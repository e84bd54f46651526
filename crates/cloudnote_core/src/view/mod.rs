//! Derived views over the client state.
//!
//! # Responsibility
//! - Compute `all_tags`, `selected_note` and `filtered_notes` from raw
//!   collections plus transient filter/sort state.
//! - Stay pure: no function here mutates its inputs.
//!
//! # Invariants
//! - `filtered_notes` applies text, tag and folder filters in that order,
//!   then a stable sort: pinned, favorite, then the selected `SortOption`.
//! - Searching or tag filtering spans all folders; otherwise the view is
//!   scoped to the selected folder, or to unfiled notes when none is selected.
//! - A `folder_id` pointing at a folder absent from the loaded set counts as
//!   unfiled.

use crate::model::folder::{Folder, FolderId};
use crate::model::note::{Note, NoteId, SortOption};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Filter and sort inputs for `filtered_notes`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ViewQuery<'a> {
    pub search_query: &'a str,
    pub selected_tag: Option<&'a str>,
    pub selected_folder_id: Option<&'a FolderId>,
    pub sort_option: SortOption,
}

/// Per-folder note counts for the folder sidebar.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderCounts {
    pub unfiled: usize,
    pub by_folder: BTreeMap<FolderId, usize>,
}

/// Every distinct tag across `notes`, sorted ascending.
pub fn all_tags(notes: &[Note]) -> Vec<String> {
    notes
        .iter()
        .flat_map(|note| note.tags.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// The note whose id equals `selected_note_id`, if still present.
pub fn selected_note<'a>(
    notes: &'a [Note],
    selected_note_id: Option<&NoteId>,
) -> Option<&'a Note> {
    let id = selected_note_id?;
    notes.iter().find(|note| &note.id == id)
}

/// Filters and orders `notes` for the note list.
///
/// Returns a freshly allocated sequence; `notes` is left untouched.
pub fn filtered_notes(notes: &[Note], folders: &[Folder], query: &ViewQuery<'_>) -> Vec<Note> {
    let trimmed_query = query.search_query.trim();
    let search_active = !trimmed_query.is_empty();
    let lowered_query = query.search_query.to_lowercase();
    let known_folders = known_folder_ids(folders);

    let mut filtered: Vec<Note> = notes
        .iter()
        .filter(|note| !search_active || note.matches_text(&lowered_query))
        .filter(|note| query.selected_tag.map_or(true, |tag| note.has_tag(tag)))
        .filter(|note| match query.selected_folder_id {
            Some(folder_id) => note.folder_id.as_ref() == Some(folder_id),
            None if search_active || query.selected_tag.is_some() => true,
            None => is_unfiled(note, &known_folders),
        })
        .cloned()
        .collect();

    filtered.sort_by(|a, b| compare_notes(a, b, query.sort_option));
    filtered
}

/// Composite comparator used by `filtered_notes`.
///
/// Pinned before unpinned, favorite before non-favorite, then:
/// - `LastEditTime`: newest first.
/// - `Title`: case-insensitive ascending, exact comparison as tie-break.
/// - `CreatedTime`: oldest `last_edit_time` first.
pub fn compare_notes(a: &Note, b: &Note, sort_option: SortOption) -> Ordering {
    b.is_pinned
        .cmp(&a.is_pinned)
        .then_with(|| b.is_favorite.cmp(&a.is_favorite))
        .then_with(|| match sort_option {
            SortOption::LastEditTime => b.last_edit_time.cmp(&a.last_edit_time),
            SortOption::Title => a
                .title
                .to_lowercase()
                .cmp(&b.title.to_lowercase())
                .then_with(|| a.title.cmp(&b.title)),
            SortOption::CreatedTime => a.last_edit_time.cmp(&b.last_edit_time),
        })
}

/// Counts notes per known folder; dangling references count as unfiled.
pub fn folder_note_counts(notes: &[Note], folders: &[Folder]) -> FolderCounts {
    let known_folders = known_folder_ids(folders);
    let mut counts = FolderCounts::default();
    for folder in folders {
        counts.by_folder.insert(folder.id.clone(), 0);
    }
    for note in notes {
        match note.folder_id.as_ref() {
            Some(folder_id) if known_folders.contains(folder_id) => {
                *counts.by_folder.entry(folder_id.clone()).or_default() += 1;
            }
            _ => counts.unfiled += 1,
        }
    }
    counts
}

fn known_folder_ids(folders: &[Folder]) -> HashSet<&FolderId> {
    folders.iter().map(|folder| &folder.id).collect()
}

fn is_unfiled(note: &Note, known_folders: &HashSet<&FolderId>) -> bool {
    match note.folder_id.as_ref() {
        None => true,
        Some(folder_id) => !known_folders.contains(folder_id),
    }
}

#[cfg(test)]
mod tests {
    use super::{all_tags, compare_notes, filtered_notes, folder_note_counts, ViewQuery};
    use crate::model::folder::{Folder, FolderId};
    use crate::model::note::{Note, NoteId, SortOption};
    use std::cmp::Ordering;

    fn note(id: &str, title: &str, last_edit_time: i64) -> Note {
        let mut note = Note::new(NoteId::new(id), last_edit_time);
        note.title = title.to_string();
        note
    }

    #[test]
    fn pinned_outranks_favorite() {
        let mut pinned = note("a", "a", 1);
        pinned.is_pinned = true;
        let mut favorite = note("b", "b", 9);
        favorite.is_favorite = true;
        assert_eq!(
            compare_notes(&pinned, &favorite, SortOption::LastEditTime),
            Ordering::Less
        );
    }

    #[test]
    fn title_sort_ignores_case_first() {
        let lower = note("a", "apple", 1);
        let upper = note("b", "Banana", 1);
        assert_eq!(compare_notes(&lower, &upper, SortOption::Title), Ordering::Less);
    }

    #[test]
    fn all_tags_dedups_and_sorts() {
        let mut first = note("a", "a", 1);
        first.tags = vec!["zeta".into(), "alpha".into()];
        let mut second = note("b", "b", 1);
        second.tags = vec!["alpha".into()];
        assert_eq!(all_tags(&[first, second]), vec!["alpha", "zeta"]);
    }

    #[test]
    fn dangling_folder_reference_is_unfiled() {
        let mut dangling = note("a", "a", 1);
        dangling.folder_id = Some(FolderId::new("gone"));
        let notes = vec![dangling];
        let folders: Vec<Folder> = Vec::new();

        let visible = filtered_notes(&notes, &folders, &ViewQuery::default());
        assert_eq!(visible.len(), 1);

        let counts = folder_note_counts(&notes, &folders);
        assert_eq!(counts.unfiled, 1);
        assert!(counts.by_folder.is_empty());
    }

    #[test]
    fn whitespace_query_does_not_filter() {
        let notes = vec![note("a", "alpha", 1), note("b", "beta", 2)];
        let query = ViewQuery {
            search_query: "   ",
            ..ViewQuery::default()
        };
        assert_eq!(filtered_notes(&notes, &[], &query).len(), 2);
    }
}
