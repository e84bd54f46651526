//! In-process persistence gateway.
//!
//! Mirrors `SqliteGateway` semantics without durability; used by tests and
//! ephemeral sessions.

use crate::gateway::{duplicate_title, EntityRef, GatewayError, GatewayResult, PersistenceGateway};
use crate::model::folder::{Folder, FolderId, FolderRecord};
use crate::model::note::{normalize_tags, Note, NoteId, NoteRecord};
use crate::model::now_epoch_ms;
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct MemoryData {
    notes: Vec<Note>,
    folders: Vec<Folder>,
    next_seq: u64,
}

impl MemoryData {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_seq += 1;
        format!("{prefix}-{}", self.next_seq)
    }

    fn note_mut(&mut self, id: &NoteId) -> GatewayResult<&mut Note> {
        self.notes
            .iter_mut()
            .find(|note| &note.id == id)
            .ok_or_else(|| GatewayError::NotFound(EntityRef::Note(id.clone())))
    }

    fn folder_mut(&mut self, id: &FolderId) -> GatewayResult<&mut Folder> {
        self.folders
            .iter_mut()
            .find(|folder| &folder.id == id)
            .ok_or_else(|| GatewayError::NotFound(EntityRef::Folder(id.clone())))
    }
}

/// Gateway keeping every record in process memory.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    data: Mutex<MemoryData>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the gateway with existing records, e.g. for an initial load.
    pub fn with_records(notes: Vec<NoteRecord>, folders: Vec<FolderRecord>) -> Self {
        Self {
            data: Mutex::new(MemoryData {
                notes,
                folders,
                next_seq: 0,
            }),
        }
    }

    fn lock(&self) -> GatewayResult<MutexGuard<'_, MemoryData>> {
        self.data
            .lock()
            .map_err(|_| GatewayError::Unavailable("memory gateway lock poisoned".to_string()))
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn list_notes(&self) -> GatewayResult<Vec<NoteRecord>> {
        Ok(self.lock()?.notes.clone())
    }

    async fn get_note(&self, id: &NoteId) -> GatewayResult<Option<NoteRecord>> {
        let data = self.lock()?;
        Ok(data.notes.iter().find(|note| &note.id == id).cloned())
    }

    async fn create_note(&self, title: &str, content: &str) -> GatewayResult<NoteId> {
        let mut data = self.lock()?;
        let id = NoteId::new(data.next_id("note"));
        let mut note = Note::new(id.clone(), now_epoch_ms());
        note.title = title.to_string();
        note.content = content.to_string();
        data.notes.push(note);
        Ok(id)
    }

    async fn delete_note(&self, id: &NoteId) -> GatewayResult<()> {
        let mut data = self.lock()?;
        let before = data.notes.len();
        data.notes.retain(|note| &note.id != id);
        if data.notes.len() == before {
            return Err(GatewayError::NotFound(EntityRef::Note(id.clone())));
        }
        Ok(())
    }

    async fn update_note(&self, id: &NoteId, title: &str, content: &str) -> GatewayResult<()> {
        let mut data = self.lock()?;
        data.note_mut(id)?
            .apply_edit(Some(title), Some(content), now_epoch_ms());
        Ok(())
    }

    async fn set_favorite(&self, id: &NoteId, value: bool) -> GatewayResult<()> {
        self.lock()?.note_mut(id)?.is_favorite = value;
        Ok(())
    }

    async fn set_pinned(&self, id: &NoteId, value: bool) -> GatewayResult<()> {
        self.lock()?.note_mut(id)?.is_pinned = value;
        Ok(())
    }

    async fn set_tags(&self, id: &NoteId, tags: &[String]) -> GatewayResult<()> {
        self.lock()?.note_mut(id)?.tags = normalize_tags(tags);
        Ok(())
    }

    async fn set_note_folder(
        &self,
        id: &NoteId,
        folder_id: Option<&FolderId>,
    ) -> GatewayResult<()> {
        self.lock()?.note_mut(id)?.folder_id = folder_id.cloned();
        Ok(())
    }

    async fn duplicate_note(&self, id: &NoteId) -> GatewayResult<NoteId> {
        let mut data = self.lock()?;
        let original = data.note_mut(id)?.clone();
        let copy_id = NoteId::new(data.next_id("note"));
        data.notes.push(Note {
            id: copy_id.clone(),
            title: duplicate_title(&original.title),
            content: original.content,
            last_edit_time: now_epoch_ms(),
            is_favorite: false,
            is_pinned: false,
            tags: original.tags,
            // The copy stays in the source's folder instead of landing unfiled.
            folder_id: original.folder_id,
        });
        Ok(copy_id)
    }

    async fn list_folders(&self) -> GatewayResult<Vec<FolderRecord>> {
        Ok(self.lock()?.folders.clone())
    }

    async fn create_folder(&self, name: &str) -> GatewayResult<FolderId> {
        let mut data = self.lock()?;
        let id = FolderId::new(data.next_id("folder"));
        data.folders
            .push(Folder::new(id.clone(), name, now_epoch_ms()));
        Ok(id)
    }

    async fn delete_folder(&self, id: &FolderId) -> GatewayResult<()> {
        let mut data = self.lock()?;
        let before = data.folders.len();
        data.folders.retain(|folder| &folder.id != id);
        if data.folders.len() == before {
            return Err(GatewayError::NotFound(EntityRef::Folder(id.clone())));
        }
        for note in data
            .notes
            .iter_mut()
            .filter(|note| note.folder_id.as_ref() == Some(id))
        {
            note.folder_id = None;
        }
        Ok(())
    }

    async fn rename_folder(&self, id: &FolderId, name: &str) -> GatewayResult<()> {
        self.lock()?.folder_mut(id)?.name = name.to_string();
        Ok(())
    }
}
