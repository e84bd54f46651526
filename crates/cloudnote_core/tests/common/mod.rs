#![allow(dead_code)]

use async_trait::async_trait;
use cloudnote_core::gateway::{GatewayError, GatewayResult, MemoryGateway, PersistenceGateway};
use cloudnote_core::model::folder::{Folder, FolderId, FolderRecord};
use cloudnote_core::model::note::{Note, NoteId, NoteRecord};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// One gateway request as observed by `RecordingGateway`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListNotes,
    GetNote(String),
    CreateNote { title: String, content: String },
    DeleteNote(String),
    UpdateNote {
        id: String,
        title: String,
        content: String,
    },
    SetFavorite { id: String, value: bool },
    SetPinned { id: String, value: bool },
    SetTags { id: String, tags: Vec<String> },
    SetNoteFolder { id: String, folder: Option<String> },
    DuplicateNote(String),
    ListFolders,
    CreateFolder(String),
    DeleteFolder(String),
    RenameFolder { id: String, name: String },
}

/// Memory gateway that records every request and can inject failures and
/// latency.
#[derive(Debug, Default)]
pub struct RecordingGateway {
    inner: MemoryGateway,
    calls: Mutex<Vec<Call>>,
    failures_left: AtomicUsize,
    latency: Mutex<Duration>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(notes: Vec<NoteRecord>, folders: Vec<FolderRecord>) -> Self {
        Self {
            inner: MemoryGateway::with_records(notes, folders),
            ..Self::default()
        }
    }

    /// The next `count` requests fail with `Unavailable`.
    pub fn fail_next(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    /// Every following request sleeps `latency` before answering.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls other than the list/get reads used for loading.
    pub fn writes(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| {
                !matches!(call, Call::ListNotes | Call::ListFolders | Call::GetNote(_))
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn inner(&self) -> &MemoryGateway {
        &self.inner
    }

    async fn enter(&self, call: Call) -> GatewayResult<()> {
        self.calls.lock().unwrap().push(call);
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let injected = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if injected {
            return Err(GatewayError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for RecordingGateway {
    async fn list_notes(&self) -> GatewayResult<Vec<NoteRecord>> {
        self.enter(Call::ListNotes).await?;
        self.inner.list_notes().await
    }

    async fn get_note(&self, id: &NoteId) -> GatewayResult<Option<NoteRecord>> {
        self.enter(Call::GetNote(id.to_string())).await?;
        self.inner.get_note(id).await
    }

    async fn create_note(&self, title: &str, content: &str) -> GatewayResult<NoteId> {
        self.enter(Call::CreateNote {
            title: title.to_string(),
            content: content.to_string(),
        })
        .await?;
        self.inner.create_note(title, content).await
    }

    async fn delete_note(&self, id: &NoteId) -> GatewayResult<()> {
        self.enter(Call::DeleteNote(id.to_string())).await?;
        self.inner.delete_note(id).await
    }

    async fn update_note(&self, id: &NoteId, title: &str, content: &str) -> GatewayResult<()> {
        self.enter(Call::UpdateNote {
            id: id.to_string(),
            title: title.to_string(),
            content: content.to_string(),
        })
        .await?;
        self.inner.update_note(id, title, content).await
    }

    async fn set_favorite(&self, id: &NoteId, value: bool) -> GatewayResult<()> {
        self.enter(Call::SetFavorite {
            id: id.to_string(),
            value,
        })
        .await?;
        self.inner.set_favorite(id, value).await
    }

    async fn set_pinned(&self, id: &NoteId, value: bool) -> GatewayResult<()> {
        self.enter(Call::SetPinned {
            id: id.to_string(),
            value,
        })
        .await?;
        self.inner.set_pinned(id, value).await
    }

    async fn set_tags(&self, id: &NoteId, tags: &[String]) -> GatewayResult<()> {
        self.enter(Call::SetTags {
            id: id.to_string(),
            tags: tags.to_vec(),
        })
        .await?;
        self.inner.set_tags(id, tags).await
    }

    async fn set_note_folder(
        &self,
        id: &NoteId,
        folder_id: Option<&FolderId>,
    ) -> GatewayResult<()> {
        self.enter(Call::SetNoteFolder {
            id: id.to_string(),
            folder: folder_id.map(ToString::to_string),
        })
        .await?;
        self.inner.set_note_folder(id, folder_id).await
    }

    async fn duplicate_note(&self, id: &NoteId) -> GatewayResult<NoteId> {
        self.enter(Call::DuplicateNote(id.to_string())).await?;
        self.inner.duplicate_note(id).await
    }

    async fn list_folders(&self) -> GatewayResult<Vec<FolderRecord>> {
        self.enter(Call::ListFolders).await?;
        self.inner.list_folders().await
    }

    async fn create_folder(&self, name: &str) -> GatewayResult<FolderId> {
        self.enter(Call::CreateFolder(name.to_string())).await?;
        self.inner.create_folder(name).await
    }

    async fn delete_folder(&self, id: &FolderId) -> GatewayResult<()> {
        self.enter(Call::DeleteFolder(id.to_string())).await?;
        self.inner.delete_folder(id).await
    }

    async fn rename_folder(&self, id: &FolderId, name: &str) -> GatewayResult<()> {
        self.enter(Call::RenameFolder {
            id: id.to_string(),
            name: name.to_string(),
        })
        .await?;
        self.inner.rename_folder(id, name).await
    }
}

/// Note fixture with explicit flags; ids avoid the memory gateway's
/// `note-N` sequence.
pub fn note(id: &str, title: &str, content: &str, last_edit_time: i64) -> Note {
    let mut note = Note::new(NoteId::new(id), last_edit_time);
    note.title = title.to_string();
    note.content = content.to_string();
    note
}

pub fn folder(id: &str, name: &str) -> Folder {
    Folder::new(FolderId::new(id), name, 1)
}
