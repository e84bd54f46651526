//! Mutation coordinator.
//!
//! # Responsibility
//! - Apply every user action to the state store synchronously.
//! - Persist the action through the gateway in the background.
//! - Debounce title/content edits per note.
//! - Publish failed writes on the sync event channel.
//!
//! # Invariants
//! - Local state is updated before any remote call starts and is never
//!   rolled back; `reload` re-reads the durable copy.
//! - Remote writes for one note (or folder) run one at a time, in the
//!   order their actions were issued. Each action reserves its queue turn
//!   before it returns; the spawned task only waits for that turn.
//! - Locks on the alias map, debounce registry and state store are never
//!   held across an `.await`. The alias map is only ever locked inside a
//!   store closure or on its own, so swapping a placeholder for its durable
//!   id is atomic with every id lookup done by an action.
//! - Precondition failures leave state untouched.

use crate::config::SyncConfig;
use crate::gateway::{EntityRef, GatewayError, GatewayResult, PersistenceGateway};
use crate::model::folder::{Folder, FolderId};
use crate::model::note::{normalize_tag, normalize_tags, Note, NoteId, DEFAULT_NOTE_TITLE};
use crate::model::now_epoch_ms;
use crate::service::debounce::{Debouncer, EditField};
use crate::service::queue::{AliasMap, KeyedQueue, Reservation};
use crate::store::StateStore;
use log::{debug, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, Notify};
use tokio::task::AbortHandle;
use tokio::time::{sleep, timeout, Instant};

const SYNC_EVENT_CAPACITY: usize = 64;

/// Errors returned by coordinator actions.
#[derive(Debug)]
pub enum MutationError {
    /// Target note/folder is not in local state.
    NotFound(EntityRef),
    /// Input was discarded without touching state (blank tag, blank name).
    ValidationSkip(&'static str),
    /// A remote call the action waits on failed after retries.
    Remote(GatewayError),
    /// Constructed outside a tokio runtime.
    RuntimeUnavailable,
}

impl Display for MutationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(entity) => write!(f, "{entity} not found"),
            Self::ValidationSkip(reason) => write!(f, "input skipped: {reason}"),
            Self::Remote(err) => write!(f, "remote write failed: {err}"),
            Self::RuntimeUnavailable => write!(f, "no tokio runtime available"),
        }
    }
}

impl Error for MutationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Remote(err) => Some(err),
            _ => None,
        }
    }
}

/// Background synchronization outcome worth surfacing to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A remote write gave up; local state now disagrees with the store.
    WriteFailed {
        operation: &'static str,
        target: String,
        attempts: u32,
        error_code: &'static str,
        message: String,
    },
    /// Local collections were replaced by a fresh load.
    Reloaded { notes: usize, folders: usize },
}

#[derive(Debug)]
struct RemoteFailure {
    error: GatewayError,
    attempts: u32,
}

/// Remote half of an action, queued behind earlier writes to its entity.
#[derive(Debug, Clone)]
enum PendingWrite {
    DeleteNote(NoteId),
    UpdateNote {
        id: NoteId,
        title: String,
        content: String,
    },
    SetFavorite {
        id: NoteId,
        value: bool,
    },
    SetPinned {
        id: NoteId,
        value: bool,
    },
    SetTags {
        id: NoteId,
        tags: Vec<String>,
    },
    SetFolder {
        id: NoteId,
        folder_id: Option<FolderId>,
    },
    DeleteFolder(FolderId),
    RenameFolder {
        id: FolderId,
        name: String,
    },
}

impl PendingWrite {
    fn operation(&self) -> &'static str {
        match self {
            Self::DeleteNote(_) => "delete_note",
            Self::UpdateNote { .. } => "update_note",
            Self::SetFavorite { .. } => "set_favorite",
            Self::SetPinned { .. } => "set_pinned",
            Self::SetTags { .. } => "set_tags",
            Self::SetFolder { .. } => "set_note_folder",
            Self::DeleteFolder(_) => "delete_folder",
            Self::RenameFolder { .. } => "rename_folder",
        }
    }

    fn note(&self) -> Option<&NoteId> {
        match self {
            Self::DeleteNote(id)
            | Self::UpdateNote { id, .. }
            | Self::SetFavorite { id, .. }
            | Self::SetPinned { id, .. }
            | Self::SetTags { id, .. }
            | Self::SetFolder { id, .. } => Some(id),
            Self::DeleteFolder(_) | Self::RenameFolder { .. } => None,
        }
    }

    fn folder(&self) -> Option<&FolderId> {
        match self {
            Self::SetFolder { folder_id, .. } => folder_id.as_ref(),
            Self::DeleteFolder(id) | Self::RenameFolder { id, .. } => Some(id),
            _ => None,
        }
    }

    fn entity(&self) -> EntityRef {
        match self {
            Self::DeleteNote(id)
            | Self::UpdateNote { id, .. }
            | Self::SetFavorite { id, .. }
            | Self::SetPinned { id, .. }
            | Self::SetTags { id, .. }
            | Self::SetFolder { id, .. } => EntityRef::Note(id.clone()),
            Self::DeleteFolder(id) | Self::RenameFolder { id, .. } => {
                EntityRef::Folder(id.clone())
            }
        }
    }

    /// Deletes of an already missing entity count as done.
    fn tolerates_not_found(&self) -> bool {
        matches!(self, Self::DeleteNote(_) | Self::DeleteFolder(_))
    }

    /// Lane keys, folder first so multi-lane writes always lock in one order.
    fn queue_keys(&self, aliases: &Aliases) -> Vec<String> {
        let mut keys = Vec::with_capacity(2);
        if let Some(folder) = self.folder() {
            keys.push(format!("folder:{}", aliases.folders.key(folder)));
        }
        if let Some(note) = self.note() {
            keys.push(format!("note:{}", aliases.notes.key(note)));
        }
        keys
    }

    fn resolve(&mut self, aliases: &Aliases) {
        match self {
            Self::DeleteNote(id)
            | Self::UpdateNote { id, .. }
            | Self::SetFavorite { id, .. }
            | Self::SetPinned { id, .. }
            | Self::SetTags { id, .. } => *id = aliases.notes.resolve(id),
            Self::SetFolder { id, folder_id } => {
                *id = aliases.notes.resolve(id);
                if let Some(folder) = folder_id.as_mut() {
                    *folder = aliases.folders.resolve(folder);
                }
            }
            Self::DeleteFolder(id) | Self::RenameFolder { id, .. } => {
                *id = aliases.folders.resolve(id)
            }
        }
    }

    /// True while an id still points at a create that never succeeded.
    fn has_placeholder(&self) -> bool {
        self.note().is_some_and(NoteId::is_placeholder)
            || self.folder().is_some_and(FolderId::is_placeholder)
    }

    async fn apply<G>(&self, gateway: &G) -> GatewayResult<()>
    where
        G: PersistenceGateway + ?Sized,
    {
        match self {
            Self::DeleteNote(id) => gateway.delete_note(id).await,
            Self::UpdateNote { id, title, content } => {
                gateway.update_note(id, title, content).await
            }
            Self::SetFavorite { id, value } => gateway.set_favorite(id, *value).await,
            Self::SetPinned { id, value } => gateway.set_pinned(id, *value).await,
            Self::SetTags { id, tags } => gateway.set_tags(id, tags).await,
            Self::SetFolder { id, folder_id } => {
                gateway.set_note_folder(id, folder_id.as_ref()).await
            }
            Self::DeleteFolder(id) => gateway.delete_folder(id).await,
            Self::RenameFolder { id, name } => gateway.rename_folder(id, name).await,
        }
    }
}

#[derive(Debug, Default)]
struct Aliases {
    notes: AliasMap<NoteId>,
    folders: AliasMap<FolderId>,
}

/// Counts live background tasks and wakes `flush` when none remain.
#[derive(Debug, Default)]
struct TaskCounter {
    active: AtomicUsize,
    idle: Notify,
}

impl TaskCounter {
    fn track(self: &Arc<Self>) -> TaskGuard {
        self.active.fetch_add(1, Ordering::AcqRel);
        TaskGuard(Arc::clone(self))
    }

    fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.active() == 0 {
                return;
            }
            notified.await;
        }
    }
}

struct TaskGuard(Arc<TaskCounter>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if self.0.active.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

struct Shared<G: ?Sized> {
    store: Arc<StateStore>,
    config: SyncConfig,
    runtime: Handle,
    tasks: Arc<TaskCounter>,
    debouncer: Debouncer,
    queue: KeyedQueue,
    aliases: Mutex<Aliases>,
    events: broadcast::Sender<SyncEvent>,
    gateway: Arc<G>,
}

impl<G> Shared<G>
where
    G: PersistenceGateway + ?Sized + 'static,
{
    fn aliases(&self) -> MutexGuard<'_, Aliases> {
        self.aliases.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve_note(&self, id: &NoteId) -> NoteId {
        self.aliases().notes.resolve(id)
    }

    fn resolve_folder(&self, id: &FolderId) -> FolderId {
        self.aliases().folders.resolve(id)
    }

    fn note_key(&self, id: &NoteId) -> NoteId {
        self.aliases().notes.key(id)
    }

    fn spawn<F>(&self, task: F) -> AbortHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = self.tasks.track();
        self.runtime
            .spawn(async move {
                let _guard = guard;
                task.await;
            })
            .abort_handle()
    }

    /// Takes the queue turn for `write` on its note and folder lanes.
    fn reserve(&self, write: &PendingWrite) -> Reservation {
        let keys = write.queue_keys(&self.aliases());
        self.queue.reserve(keys)
    }

    fn enqueue(self: &Arc<Self>, write: PendingWrite) {
        let turn = self.reserve(&write);
        let shared = Arc::clone(self);
        self.spawn(async move { shared.run_write(write, turn).await });
    }

    async fn run_write(&self, mut write: PendingWrite, turn: Reservation) {
        let _ticket = turn.wait().await;
        self.resolve_write(&mut write);
        let operation = write.operation();
        let target = write.entity().to_string();

        let outcome = if write.has_placeholder() {
            Err(RemoteFailure {
                error: GatewayError::NotFound(write.entity()),
                attempts: 0,
            })
        } else {
            self.call_remote(operation, &target, || write.apply(self.gateway.as_ref()))
                .await
        };

        match outcome {
            Ok(()) => {}
            Err(failure) if failure.error.is_not_found() && write.tolerates_not_found() => {
                debug!(
                    "event=remote_write module=service status=skipped op={operation} target={target} reason=already_gone"
                );
            }
            Err(failure) => {
                self.report_failure(operation, &target, failure);
            }
        }
    }

    fn resolve_write(&self, write: &mut PendingWrite) {
        write.resolve(&self.aliases());
    }

    /// Runs `call` under the request timeout, retrying retryable errors.
    async fn call_remote<T, F, Fut>(
        &self,
        operation: &'static str,
        target: &str,
        mut call: F,
    ) -> Result<T, RemoteFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        let mut attempt = 1;
        loop {
            let started = Instant::now();
            let result = match timeout(self.config.request_timeout(), call()).await {
                Ok(result) => result,
                Err(_) => Err(GatewayError::Timeout),
            };
            match result {
                Ok(value) => {
                    debug!(
                        "event=remote_write module=service status=ok op={operation} target={target} attempt={attempt} duration_ms={}",
                        started.elapsed().as_millis()
                    );
                    return Ok(value);
                }
                Err(error) if error.is_retryable() && attempt < self.config.max_attempts => {
                    let delay = self.config.retry_delay(attempt);
                    warn!(
                        "event=remote_write module=service status=retry op={operation} target={target} attempt={attempt} error_code={} retry_in_ms={}",
                        error.code(),
                        delay.as_millis()
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    return Err(RemoteFailure {
                        error,
                        attempts: attempt,
                    })
                }
            }
        }
    }

    /// Logs a final failure, publishes it and hands the error back.
    fn report_failure(
        &self,
        operation: &'static str,
        target: &str,
        failure: RemoteFailure,
    ) -> GatewayError {
        let RemoteFailure { error, attempts } = failure;
        warn!(
            "event=remote_write module=service status=error op={operation} target={target} attempts={attempts} error_code={}",
            error.code()
        );
        // No subscribers is fine; the failure is already logged.
        let _ = self.events.send(SyncEvent::WriteFailed {
            operation,
            target: target.to_string(),
            attempts,
            error_code: error.code(),
            message: error.to_string(),
        });
        error
    }

    async fn run_create_note(&self, local_id: NoteId, turn: Reservation) {
        let _ticket = turn.wait().await;
        let target = EntityRef::Note(local_id.clone()).to_string();
        let created = self
            .call_remote("create_note", &target, || {
                self.gateway.create_note(DEFAULT_NOTE_TITLE, "")
            })
            .await;

        match created {
            Ok(durable_id) => {
                self.store.update(|state| {
                    self.aliases()
                        .notes
                        .insert(local_id.clone(), durable_id.clone());
                    if let Some(note) = state.note_mut(&local_id) {
                        note.id = durable_id.clone();
                    }
                    if state.selected_note_id.as_ref() == Some(&local_id) {
                        state.selected_note_id = Some(durable_id.clone());
                    }
                });
                info!(
                    "event=note_create module=service status=ok placeholder={local_id} note_id={durable_id}"
                );
            }
            Err(failure) => {
                self.report_failure("create_note", &target, failure);
            }
        }
    }

    async fn run_create_folder(&self, local_id: FolderId, name: String, turn: Reservation) {
        let _ticket = turn.wait().await;
        let target = EntityRef::Folder(local_id.clone()).to_string();
        let created = self
            .call_remote("create_folder", &target, || self.gateway.create_folder(&name))
            .await;

        match created {
            Ok(durable_id) => {
                self.store.update(|state| {
                    self.aliases()
                        .folders
                        .insert(local_id.clone(), durable_id.clone());
                    if let Some(folder) = state.folder_mut(&local_id) {
                        folder.id = durable_id.clone();
                    }
                    for note in state
                        .notes
                        .iter_mut()
                        .filter(|note| note.folder_id.as_ref() == Some(&local_id))
                    {
                        note.folder_id = Some(durable_id.clone());
                    }
                    if state.selected_folder_id.as_ref() == Some(&local_id) {
                        state.selected_folder_id = Some(durable_id.clone());
                    }
                });
                info!(
                    "event=folder_create module=service status=ok placeholder={local_id} folder_id={durable_id}"
                );
            }
            Err(failure) => {
                self.report_failure("create_folder", &target, failure);
            }
        }
    }

    /// Persists the latest title/content of a note once its timer fired.
    async fn persist_text(&self, key: NoteId, field: EditField) {
        if let Some((write, turn)) = self.prepare_text_save(&key, field) {
            self.run_write(write, turn).await;
        }
    }

    /// Snapshots the note text for a fired timer and reserves its turn.
    fn prepare_text_save(
        &self,
        key: &NoteId,
        field: EditField,
    ) -> Option<(PendingWrite, Reservation)> {
        let latest = self.store.read(|state| {
            state
                .note(&self.resolve_note(key))
                .map(|note| (note.id.clone(), note.title.clone(), note.content.clone()))
        });
        let Some((id, title, content)) = latest else {
            debug!(
                "event=debounced_save module=service status=skipped note_id={key} field={} reason=note_missing",
                field.as_str()
            );
            return None;
        };
        // Blank titles are never written.
        let title = match (field, title.trim().is_empty()) {
            (EditField::Title, true) => {
                debug!(
                    "event=debounced_save module=service status=skipped note_id={id} field=title reason=empty_title"
                );
                return None;
            }
            (EditField::Content, true) => DEFAULT_NOTE_TITLE.to_string(),
            (_, false) => title,
        };
        let write = PendingWrite::UpdateNote { id, title, content };
        let turn = self.reserve(&write);
        Some((write, turn))
    }

    fn schedule_save(self: &Arc<Self>, id: &NoteId, field: EditField) {
        let key = self.note_key(id);
        let delay = match field {
            EditField::Title => self.config.title_debounce(),
            EditField::Content => self.config.content_debounce(),
        };
        self.debouncer.arm(key.clone(), field, |generation| {
            let shared = Arc::clone(self);
            self.spawn(async move {
                sleep(delay).await;
                if shared.debouncer.claim(&key, field, generation) {
                    shared.persist_text(key, field).await;
                }
            })
        });
    }
}

/// Optimistic-first coordinator between the state store and a gateway.
///
/// Actions return as soon as local state is updated; remote writes run on
/// the tokio runtime that was current when the coordinator was built.
pub struct MutationCoordinator<G: ?Sized> {
    shared: Arc<Shared<G>>,
}

impl<G: ?Sized> Clone for MutationCoordinator<G> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<G> MutationCoordinator<G>
where
    G: PersistenceGateway + ?Sized + 'static,
{
    /// Binds `store` to `gateway` on the current tokio runtime.
    ///
    /// # Errors
    /// - `RuntimeUnavailable` when called outside a tokio runtime.
    pub fn new(
        store: Arc<StateStore>,
        gateway: Arc<G>,
        config: SyncConfig,
    ) -> Result<Self, MutationError> {
        let runtime = Handle::try_current().map_err(|_| MutationError::RuntimeUnavailable)?;
        let (events, _) = broadcast::channel(SYNC_EVENT_CAPACITY);
        Ok(Self {
            shared: Arc::new(Shared {
                store,
                config,
                runtime,
                tasks: Arc::default(),
                debouncer: Debouncer::default(),
                queue: KeyedQueue::default(),
                aliases: Mutex::default(),
                events,
                gateway,
            }),
        })
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.shared.store
    }

    pub fn gateway(&self) -> &Arc<G> {
        &self.shared.gateway
    }

    pub fn config(&self) -> &SyncConfig {
        &self.shared.config
    }

    /// Subscribes to failed-write and reload notifications.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.shared.events.subscribe()
    }

    /// Whether a debounced save or remote write is still outstanding.
    pub fn is_saving(&self) -> bool {
        self.shared.tasks.active() > 0
    }

    /// Durable id for a note created under a placeholder, if known yet.
    pub fn resolve_note_id(&self, id: &NoteId) -> NoteId {
        self.shared.resolve_note(id)
    }

    pub fn resolve_folder_id(&self, id: &FolderId) -> FolderId {
        self.shared.resolve_folder(id)
    }

    /// Replaces local collections with the gateway's notes and folders.
    pub async fn load(&self) -> Result<(), MutationError> {
        let shared = &self.shared;
        let started = Instant::now();
        let notes = shared
            .call_remote("list_notes", "notes", || shared.gateway.list_notes())
            .await
            .map_err(|failure| {
                MutationError::Remote(shared.report_failure("list_notes", "notes", failure))
            })?;
        let folders = shared
            .call_remote("list_folders", "folders", || shared.gateway.list_folders())
            .await
            .map_err(|failure| {
                MutationError::Remote(shared.report_failure("list_folders", "folders", failure))
            })?;

        let (note_count, folder_count) = (notes.len(), folders.len());
        shared.store.replace_collections(notes, folders);
        info!(
            "event=store_load module=service status=ok notes={note_count} folders={folder_count} duration_ms={}",
            started.elapsed().as_millis()
        );
        Ok(())
    }

    /// Lands outstanding writes, then reloads from the gateway.
    pub async fn reload(&self) -> Result<(), MutationError> {
        self.flush().await;
        self.load().await?;
        let (notes, folders) = self
            .shared
            .store
            .read(|state| (state.notes.len(), state.folders.len()));
        let _ = self
            .shared
            .events
            .send(SyncEvent::Reloaded { notes, folders });
        Ok(())
    }

    /// Fires pending debounced saves now and waits for every write to land.
    pub async fn flush(&self) {
        let shared = &self.shared;
        for (key, field) in shared.debouncer.drain() {
            if let Some((write, turn)) = shared.prepare_text_save(&key, field) {
                let task_shared = Arc::clone(shared);
                shared.spawn(async move { task_shared.run_write(write, turn).await });
            }
        }
        shared.tasks.wait_idle().await;
    }

    /// Appends an untitled note under a placeholder id and creates it
    /// remotely. Returns the placeholder id.
    pub fn create_note(&self) -> NoteId {
        let note = Note::new_local(now_epoch_ms());
        let local_id = note.id.clone();
        self.shared.store.update(|state| state.notes.push(note));
        debug!("event=note_create module=service status=pending placeholder={local_id}");

        let turn = self.shared.queue.reserve([format!("note:{local_id}")]);
        let shared = Arc::clone(&self.shared);
        let task_id = local_id.clone();
        self.shared
            .spawn(async move { shared.run_create_note(task_id, turn).await });
        local_id
    }

    pub fn delete_note(&self, id: &NoteId) -> Result<(), MutationError> {
        let shared = &self.shared;
        let id = shared
            .store
            .try_update(|state| {
                let id = shared.resolve_note(id);
                let before = state.notes.len();
                state.notes.retain(|note| note.id != id);
                (state.notes.len() != before).then_some(id)
            })
            .ok_or_else(|| MutationError::NotFound(EntityRef::Note(shared.resolve_note(id))))?;

        let cancelled = shared.debouncer.cancel_note(&shared.note_key(&id));
        if cancelled > 0 {
            debug!(
                "event=debounced_save module=service status=cancelled note_id={id} timers={cancelled}"
            );
        }
        shared.enqueue(PendingWrite::DeleteNote(id));
        Ok(())
    }

    /// Sets the title locally; persisted after the title quiet period.
    ///
    /// A title that is blank when the timer fires is not persisted.
    pub fn edit_title(&self, id: &NoteId, title: &str) -> Result<(), MutationError> {
        let id = self.patch_text(id, Some(title), None)?;
        self.shared.schedule_save(&id, EditField::Title);
        Ok(())
    }

    /// Sets the content locally; persisted after the content quiet period.
    pub fn edit_content(&self, id: &NoteId, content: &str) -> Result<(), MutationError> {
        let id = self.patch_text(id, None, Some(content))?;
        self.shared.schedule_save(&id, EditField::Content);
        Ok(())
    }

    /// Patches title and/or content and persists immediately.
    pub fn update_note(
        &self,
        id: &NoteId,
        title: Option<&str>,
        content: Option<&str>,
    ) -> Result<Note, MutationError> {
        if title.is_none() && content.is_none() {
            return Err(MutationError::ValidationSkip("nothing to update"));
        }
        if title.is_some_and(|title| title.trim().is_empty()) {
            return Err(MutationError::ValidationSkip("title is blank"));
        }
        let now = now_epoch_ms();
        let (id, note) = self.modify_note(id, |note| {
            note.apply_edit(title, content, now);
            note.clone()
        })?;
        self.shared.enqueue(PendingWrite::UpdateNote {
            id,
            title: note.title.clone(),
            content: note.content.clone(),
        });
        Ok(note)
    }

    /// Flips `is_favorite` and returns the new value.
    pub fn toggle_favorite(&self, id: &NoteId) -> Result<bool, MutationError> {
        let (id, value) = self.modify_note(id, |note| {
            note.is_favorite = !note.is_favorite;
            note.is_favorite
        })?;
        self.shared.enqueue(PendingWrite::SetFavorite { id, value });
        Ok(value)
    }

    /// Flips `is_pinned` and returns the new value.
    pub fn toggle_pinned(&self, id: &NoteId) -> Result<bool, MutationError> {
        let (id, value) = self.modify_note(id, |note| {
            note.is_pinned = !note.is_pinned;
            note.is_pinned
        })?;
        self.shared.enqueue(PendingWrite::SetPinned { id, value });
        Ok(value)
    }

    /// Replaces the tag sequence with its normalized form.
    pub fn update_tags<S: AsRef<str>>(
        &self,
        id: &NoteId,
        tags: &[S],
    ) -> Result<Vec<String>, MutationError> {
        let tags = normalize_tags(tags);
        let (id, tags) = self.modify_note(id, |note| {
            note.tags = tags;
            note.tags.clone()
        })?;
        self.shared.enqueue(PendingWrite::SetTags {
            id,
            tags: tags.clone(),
        });
        Ok(tags)
    }

    /// Appends one tag. Blank text is skipped; a present tag is a no-op.
    pub fn add_tag(&self, id: &NoteId, tag: &str) -> Result<Vec<String>, MutationError> {
        let tag = normalize_tag(tag).ok_or(MutationError::ValidationSkip("tag is blank"))?;
        let (id, current) = self.note_tags(id)?;
        if current.contains(&tag) {
            return Ok(current);
        }
        let mut tags = current;
        tags.push(tag);
        self.update_tags(&id, &tags)
    }

    /// Removes one tag; removing an absent tag is a no-op.
    pub fn remove_tag(&self, id: &NoteId, tag: &str) -> Result<Vec<String>, MutationError> {
        let tag = tag.trim();
        let (id, current) = self.note_tags(id)?;
        if !current.iter().any(|existing| existing == tag) {
            return Ok(current);
        }
        let tags: Vec<String> = current.into_iter().filter(|existing| existing != tag).collect();
        self.update_tags(&id, &tags)
    }

    /// Files the note into `folder_id`, or unfiles it with `None`.
    pub fn move_note_to_folder(
        &self,
        id: &NoteId,
        folder_id: Option<&FolderId>,
    ) -> Result<(), MutationError> {
        let shared = &self.shared;
        let mut missing_folder = None;
        let moved = shared.store.try_update(|state| {
            let target = match folder_id {
                Some(folder) => {
                    let folder = shared.resolve_folder(folder);
                    if state.folder(&folder).is_none() {
                        missing_folder = Some(folder);
                        return None;
                    }
                    Some(folder)
                }
                None => None,
            };
            let id = shared.resolve_note(id);
            let note = state.note_mut(&id)?;
            note.folder_id = target.clone();
            Some((id, target))
        });
        if let Some(folder) = missing_folder {
            return Err(MutationError::NotFound(EntityRef::Folder(folder)));
        }
        let (id, folder_id) = moved
            .ok_or_else(|| MutationError::NotFound(EntityRef::Note(shared.resolve_note(id))))?;
        shared.enqueue(PendingWrite::SetFolder { id, folder_id });
        Ok(())
    }

    /// Asks the gateway for a copy and appends it once materialized.
    ///
    /// Waits behind earlier writes to the source note, so the copy sees
    /// every edit issued before this call (debounced edits excepted).
    pub async fn duplicate_note(&self, id: &NoteId) -> Result<NoteId, MutationError> {
        let shared = &self.shared;
        let local_id = shared
            .store
            .read(|state| {
                let id = shared.resolve_note(id);
                state.note(&id).map(|_| id)
            })
            .ok_or_else(|| MutationError::NotFound(EntityRef::Note(shared.resolve_note(id))))?;
        let _guard = shared.tasks.track();
        let turn = shared
            .queue
            .reserve([format!("note:{}", shared.note_key(&local_id))]);

        let copy_id = {
            let _ticket = turn.wait().await;
            let source = shared.resolve_note(&local_id);
            if source.is_placeholder() {
                return Err(MutationError::NotFound(EntityRef::Note(source)));
            }
            let target = EntityRef::Note(source.clone()).to_string();
            shared
                .call_remote("duplicate_note", &target, || {
                    shared.gateway.duplicate_note(&source)
                })
                .await
                .map_err(|failure| {
                    MutationError::Remote(shared.report_failure("duplicate_note", &target, failure))
                })?
        };

        let target = EntityRef::Note(copy_id.clone()).to_string();
        let copy = shared
            .call_remote("get_note", &target, || shared.gateway.get_note(&copy_id))
            .await
            .map_err(|failure| {
                MutationError::Remote(shared.report_failure("get_note", &target, failure))
            })?
            .ok_or_else(|| MutationError::NotFound(EntityRef::Note(copy_id.clone())))?;

        shared.store.update(|state| {
            if state.note(&copy.id).is_none() {
                state.notes.push(copy);
            }
        });
        info!("event=note_duplicate module=service status=ok source={local_id} note_id={copy_id}");
        Ok(copy_id)
    }

    /// Appends a folder under a placeholder id and creates it remotely.
    pub fn create_folder(&self, name: &str) -> Result<FolderId, MutationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(MutationError::ValidationSkip("folder name is blank"));
        }
        let folder = Folder::new_local(name, now_epoch_ms());
        let local_id = folder.id.clone();
        self.shared.store.update(|state| state.folders.push(folder));
        debug!("event=folder_create module=service status=pending placeholder={local_id}");

        let turn = self.shared.queue.reserve([format!("folder:{local_id}")]);
        let shared = Arc::clone(&self.shared);
        let task_id = local_id.clone();
        let name = name.to_string();
        self.shared
            .spawn(async move { shared.run_create_folder(task_id, name, turn).await });
        Ok(local_id)
    }

    /// Removes the folder and unfiles its notes. Returns how many notes
    /// were unfiled.
    pub fn delete_folder(&self, id: &FolderId) -> Result<usize, MutationError> {
        let shared = &self.shared;
        let deleted = shared.store.try_update(|state| {
            let id = shared.resolve_folder(id);
            let before = state.folders.len();
            state.folders.retain(|folder| folder.id != id);
            if state.folders.len() == before {
                return None;
            }
            let mut unfiled = 0;
            for note in state
                .notes
                .iter_mut()
                .filter(|note| note.folder_id.as_ref() == Some(&id))
            {
                note.folder_id = None;
                unfiled += 1;
            }
            if state.selected_folder_id.as_ref() == Some(&id) {
                state.selected_folder_id = None;
            }
            Some((id, unfiled))
        });
        let (id, unfiled) = deleted
            .ok_or_else(|| MutationError::NotFound(EntityRef::Folder(shared.resolve_folder(id))))?;

        debug!("event=folder_delete module=service status=pending folder_id={id} unfiled={unfiled}");
        shared.enqueue(PendingWrite::DeleteFolder(id));
        Ok(unfiled)
    }

    pub fn rename_folder(&self, id: &FolderId, name: &str) -> Result<(), MutationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(MutationError::ValidationSkip("folder name is blank"));
        }
        let shared = &self.shared;
        let id = shared
            .store
            .try_update(|state| {
                let id = shared.resolve_folder(id);
                let folder = state.folder_mut(&id)?;
                folder.name = name.to_string();
                Some(id)
            })
            .ok_or_else(|| MutationError::NotFound(EntityRef::Folder(shared.resolve_folder(id))))?;
        shared.enqueue(PendingWrite::RenameFolder {
            id,
            name: name.to_string(),
        });
        Ok(())
    }

    /// Applies a title/content patch and refreshes `last_edit_time`.
    fn patch_text(
        &self,
        id: &NoteId,
        title: Option<&str>,
        content: Option<&str>,
    ) -> Result<NoteId, MutationError> {
        let now = now_epoch_ms();
        let (id, ()) = self.modify_note(id, |note| note.apply_edit(title, content, now))?;
        Ok(id)
    }

    /// Runs `edit` on the note inside one store write.
    fn modify_note<R>(
        &self,
        id: &NoteId,
        edit: impl FnOnce(&mut Note) -> R,
    ) -> Result<(NoteId, R), MutationError> {
        let shared = &self.shared;
        shared
            .store
            .try_update(|state| {
                let id = shared.resolve_note(id);
                let output = state.note_mut(&id).map(edit)?;
                Some((id, output))
            })
            .ok_or_else(|| MutationError::NotFound(EntityRef::Note(shared.resolve_note(id))))
    }

    /// Resolved id and current tags of a note.
    fn note_tags(&self, id: &NoteId) -> Result<(NoteId, Vec<String>), MutationError> {
        let shared = &self.shared;
        shared
            .store
            .read(|state| {
                let id = shared.resolve_note(id);
                let tags = state.note(&id)?.tags.clone();
                Some((id, tags))
            })
            .ok_or_else(|| MutationError::NotFound(EntityRef::Note(shared.resolve_note(id))))
    }
}
