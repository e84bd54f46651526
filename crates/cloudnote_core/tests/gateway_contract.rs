use cloudnote_core::gateway::{
    EntityRef, GatewayError, MemoryGateway, PersistenceGateway, SqliteGateway,
};
use cloudnote_core::model::folder::FolderId;
use cloudnote_core::model::note::NoteId;

async fn note_lifecycle<G: PersistenceGateway>(gateway: &G) {
    let id = gateway.create_note("Untitled", "").await.unwrap();
    let created = gateway.get_note(&id).await.unwrap().unwrap();
    assert_eq!(created.title, "Untitled");
    assert!(created.content.is_empty());
    assert!(!created.is_favorite);
    assert!(!created.is_pinned);
    assert!(created.tags.is_empty());
    assert!(created.folder_id.is_none());

    gateway.update_note(&id, "Plan", "hello").await.unwrap();
    gateway.set_favorite(&id, true).await.unwrap();
    gateway.set_pinned(&id, true).await.unwrap();
    gateway
        .set_tags(&id, &["b".to_string(), "a".to_string(), "b".to_string()])
        .await
        .unwrap();

    let updated = gateway.get_note(&id).await.unwrap().unwrap();
    assert_eq!(updated.title, "Plan");
    assert_eq!(updated.content, "hello");
    assert!(updated.is_favorite);
    assert!(updated.is_pinned);
    assert_eq!(updated.tags, vec!["b", "a"]);
    assert!(updated.last_edit_time >= created.last_edit_time);

    gateway.delete_note(&id).await.unwrap();
    assert!(gateway.get_note(&id).await.unwrap().is_none());
    assert!(gateway.list_notes().await.unwrap().is_empty());
}

async fn duplicate_resets_flags<G: PersistenceGateway>(gateway: &G) {
    let folder = gateway.create_folder("Work").await.unwrap();
    let id = gateway.create_note("Plan", "body").await.unwrap();
    gateway.set_favorite(&id, true).await.unwrap();
    gateway.set_pinned(&id, true).await.unwrap();
    gateway
        .set_tags(&id, &["a".to_string(), "b".to_string()])
        .await
        .unwrap();
    gateway.set_note_folder(&id, Some(&folder)).await.unwrap();

    let copy_id = gateway.duplicate_note(&id).await.unwrap();
    assert_ne!(copy_id, id);

    let copy = gateway.get_note(&copy_id).await.unwrap().unwrap();
    assert_eq!(copy.title, "Plan (copy)");
    assert_eq!(copy.content, "body");
    assert!(!copy.is_favorite);
    assert!(!copy.is_pinned);
    assert_eq!(copy.tags, vec!["a", "b"]);
    assert_eq!(copy.folder_id, Some(folder));

    let listed = gateway.list_notes().await.unwrap();
    let listed_ids: Vec<&NoteId> = listed.iter().map(|note| &note.id).collect();
    assert_eq!(listed_ids, vec![&id, &copy_id]);
}

async fn folder_delete_unfiles_notes<G: PersistenceGateway>(gateway: &G) {
    let kept = gateway.create_folder("Keep").await.unwrap();
    let doomed = gateway.create_folder("Doomed").await.unwrap();
    let first = gateway.create_note("one", "").await.unwrap();
    let second = gateway.create_note("two", "").await.unwrap();
    gateway.set_note_folder(&first, Some(&doomed)).await.unwrap();
    gateway.set_note_folder(&second, Some(&kept)).await.unwrap();

    gateway.rename_folder(&kept, "Kept").await.unwrap();
    gateway.delete_folder(&doomed).await.unwrap();

    let folders = gateway.list_folders().await.unwrap();
    assert_eq!(folders.len(), 1);
    assert_eq!(folders[0].name, "Kept");

    let first = gateway.get_note(&first).await.unwrap().unwrap();
    let second = gateway.get_note(&second).await.unwrap().unwrap();
    assert!(first.folder_id.is_none());
    assert_eq!(second.folder_id, Some(kept));
}

async fn missing_targets_are_not_found<G: PersistenceGateway>(gateway: &G) {
    let missing = NoteId::new("missing");
    let missing_folder = FolderId::new("missing");

    assert!(matches!(
        gateway.duplicate_note(&missing).await,
        Err(GatewayError::NotFound(EntityRef::Note(_)))
    ));
    assert!(gateway
        .update_note(&missing, "t", "c")
        .await
        .unwrap_err()
        .is_not_found());
    assert!(gateway.delete_note(&missing).await.unwrap_err().is_not_found());
    assert!(gateway
        .set_tags(&missing, &["a".to_string()])
        .await
        .unwrap_err()
        .is_not_found());
    assert!(matches!(
        gateway.delete_folder(&missing_folder).await,
        Err(GatewayError::NotFound(EntityRef::Folder(_)))
    ));
    assert!(gateway
        .rename_folder(&missing_folder, "x")
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn sqlite_gateway_honors_contract() {
    note_lifecycle(&SqliteGateway::open_in_memory().unwrap()).await;
    duplicate_resets_flags(&SqliteGateway::open_in_memory().unwrap()).await;
    folder_delete_unfiles_notes(&SqliteGateway::open_in_memory().unwrap()).await;
    missing_targets_are_not_found(&SqliteGateway::open_in_memory().unwrap()).await;
}

#[tokio::test]
async fn memory_gateway_honors_contract() {
    note_lifecycle(&MemoryGateway::new()).await;
    duplicate_resets_flags(&MemoryGateway::new()).await;
    folder_delete_unfiles_notes(&MemoryGateway::new()).await;
    missing_targets_are_not_found(&MemoryGateway::new()).await;
}

#[tokio::test]
async fn sqlite_gateway_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cloudnote.sqlite3");

    let id = {
        let gateway = SqliteGateway::open(&path).unwrap();
        let id = gateway.create_note("Persisted", "text").await.unwrap();
        gateway
            .set_tags(&id, &["keep".to_string()])
            .await
            .unwrap();
        id
    };

    let reopened = SqliteGateway::open(&path).unwrap();
    let notes = reopened.list_notes().await.unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].id, id);
    assert_eq!(notes[0].title, "Persisted");
    assert_eq!(notes[0].tags, vec!["keep"]);
}

#[test]
fn retryable_errors_are_transient_ones() {
    assert!(GatewayError::Timeout.is_retryable());
    assert!(GatewayError::Unavailable("offline".to_string()).is_retryable());
    assert!(!GatewayError::NotFound(EntityRef::Note(NoteId::new("n"))).is_retryable());
    assert!(!GatewayError::InvalidData("bad flag".to_string()).is_retryable());
}

fn sqlite_failure(code: i32) -> GatewayError {
    GatewayError::from(rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(code),
        None,
    ))
}

#[test]
fn only_lock_contention_db_errors_are_retryable() {
    assert!(sqlite_failure(rusqlite::ffi::SQLITE_BUSY).is_retryable());
    assert!(sqlite_failure(rusqlite::ffi::SQLITE_LOCKED).is_retryable());
    assert!(!sqlite_failure(rusqlite::ffi::SQLITE_CONSTRAINT).is_retryable());
    assert!(!sqlite_failure(rusqlite::ffi::SQLITE_CORRUPT).is_retryable());
    assert_eq!(sqlite_failure(rusqlite::ffi::SQLITE_CONSTRAINT).code(), "db_error");
}
