//! SQLite-backed persistence gateway.
//!
//! # Responsibility
//! - Persist notes, folders and ordered tag lists in the local database.
//! - Keep SQL details behind the `PersistenceGateway` contract.
//!
//! # Invariants
//! - Tag replacement and folder delete + unfile cascade each run inside one
//!   immediate transaction.
//! - `list_notes`/`list_folders` return rows in insertion order.
//! - Writes targeting a missing row return `GatewayError::NotFound`.

use crate::db::{open_db, open_db_in_memory};
use crate::gateway::{duplicate_title, EntityRef, GatewayError, GatewayResult, PersistenceGateway};
use crate::model::folder::{Folder, FolderId, FolderRecord};
use crate::model::note::{NoteId, NoteRecord};
use crate::model::now_epoch_ms;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

const NOTE_SELECT_SQL: &str = "SELECT
    id,
    title,
    content,
    last_edit_time,
    is_favorite,
    is_pinned,
    folder_id
FROM notes";

/// Durable gateway over one SQLite connection.
///
/// Calls complete synchronously inside the returned futures; the connection
/// lock is never held across an await point.
pub struct SqliteGateway {
    conn: Mutex<Connection>,
}

impl SqliteGateway {
    /// Wraps an already migrated connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Opens (and migrates) a database file.
    pub fn open(path: impl AsRef<Path>) -> GatewayResult<Self> {
        Ok(Self::new(open_db(path)?))
    }

    /// Opens a fresh in-memory database.
    pub fn open_in_memory() -> GatewayResult<Self> {
        Ok(Self::new(open_db_in_memory()?))
    }

    fn lock(&self) -> GatewayResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| GatewayError::Unavailable("sqlite connection lock poisoned".to_string()))
    }
}

#[async_trait]
impl PersistenceGateway for SqliteGateway {
    async fn list_notes(&self) -> GatewayResult<Vec<NoteRecord>> {
        let conn = self.lock()?;
        let mut tags_by_note = load_all_tags(&conn)?;
        let mut stmt = conn.prepare(&format!("{NOTE_SELECT_SQL} ORDER BY rowid ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut notes = Vec::new();
        while let Some(row) = rows.next()? {
            let mut note = parse_note_row(row)?;
            note.tags = tags_by_note.remove(note.id.as_str()).unwrap_or_default();
            notes.push(note);
        }
        Ok(notes)
    }

    async fn get_note(&self, id: &NoteId) -> GatewayResult<Option<NoteRecord>> {
        let conn = self.lock()?;
        load_note(&conn, id)
    }

    async fn create_note(&self, title: &str, content: &str) -> GatewayResult<NoteId> {
        let conn = self.lock()?;
        let id = NoteId::new(Uuid::new_v4().to_string());
        conn.execute(
            "INSERT INTO notes (id, title, content, last_edit_time, is_favorite, is_pinned)
             VALUES (?1, ?2, ?3, ?4, 0, 0);",
            params![id.as_str(), title, content, now_epoch_ms()],
        )?;
        Ok(id)
    }

    async fn delete_note(&self, id: &NoteId) -> GatewayResult<()> {
        let conn = self.lock()?;
        let changed = conn.execute("DELETE FROM notes WHERE id = ?1;", [id.as_str()])?;
        ensure_note_changed(changed, id)
    }

    async fn update_note(&self, id: &NoteId, title: &str, content: &str) -> GatewayResult<()> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE notes
             SET title = ?2, content = ?3, last_edit_time = ?4
             WHERE id = ?1;",
            params![id.as_str(), title, content, now_epoch_ms()],
        )?;
        ensure_note_changed(changed, id)
    }

    async fn set_favorite(&self, id: &NoteId, value: bool) -> GatewayResult<()> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE notes SET is_favorite = ?2 WHERE id = ?1;",
            params![id.as_str(), bool_to_int(value)],
        )?;
        ensure_note_changed(changed, id)
    }

    async fn set_pinned(&self, id: &NoteId, value: bool) -> GatewayResult<()> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE notes SET is_pinned = ?2 WHERE id = ?1;",
            params![id.as_str(), bool_to_int(value)],
        )?;
        ensure_note_changed(changed, id)
    }

    async fn set_tags(&self, id: &NoteId, tags: &[String]) -> GatewayResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if !note_exists(&tx, id)? {
            return Err(GatewayError::NotFound(EntityRef::Note(id.clone())));
        }
        replace_tags(&tx, id, tags)?;
        tx.commit()?;
        Ok(())
    }

    async fn set_note_folder(
        &self,
        id: &NoteId,
        folder_id: Option<&FolderId>,
    ) -> GatewayResult<()> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE notes SET folder_id = ?2 WHERE id = ?1;",
            params![id.as_str(), folder_id.map(FolderId::as_str)],
        )?;
        ensure_note_changed(changed, id)
    }

    async fn duplicate_note(&self, id: &NoteId) -> GatewayResult<NoteId> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let original = load_note(&tx, id)?
            .ok_or_else(|| GatewayError::NotFound(EntityRef::Note(id.clone())))?;

        let copy_id = NoteId::new(Uuid::new_v4().to_string());
        // The copy stays in the source's folder instead of landing unfiled.
        tx.execute(
            "INSERT INTO notes (
                id, title, content, last_edit_time, is_favorite, is_pinned, folder_id
             ) VALUES (?1, ?2, ?3, ?4, 0, 0, ?5);",
            params![
                copy_id.as_str(),
                duplicate_title(&original.title),
                original.content,
                now_epoch_ms(),
                original.folder_id.as_ref().map(FolderId::as_str),
            ],
        )?;
        replace_tags(&tx, &copy_id, &original.tags)?;
        tx.commit()?;
        Ok(copy_id)
    }

    async fn list_folders(&self) -> GatewayResult<Vec<FolderRecord>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT id, name, created_time FROM folders ORDER BY rowid ASC;")?;
        let mut rows = stmt.query([])?;
        let mut folders = Vec::new();
        while let Some(row) = rows.next()? {
            folders.push(Folder::new(
                FolderId::new(row.get::<_, String>("id")?),
                row.get::<_, String>("name")?,
                row.get("created_time")?,
            ));
        }
        Ok(folders)
    }

    async fn create_folder(&self, name: &str) -> GatewayResult<FolderId> {
        let conn = self.lock()?;
        let id = FolderId::new(Uuid::new_v4().to_string());
        conn.execute(
            "INSERT INTO folders (id, name, created_time) VALUES (?1, ?2, ?3);",
            params![id.as_str(), name, now_epoch_ms()],
        )?;
        Ok(id)
    }

    async fn delete_folder(&self, id: &FolderId) -> GatewayResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = tx.execute("DELETE FROM folders WHERE id = ?1;", [id.as_str()])?;
        if changed == 0 {
            return Err(GatewayError::NotFound(EntityRef::Folder(id.clone())));
        }
        tx.execute(
            "UPDATE notes SET folder_id = NULL WHERE folder_id = ?1;",
            [id.as_str()],
        )?;
        tx.commit()?;
        Ok(())
    }

    async fn rename_folder(&self, id: &FolderId, name: &str) -> GatewayResult<()> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE folders SET name = ?2 WHERE id = ?1;",
            params![id.as_str(), name],
        )?;
        if changed == 0 {
            return Err(GatewayError::NotFound(EntityRef::Folder(id.clone())));
        }
        Ok(())
    }
}

fn load_note(conn: &Connection, id: &NoteId) -> GatewayResult<Option<NoteRecord>> {
    let note = conn
        .query_row(
            &format!("{NOTE_SELECT_SQL} WHERE id = ?1;"),
            [id.as_str()],
            |row| Ok(parse_note_row(row)),
        )
        .optional()?
        .transpose()?;

    match note {
        Some(mut note) => {
            note.tags = load_tags_for_note(conn, id)?;
            Ok(Some(note))
        }
        None => Ok(None),
    }
}

fn parse_note_row(row: &Row<'_>) -> GatewayResult<NoteRecord> {
    Ok(NoteRecord {
        id: NoteId::new(row.get::<_, String>("id")?),
        title: row.get("title")?,
        content: row.get("content")?,
        last_edit_time: row.get("last_edit_time")?,
        is_favorite: parse_flag(row, "is_favorite")?,
        is_pinned: parse_flag(row, "is_pinned")?,
        tags: Vec::new(),
        folder_id: row
            .get::<_, Option<String>>("folder_id")?
            .map(FolderId::new),
    })
}

fn parse_flag(row: &Row<'_>, column: &str) -> GatewayResult<bool> {
    match row.get::<_, i64>(column)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(GatewayError::InvalidData(format!(
            "invalid {column} value `{other}` in notes.{column}"
        ))),
    }
}

fn load_tags_for_note(conn: &Connection, id: &NoteId) -> GatewayResult<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT tag FROM note_tags WHERE note_id = ?1 ORDER BY position ASC;")?;
    let mut rows = stmt.query([id.as_str()])?;
    let mut tags = Vec::new();
    while let Some(row) = rows.next()? {
        tags.push(row.get(0)?);
    }
    Ok(tags)
}

fn load_all_tags(conn: &Connection) -> GatewayResult<HashMap<String, Vec<String>>> {
    let mut stmt =
        conn.prepare("SELECT note_id, tag FROM note_tags ORDER BY note_id ASC, position ASC;")?;
    let mut rows = stmt.query([])?;
    let mut tags: HashMap<String, Vec<String>> = HashMap::new();
    while let Some(row) = rows.next()? {
        let note_id: String = row.get(0)?;
        tags.entry(note_id).or_default().push(row.get(1)?);
    }
    Ok(tags)
}

fn replace_tags(tx: &Transaction<'_>, id: &NoteId, tags: &[String]) -> GatewayResult<()> {
    tx.execute("DELETE FROM note_tags WHERE note_id = ?1;", [id.as_str()])?;
    let mut position: i64 = 0;
    for tag in tags {
        // Duplicate tags are dropped by the UNIQUE(note_id, tag) constraint.
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO note_tags (note_id, position, tag) VALUES (?1, ?2, ?3);",
            params![id.as_str(), position, tag],
        )?;
        position += inserted as i64;
    }
    Ok(())
}

fn note_exists(conn: &Connection, id: &NoteId) -> GatewayResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM notes WHERE id = ?1);",
        [id.as_str()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn ensure_note_changed(changed: usize, id: &NoteId) -> GatewayResult<()> {
    if changed == 0 {
        return Err(GatewayError::NotFound(EntityRef::Note(id.clone())));
    }
    Ok(())
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
