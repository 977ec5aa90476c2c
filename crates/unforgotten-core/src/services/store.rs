//! Shared note-store service wrapper used across clients.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{Database, MergePlan, NoteStore, SqliteNoteStore};
use crate::models::{Note, NoteId, SyncConflict};
use crate::Result;

/// Thread-safe service for local note store operations.
///
/// The store's write path serializes through the inner mutex; the sync
/// engine treats it as an external collaborator and never holds the lock
/// across a network call.
#[derive(Clone)]
pub struct NoteStoreService {
    db: Arc<Mutex<Database>>,
}

impl NoteStoreService {
    /// Open a store at the given filesystem path.
    pub fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|error| crate::Error::InvalidInput(error.to_string()))?;
        }

        let db = Database::open(&db_path)?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    /// Persist a new note.
    pub async fn insert_note(&self, note: &Note) -> Result<()> {
        let db = self.db.lock().await;
        SqliteNoteStore::new(db.connection()).insert(note)
    }

    /// Fetch a note by local id.
    pub async fn get_note(&self, id: &NoteId) -> Result<Option<Note>> {
        let db = self.db.lock().await;
        SqliteNoteStore::new(db.connection()).get(id)
    }

    /// Fetch a note by its server-assigned id.
    pub async fn get_note_by_remote_id(&self, remote_id: &str) -> Result<Option<Note>> {
        let db = self.db.lock().await;
        SqliteNoteStore::new(db.connection()).get_by_remote_id(remote_id)
    }

    /// List an account's notes, pinned first, then newest first.
    pub async fn list_notes(
        &self,
        account_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Note>> {
        let db = self.db.lock().await;
        SqliteNoteStore::new(db.connection()).list(account_id, limit, offset)
    }

    /// List notes with pending local edits.
    pub async fn unsynced_notes(&self, account_id: &str) -> Result<Vec<Note>> {
        let db = self.db.lock().await;
        SqliteNoteStore::new(db.connection()).unsynced(account_id)
    }

    /// Overwrite a stored note.
    pub async fn update_note(&self, note: &Note) -> Result<()> {
        let db = self.db.lock().await;
        SqliteNoteStore::new(db.connection()).update(note)
    }

    /// Remove a note from the local store.
    pub async fn delete_note(&self, id: &NoteId) -> Result<()> {
        let db = self.db.lock().await;
        SqliteNoteStore::new(db.connection()).delete(id)
    }

    /// Record a successful push, guarded by the pushed snapshot's timestamp.
    pub async fn mark_synced(
        &self,
        id: &NoteId,
        remote_id: &str,
        pushed_updated_at: i64,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        SqliteNoteStore::new(db.connection()).mark_synced(id, remote_id, pushed_updated_at)
    }

    /// Apply a merge plan atomically. Returns how many planned updates were
    /// skipped because a local edit landed after planning.
    pub async fn apply_merge(&self, plan: &MergePlan) -> Result<usize> {
        let db = self.db.lock().await;
        SqliteNoteStore::new(db.connection()).apply_merge(plan)
    }

    /// Read the account's `last_sync_date` watermark.
    pub async fn load_watermark(&self, account_id: &str) -> Result<Option<i64>> {
        let db = self.db.lock().await;
        SqliteNoteStore::new(db.connection()).load_watermark(account_id)
    }

    /// List recently resolved sync conflicts.
    pub async fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let db = self.db.lock().await;
        SqliteNoteStore::new(db.connection()).list_conflicts(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RichText;

    #[tokio::test(flavor = "multi_thread")]
    async fn in_memory_insert_and_list_roundtrip() {
        let service = NoteStoreService::open_in_memory().unwrap();

        let note = Note::new("Groceries", RichText::plain("milk"), "family-1");
        service.insert_note(&note).await.unwrap();

        let notes = service.list_notes("family-1", 10, 0).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].title, "Groceries");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn open_path_creates_parent_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("nested").join("unforgotten.db");

        let service = NoteStoreService::open_path(&db_path).unwrap();
        service
            .insert_note(&Note::new("A", RichText::plain("a"), "family-1"))
            .await
            .unwrap();

        assert!(db_path.exists());
    }
}
