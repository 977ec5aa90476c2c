//! Note store implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use crate::error::{Error, Result};
use crate::models::{Note, NoteId, SyncConflict};
use rusqlite::{params, Connection};
use std::str::FromStr;

/// One local-store mutation produced by the merge engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOp {
    /// Insert a note the device has never seen
    Insert(Note),
    /// Overwrite an existing note's content from remote
    Update(Note),
    /// Remove a note whose remote record was soft-deleted
    Delete(NoteId),
    /// Log a discarded remote edit (pending local edit won)
    RecordConflict {
        note_id: NoteId,
        local_updated_at: i64,
        remote_updated_at: i64,
    },
}

/// A batch of merge mutations plus the watermark they justify.
///
/// Applied transactionally: either every op lands and the watermark
/// advances, or nothing does, so a failed merge can be retried over the
/// same window.
#[derive(Debug, Clone, Default)]
pub struct MergePlan {
    pub account_id: String,
    pub ops: Vec<MergeOp>,
    /// New `last_sync_date` (Unix ms); `None` leaves the watermark untouched
    pub watermark: Option<i64>,
}

impl MergePlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty() && self.watermark.is_none()
    }
}

/// Trait for local note storage operations
pub trait NoteStore {
    /// Persist a new note
    fn insert(&self, note: &Note) -> Result<()>;

    /// Get a note by local ID
    fn get(&self, id: &NoteId) -> Result<Option<Note>>;

    /// Get a note by its server-assigned ID
    fn get_by_remote_id(&self, remote_id: &str) -> Result<Option<Note>>;

    /// List an account's notes, pinned first, then newest first
    fn list(&self, account_id: &str, limit: usize, offset: usize) -> Result<Vec<Note>>;

    /// List notes with pending local edits, oldest edit first
    fn unsynced(&self, account_id: &str) -> Result<Vec<Note>>;

    /// Overwrite a stored note
    fn update(&self, note: &Note) -> Result<()>;

    /// Remove a note from the local store
    fn delete(&self, id: &NoteId) -> Result<()>;

    /// Record a successful push: set `remote_id` and `is_synced`.
    ///
    /// Guarded by `pushed_updated_at` so a note edited while the push was in
    /// flight stays dirty. Returns whether the guard matched.
    fn mark_synced(&self, id: &NoteId, remote_id: &str, pushed_updated_at: i64) -> Result<bool>;

    /// Apply a merge plan atomically, advancing the watermark with it.
    ///
    /// Update ops only land on rows still marked synced; a local edit that
    /// arrived after planning keeps its state. Returns how many updates
    /// were skipped that way.
    fn apply_merge(&self, plan: &MergePlan) -> Result<usize>;

    /// Read the account's `last_sync_date` watermark
    fn load_watermark(&self, account_id: &str) -> Result<Option<i64>>;

    /// List recently resolved sync conflicts, newest first
    fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>>;
}

/// `SQLite` implementation of `NoteStore`
pub struct SqliteNoteStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteNoteStore<'a> {
    /// Create a new store with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a note from a database row
    fn parse_note(row: &rusqlite::Row<'_>) -> rusqlite::Result<Note> {
        let id: String = row.get(0)?;
        let id = id.parse().map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(error),
            )
        })?;
        let content_json: String = row.get(3)?;
        let content = serde_json::from_str(&content_json).map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                Box::new(error),
            )
        })?;
        let theme: String = row.get(5)?;

        Ok(Note {
            id,
            remote_id: row.get(1)?,
            title: row.get(2)?,
            content,
            plain_text: row.get(4)?,
            theme: FromStr::from_str(&theme).unwrap_or_default(),
            is_pinned: row.get::<_, i32>(6)? != 0,
            is_synced: row.get::<_, i32>(7)? != 0,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
            account_id: row.get(10)?,
        })
    }

    fn content_json(note: &Note) -> Result<String> {
        Ok(serde_json::to_string(note.content())?)
    }

    fn insert_with(conn: &Connection, note: &Note) -> Result<()> {
        conn.execute(
            "INSERT INTO notes (id, remote_id, title, content, plain_text, theme,
                                is_pinned, is_synced, created_at, updated_at, account_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                note.id.as_str(),
                note.remote_id,
                note.title,
                Self::content_json(note)?,
                note.plain_text(),
                note.theme.as_str(),
                i32::from(note.is_pinned),
                i32::from(note.is_synced),
                note.created_at,
                note.updated_at,
                note.account_id,
            ],
        )?;
        Ok(())
    }

    fn update_with(conn: &Connection, note: &Note) -> Result<()> {
        let rows = conn.execute(
            "UPDATE notes
             SET remote_id = ?, title = ?, content = ?, plain_text = ?, theme = ?,
                 is_pinned = ?, is_synced = ?, updated_at = ?
             WHERE id = ?",
            params![
                note.remote_id,
                note.title,
                Self::content_json(note)?,
                note.plain_text(),
                note.theme.as_str(),
                i32::from(note.is_pinned),
                i32::from(note.is_synced),
                note.updated_at,
                note.id.as_str(),
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(note.id.to_string()));
        }
        Ok(())
    }

    /// Merge-path variant of `update_with`: only touches rows still marked
    /// synced, so a local edit landing between planning and application is
    /// never overwritten. Returns whether the row matched.
    fn merge_update_with(conn: &Connection, note: &Note) -> Result<bool> {
        let rows = conn.execute(
            "UPDATE notes
             SET remote_id = ?, title = ?, content = ?, plain_text = ?, theme = ?,
                 is_pinned = ?, is_synced = ?, updated_at = ?
             WHERE id = ? AND is_synced = 1",
            params![
                note.remote_id,
                note.title,
                Self::content_json(note)?,
                note.plain_text(),
                note.theme.as_str(),
                i32::from(note.is_pinned),
                i32::from(note.is_synced),
                note.updated_at,
                note.id.as_str(),
            ],
        )?;

        Ok(rows > 0)
    }

    fn delete_with(conn: &Connection, id: &NoteId) -> Result<()> {
        let rows = conn.execute("DELETE FROM notes WHERE id = ?", params![id.as_str()])?;
        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn record_conflict_with(
        conn: &Connection,
        note_id: &NoteId,
        local_updated_at: i64,
        remote_updated_at: i64,
    ) -> Result<()> {
        conn.execute(
            "INSERT INTO sync_conflicts (note_id, local_updated_at, remote_updated_at,
                                         resolved_at, strategy)
             VALUES (?, ?, ?, ?, ?)",
            params![
                note_id.as_str(),
                local_updated_at,
                remote_updated_at,
                crate::util::unix_millis_now(),
                SyncConflict::LOCAL_PENDING_WINS,
            ],
        )?;
        Ok(())
    }

    fn save_watermark_with(conn: &Connection, account_id: &str, watermark: i64) -> Result<()> {
        conn.execute(
            "INSERT INTO sync_meta (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![watermark_key(account_id), watermark.to_string()],
        )?;
        Ok(())
    }
}

fn watermark_key(account_id: &str) -> String {
    format!("last_sync_date:{account_id}")
}

impl NoteStore for SqliteNoteStore<'_> {
    fn insert(&self, note: &Note) -> Result<()> {
        Self::insert_with(self.conn, note)
    }

    fn get(&self, id: &NoteId) -> Result<Option<Note>> {
        let result = self.conn.query_row(
            "SELECT id, remote_id, title, content, plain_text, theme, is_pinned,
                    is_synced, created_at, updated_at, account_id
             FROM notes WHERE id = ?",
            params![id.as_str()],
            Self::parse_note,
        );

        match result {
            Ok(note) => Ok(Some(note)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn get_by_remote_id(&self, remote_id: &str) -> Result<Option<Note>> {
        let result = self.conn.query_row(
            "SELECT id, remote_id, title, content, plain_text, theme, is_pinned,
                    is_synced, created_at, updated_at, account_id
             FROM notes WHERE remote_id = ?",
            params![remote_id],
            Self::parse_note,
        );

        match result {
            Ok(note) => Ok(Some(note)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, account_id: &str, limit: usize, offset: usize) -> Result<Vec<Note>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, remote_id, title, content, plain_text, theme, is_pinned,
                    is_synced, created_at, updated_at, account_id
             FROM notes
             WHERE account_id = ?
             ORDER BY is_pinned DESC, updated_at DESC
             LIMIT ? OFFSET ?",
        )?;

        let notes = stmt
            .query_map(
                params![account_id, limit as i64, offset as i64],
                Self::parse_note,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(notes)
    }

    fn unsynced(&self, account_id: &str) -> Result<Vec<Note>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, remote_id, title, content, plain_text, theme, is_pinned,
                    is_synced, created_at, updated_at, account_id
             FROM notes
             WHERE account_id = ? AND is_synced = 0
             ORDER BY updated_at ASC",
        )?;

        let notes = stmt
            .query_map(params![account_id], Self::parse_note)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(notes)
    }

    fn update(&self, note: &Note) -> Result<()> {
        Self::update_with(self.conn, note)
    }

    fn delete(&self, id: &NoteId) -> Result<()> {
        Self::delete_with(self.conn, id)
    }

    fn mark_synced(&self, id: &NoteId, remote_id: &str, pushed_updated_at: i64) -> Result<bool> {
        // The updated_at guard keeps a note dirty when an edit landed while
        // the push was in flight.
        let rows = self.conn.execute(
            "UPDATE notes SET remote_id = ?, is_synced = 1
             WHERE id = ? AND updated_at = ?",
            params![remote_id, id.as_str(), pushed_updated_at],
        )?;

        Ok(rows > 0)
    }

    fn apply_merge(&self, plan: &MergePlan) -> Result<usize> {
        if plan.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.unchecked_transaction()?;
        let mut skipped_updates = 0;

        for op in &plan.ops {
            match op {
                MergeOp::Insert(note) => Self::insert_with(&tx, note)?,
                MergeOp::Update(note) => {
                    if !Self::merge_update_with(&tx, note)? {
                        tracing::debug!(note_id = %note.id, "Note edited since planning; keeping local state");
                        skipped_updates += 1;
                    }
                }
                MergeOp::Delete(id) => Self::delete_with(&tx, id)?,
                MergeOp::RecordConflict {
                    note_id,
                    local_updated_at,
                    remote_updated_at,
                } => Self::record_conflict_with(&tx, note_id, *local_updated_at, *remote_updated_at)?,
            }
        }

        if let Some(watermark) = plan.watermark {
            Self::save_watermark_with(&tx, &plan.account_id, watermark)?;
        }

        tx.commit()?;
        Ok(skipped_updates)
    }

    fn load_watermark(&self, account_id: &str) -> Result<Option<i64>> {
        let result = self.conn.query_row(
            "SELECT value FROM sync_meta WHERE key = ?",
            params![watermark_key(account_id)],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(value.parse().ok()),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, note_id, local_updated_at, remote_updated_at, resolved_at, strategy
             FROM sync_conflicts
             ORDER BY resolved_at DESC
             LIMIT ?",
        )?;

        let conflicts = stmt
            .query_map(params![limit as i64], |row| {
                Ok(SyncConflict {
                    id: row.get(0)?,
                    note_id: row.get(1)?,
                    local_updated_at: row.get(2)?,
                    remote_updated_at: row.get(3)?,
                    resolved_at: row.get(4)?,
                    strategy: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(conflicts)
    }
}
