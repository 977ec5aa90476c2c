//! Sync scheduler: debounced pushes, cancellation, and refresh.

use crate::models::{Note, NoteId};
use crate::services::NoteStoreService;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;

use super::merge::{merge_remote_notes, MergeStats};
use super::transport::NoteTransport;

/// Default quiet period before a scheduled edit is pushed.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(1);

/// Observable sync state, published over a watch channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatus {
    /// Watermark of the last successful remote merge (Unix ms)
    pub last_sync_date: Option<i64>,
    /// Most recent sync failure, cleared by the next success
    pub last_error: Option<String>,
}

/// Per-note scheduling state.
///
/// `generation` identifies the latest scheduled sync for the note; a task
/// whose generation has been superseded aborts instead of pushing stale
/// content. `gate` serializes pushes so at most one request per note is in
/// flight.
struct SyncSlot {
    generation: u64,
    gate: Arc<tokio::sync::Mutex<()>>,
}

/// Schedules and executes note synchronization.
///
/// Edits are pushed after a debounce window; re-scheduling the same note
/// within the window supersedes the earlier push so rapid edits coalesce
/// into one request carrying the latest content.
pub struct SyncService {
    store: NoteStoreService,
    transport: Arc<dyn NoteTransport>,
    debounce: Duration,
    slots: Arc<StdMutex<HashMap<NoteId, SyncSlot>>>,
    status_tx: Arc<watch::Sender<SyncStatus>>,
}

impl Clone for SyncService {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            transport: Arc::clone(&self.transport),
            debounce: self.debounce,
            slots: Arc::clone(&self.slots),
            status_tx: Arc::clone(&self.status_tx),
        }
    }
}

impl SyncService {
    #[must_use]
    pub fn new(store: NoteStoreService, transport: Arc<dyn NoteTransport>) -> Self {
        Self::with_debounce(store, transport, DEFAULT_DEBOUNCE)
    }

    #[must_use]
    pub fn with_debounce(
        store: NoteStoreService,
        transport: Arc<dyn NoteTransport>,
        debounce: Duration,
    ) -> Self {
        let (status_tx, _) = watch::channel(SyncStatus::default());
        Self {
            store,
            transport,
            debounce,
            slots: Arc::new(StdMutex::new(HashMap::new())),
            status_tx: Arc::new(status_tx),
        }
    }

    /// Subscribe to sync status updates.
    #[must_use]
    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.status_tx.subscribe()
    }

    /// Current sync status snapshot.
    #[must_use]
    pub fn current_status(&self) -> SyncStatus {
        self.status_tx.borrow().clone()
    }

    /// Bump the note's generation and return the new value plus its gate.
    fn supersede(&self, id: NoteId) -> (u64, Arc<tokio::sync::Mutex<()>>) {
        let mut slots = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let slot = slots.entry(id).or_insert_with(|| SyncSlot {
            generation: 0,
            gate: Arc::new(tokio::sync::Mutex::new(())),
        });
        slot.generation += 1;
        (slot.generation, Arc::clone(&slot.gate))
    }

    /// Whether `generation` is still the latest scheduled sync for the note.
    fn is_current(&self, id: &NoteId, generation: u64) -> bool {
        let slots = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        slots
            .get(id)
            .is_some_and(|slot| slot.generation == generation)
    }

    /// Drop the note's slot if `generation` is still current.
    fn release_slot(&self, id: &NoteId, generation: u64) {
        let mut slots = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slots
            .get(id)
            .is_some_and(|slot| slot.generation == generation)
        {
            slots.remove(id);
        }
    }

    fn set_error(&self, error: &Error) {
        self.status_tx.send_modify(|status| {
            status.last_error = Some(error.to_string());
        });
    }

    fn clear_error(&self) {
        self.status_tx.send_modify(|status| {
            if status.last_error.is_some() {
                status.last_error = None;
            }
        });
    }

    /// Schedule a debounced push of the note's current content.
    ///
    /// Returns immediately; the push runs after the quiet period unless a
    /// later call for the same note supersedes it.
    pub fn sync(&self, note: &Note) {
        let (generation, gate) = self.supersede(note.id);
        let snapshot = note.clone();
        let service = self.clone();

        tokio::spawn(async move {
            tokio::time::sleep(service.debounce).await;
            if !service.is_current(&snapshot.id, generation) {
                tracing::debug!(note_id = %snapshot.id, "Debounced push superseded");
                return;
            }
            if let Err(error) = service.push_snapshot(&snapshot, generation, &gate).await {
                tracing::warn!(note_id = %snapshot.id, %error, "Scheduled push failed");
            }
        });
    }

    /// Push the note now, skipping the debounce window.
    ///
    /// Supersedes any pending debounced push for the same note.
    pub async fn sync_immediately(&self, note: &Note) -> Result<()> {
        let (generation, gate) = self.supersede(note.id);
        self.push_snapshot(note, generation, &gate).await
    }

    /// Push one snapshot through the per-note gate.
    ///
    /// A cancellation observed after the network call completed is honored
    /// as a success: the server already has the content, so the local note
    /// is still marked synced.
    async fn push_snapshot(
        &self,
        snapshot: &Note,
        generation: u64,
        gate: &tokio::sync::Mutex<()>,
    ) -> Result<()> {
        let _guard = gate.lock().await;

        // Re-check after waiting for the gate: a newer sync may have been
        // scheduled while an earlier push held it.
        if !self.is_current(&snapshot.id, generation) {
            tracing::debug!(note_id = %snapshot.id, "Push superseded before send");
            return Ok(());
        }

        let result = self.transport.push(snapshot).await;
        let cancelled = !self.is_current(&snapshot.id, generation);

        match result {
            Ok(remote) => {
                let marked = self
                    .store
                    .mark_synced(&snapshot.id, &remote.id, snapshot.updated_at)
                    .await?;
                self.release_slot(&snapshot.id, generation);
                if marked {
                    self.clear_error();
                    tracing::debug!(note_id = %snapshot.id, remote_id = %remote.id, "Pushed note");
                } else {
                    // Edited while the push was in flight; the note stays
                    // dirty and the newer edit's own sync will pick it up.
                    tracing::debug!(note_id = %snapshot.id, "Note changed during push");
                }
                Ok(())
            }
            Err(error) if cancelled => {
                tracing::debug!(note_id = %snapshot.id, %error, "Cancelled push failed; ignoring");
                Ok(())
            }
            Err(error) => {
                self.set_error(&error);
                self.release_slot(&snapshot.id, generation);
                Err(error)
            }
        }
    }

    /// Cancel every pending debounced push without waiting for them.
    ///
    /// Pushes already past the network call still record their result.
    pub fn cancel_pending_sync(&self) {
        let mut slots = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for slot in slots.values_mut() {
            slot.generation += 1;
        }
    }

    /// Push every note with pending local edits, oldest edit first.
    ///
    /// Transient failures skip to the next note; anything else aborts.
    pub async fn sync_pending_notes(&self, account_id: &str) -> Result<usize> {
        let pending = self.store.unsynced_notes(account_id).await?;
        let mut pushed = 0;

        for note in &pending {
            match self.sync_immediately(note).await {
                Ok(()) => pushed += 1,
                Err(error) if error.is_transient() => {
                    tracing::warn!(note_id = %note.id, %error, "Skipping note after transient push failure");
                }
                Err(error) => return Err(error),
            }
        }

        Ok(pushed)
    }

    /// Fetch remote changes since the stored watermark.
    pub async fn fetch_remote_changes(
        &self,
        account_id: &str,
    ) -> Result<Vec<crate::models::RemoteNote>> {
        let since = self.store.load_watermark(account_id).await?.unwrap_or(0);
        self.transport.fetch_changes_since(since, account_id).await
    }

    /// Merge a batch of remote records and publish the new watermark.
    pub async fn merge_remote_notes(
        &self,
        account_id: &str,
        records: &[crate::models::RemoteNote],
    ) -> Result<MergeStats> {
        let stats = merge_remote_notes(&self.store, account_id, records).await?;

        let watermark = self.store.load_watermark(account_id).await?;
        self.status_tx.send_modify(|status| {
            status.last_sync_date = watermark;
            status.last_error = None;
        });
        Ok(stats)
    }

    /// Pull and merge remote changes in one step.
    pub async fn refresh(&self, account_id: &str) -> Result<MergeStats> {
        let result = async {
            let records = self.fetch_remote_changes(account_id).await?;
            self.merge_remote_notes(account_id, &records).await
        }
        .await;

        if let Err(error) = &result {
            self.set_error(error);
        }
        result
    }

    /// Delete a note locally, then best-effort delete it on the backend.
    ///
    /// Local deletion never waits on the network; a failed remote delete is
    /// retried implicitly because the server treats repeat deletes of the
    /// same note as success.
    pub async fn delete(&self, note: &Note) -> Result<()> {
        // Invalidate any in-flight or pending push for this note first.
        self.supersede(note.id);
        self.store.delete_note(&note.id).await?;

        if let Some(remote_id) = note.remote_id.clone() {
            let transport = Arc::clone(&self.transport);
            let id = note.id;
            tokio::spawn(async move {
                if let Err(error) = transport.delete_remote(&remote_id).await {
                    tracing::warn!(note_id = %id, %error, "Remote delete failed");
                }
            });
        }
        Ok(())
    }
}
