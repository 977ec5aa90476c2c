//! Merge engine: applies batches of remote changes to the local store.

use crate::db::{MergeOp, MergePlan};
use crate::models::{Note, RemoteNote};
use crate::services::NoteStoreService;
use crate::Result;

use super::policy::{resolve, MergeAction};

/// Outcome counters for one merged batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Records discarded because a local edit is pending
    pub kept_local: usize,
    pub ignored: usize,
}

impl MergeStats {
    /// Whether the batch changed the local store at all.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.inserted == 0 && self.updated == 0 && self.deleted == 0
    }
}

/// Plan the local mutations for a batch of remote records.
///
/// Each record's fate is decided independently, so batch order does not
/// matter and re-planning the same batch against the resulting state
/// yields an empty plan. The plan's watermark is the newest server
/// timestamp in the batch; an empty batch leaves the watermark untouched.
pub async fn plan_merge(
    store: &NoteStoreService,
    account_id: &str,
    records: &[RemoteNote],
) -> Result<(MergePlan, MergeStats)> {
    let mut plan = MergePlan {
        account_id: account_id.to_string(),
        ..MergePlan::default()
    };
    let mut stats = MergeStats::default();

    for record in records {
        if record.account_id != account_id {
            tracing::warn!(
                remote_id = %record.id,
                "Skipping remote record for a different account"
            );
            stats.ignored += 1;
            continue;
        }

        let local = store.get_note_by_remote_id(&record.id).await?;
        match resolve(local.as_ref(), record) {
            MergeAction::InsertLocal => {
                plan.ops.push(MergeOp::Insert(Note::from_remote(record)));
                stats.inserted += 1;
            }
            MergeAction::OverwriteLocal => {
                // resolve() only returns OverwriteLocal for an existing note
                if let Some(mut note) = local {
                    note.apply_remote(record);
                    plan.ops.push(MergeOp::Update(note));
                    stats.updated += 1;
                }
            }
            MergeAction::DeleteLocal => {
                if let Some(note) = local {
                    plan.ops.push(MergeOp::Delete(note.id));
                    stats.deleted += 1;
                }
            }
            MergeAction::KeepLocal { remote_newer } => {
                if remote_newer {
                    if let Some(note) = local {
                        plan.ops.push(MergeOp::RecordConflict {
                            note_id: note.id,
                            local_updated_at: note.updated_at,
                            remote_updated_at: record.updated_at,
                        });
                    }
                }
                stats.kept_local += 1;
            }
            MergeAction::Ignore => stats.ignored += 1,
        }
    }

    plan.watermark = records.iter().map(|record| record.updated_at).max();
    Ok((plan, stats))
}

/// Apply a batch of remote records to the local store.
///
/// Transactional: all mutations and the watermark advance commit together
/// or not at all, so a failed merge leaves `last_sync_date` unchanged and
/// the whole batch can be retried. Safe to call with an empty batch.
pub async fn merge_remote_notes(
    store: &NoteStoreService,
    account_id: &str,
    records: &[RemoteNote],
) -> Result<MergeStats> {
    let (plan, mut stats) = plan_merge(store, account_id, records).await?;

    // Updates skipped inside the transaction mean a local edit won the race
    // between planning and application; grade them kept, not applied.
    let skipped = store.apply_merge(&plan).await?;
    stats.updated -= skipped;
    stats.kept_local += skipped;

    tracing::debug!(
        inserted = stats.inserted,
        updated = stats.updated,
        deleted = stats.deleted,
        kept_local = stats.kept_local,
        ignored = stats.ignored,
        "Merged remote changes"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NoteTheme, RichText};
    use pretty_assertions::assert_eq;

    const ACCOUNT: &str = "family-1";

    fn remote(id: &str, title: &str, updated_at: i64) -> RemoteNote {
        RemoteNote {
            id: id.to_string(),
            account_id: ACCOUNT.to_string(),
            title: title.to_string(),
            content: RichText::plain("body"),
            theme: NoteTheme::Plain,
            is_pinned: false,
            updated_at,
            deleted_at: None,
        }
    }

    async fn store() -> NoteStoreService {
        NoteStoreService::open_in_memory().unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn merge_inserts_new_remote_notes() {
        let store = store().await;
        let records = vec![remote("srv-1", "Groceries", 100)];

        let stats = merge_remote_notes(&store, ACCOUNT, &records).await.unwrap();
        assert_eq!(stats.inserted, 1);

        let note = store.get_note_by_remote_id("srv-1").await.unwrap().unwrap();
        assert!(note.is_synced);
        assert_eq!(note.title, "Groceries");
        assert_eq!(store.load_watermark(ACCOUNT).await.unwrap(), Some(100));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn merge_is_idempotent() {
        let store = store().await;
        let records = vec![
            remote("srv-1", "Groceries", 100),
            remote("srv-2", "Trip", 200),
        ];

        merge_remote_notes(&store, ACCOUNT, &records).await.unwrap();
        let before = store.list_notes(ACCOUNT, 10, 0).await.unwrap();

        let stats = merge_remote_notes(&store, ACCOUNT, &records).await.unwrap();
        assert!(stats.is_noop());
        assert_eq!(store.list_notes(ACCOUNT, 10, 0).await.unwrap(), before);
        assert_eq!(store.load_watermark(ACCOUNT).await.unwrap(), Some(200));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn merge_overwrites_clean_local_note() {
        let store = store().await;
        merge_remote_notes(&store, ACCOUNT, &[remote("srv-1", "Groceries", 100)])
            .await
            .unwrap();

        let mut changed = remote("srv-1", "Groceries v2", 200);
        changed.is_pinned = true;
        let stats = merge_remote_notes(&store, ACCOUNT, &[changed]).await.unwrap();
        assert_eq!(stats.updated, 1);

        let note = store.get_note_by_remote_id("srv-1").await.unwrap().unwrap();
        assert_eq!(note.title, "Groceries v2");
        assert!(note.is_pinned);
        assert!(note.is_synced);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn merge_keeps_pending_local_edit_and_logs_conflict() {
        let store = store().await;
        merge_remote_notes(&store, ACCOUNT, &[remote("srv-1", "Groceries", 100)])
            .await
            .unwrap();

        let mut note = store.get_note_by_remote_id("srv-1").await.unwrap().unwrap();
        note.title = "Groceries (mine)".to_string();
        note.mark_as_modified();
        store.update_note(&note).await.unwrap();

        // Concurrent remote edit with a newer server timestamp.
        let newer = remote("srv-1", "Groceries (theirs)", note.updated_at + 1_000);
        let stats = merge_remote_notes(&store, ACCOUNT, &[newer]).await.unwrap();
        assert_eq!(stats.kept_local, 1);

        let unchanged = store.get_note_by_remote_id("srv-1").await.unwrap().unwrap();
        assert_eq!(unchanged.title, "Groceries (mine)");
        assert!(!unchanged.is_synced);

        let conflicts = store.list_conflicts(10).await.unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].note_id, note.id.as_str());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn merge_keeps_edit_landing_between_plan_and_apply() {
        let store = store().await;
        merge_remote_notes(&store, ACCOUNT, &[remote("srv-1", "Groceries", 100)])
            .await
            .unwrap();

        let (plan, stats) = plan_merge(&store, ACCOUNT, &[remote("srv-1", "Groceries v2", 200)])
            .await
            .unwrap();
        assert_eq!(stats.updated, 1);

        // A local edit lands after the plan was computed.
        let mut note = store.get_note_by_remote_id("srv-1").await.unwrap().unwrap();
        note.title = "Groceries (mine)".to_string();
        note.mark_as_modified();
        store.update_note(&note).await.unwrap();

        let skipped = store.apply_merge(&plan).await.unwrap();
        assert_eq!(skipped, 1);

        let kept = store.get_note_by_remote_id("srv-1").await.unwrap().unwrap();
        assert_eq!(kept.title, "Groceries (mine)");
        assert!(!kept.is_synced);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn merge_propagates_soft_deletes() {
        let store = store().await;
        merge_remote_notes(&store, ACCOUNT, &[remote("srv-1", "Groceries", 100)])
            .await
            .unwrap();

        let mut deleted = remote("srv-1", "Groceries", 200);
        deleted.deleted_at = Some(200);
        let stats = merge_remote_notes(&store, ACCOUNT, &[deleted]).await.unwrap();
        assert_eq!(stats.deleted, 1);

        assert!(store.get_note_by_remote_id("srv-1").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn merge_empty_batch_is_noop() {
        let store = store().await;
        let stats = merge_remote_notes(&store, ACCOUNT, &[]).await.unwrap();
        assert!(stats.is_noop());
        assert_eq!(store.load_watermark(ACCOUNT).await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn merge_skips_records_for_other_accounts() {
        let store = store().await;
        let mut foreign = remote("srv-1", "Not ours", 100);
        foreign.account_id = "family-2".to_string();

        let stats = merge_remote_notes(&store, ACCOUNT, &[foreign]).await.unwrap();
        assert_eq!(stats.ignored, 1);
        assert!(store.get_note_by_remote_id("srv-1").await.unwrap().is_none());
    }
}
