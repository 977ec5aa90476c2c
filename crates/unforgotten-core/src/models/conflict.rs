//! Sync conflict model

use serde::{Deserialize, Serialize};

/// Recorded sync conflict resolved by strategy (e.g., local-pending-wins)
///
/// The merge policy never surfaces conflicts for manual resolution; this
/// log is the audit trail of remote edits the policy discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Conflict row identifier
    pub id: i64,
    /// Note involved in the conflict
    pub note_id: String,
    /// Local row's timestamp when the conflict occurred
    pub local_updated_at: i64,
    /// Remote record's timestamp that was discarded
    pub remote_updated_at: i64,
    /// Resolution timestamp (unix ms)
    pub resolved_at: i64,
    /// Resolution strategy name
    pub strategy: String,
}

impl SyncConflict {
    /// Strategy recorded when a pending local edit discards a newer remote edit.
    pub const LOCAL_PENDING_WINS: &'static str = "local-pending-wins";
}
