//! Conflict resolution policy.

use crate::models::{Note, RemoteNote};

/// The fate of one remote record against the matching local note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeAction {
    /// No local match: materialize a new local note
    InsertLocal,
    /// Local note is clean: take the remote content
    OverwriteLocal,
    /// A local edit is pending: the remote record is discarded.
    /// `remote_newer` marks a concurrent remote edit worth logging.
    KeepLocal { remote_newer: bool },
    /// Remote record was soft-deleted: remove the local note
    DeleteLocal,
    /// Nothing to do
    Ignore,
}

/// Decide what a remote record does to the local store.
///
/// Each record's fate depends only on its own identifier and timestamp
/// against the matching local note, never on other records in a batch.
/// Pending local edits always win over concurrent remote edits; the
/// discarded remote version is logged, not surfaced for manual resolution.
#[must_use]
pub fn resolve(local: Option<&Note>, remote: &RemoteNote) -> MergeAction {
    let Some(local) = local else {
        // Deletion of a record this device never saw is a no-op.
        return if remote.is_deleted() {
            MergeAction::Ignore
        } else {
            MergeAction::InsertLocal
        };
    };

    if remote.is_deleted() {
        return MergeAction::DeleteLocal;
    }

    if !local.is_synced {
        return MergeAction::KeepLocal {
            remote_newer: remote.updated_at > local.updated_at,
        };
    }

    if local.content_eq(remote) {
        MergeAction::Ignore
    } else {
        MergeAction::OverwriteLocal
    }
}
