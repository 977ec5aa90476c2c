//! Local-first note synchronization engine.
//!
//! A UI mutation updates the local note synchronously and marks it
//! unsynced, then hands it to the [`SyncService`], which debounces bursts
//! of edits into one push per note. Independently, callers pull remote
//! changes since the last watermark and apply them through the merge
//! engine. Conflicts are resolved silently by [`resolve`]; the
//! local store is never rolled back on a sync failure.

mod merge;
mod policy;
mod scheduler;
mod transport;

pub use merge::{merge_remote_notes, plan_merge, MergeStats};
pub use policy::{resolve, MergeAction};
pub use scheduler::{SyncService, SyncStatus, DEFAULT_DEBOUNCE};
pub use transport::{HttpNoteTransport, NoteTransport, SessionProvider, StaticSession};
