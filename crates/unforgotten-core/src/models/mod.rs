//! Data models for Unforgotten

mod conflict;
mod note;
mod remote;

pub use conflict::SyncConflict;
pub use note::{Note, NoteId, NoteTheme, RichText, Span};
pub use remote::RemoteNote;
