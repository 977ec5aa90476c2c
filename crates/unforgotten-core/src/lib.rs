//! unforgotten-core - Core library for Unforgotten
//!
//! This crate contains the note model, the local SQLite store, and the
//! local-first synchronization engine shared by all Unforgotten clients.
//! The local store is always writable and authoritative for the user's own
//! edits; pushing to the backend is best-effort and asynchronous.

pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Note, NoteId, NoteTheme, RemoteNote, RichText};
pub use services::NoteStoreService;
pub use sync::{NoteTransport, SyncService, SyncStatus};
