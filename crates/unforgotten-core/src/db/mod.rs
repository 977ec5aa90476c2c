//! Database layer for Unforgotten

mod connection;
mod migrations;
mod store;

pub use connection::Database;
pub use store::{MergeOp, MergePlan, NoteStore, SqliteNoteStore};
