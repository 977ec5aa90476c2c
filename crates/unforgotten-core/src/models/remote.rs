//! Remote note wire record

use serde::{Deserialize, Serialize};

use super::note::{NoteTheme, RichText};

/// Backend-side projection of a note, keyed by the server-assigned id.
///
/// Used only at the transport and merge boundary; the rest of the engine
/// works on [`super::Note`]. Soft-deleted records carry a `deleted_at`
/// timestamp so deletions propagate during incremental fetches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteNote {
    /// Server-assigned identifier
    pub id: String,
    /// Owning account
    pub account_id: String,
    pub title: String,
    pub content: RichText,
    pub theme: NoteTheme,
    pub is_pinned: bool,
    /// Server-stamped last update (Unix ms)
    pub updated_at: i64,
    /// Soft-delete timestamp; `Some` means the record is deleted
    #[serde(default)]
    pub deleted_at: Option<i64>,
}

impl RemoteNote {
    /// Whether the record is a soft-deletion marker.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_without_deleted_at() {
        let payload = r#"
        {
          "id": "srv-1",
          "account_id": "family-1",
          "title": "Groceries",
          "content": { "spans": [ { "text": "milk" } ] },
          "theme": "plain",
          "is_pinned": false,
          "updated_at": 1700000000000
        }
        "#;

        let record: RemoteNote = serde_json::from_str(payload).unwrap();
        assert!(!record.is_deleted());
        assert_eq!(record.content.plain_text(), "milk");
    }

    #[test]
    fn deleted_at_marks_record_deleted() {
        let record = RemoteNote {
            id: "srv-1".to_string(),
            account_id: "family-1".to_string(),
            title: String::new(),
            content: RichText::default(),
            theme: NoteTheme::Plain,
            is_pinned: false,
            updated_at: 10,
            deleted_at: Some(11),
        };
        assert!(record.is_deleted());
    }
}
