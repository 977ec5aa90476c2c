//! Note model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::RemoteNote;

/// A unique identifier for a note, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NoteId(Uuid);

impl NoteId {
    /// Create a new unique note ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for NoteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NoteId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Visual theme tag carried alongside note content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteTheme {
    #[default]
    Plain,
    Sunrise,
    Meadow,
    Ocean,
    Lavender,
}

impl NoteTheme {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Sunrise => "sunrise",
            Self::Meadow => "meadow",
            Self::Ocean => "ocean",
            Self::Lavender => "lavender",
        }
    }
}

impl fmt::Display for NoteTheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NoteTheme {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(Self::Plain),
            "sunrise" => Ok(Self::Sunrise),
            "meadow" => Ok(Self::Meadow),
            "ocean" => Ok(Self::Ocean),
            "lavender" => Ok(Self::Lavender),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown note theme: {other}"
            ))),
        }
    }
}

/// One styled run of text within a note body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub text: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub bold: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub italic: bool,
}

/// Rich-text note body: an ordered list of styled runs.
///
/// The plain-text projection (concatenated run texts) is what search,
/// previews, and conflict equality operate on; styling never affects
/// sync decisions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RichText {
    pub spans: Vec<Span>,
}

impl RichText {
    /// Build an unstyled body from plain text.
    #[must_use]
    pub fn plain(text: impl Into<String>) -> Self {
        let text = text.into();
        if text.is_empty() {
            return Self::default();
        }
        Self {
            spans: vec![Span {
                text,
                ..Span::default()
            }],
        }
    }

    /// Concatenate all run texts into the plain projection.
    #[must_use]
    pub fn plain_text(&self) -> String {
        self.spans.iter().map(|span| span.text.as_str()).collect()
    }

    /// Check if the body is empty (whitespace-only counts as empty)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spans
            .iter()
            .all(|span| span.text.trim().is_empty())
    }
}

/// A note in the local store.
///
/// `is_synced == true` always implies `remote_id` is set; a note without a
/// `remote_id` has never been pushed and is local-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Local identifier, generated on device
    pub id: NoteId,
    /// Server-assigned identifier, set after the first successful push
    pub remote_id: Option<String>,
    /// Note title
    pub title: String,
    /// Rich-text body; mutate through [`Note::set_content`]
    pub(crate) content: RichText,
    /// Derived plain-text projection of `content`
    pub(crate) plain_text: String,
    /// Visual theme tag
    pub theme: NoteTheme,
    /// Pinned to the top of the list
    pub is_pinned: bool,
    /// True iff the last known local state matches the last pushed/pulled remote state
    pub is_synced: bool,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last local mutation timestamp (Unix ms)
    pub updated_at: i64,
    /// Owning account
    pub account_id: String,
}

impl Note {
    /// Create a new local-only note.
    #[must_use]
    pub fn new(title: impl Into<String>, content: RichText, account_id: impl Into<String>) -> Self {
        let now = crate::util::unix_millis_now();
        let plain_text = content.plain_text();
        Self {
            id: NoteId::new(),
            remote_id: None,
            title: title.into(),
            content,
            plain_text,
            theme: NoteTheme::default(),
            is_pinned: false,
            is_synced: false,
            created_at: now,
            updated_at: now,
            account_id: account_id.into(),
        }
    }

    /// Create an empty in-memory draft; not persisted until it has content.
    #[must_use]
    pub fn draft(account_id: impl Into<String>) -> Self {
        Self::new(String::new(), RichText::default(), account_id)
    }

    /// Check if the note has no title and no body content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.trim().is_empty() && self.content.is_empty()
    }

    /// Whether the note has never been pushed to the backend.
    #[must_use]
    pub const fn is_local_only(&self) -> bool {
        self.remote_id.is_none()
    }

    /// Rich-text body.
    #[must_use]
    pub const fn content(&self) -> &RichText {
        &self.content
    }

    /// Plain-text projection of the body, used for search and previews.
    #[must_use]
    pub fn plain_text(&self) -> &str {
        &self.plain_text
    }

    /// Store a new body and recompute the plain-text projection.
    ///
    /// Does not touch sync metadata; callers stamp the edit with
    /// [`Note::mark_as_modified`].
    pub fn set_content(&mut self, content: RichText) {
        self.plain_text = content.plain_text();
        self.content = content;
    }

    /// Stamp a local mutation: re-stamps `updated_at` and clears `is_synced`.
    ///
    /// Strictly monotonic even within one clock millisecond, so every edit
    /// gets a distinct stamp and a stale push snapshot can never pass the
    /// store's `mark_synced` guard.
    pub fn mark_as_modified(&mut self) {
        self.updated_at = crate::util::unix_millis_now().max(self.updated_at + 1);
        self.is_synced = false;
    }

    /// Get first line of the plain text as a preview, truncated to `max_len` characters
    #[must_use]
    pub fn preview(&self, max_len: usize) -> String {
        self.plain_text
            .lines()
            .next()
            .unwrap_or("")
            .chars()
            .take(max_len)
            .collect()
    }

    /// Content equality for conflict purposes: `(title, plain text, theme,
    /// pinned)`. Rich-payload byte differences from formatting-only
    /// round-trips never count as a change.
    #[must_use]
    pub fn content_eq(&self, remote: &RemoteNote) -> bool {
        self.title == remote.title
            && self.plain_text == remote.content.plain_text()
            && self.theme == remote.theme
            && self.is_pinned == remote.is_pinned
    }

    /// Materialize a local note from a remote record the device has never seen.
    #[must_use]
    pub fn from_remote(remote: &RemoteNote) -> Self {
        let plain_text = remote.content.plain_text();
        Self {
            id: NoteId::new(),
            remote_id: Some(remote.id.clone()),
            title: remote.title.clone(),
            content: remote.content.clone(),
            plain_text,
            theme: remote.theme,
            is_pinned: remote.is_pinned,
            is_synced: true,
            created_at: remote.updated_at,
            updated_at: remote.updated_at,
            account_id: remote.account_id.clone(),
        }
    }

    /// Overwrite local content fields from a remote record and mark synced.
    pub fn apply_remote(&mut self, remote: &RemoteNote) {
        self.remote_id = Some(remote.id.clone());
        self.title = remote.title.clone();
        self.set_content(remote.content.clone());
        self.theme = remote.theme;
        self.is_pinned = remote.is_pinned;
        self.updated_at = remote.updated_at;
        self.is_synced = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote_for(note: &Note) -> RemoteNote {
        RemoteNote {
            id: "srv-1".to_string(),
            account_id: note.account_id.clone(),
            title: note.title.clone(),
            content: note.content.clone(),
            theme: note.theme,
            is_pinned: note.is_pinned,
            updated_at: note.updated_at,
            deleted_at: None,
        }
    }

    #[test]
    fn test_note_id_unique() {
        let id1 = NoteId::new();
        let id2 = NoteId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_note_id_parse() {
        let id = NoteId::new();
        let parsed: NoteId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_theme_round_trip() {
        for theme in [
            NoteTheme::Plain,
            NoteTheme::Sunrise,
            NoteTheme::Meadow,
            NoteTheme::Ocean,
            NoteTheme::Lavender,
        ] {
            assert_eq!(theme.as_str().parse::<NoteTheme>().unwrap(), theme);
        }
        assert!("neon".parse::<NoteTheme>().is_err());
    }

    #[test]
    fn test_draft_is_unsynced_and_local_only() {
        let note = Note::draft("family-1");
        assert!(note.is_empty());
        assert!(!note.is_synced);
        assert!(note.is_local_only());
        assert_eq!(note.created_at, note.updated_at);
    }

    #[test]
    fn test_set_content_recomputes_projection() {
        let mut note = Note::draft("family-1");
        note.set_content(RichText {
            spans: vec![
                Span {
                    text: "Gift ".to_string(),
                    bold: true,
                    italic: false,
                },
                Span {
                    text: "Ideas".to_string(),
                    ..Span::default()
                },
            ],
        });
        assert_eq!(note.plain_text(), "Gift Ideas");
    }

    #[test]
    fn test_mark_as_modified_clears_synced() {
        let mut note = Note::new("Groceries", RichText::plain("milk"), "family-1");
        note.remote_id = Some("srv-1".to_string());
        note.is_synced = true;
        let before = note.updated_at;

        note.mark_as_modified();
        assert!(!note.is_synced);
        assert!(note.updated_at > before);
    }

    #[test]
    fn test_mark_as_modified_is_monotonic_within_one_millisecond() {
        let mut note = Note::new("Groceries", RichText::plain("milk"), "family-1");

        // Back-to-back edits land within the same clock millisecond; each
        // must still get a strictly newer stamp.
        note.mark_as_modified();
        let first = note.updated_at;
        note.mark_as_modified();
        let second = note.updated_at;
        note.mark_as_modified();

        assert!(second > first);
        assert!(note.updated_at > second);
    }

    #[test]
    fn test_content_eq_ignores_formatting() {
        let mut note = Note::new("Trip", RichText::plain("pack bags"), "family-1");
        let mut remote = remote_for(&note);

        // Same plain text split across styled runs is still equal.
        remote.content = RichText {
            spans: vec![
                Span {
                    text: "pack ".to_string(),
                    italic: true,
                    bold: false,
                },
                Span {
                    text: "bags".to_string(),
                    ..Span::default()
                },
            ],
        };
        assert!(note.content_eq(&remote));

        note.set_content(RichText::plain("pack bags and passports"));
        assert!(!note.content_eq(&remote));
    }

    #[test]
    fn test_from_remote_is_synced() {
        let note = Note::new("Trip", RichText::plain("pack"), "family-1");
        let remote = remote_for(&note);

        let local = Note::from_remote(&remote);
        assert!(local.is_synced);
        assert_eq!(local.remote_id.as_deref(), Some("srv-1"));
        assert_eq!(local.plain_text(), "pack");
    }

    #[test]
    fn test_preview() {
        let note = Note::new(
            "Lists",
            RichText::plain("First line\nSecond line"),
            "family-1",
        );
        assert_eq!(note.preview(50), "First line");
        assert_eq!(note.preview(5), "First");
    }
}
