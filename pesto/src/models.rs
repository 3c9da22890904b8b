//! Core data models for Pesto
//!
//! `HistoryEntry` is what the store hands out; `Candidate` is what the
//! classifier produces before anything is stored.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::fingerprint::Fingerprint;

// ─────────────────────────────────────────────────────────────────────────────
// IDENTIFIERS
// ─────────────────────────────────────────────────────────────────────────────

/// Opaque entry identifier, assigned once at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(Uuid);

impl EntryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for EntryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CONTENT
// ─────────────────────────────────────────────────────────────────────────────

/// Content category of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    PlainText,
    RichText,
    Image,
    FileList,
}

impl EntryKind {
    /// Value stored in the `kind` column
    pub fn database_str(&self) -> &'static str {
        match self {
            EntryKind::PlainText => "text",
            EntryKind::RichText => "rtf",
            EntryKind::Image => "image",
            EntryKind::FileList => "file",
        }
    }

    pub fn from_database_str(s: &str) -> Option<Self> {
        match s {
            "text" => Some(EntryKind::PlainText),
            "rtf" => Some(EntryKind::RichText),
            "image" => Some(EntryKind::Image),
            "file" => Some(EntryKind::FileList),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            EntryKind::PlainText => "Text",
            EntryKind::RichText => "Rich Text",
            EntryKind::Image => "Image",
            EntryKind::FileList => "File",
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, EntryKind::PlainText | EntryKind::RichText)
    }
}

/// Kind-dependent content of an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    PlainText { text: String },
    /// Formatted document bytes plus their plain-text rendering
    RichText { text: String, rich: Vec<u8> },
    /// `data` is None when the image exceeded the size cap at capture time
    Image { data: Option<Vec<u8>> },
    FileList { paths: Vec<PathBuf> },
}

impl Payload {
    pub fn kind(&self) -> EntryKind {
        match self {
            Payload::PlainText { .. } => EntryKind::PlainText,
            Payload::RichText { .. } => EntryKind::RichText,
            Payload::Image { .. } => EntryKind::Image,
            Payload::FileList { .. } => EntryKind::FileList,
        }
    }

    /// Textual body used for search. None for images and files.
    pub fn text(&self) -> Option<&str> {
        match self {
            Payload::PlainText { text } | Payload::RichText { text, .. } => Some(text),
            Payload::Image { .. } | Payload::FileList { .. } => None,
        }
    }

    /// Fingerprint of the canonical form.
    ///
    /// Images whose bytes were already dropped cannot be fingerprinted here;
    /// those carry the fingerprint computed at capture time.
    pub fn fingerprint(&self) -> Option<Fingerprint> {
        match self {
            Payload::PlainText { text } | Payload::RichText { text, .. } => {
                Some(Fingerprint::of_text(text))
            }
            Payload::Image { data } => data.as_deref().map(Fingerprint::of_bytes),
            Payload::FileList { paths } => Some(Fingerprint::of_paths(paths)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// STORED ENTRY
// ─────────────────────────────────────────────────────────────────────────────

/// A unit of stored history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: EntryId,
    /// Sole recency signal, bumped on every touch
    pub created_at: DateTime<Utc>,
    pub payload: Payload,
    /// Thumbnail for images and files. Never authoritative.
    pub preview: Option<Vec<u8>>,
    pub fingerprint: Fingerprint,
    pub pinned: bool,
}

impl HistoryEntry {
    pub fn kind(&self) -> EntryKind {
        self.payload.kind()
    }

    pub fn text_content(&self) -> Option<&str> {
        self.payload.text()
    }

    /// Short label for list rows and logs
    pub fn display_text(&self) -> String {
        match &self.payload {
            Payload::PlainText { text } | Payload::RichText { text, .. } => text.clone(),
            Payload::Image { .. } => "Image".to_string(),
            Payload::FileList { paths } => match paths.as_slice() {
                [single] => single
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| single.to_string_lossy().into_owned()),
                [] => "File".to_string(),
                many => format!("{} files", many.len()),
            },
        }
    }

    /// Display text truncated to `max_chars` with a trailing ellipsis
    pub fn preview_text(&self, max_chars: usize) -> String {
        let text = self.display_text();
        if text.chars().count() > max_chars {
            let truncated: String = text.chars().take(max_chars).collect();
            format!("{}...", truncated)
        } else {
            text
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CANDIDATE
// ─────────────────────────────────────────────────────────────────────────────

/// A classified, not-yet-stored capture.
///
/// The fingerprint is fixed at construction so that dropping an oversized
/// image payload later does not change the dedup key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    payload: Payload,
    preview: Option<Vec<u8>>,
    fingerprint: Fingerprint,
}

impl Candidate {
    pub fn plain_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let fingerprint = Fingerprint::of_text(&text);
        Self {
            payload: Payload::PlainText { text },
            preview: None,
            fingerprint,
        }
    }

    pub fn rich_text(text: impl Into<String>, rich: Vec<u8>) -> Self {
        let text = text.into();
        let fingerprint = Fingerprint::of_text(&text);
        Self {
            payload: Payload::RichText { text, rich },
            preview: None,
            fingerprint,
        }
    }

    pub fn image(data: Vec<u8>, preview: Option<Vec<u8>>) -> Self {
        let fingerprint = Fingerprint::of_bytes(&data);
        Self {
            payload: Payload::Image { data: Some(data) },
            preview,
            fingerprint,
        }
    }

    pub fn files(paths: Vec<PathBuf>, preview: Option<Vec<u8>>) -> Self {
        let fingerprint = Fingerprint::of_paths(&paths);
        Self {
            payload: Payload::FileList { paths },
            preview,
            fingerprint,
        }
    }

    /// Drop image bytes above `max_bytes`, keeping preview and fingerprint.
    /// Returns true when the payload was dropped.
    pub fn enforce_image_limit(&mut self, max_bytes: usize) -> bool {
        if let Payload::Image { data } = &mut self.payload {
            if data.as_ref().is_some_and(|d| d.len() > max_bytes) {
                *data = None;
                return true;
            }
        }
        false
    }

    pub fn kind(&self) -> EntryKind {
        self.payload.kind()
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn preview(&self) -> Option<&[u8]> {
        self.preview.as_deref()
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub(crate) fn into_entry(self, id: EntryId, created_at: DateTime<Utc>) -> HistoryEntry {
        HistoryEntry {
            id,
            created_at,
            payload: self.payload,
            preview: self.preview,
            fingerprint: self.fingerprint,
            pinned: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_database_roundtrip() {
        for kind in [EntryKind::PlainText, EntryKind::RichText, EntryKind::Image, EntryKind::FileList] {
            assert_eq!(EntryKind::from_database_str(kind.database_str()), Some(kind));
        }
        assert_eq!(EntryKind::from_database_str("color"), None);
    }

    #[test]
    fn test_rich_and_plain_share_fingerprint() {
        let plain = Candidate::plain_text("Hello");
        let rich = Candidate::rich_text("Hello", b"{\\rtf1 Hello}".to_vec());
        assert_eq!(plain.fingerprint(), rich.fingerprint());
    }

    #[test]
    fn test_oversized_image_keeps_fingerprint_and_preview() {
        let data = vec![7u8; 64];
        let expected = Fingerprint::of_bytes(&data);
        let mut candidate = Candidate::image(data, Some(vec![1, 2, 3]));

        assert!(candidate.enforce_image_limit(32));
        assert_eq!(candidate.payload(), &Payload::Image { data: None });
        assert_eq!(candidate.preview(), Some(&[1u8, 2, 3][..]));
        assert_eq!(candidate.fingerprint(), &expected);
    }

    #[test]
    fn test_image_within_limit_untouched() {
        let mut candidate = Candidate::image(vec![1u8; 10], None);
        assert!(!candidate.enforce_image_limit(10));
        assert!(matches!(candidate.payload(), Payload::Image { data: Some(_) }));
    }

    #[test]
    fn test_text_limit_is_noop() {
        let mut candidate = Candidate::plain_text("x".repeat(100));
        assert!(!candidate.enforce_image_limit(1));
    }

    #[test]
    fn test_non_text_payloads_have_no_text() {
        assert_eq!(Payload::Image { data: None }.text(), None);
        assert_eq!(Payload::FileList { paths: vec!["/a".into()] }.text(), None);
        assert_eq!(Payload::PlainText { text: "a".into() }.text(), Some("a"));
    }

    #[test]
    fn test_display_text_for_files() {
        let entry = Candidate::files(vec!["/tmp/report.pdf".into()], None)
            .into_entry(EntryId::new(), Utc::now());
        assert_eq!(entry.display_text(), "report.pdf");

        let entry = Candidate::files(vec!["/tmp/a".into(), "/tmp/b".into()], None)
            .into_entry(EntryId::new(), Utc::now());
        assert_eq!(entry.display_text(), "2 files");
    }

    #[test]
    fn test_preview_text_truncation() {
        let entry = Candidate::plain_text("a".repeat(300)).into_entry(EntryId::new(), Utc::now());
        let preview = entry.preview_text(200);
        assert_eq!(preview.chars().count(), 203);
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn test_entry_id_parse_roundtrip() {
        let id = EntryId::new();
        let parsed: EntryId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }
}
