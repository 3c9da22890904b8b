//! Boundary to the system clipboard.
//!
//! The core never talks to the OS directly. Everything it needs from the
//! clipboard, the frontmost application and the keystroke injector goes
//! through [`PasteboardPort`]. [`MemoryPasteboard`] is an in-process port used
//! by tests and tooling.

use std::collections::BTreeSet;
use std::path::PathBuf;

use parking_lot::Mutex;
use thiserror::Error;

use crate::models::{HistoryEntry, Payload};

/// Type marker set by the OS when the clipboard came from another device
pub const REMOTE_CLIPBOARD_TYPE: &str = "com.apple.is-remote-clipboard";

/// Type markers password managers set on secrets they copy
pub const CONCEALED_TYPES: &[&str] = &[
    "org.nspasteboard.ConcealedType",
    "org.nspasteboard.AutoGeneratedType",
    "com.agilebits.onepassword",
    "com.lastpass.LastPass",
    "com.bitwarden.desktop",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PortError {
    #[error("pasteboard rejected the write: {0}")]
    WriteRejected(String),
    #[error("nothing to write")]
    Empty,
}

/// Monotonic change counter of the system clipboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct VersionToken(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEncoding {
    Png,
    Tiff,
    Jpeg,
}

/// Image bytes already in a file format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub encoding: ImageEncoding,
    pub data: Vec<u8>,
}

/// Decoded pixels offered without a file format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbaBitmap {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RichTextData {
    pub data: Vec<u8>,
    /// Plain rendering of `data`, when the port could produce one
    pub rendered: Option<String>,
}

/// Everything the clipboard offered at one point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawClipboardContent {
    pub marker_types: BTreeSet<String>,
    pub frontmost_app: Option<String>,
    pub file_paths: Vec<PathBuf>,
    pub images: Vec<EncodedImage>,
    pub generic_image: Option<RgbaBitmap>,
    pub rich_text: Option<RichTextData>,
    pub plain_text: Option<String>,
}

impl RawClipboardContent {
    pub fn has_marker(&self, marker: &str) -> bool {
        self.marker_types.contains(marker)
    }

    pub fn is_empty(&self) -> bool {
        self.file_paths.is_empty()
            && self.images.is_empty()
            && self.generic_image.is_none()
            && self.rich_text.is_none()
            && self.plain_text.is_none()
    }
}

/// One flavor written back to the clipboard
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Representation {
    RichText(Vec<u8>),
    PlainText(String),
    Image(Vec<u8>),
    FileUrls(Vec<PathBuf>),
}

/// Representations to write for an entry, richest first.
///
/// `as_plain_text` reduces text entries to their plain body. Images whose
/// bytes were dropped at capture have nothing to write.
pub fn representations_for(entry: &HistoryEntry, as_plain_text: bool) -> Vec<Representation> {
    match &entry.payload {
        Payload::PlainText { text } => vec![Representation::PlainText(text.clone())],
        Payload::RichText { text, .. } if as_plain_text => {
            vec![Representation::PlainText(text.clone())]
        }
        Payload::RichText { text, rich } => vec![
            Representation::RichText(rich.clone()),
            Representation::PlainText(text.clone()),
        ],
        Payload::Image { data: Some(data) } => vec![Representation::Image(data.clone())],
        Payload::Image { data: None } => Vec::new(),
        Payload::FileList { paths } => vec![Representation::FileUrls(paths.clone())],
    }
}

/// Host clipboard, focus and input capabilities
pub trait PasteboardPort: Send + Sync {
    fn current_version(&self) -> VersionToken;

    fn read_snapshot(&self) -> RawClipboardContent;

    /// Replace the clipboard contents. Bumps the version token.
    fn write(&self, representations: &[Representation]) -> Result<(), PortError>;

    /// Post a paste keystroke to the frontmost application
    fn inject_paste_keystroke(&self);

    /// Whether the host may synthesize input events
    fn has_permission(&self) -> bool;
}

#[derive(Debug, Default)]
struct MemoryState {
    version: u64,
    content: RawClipboardContent,
    writes: Vec<Vec<Representation>>,
    keystrokes: usize,
    permission_denied: bool,
}

/// In-process clipboard with the same change-counter semantics as the OS one
#[derive(Debug, Default)]
pub struct MemoryPasteboard {
    state: Mutex<MemoryState>,
}

impl MemoryPasteboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate another application copying `content`
    pub fn set_content(&self, content: RawClipboardContent) {
        let mut state = self.state.lock();
        state.version += 1;
        state.content = content;
    }

    pub fn set_text(&self, text: impl Into<String>) {
        self.set_content(RawClipboardContent {
            plain_text: Some(text.into()),
            ..Default::default()
        });
    }

    /// Bump the version without changing contents
    pub fn bump_version(&self) {
        self.state.lock().version += 1;
    }

    pub fn set_permission(&self, granted: bool) {
        self.state.lock().permission_denied = !granted;
    }

    /// Every `write` call so far, oldest first
    pub fn writes(&self) -> Vec<Vec<Representation>> {
        self.state.lock().writes.clone()
    }

    pub fn keystrokes(&self) -> usize {
        self.state.lock().keystrokes
    }
}

impl PasteboardPort for MemoryPasteboard {
    fn current_version(&self) -> VersionToken {
        VersionToken(self.state.lock().version)
    }

    fn read_snapshot(&self) -> RawClipboardContent {
        self.state.lock().content.clone()
    }

    fn write(&self, representations: &[Representation]) -> Result<(), PortError> {
        if representations.is_empty() {
            return Err(PortError::Empty);
        }

        let mut content = RawClipboardContent::default();
        for representation in representations {
            match representation {
                Representation::RichText(data) => {
                    content.rich_text = Some(RichTextData {
                        data: data.clone(),
                        rendered: None,
                    })
                }
                Representation::PlainText(text) => content.plain_text = Some(text.clone()),
                Representation::Image(data) => content.images.push(EncodedImage {
                    encoding: ImageEncoding::Png,
                    data: data.clone(),
                }),
                Representation::FileUrls(paths) => content.file_paths = paths.clone(),
            }
        }

        let mut state = self.state.lock();
        state.version += 1;
        state.content = content;
        state.writes.push(representations.to_vec());
        Ok(())
    }

    fn inject_paste_keystroke(&self) {
        self.state.lock().keystrokes += 1;
    }

    fn has_permission(&self) -> bool {
        !self.state.lock().permission_denied
    }
}
