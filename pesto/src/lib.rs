//! Pesto Core - clipboard history capture and recall
//!
//! Polls a system clipboard through [`PasteboardPort`], classifies and filters
//! what it sees, deduplicates by content fingerprint and keeps a bounded,
//! pin-aware history in SQLite. The selection controller writes entries back
//! and schedules the paste keystroke.

pub mod classifier;
pub mod database;
pub mod debounce;
pub mod engine;
pub mod events;
pub mod fingerprint;
pub mod interface;
pub mod models;
pub mod pasteboard;
pub mod poller;
pub mod preview;
pub mod retention;
pub mod selection;
pub mod settings;
mod store;

pub use classifier::{Classification, ContentClassifier, DiscardReason};
pub use engine::Engine;
pub use events::{EventBus, HistoryEvent};
pub use fingerprint::Fingerprint;
pub use interface::*;
pub use models::{Candidate, EntryId, EntryKind, HistoryEntry, Payload};
pub use pasteboard::{MemoryPasteboard, PasteboardPort, RawClipboardContent, Representation, VersionToken};
pub use poller::{ClipboardPoller, TickOutcome, TickSource};
pub use selection::SelectionController;
pub use settings::{CaptureSettings, PasteSettings, Settings, SharedSettings};
pub use store::HistoryStore;
