//! Pesto Core Interface Definition
//!
//! Shared outcome and error types handed to the presentation layer.
//! It acts as the source of truth for what the core reports back.

use thiserror::Error;

use crate::models::EntryId;

// ═══════════════════════════════════════════════════════════════════════════════
// OUTCOMES
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of routing a candidate through the fingerprint index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// New entry stored. `evicted` lists entries removed by retention.
    Inserted { id: EntryId, evicted: Vec<EntryId> },
    /// An entry with the same fingerprint existed and was moved to the top
    Touched { id: EntryId },
}

impl CaptureOutcome {
    pub fn id(&self) -> EntryId {
        match self {
            CaptureOutcome::Inserted { id, .. } | CaptureOutcome::Touched { id } => *id,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, CaptureOutcome::Touched { .. })
    }
}

/// What happened to the keystroke half of a paste
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasteOutcome {
    /// Clipboard written and a paste keystroke scheduled after the dismissal delay
    KeystrokeScheduled,
    /// Clipboard written, keystroke skipped because the host lacks permission
    PermissionDenied,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Error type for Pesto operations.
///
/// Every variant is recoverable: the caller shows a notice and keeps its
/// last-good view until the next successful operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PestoError {
    #[error("Failed to load clipboard history: {0}")]
    StoreReadFailed(String),
    #[error("Failed to save clipboard item: {0}")]
    StoreWriteFailed(String),
    #[error("Failed to search clipboard history: {0}")]
    SearchFailed(String),
    #[error("No history entry with id {0}")]
    NotFound(EntryId),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Failed to write to the pasteboard: {0}")]
    PasteboardWriteFailed(String),
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
}

impl PestoError {
    /// Error raised from a read path (fetch, lookup)
    pub(crate) fn read(e: crate::database::DatabaseError) -> Self {
        PestoError::StoreReadFailed(e.to_string())
    }

    /// Error raised from a write path (insert, update, delete)
    pub(crate) fn write(e: crate::database::DatabaseError) -> Self {
        PestoError::StoreWriteFailed(e.to_string())
    }

    /// Error raised while running a non-empty search
    pub(crate) fn search(e: crate::database::DatabaseError) -> Self {
        PestoError::SearchFailed(e.to_string())
    }
}

impl From<crate::pasteboard::PortError> for PestoError {
    fn from(e: crate::pasteboard::PortError) -> Self {
        PestoError::PasteboardWriteFailed(e.to_string())
    }
}

impl From<crate::settings::SettingsError> for PestoError {
    fn from(e: crate::settings::SettingsError) -> Self {
        PestoError::InvalidSettings(e.to_string())
    }
}
