//! User-facing capture and paste settings.
//!
//! The host keeps these in its own preference store; the core reads them on
//! every tick so changes take effect without a restart.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_HISTORY_LIMIT: usize = 500;
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 5_000_000;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("max_items must be at least 1")]
    ZeroHistoryLimit,
    #[error("max_image_bytes must be at least 1")]
    ZeroImageLimit,
    #[error("Malformed settings: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Options that decide what the poller records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CaptureSettings {
    pub capture_text: bool,
    pub capture_images: bool,
    pub capture_files: bool,
    /// Application identifiers whose copies are never recorded
    pub ignored_apps: BTreeSet<String>,
    pub ignore_remote_clipboard: bool,
    pub paused: bool,
    #[serde(alias = "historyLimit")]
    pub max_items: usize,
    pub max_image_bytes: usize,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            capture_text: true,
            capture_images: true,
            capture_files: true,
            ignored_apps: BTreeSet::new(),
            ignore_remote_clipboard: true,
            paused: false,
            max_items: DEFAULT_HISTORY_LIMIT,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }
}

impl CaptureSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.max_items == 0 {
            return Err(SettingsError::ZeroHistoryLimit);
        }
        if self.max_image_bytes == 0 {
            return Err(SettingsError::ZeroImageLimit);
        }
        Ok(())
    }

    /// Build from a flat key/value map as kept by a preference store.
    /// Unknown keys are ignored, missing keys take their defaults.
    pub fn from_key_values(values: HashMap<String, serde_json::Value>) -> Result<Self, SettingsError> {
        let object: serde_json::Map<String, serde_json::Value> = values.into_iter().collect();
        let settings: Self = serde_json::from_value(serde_json::Value::Object(object))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn is_ignored_app(&self, app: &str) -> bool {
        self.ignored_apps.contains(app)
    }
}

/// Options that decide what a selection does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PasteSettings {
    /// Activating an entry pastes into the previous app instead of only copying
    pub paste_automatically: bool,
    /// Strip formatting whenever an entry is pasted
    pub plain_text_mode: bool,
}

/// Both settings groups as persisted together
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    #[serde(flatten)]
    pub capture: CaptureSettings,
    #[serde(flatten)]
    pub paste: PasteSettings,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let raw = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&raw)?;
        settings.capture.validate()?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }
}

/// Shared, live view of the current settings
#[derive(Debug, Clone, Default)]
pub struct SharedSettings {
    inner: Arc<RwLock<Settings>>,
}

impl SharedSettings {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    pub fn capture(&self) -> CaptureSettings {
        self.inner.read().capture.clone()
    }

    pub fn paste(&self) -> PasteSettings {
        self.inner.read().paste
    }

    pub fn snapshot(&self) -> Settings {
        self.inner.read().clone()
    }

    /// Replace capture settings after validating them
    pub fn set_capture(&self, capture: CaptureSettings) -> Result<(), SettingsError> {
        capture.validate()?;
        self.inner.write().capture = capture;
        Ok(())
    }

    pub fn set_paste(&self, paste: PasteSettings) {
        self.inner.write().paste = paste;
    }

    pub(crate) fn set_paused(&self, paused: bool) {
        self.inner.write().capture.paused = paused;
    }
}
