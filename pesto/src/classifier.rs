//! Turns a raw clipboard snapshot into something worth storing, or a reason not to.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

use crate::models::Candidate;
use crate::pasteboard::{
    ImageEncoding, RawClipboardContent, CONCEALED_TYPES, REMOTE_CLIPBOARD_TYPE,
};
use crate::preview::{encode_rgba_png, PreviewGenerator, PREVIEW_MAX_DIMENSION, PREVIEW_TIMEOUT};
use crate::settings::CaptureSettings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscardReason {
    /// Synced from another device
    RemoteOrigin,
    /// Marked as a secret by a password manager
    Concealed,
    /// Copied from an application on the ignore list
    IgnoredApp(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Capture(Candidate),
    Discard(DiscardReason),
    /// No capturable representation under the current settings
    Nothing,
}

pub struct ContentClassifier {
    previews: Arc<dyn PreviewGenerator>,
    preview_timeout: Duration,
    max_dimension: u32,
}

impl ContentClassifier {
    pub fn new(previews: Arc<dyn PreviewGenerator>) -> Self {
        Self {
            previews,
            preview_timeout: PREVIEW_TIMEOUT,
            max_dimension: PREVIEW_MAX_DIMENSION,
        }
    }

    pub fn with_preview_timeout(mut self, preview_timeout: Duration) -> Self {
        self.preview_timeout = preview_timeout;
        self
    }

    pub async fn classify(
        &self,
        snapshot: &RawClipboardContent,
        settings: &CaptureSettings,
    ) -> Classification {
        if let Some(reason) = Self::discard_reason(snapshot, settings) {
            debug!(?reason, "Discarding clipboard change");
            return Classification::Discard(reason);
        }

        if settings.capture_files {
            let paths: Vec<PathBuf> = snapshot
                .file_paths
                .iter()
                .filter(|p| p.exists())
                .cloned()
                .collect();
            if !paths.is_empty() {
                let preview = self.file_preview(&paths).await;
                return Classification::Capture(Candidate::files(paths, preview));
            }
        }

        if settings.capture_images {
            if let Some(data) = Self::image_bytes(snapshot) {
                let preview = self.image_preview(&data).await;
                let mut candidate = Candidate::image(data, preview);
                if candidate.enforce_image_limit(settings.max_image_bytes) {
                    debug!(max_bytes = settings.max_image_bytes, "Image over size limit, keeping preview only");
                }
                return Classification::Capture(candidate);
            }
        }

        if settings.capture_text {
            if let Some(candidate) = Self::text_candidate(snapshot) {
                return Classification::Capture(candidate);
            }
        }

        debug!("Nothing capturable on the clipboard");
        Classification::Nothing
    }

    fn discard_reason(snapshot: &RawClipboardContent, settings: &CaptureSettings) -> Option<DiscardReason> {
        if settings.ignore_remote_clipboard && snapshot.has_marker(REMOTE_CLIPBOARD_TYPE) {
            return Some(DiscardReason::RemoteOrigin);
        }
        if CONCEALED_TYPES.iter().any(|marker| snapshot.has_marker(marker)) {
            return Some(DiscardReason::Concealed);
        }
        match &snapshot.frontmost_app {
            Some(app) if settings.is_ignored_app(app) => Some(DiscardReason::IgnoredApp(app.clone())),
            _ => None,
        }
    }

    /// First encoded image in preference order, else the generic bitmap as PNG
    fn image_bytes(snapshot: &RawClipboardContent) -> Option<Vec<u8>> {
        for encoding in [ImageEncoding::Png, ImageEncoding::Tiff, ImageEncoding::Jpeg] {
            if let Some(image) = snapshot.images.iter().find(|i| i.encoding == encoding) {
                return Some(image.data.clone());
            }
        }

        let bitmap = snapshot.generic_image.as_ref()?;
        match encode_rgba_png(bitmap.width, bitmap.height, &bitmap.rgba) {
            Ok(png) => Some(png),
            Err(e) => {
                warn!("Failed to encode clipboard bitmap: {}", e);
                None
            }
        }
    }

    fn text_candidate(snapshot: &RawClipboardContent) -> Option<Candidate> {
        let plain = snapshot.plain_text.as_deref().filter(|t| !t.is_empty());

        if let Some(rich) = &snapshot.rich_text {
            let rendered = rich
                .rendered
                .as_deref()
                .filter(|t| !t.is_empty())
                .or(plain);
            if let Some(text) = rendered {
                return Some(Candidate::rich_text(text, rich.data.clone()));
            }
        }

        plain.map(Candidate::plain_text)
    }

    async fn image_preview(&self, data: &[u8]) -> Option<Vec<u8>> {
        let work = self.previews.image_preview(data.to_vec(), self.max_dimension);
        match timeout(self.preview_timeout, work).await {
            Ok(Ok(preview)) => Some(preview),
            Ok(Err(e)) => {
                warn!("Image preview failed: {}", e);
                None
            }
            Err(_) => {
                warn!(timeout_ms = self.preview_timeout.as_millis() as u64, "Image preview timed out");
                None
            }
        }
    }

    /// Preview from the first file that yields one, all under one deadline
    async fn file_preview(&self, paths: &[PathBuf]) -> Option<Vec<u8>> {
        let deadline = Instant::now() + self.preview_timeout;
        for path in paths {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!("File preview deadline reached");
                return None;
            }
            match timeout(remaining, self.previews.file_preview(path.clone(), self.max_dimension)).await {
                Ok(Ok(preview)) => return Some(preview),
                Ok(Err(e)) => debug!(path = %path.display(), "No preview for file: {}", e),
                Err(_) => {
                    warn!(path = %path.display(), "File preview timed out");
                    return None;
                }
            }
        }
        None
    }
}
