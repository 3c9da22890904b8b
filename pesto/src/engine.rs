//! Wires the store, poller and selection controller around one clipboard port.

use std::path::Path;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::info;

use crate::classifier::ContentClassifier;
use crate::database::Database;
use crate::events::{EventBus, HistoryEvent};
use crate::interface::PestoError;
use crate::models::EntryId;
use crate::pasteboard::PasteboardPort;
use crate::poller::ClipboardPoller;
use crate::preview::{ImagePreviewGenerator, PreviewGenerator};
use crate::selection::SelectionController;
use crate::settings::{CaptureSettings, Settings, SharedSettings};
use crate::store::HistoryStore;

pub struct Engine {
    settings: SharedSettings,
    events: EventBus,
    store: Arc<HistoryStore>,
    poller: ClipboardPoller,
    selection: SelectionController,
}

impl Engine {
    /// Open the history database at `db_path`. The poller is created stopped.
    pub fn open(
        db_path: impl AsRef<Path>,
        port: Arc<dyn PasteboardPort>,
        settings: Settings,
        runtime: Handle,
    ) -> Result<Self, PestoError> {
        let db = Database::open(db_path).map_err(PestoError::read)?;
        Self::assemble(db, port, Arc::new(ImagePreviewGenerator), settings, runtime)
    }

    pub fn open_in_memory(
        port: Arc<dyn PasteboardPort>,
        settings: Settings,
        runtime: Handle,
    ) -> Result<Self, PestoError> {
        let db = Database::open_in_memory().map_err(PestoError::read)?;
        Self::assemble(db, port, Arc::new(ImagePreviewGenerator), settings, runtime)
    }

    /// Build from an already opened database and a custom preview generator
    pub fn assemble(
        db: Database,
        port: Arc<dyn PasteboardPort>,
        previews: Arc<dyn PreviewGenerator>,
        settings: Settings,
        runtime: Handle,
    ) -> Result<Self, PestoError> {
        settings.capture.validate()?;
        let settings = SharedSettings::new(settings);
        let events = EventBus::new();

        let store = Arc::new(HistoryStore::new(Arc::new(db), settings.clone(), events.clone())?);
        let poller = ClipboardPoller::new(
            Arc::clone(&port),
            Arc::clone(&store),
            ContentClassifier::new(previews),
            settings.clone(),
            events.clone(),
            runtime.clone(),
        );
        let selection = SelectionController::new(Arc::clone(&store), port, events.clone(), runtime);

        // A failed first load is already recorded on the store
        let _ = selection.refresh();

        info!(entries = store.count().unwrap_or(0), "Pesto engine ready");
        Ok(Self {
            settings,
            events,
            store,
            poller,
            selection,
        })
    }

    pub fn store(&self) -> &Arc<HistoryStore> {
        &self.store
    }

    pub fn poller(&self) -> &ClipboardPoller {
        &self.poller
    }

    pub fn selection(&self) -> &SelectionController {
        &self.selection
    }

    pub fn settings(&self) -> &SharedSettings {
        &self.settings
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HistoryEvent> {
        self.events.subscribe()
    }

    /// Apply new capture settings.
    ///
    /// A lowered `max_items` evicts immediately; the ids removed are returned.
    /// A changed `paused` flag goes through the poller so resume skips a tick.
    pub fn update_capture_settings(&self, capture: CaptureSettings) -> Result<Vec<EntryId>, PestoError> {
        let paused = capture.paused;
        self.settings.set_capture(capture)?;
        if paused != self.poller.is_paused() {
            self.poller.set_paused(paused);
        }
        self.store.apply_retention()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.poller.stop();
    }
}
