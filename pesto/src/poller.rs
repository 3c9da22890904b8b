//! Clipboard polling loop
//!
//! The system clipboard has no change notification, only a change counter.
//! The poller compares that counter against the last one it saw on every tick
//! and runs the capture pipeline once per observed change.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::classifier::{Classification, ContentClassifier, DiscardReason};
use crate::events::{EventBus, HistoryEvent};
use crate::interface::{CaptureOutcome, PestoError};
use crate::pasteboard::{PasteboardPort, VersionToken};
use crate::settings::SharedSettings;
use crate::store::HistoryStore;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Drives the poll loop. Each `next_tick` resolves when the next check is due.
#[async_trait::async_trait]
pub trait TickSource: Send + 'static {
    async fn next_tick(&mut self);
}

/// Fixed-period ticks. Late ticks are skipped rather than bunched up.
pub struct IntervalTickSource {
    interval: Interval,
}

impl IntervalTickSource {
    /// Must be called inside a tokio runtime context
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }
}

#[async_trait::async_trait]
impl TickSource for IntervalTickSource {
    async fn next_tick(&mut self) {
        self.interval.tick().await;
    }
}

/// What a single tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Paused,
    /// First tick after resuming: version resynced, nothing captured
    Resynced,
    Unchanged,
    Captured(CaptureOutcome),
    Discarded(DiscardReason),
    NothingToCapture,
    Failed(PestoError),
}

struct PollState {
    last_seen: VersionToken,
    paused: bool,
    skip_next_check: bool,
}

struct PollerInner {
    port: Arc<dyn PasteboardPort>,
    store: Arc<HistoryStore>,
    classifier: ContentClassifier,
    settings: SharedSettings,
    events: EventBus,
    state: Mutex<PollState>,
}

struct RunningLoop {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct ClipboardPoller {
    inner: Arc<PollerInner>,
    runtime: Handle,
    running: Mutex<Option<RunningLoop>>,
}

impl ClipboardPoller {
    /// Whatever is on the clipboard right now counts as already seen
    pub fn new(
        port: Arc<dyn PasteboardPort>,
        store: Arc<HistoryStore>,
        classifier: ContentClassifier,
        settings: SharedSettings,
        events: EventBus,
        runtime: Handle,
    ) -> Self {
        let state = PollState {
            last_seen: port.current_version(),
            paused: settings.capture().paused,
            skip_next_check: false,
        };
        Self {
            inner: Arc::new(PollerInner {
                port,
                store,
                classifier,
                settings,
                events,
                state: Mutex::new(state),
            }),
            runtime,
            running: Mutex::new(None),
        }
    }

    /// Start polling every `DEFAULT_POLL_INTERVAL`. No-op when already running.
    pub fn start(&self) {
        let ticks = {
            let _enter = self.runtime.enter();
            IntervalTickSource::new(DEFAULT_POLL_INTERVAL)
        };
        self.start_with(ticks);
    }

    /// Start polling on a custom tick source. No-op when already running.
    pub fn start_with<T: TickSource>(&self, mut ticks: T) {
        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            debug!("Poller already running");
            return;
        }

        let token = CancellationToken::new();
        let loop_token = token.clone();
        let inner = Arc::clone(&self.inner);
        let handle = self.runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = loop_token.cancelled() => break,
                    _ = ticks.next_tick() => {
                        inner.tick().await;
                    }
                }
            }
            debug!("Poll loop exited");
        });

        info!("Clipboard poller started");
        *running = Some(RunningLoop { token, handle });
    }

    /// Stop the loop. No-op when idle.
    pub fn stop(&self) {
        if let Some(running) = self.running.lock().take() {
            running.token.cancel();
            info!("Clipboard poller stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    pub fn is_paused(&self) -> bool {
        self.inner.state.lock().paused
    }

    /// Pause or resume capture.
    ///
    /// Resuming adopts the current clipboard as seen and skips the next tick,
    /// so anything copied while paused is never recorded.
    pub fn set_paused(&self, paused: bool) {
        {
            let mut state = self.inner.state.lock();
            state.paused = paused;
            if !paused {
                state.last_seen = self.inner.port.current_version();
                state.skip_next_check = true;
            }
        }
        self.inner.settings.set_paused(paused);
        self.inner.events.send(HistoryEvent::PausedChanged(paused));
        info!(paused, "Capture pause changed");
    }

    /// Flip the pause state and return the new value
    pub fn toggle_pause(&self) -> bool {
        let paused = !self.is_paused();
        self.set_paused(paused);
        paused
    }

    /// Run one poll step
    pub async fn tick(&self) -> TickOutcome {
        self.inner.tick().await
    }
}

impl Drop for ClipboardPoller {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.token.cancel();
        }
    }
}

impl PollerInner {
    async fn tick(&self) -> TickOutcome {
        {
            let mut state = self.state.lock();
            if state.paused {
                return TickOutcome::Paused;
            }
            let current = self.port.current_version();
            if state.skip_next_check {
                state.skip_next_check = false;
                state.last_seen = current;
                return TickOutcome::Resynced;
            }
            if current == state.last_seen {
                return TickOutcome::Unchanged;
            }
            state.last_seen = current;
        }

        let snapshot = self.port.read_snapshot();
        let settings = self.settings.capture();
        match self.classifier.classify(&snapshot, &settings).await {
            Classification::Capture(candidate) => {
                // SQLite calls block; keep them off the runtime workers
                let store = Arc::clone(&self.store);
                match tokio::task::spawn_blocking(move || store.insert_or_touch(candidate)).await {
                    Ok(Ok(outcome)) => TickOutcome::Captured(outcome),
                    Ok(Err(e)) => TickOutcome::Failed(e),
                    Err(e) => {
                        warn!("Capture task failed: {}", e);
                        TickOutcome::Failed(PestoError::StoreWriteFailed(e.to_string()))
                    }
                }
            }
            Classification::Discard(reason) => TickOutcome::Discarded(reason),
            Classification::Nothing => TickOutcome::NothingToCapture,
        }
    }
}
