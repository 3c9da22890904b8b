//! Change notifications fanned out to the presentation layer.

use tokio::sync::broadcast;

use crate::models::EntryId;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryEvent {
    /// A new entry was stored
    EntryCaptured { id: EntryId },
    /// An existing entry was moved to the top
    EntryTouched { id: EntryId },
    /// The stored list changed in some other way (pin, edit, delete, retention)
    StoreChanged,
    SelectionChanged { index: Option<usize> },
    PausedChanged(bool),
    /// A recoverable failure the UI should surface
    ErrorRaised(String),
}

/// Multi-consumer event channel. Slow subscribers lag rather than block senders.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<HistoryEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub fn send(&self, event: HistoryEvent) {
        // No subscribers is not an error
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HistoryEvent> {
        self.sender.subscribe()
    }
}
