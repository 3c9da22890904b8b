//! Selection, search and paste orchestration for the history list.
//!
//! Holds the last successfully loaded list. A failed reload leaves it in
//! place so the presentation layer keeps showing something sensible.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::debounce::Debouncer;
use crate::events::{EventBus, HistoryEvent};
use crate::interface::{PasteOutcome, PestoError};
use crate::models::{EntryId, HistoryEntry};
use crate::pasteboard::{representations_for, PasteboardPort};
use crate::settings::PasteSettings;
use crate::store::HistoryStore;

pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(50);

/// Time for the history window to give focus back before the keystroke
pub const PASTE_KEYSTROKE_DELAY: Duration = Duration::from_millis(150);

#[derive(Default)]
struct SelectionState {
    selected: Option<usize>,
    query: String,
    show_pinned_only: bool,
    items: Vec<HistoryEntry>,
}

struct SelectionInner {
    store: Arc<HistoryStore>,
    port: Arc<dyn PasteboardPort>,
    events: EventBus,
    runtime: Handle,
    state: Mutex<SelectionState>,
}

pub struct SelectionController {
    inner: Arc<SelectionInner>,
    debouncer: Debouncer,
}

impl SelectionController {
    pub fn new(
        store: Arc<HistoryStore>,
        port: Arc<dyn PasteboardPort>,
        events: EventBus,
        runtime: Handle,
    ) -> Self {
        let debouncer = Debouncer::new(SEARCH_DEBOUNCE, runtime.clone());
        Self {
            inner: Arc::new(SelectionInner {
                store,
                port,
                events,
                runtime,
                state: Mutex::new(SelectionState::default()),
            }),
            debouncer,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // State
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn selected_index(&self) -> Option<usize> {
        self.inner.state.lock().selected
    }

    pub fn selected_entry(&self) -> Option<HistoryEntry> {
        let state = self.inner.state.lock();
        state.selected.and_then(|i| state.items.get(i).cloned())
    }

    /// The list as last loaded, newest first
    pub fn visible_items(&self) -> Vec<HistoryEntry> {
        self.inner.state.lock().items.clone()
    }

    pub fn query(&self) -> String {
        self.inner.state.lock().query.clone()
    }

    /// Select a row directly, e.g. on hover or click
    pub fn select(&self, index: Option<usize>) {
        let mut state = self.inner.state.lock();
        let index = index.filter(|i| *i < state.items.len());
        self.inner.set_selected(&mut state, index);
    }

    /// Step the selection by `delta` rows.
    ///
    /// From no selection, moving down selects the first row and moving up the
    /// last. Steps that would leave the list are ignored.
    pub fn move_selection(&self, delta: isize) {
        let mut state = self.inner.state.lock();
        let len = state.items.len();
        if len == 0 {
            return;
        }
        let next = match state.selected {
            None if delta > 0 => 0,
            None => len - 1,
            Some(current) => {
                let Some(target) = (current as isize).checked_add(delta) else {
                    return;
                };
                if target < 0 || target >= len as isize {
                    return;
                }
                target as usize
            }
        };
        self.inner.set_selected(&mut state, Some(next));
    }

    /// Keep the selection inside the list after it shrank
    pub fn on_list_changed(&self) {
        let mut state = self.inner.state.lock();
        self.inner.clamp(&mut state);
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Loading
    // ─────────────────────────────────────────────────────────────────────────────

    /// Reload with the current query and filter, keeping the selection position
    pub fn refresh(&self) -> Result<(), PestoError> {
        self.inner.refresh()
    }

    /// Update the search query. The search runs once typing settles.
    pub fn set_query(&self, query: impl Into<String>) {
        let query = query.into();
        self.inner.state.lock().query = query.clone();

        let inner = Arc::clone(&self.inner);
        self.debouncer.schedule(async move {
            inner.apply_query(&query);
        });
    }

    pub fn set_show_pinned_only(&self, show_pinned_only: bool) -> Result<(), PestoError> {
        self.inner.state.lock().show_pinned_only = show_pinned_only;
        self.inner.refresh()
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Actions
    // ─────────────────────────────────────────────────────────────────────────────

    /// Put an entry back on the clipboard with all its representations
    pub fn copy(&self, id: EntryId) -> Result<(), PestoError> {
        let entry = self.inner.store.get(id)?;
        self.inner.port.write(&representations_for(&entry, false))?;
        self.inner.store.touch(id)?;
        debug!(%id, "Copied entry to clipboard");
        self.inner.refresh_after_write();
        Ok(())
    }

    /// Put an entry on the clipboard and paste it into the previous app
    pub fn paste(&self, id: EntryId, as_plain_text: bool) -> Result<PasteOutcome, PestoError> {
        let entry = self.inner.store.get(id)?;
        self.inner.port.write(&representations_for(&entry, as_plain_text))?;
        self.inner.store.touch(id)?;
        {
            let mut state = self.inner.state.lock();
            self.inner.set_selected(&mut state, None);
        }

        // The clipboard already holds the entry, so the keystroke goes ahead
        // whatever happens to the list reload below
        let outcome = if self.inner.port.has_permission() {
            let port = Arc::clone(&self.inner.port);
            self.inner.runtime.spawn(async move {
                tokio::time::sleep(PASTE_KEYSTROKE_DELAY).await;
                port.inject_paste_keystroke();
            });
            info!(%id, as_plain_text, "Pasting entry");
            PasteOutcome::KeystrokeScheduled
        } else {
            warn!("Paste keystroke skipped: input permission not granted");
            PasteOutcome::PermissionDenied
        };

        self.inner.refresh_after_write();
        Ok(outcome)
    }

    /// Paste the selected entry. None when nothing is selected.
    pub fn paste_selected(&self, as_plain_text: bool) -> Result<Option<PasteOutcome>, PestoError> {
        match self.selected_entry() {
            Some(entry) => self.paste(entry.id, as_plain_text).map(Some),
            None => Ok(None),
        }
    }

    /// Quick paste by row. None when the row does not exist.
    pub fn paste_at_index(&self, index: usize, as_plain_text: bool) -> Result<Option<PasteOutcome>, PestoError> {
        let entry = {
            let mut state = self.inner.state.lock();
            let Some(entry) = state.items.get(index).cloned() else {
                return Ok(None);
            };
            self.inner.set_selected(&mut state, Some(index));
            entry
        };
        self.paste(entry.id, as_plain_text).map(Some)
    }

    /// Act on a row the way the user configured: paste it, or only copy it.
    /// Returns None when the entry was copied.
    pub fn activate(&self, index: usize, settings: &PasteSettings) -> Result<Option<PasteOutcome>, PestoError> {
        let entry = {
            let mut state = self.inner.state.lock();
            let entry = state
                .items
                .get(index)
                .cloned()
                .ok_or_else(|| PestoError::InvalidInput(format!("no row at index {}", index)))?;
            self.inner.set_selected(&mut state, Some(index));
            entry
        };

        if settings.paste_automatically {
            self.paste(entry.id, settings.plain_text_mode).map(Some)
        } else {
            self.copy(entry.id).map(|_| None)
        }
    }

    /// Delete the selected entry. Returns false when nothing is selected.
    pub fn delete_selected(&self) -> Result<bool, PestoError> {
        let Some(entry) = self.selected_entry() else {
            return Ok(false);
        };
        self.inner.store.delete(entry.id)?;
        self.inner.refresh()?;
        Ok(true)
    }
}

impl SelectionInner {
    fn set_selected(&self, state: &mut SelectionState, index: Option<usize>) {
        if state.selected != index {
            state.selected = index;
            self.events.send(HistoryEvent::SelectionChanged { index });
        }
    }

    fn clamp(&self, state: &mut SelectionState) {
        let len = state.items.len();
        let clamped = match state.selected {
            Some(_) if len == 0 => None,
            Some(i) if i >= len => Some(len - 1),
            other => other,
        };
        self.set_selected(state, clamped);
    }

    fn load(&self, query: &str, show_pinned_only: bool) -> Result<Vec<HistoryEntry>, PestoError> {
        let mut items = self.store.search(query)?;
        if show_pinned_only {
            items.retain(|e| e.pinned);
        }
        Ok(items)
    }

    fn refresh(&self) -> Result<(), PestoError> {
        let (query, show_pinned_only) = {
            let state = self.state.lock();
            (state.query.clone(), state.show_pinned_only)
        };
        let items = self.load(&query, show_pinned_only)?;

        let mut state = self.state.lock();
        state.items = items;
        self.clamp(&mut state);
        Ok(())
    }

    /// Reload after a clipboard write. The store records the failure and the
    /// previous list stays on screen.
    fn refresh_after_write(&self) {
        if let Err(e) = self.refresh() {
            warn!("Keeping previous list after failed reload: {}", e);
        }
    }

    /// Run a settled query. Stale queries are dropped.
    fn apply_query(&self, query: &str) {
        let show_pinned_only = {
            let state = self.state.lock();
            if state.query != query {
                return;
            }
            state.show_pinned_only
        };

        let items = match self.load(query, show_pinned_only) {
            Ok(items) => items,
            Err(e) => {
                debug!("Keeping previous results after failed search: {}", e);
                return;
            }
        };

        let mut state = self.state.lock();
        if state.query != query {
            return;
        }
        state.items = items;
        if query.is_empty() {
            self.clamp(&mut state);
        } else {
            self.set_selected(&mut state, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pasteboard::MemoryPasteboard;
    use crate::settings::SharedSettings;

    fn controller(texts: &[&str]) -> (SelectionController, Arc<HistoryStore>, Arc<MemoryPasteboard>) {
        let store = Arc::new(HistoryStore::open_in_memory().unwrap());
        for t in texts {
            store.insert_text(t).unwrap();
        }
        let port = Arc::new(MemoryPasteboard::new());
        let controller = SelectionController::new(
            Arc::clone(&store),
            port.clone(),
            EventBus::new(),
            Handle::current(),
        );
        controller.refresh().unwrap();
        (controller, store, port)
    }

    #[tokio::test]
    async fn test_move_selection_from_unset() {
        let (c, _, _) = controller(&["a", "b", "c"]);
        assert_eq!(c.selected_index(), None);
        c.move_selection(1);
        assert_eq!(c.selected_index(), Some(0));

        c.select(None);
        c.move_selection(-1);
        assert_eq!(c.selected_index(), Some(2));
    }

    #[tokio::test]
    async fn test_move_selection_stays_in_bounds() {
        let (c, _, _) = controller(&["a", "b"]);
        c.move_selection(1);
        c.move_selection(-1);
        assert_eq!(c.selected_index(), Some(0));
        c.move_selection(1);
        c.move_selection(1);
        assert_eq!(c.selected_index(), Some(1));
        c.move_selection(5);
        assert_eq!(c.selected_index(), Some(1));
    }

    #[tokio::test]
    async fn test_move_selection_extreme_deltas() {
        let (c, _, _) = controller(&["a", "b", "c"]);
        c.select(Some(1));
        c.move_selection(isize::MAX);
        assert_eq!(c.selected_index(), Some(1));
        c.move_selection(isize::MIN);
        assert_eq!(c.selected_index(), Some(1));

        c.select(Some(2));
        c.move_selection(isize::MAX);
        assert_eq!(c.selected_index(), Some(2));
        c.move_selection(-2);
        assert_eq!(c.selected_index(), Some(0));
    }

    #[tokio::test]
    async fn test_move_selection_on_empty_list() {
        let (c, _, _) = controller(&[]);
        c.move_selection(1);
        assert_eq!(c.selected_index(), None);
    }

    #[tokio::test]
    async fn test_list_shrink_clamps_selection() {
        let (c, store, _) = controller(&["a", "b", "c"]);
        c.select(Some(2));
        let oldest = c.visible_items()[2].id;
        store.delete(oldest).unwrap();
        c.refresh().unwrap();
        assert_eq!(c.selected_index(), Some(1));

        store.clear(false).unwrap();
        c.refresh().unwrap();
        assert_eq!(c.selected_index(), None);
    }

    #[tokio::test]
    async fn test_copy_touches_and_keeps_selection() {
        let (c, _, port) = controller(&["old", "new"]);
        c.select(Some(1));
        let old = c.visible_items()[1].id;

        c.copy(old).unwrap();
        assert_eq!(c.visible_items()[0].id, old);
        assert_eq!(c.selected_index(), Some(1));
        assert_eq!(port.writes().len(), 1);
        assert_eq!(port.keystrokes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paste_schedules_keystroke() {
        let (c, _, port) = controller(&["x"]);
        c.select(Some(0));
        let id = c.visible_items()[0].id;

        assert_eq!(c.paste(id, false).unwrap(), PasteOutcome::KeystrokeScheduled);
        assert_eq!(c.selected_index(), None);
        assert_eq!(port.keystrokes(), 0);

        tokio::time::sleep(PASTE_KEYSTROKE_DELAY + Duration::from_millis(10)).await;
        assert_eq!(port.keystrokes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paste_without_permission() {
        let (c, _, port) = controller(&["x"]);
        port.set_permission(false);
        let id = c.visible_items()[0].id;

        assert_eq!(c.paste(id, false).unwrap(), PasteOutcome::PermissionDenied);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(port.keystrokes(), 0);
        assert_eq!(port.writes().len(), 1);
    }

    /// Controller over an on-disk database holding one valid entry and one
    /// row that cannot be loaded, so every list reload fails
    fn controller_with_unreadable_row(
        dir: &tempfile::TempDir,
    ) -> (SelectionController, Arc<HistoryStore>, Arc<MemoryPasteboard>, EntryId) {
        let path = dir.path().join("history.sqlite");
        let db = crate::database::Database::open(&path).unwrap();
        let store = Arc::new(HistoryStore::new(Arc::new(db), SharedSettings::default(), EventBus::new()).unwrap());
        let id = store.insert_text("good").unwrap().id();

        let raw = rusqlite::Connection::open(&path).unwrap();
        raw.execute(
            "INSERT INTO entries (id, kind, fingerprint, pinned, createdAt) VALUES ('not-an-id', 'bogus', 'x', 0, 0)",
            [],
        )
        .unwrap();

        let port = Arc::new(MemoryPasteboard::new());
        let controller = SelectionController::new(
            Arc::clone(&store),
            port.clone(),
            EventBus::new(),
            Handle::current(),
        );
        (controller, store, port, id)
    }

    #[tokio::test(start_paused = true)]
    async fn test_paste_survives_failed_reload() {
        let dir = tempfile::tempdir().unwrap();
        let (c, store, port, id) = controller_with_unreadable_row(&dir);
        assert!(c.refresh().is_err());

        assert_eq!(c.paste(id, false).unwrap(), PasteOutcome::KeystrokeScheduled);
        assert_eq!(port.writes().len(), 1);
        assert!(matches!(store.last_error(), Some(PestoError::StoreReadFailed(_))));

        tokio::time::sleep(PASTE_KEYSTROKE_DELAY + Duration::from_millis(10)).await;
        assert_eq!(port.keystrokes(), 1);
    }

    #[tokio::test]
    async fn test_copy_survives_failed_reload() {
        let dir = tempfile::tempdir().unwrap();
        let (c, store, port, id) = controller_with_unreadable_row(&dir);

        store.clear_error();
        c.copy(id).unwrap();
        assert_eq!(port.writes().len(), 1);
        assert!(store.last_error().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounced_query() {
        let (c, _, _) = controller(&["apple", "banana", "apricot"]);
        c.select(Some(0));

        c.set_query("a");
        c.set_query("ap");
        assert_eq!(c.visible_items().len(), 3);

        tokio::time::sleep(SEARCH_DEBOUNCE + Duration::from_millis(10)).await;
        let texts: Vec<_> = c.visible_items().iter().map(|e| e.display_text()).collect();
        assert_eq!(texts, vec!["apricot", "apple"]);
        assert_eq!(c.selected_index(), None);

        c.move_selection(1);
        c.set_query("");
        tokio::time::sleep(SEARCH_DEBOUNCE + Duration::from_millis(10)).await;
        assert_eq!(c.visible_items().len(), 3);
        assert_eq!(c.selected_index(), Some(0));
    }

    #[tokio::test]
    async fn test_pinned_only_filter() {
        let (c, store, _) = controller(&["a", "b"]);
        let a = c.visible_items()[1].id;
        store.toggle_pin(a).unwrap();

        c.set_show_pinned_only(true).unwrap();
        assert_eq!(c.visible_items().iter().map(|e| e.id).collect::<Vec<_>>(), vec![a]);
        c.set_show_pinned_only(false).unwrap();
        assert_eq!(c.visible_items().len(), 2);
    }

    #[tokio::test]
    async fn test_activate_copies_or_pastes() {
        let (c, _, port) = controller(&["a", "b"]);

        assert_eq!(c.activate(1, &PasteSettings::default()).unwrap(), None);
        assert_eq!(port.writes().len(), 1);

        let settings = PasteSettings { paste_automatically: true, plain_text_mode: true };
        assert_eq!(c.activate(0, &settings).unwrap(), Some(PasteOutcome::KeystrokeScheduled));

        assert!(matches!(c.activate(9, &settings), Err(PestoError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_paste_at_index_out_of_range() {
        let (c, _, port) = controller(&["a"]);
        assert_eq!(c.paste_at_index(3, false).unwrap(), None);
        assert!(port.writes().is_empty());
        assert!(c.paste_at_index(0, false).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_selected() {
        let (c, store, _) = controller(&["a", "b"]);
        assert!(!c.delete_selected().unwrap());
        c.select(Some(1));
        assert!(c.delete_selected().unwrap());
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(c.selected_index(), Some(0));
    }

    #[tokio::test]
    async fn test_selection_events() {
        let (c, _, _) = controller(&["a", "b"]);
        let mut rx = c.inner.events.subscribe();
        c.move_selection(1);
        c.move_selection(1);
        c.move_selection(1);
        assert_eq!(rx.recv().await.unwrap(), HistoryEvent::SelectionChanged { index: Some(0) });
        assert_eq!(rx.recv().await.unwrap(), HistoryEvent::SelectionChanged { index: Some(1) });
        assert!(rx.try_recv().is_err());
    }
}
