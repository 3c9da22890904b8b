//! Clipboard history store
//!
//! Owns the database, issues timestamps, serializes writers and turns every
//! mutation into a `HistoryEvent`.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::database::Database;
use crate::events::{EventBus, HistoryEvent};
use crate::fingerprint::Fingerprint;
use crate::interface::{CaptureOutcome, PestoError};
use crate::models::{Candidate, EntryId, HistoryEntry};
use crate::retention::RetentionPolicy;
use crate::settings::SharedSettings;

/// Thread-safe clipboard history store
///
/// Concurrency Model:
/// - Database uses r2d2 connection pool (concurrent reads, no mutex blocking)
/// - Writers take `write_lock`, then run in one IMMEDIATE transaction each
/// - `created_at` values are strictly increasing across all writes
pub struct HistoryStore {
    db: Arc<Database>,
    settings: SharedSettings,
    events: EventBus,
    /// Last issued timestamp in microseconds
    last_micros: AtomicI64,
    write_lock: Mutex<()>,
    last_error: Mutex<Option<PestoError>>,
}

impl HistoryStore {
    pub fn new(db: Arc<Database>, settings: SharedSettings, events: EventBus) -> Result<Self, PestoError> {
        let newest = db.max_created_at().map_err(PestoError::read)?.unwrap_or(0);
        Ok(Self {
            db,
            settings,
            events,
            last_micros: AtomicI64::new(newest),
            write_lock: Mutex::new(()),
            last_error: Mutex::new(None),
        })
    }

    /// Create a store with an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, PestoError> {
        let db = Database::open_in_memory().map_err(PestoError::read)?;
        Self::new(Arc::new(db), SharedSettings::default(), EventBus::new())
    }

    /// Next timestamp: wall clock, nudged forward when it has not advanced
    fn next_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now().timestamp_micros();
        let previous = self
            .last_micros
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now.max(last + 1)))
            .unwrap_or(now);
        let issued = now.max(previous + 1);
        DateTime::<Utc>::from_timestamp_micros(issued).unwrap_or_else(Utc::now)
    }

    fn policy(&self) -> RetentionPolicy {
        RetentionPolicy::new(self.settings.capture().max_items)
    }

    /// Record storage failures as the last error and publish them
    fn track<T>(&self, result: Result<T, PestoError>) -> Result<T, PestoError> {
        if let Err(e) = &result {
            if matches!(
                e,
                PestoError::StoreReadFailed(_) | PestoError::StoreWriteFailed(_) | PestoError::SearchFailed(_)
            ) {
                error!("History store failure: {}", e);
                *self.last_error.lock() = Some(e.clone());
                self.events.send(HistoryEvent::ErrorRaised(e.to_string()));
            }
        }
        result
    }

    /// Most recent storage failure, kept until cleared
    pub fn last_error(&self) -> Option<PestoError> {
        self.last_error.lock().clone()
    }

    pub fn clear_error(&self) {
        *self.last_error.lock() = None;
    }

    pub fn settings(&self) -> &SharedSettings {
        &self.settings
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Read Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// All entries, newest first
    pub fn fetch_all(&self) -> Result<Vec<HistoryEntry>, PestoError> {
        self.track(self.db.fetch_all().map_err(PestoError::read))
    }

    /// Case-insensitive substring search. An empty query lists everything.
    pub fn search(&self, query: &str) -> Result<Vec<HistoryEntry>, PestoError> {
        if query.is_empty() {
            return self.fetch_all();
        }
        self.track(self.db.search_text(query).map_err(PestoError::search))
    }

    pub fn get(&self, id: EntryId) -> Result<HistoryEntry, PestoError> {
        let found = self.track(self.db.fetch_entry(id).map_err(PestoError::read))?;
        found.ok_or(PestoError::NotFound(id))
    }

    pub fn count(&self) -> Result<u64, PestoError> {
        self.track(self.db.count_entries().map_err(PestoError::read))
    }

    /// Get the database size in bytes
    pub fn database_size(&self) -> i64 {
        self.db.database_size().unwrap_or(0)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Write Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Store a candidate, or move the entry with the same fingerprint to the top
    pub fn insert_or_touch(&self, candidate: Candidate) -> Result<CaptureOutcome, PestoError> {
        let kind = candidate.kind();
        let outcome = {
            let _guard = self.write_lock.lock();
            let now = self.next_timestamp();
            self.track(
                self.db
                    .insert_or_touch(candidate, now, self.policy())
                    .map_err(PestoError::write),
            )?
        };

        match &outcome {
            CaptureOutcome::Inserted { id, evicted } => {
                info!(%id, kind = kind.display_name(), evicted = evicted.len(), "Captured clipboard entry");
                self.events.send(HistoryEvent::EntryCaptured { id: *id });
            }
            CaptureOutcome::Touched { id } => {
                debug!(%id, "Duplicate capture moved to top");
                self.events.send(HistoryEvent::EntryTouched { id: *id });
            }
        }
        Ok(outcome)
    }

    /// Save user-entered text as a plain-text entry
    pub fn insert_text(&self, text: &str) -> Result<CaptureOutcome, PestoError> {
        if text.is_empty() {
            return Err(PestoError::InvalidInput("text is empty".into()));
        }
        self.insert_or_touch(Candidate::plain_text(text))
    }

    /// Move an entry to the top
    pub fn touch(&self, id: EntryId) -> Result<(), PestoError> {
        let updated = {
            let _guard = self.write_lock.lock();
            let now = self.next_timestamp();
            self.track(self.db.update_created_at(id, now).map_err(PestoError::write))?
        };
        if !updated {
            return Err(PestoError::NotFound(id));
        }
        self.events.send(HistoryEvent::EntryTouched { id });
        Ok(())
    }

    /// Flip the pin and return the new state
    pub fn toggle_pin(&self, id: EntryId) -> Result<bool, PestoError> {
        let pinned = {
            let _guard = self.write_lock.lock();
            self.track(self.db.toggle_pinned(id).map_err(PestoError::write))?
        };
        let pinned = pinned.ok_or(PestoError::NotFound(id))?;
        self.events.send(HistoryEvent::StoreChanged);
        Ok(pinned)
    }

    /// Replace the text of a text entry. Rich formatting is dropped.
    pub fn edit_text(&self, id: EntryId, text: &str) -> Result<(), PestoError> {
        if text.is_empty() {
            return Err(PestoError::InvalidInput("text is empty".into()));
        }

        let merged = {
            let _guard = self.write_lock.lock();
            let entry = self
                .track(self.db.fetch_entry(id).map_err(PestoError::read))?
                .ok_or(PestoError::NotFound(id))?;
            if !entry.kind().is_text() {
                return Err(PestoError::InvalidInput(format!(
                    "{} entries cannot be edited",
                    entry.kind().display_name()
                )));
            }

            let fingerprint = Fingerprint::of_text(text);
            let now = self.next_timestamp();
            self.track(
                self.db
                    .update_text(id, text, &fingerprint, now)
                    .map_err(PestoError::write),
            )?
        };

        if let Some(other) = merged {
            debug!(%id, merged = %other, "Edit collided with existing entry, merged");
        }
        self.events.send(HistoryEvent::StoreChanged);
        Ok(())
    }

    pub fn delete(&self, id: EntryId) -> Result<(), PestoError> {
        let deleted = {
            let _guard = self.write_lock.lock();
            self.track(self.db.delete_entry(id).map_err(PestoError::write))?
        };
        if !deleted {
            return Err(PestoError::NotFound(id));
        }
        self.events.send(HistoryEvent::StoreChanged);
        Ok(())
    }

    /// Delete several entries. Unknown ids are skipped. Returns how many were removed.
    pub fn delete_many(&self, ids: &[EntryId]) -> Result<usize, PestoError> {
        let deleted = {
            let _guard = self.write_lock.lock();
            self.track(self.db.delete_entries(ids).map_err(PestoError::write))?
        };
        if deleted > 0 {
            self.events.send(HistoryEvent::StoreChanged);
        }
        Ok(deleted)
    }

    /// Remove history, optionally keeping pinned entries
    pub fn clear(&self, keep_pinned: bool) -> Result<usize, PestoError> {
        let deleted = {
            let _guard = self.write_lock.lock();
            self.track(self.db.clear(keep_pinned).map_err(PestoError::write))?
        };
        info!(deleted, keep_pinned, "Cleared clipboard history");
        self.events.send(HistoryEvent::StoreChanged);
        Ok(deleted)
    }

    /// Re-run retention with the current `max_items`
    pub fn apply_retention(&self) -> Result<Vec<EntryId>, PestoError> {
        let evicted = {
            let _guard = self.write_lock.lock();
            self.track(self.db.apply_retention(self.policy()).map_err(PestoError::write))?
        };
        if !evicted.is_empty() {
            info!(evicted = evicted.len(), "Applied retention");
            self.events.send(HistoryEvent::StoreChanged);
        }
        Ok(evicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Payload;
    use crate::settings::CaptureSettings;

    fn store_with_limit(max_items: usize) -> HistoryStore {
        let store = HistoryStore::open_in_memory().unwrap();
        store
            .settings()
            .set_capture(CaptureSettings { max_items, ..Default::default() })
            .unwrap();
        store
    }

    fn texts(entries: &[HistoryEntry]) -> Vec<&str> {
        entries.iter().filter_map(|e| e.text_content()).collect()
    }

    #[test]
    fn test_timestamps_strictly_increase() {
        let store = HistoryStore::open_in_memory().unwrap();
        let mut previous = store.next_timestamp();
        for _ in 0..1000 {
            let next = store.next_timestamp();
            assert!(next > previous);
            previous = next;
        }
    }

    #[test]
    fn test_aba_capture_order() {
        let store = HistoryStore::open_in_memory().unwrap();
        let a = store.insert_text("A").unwrap();
        store.insert_text("B").unwrap();
        let a_again = store.insert_text("A").unwrap();

        assert!(a_again.is_duplicate());
        assert_eq!(a_again.id(), a.id());
        assert_eq!(texts(&store.fetch_all().unwrap()), vec!["A", "B"]);
    }

    #[test]
    fn test_duplicate_capture_keeps_pin() {
        let store = HistoryStore::open_in_memory().unwrap();
        let id = store.insert_text("keep").unwrap().id();
        assert!(store.toggle_pin(id).unwrap());
        store.insert_text("keep").unwrap();
        assert!(store.get(id).unwrap().pinned);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_eviction_skips_pinned() {
        let store = store_with_limit(2);
        let a = store.insert_text("A").unwrap().id();
        store.toggle_pin(a).unwrap();
        store.insert_text("B").unwrap();
        store.insert_text("C").unwrap();
        let d = store.insert_text("D").unwrap();

        match d {
            CaptureOutcome::Inserted { evicted, .. } => assert_eq!(evicted.len(), 1),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(texts(&store.fetch_all().unwrap()), vec!["D", "C", "A"]);
    }

    #[test]
    fn test_touch_moves_to_front() {
        let store = HistoryStore::open_in_memory().unwrap();
        let a = store.insert_text("A").unwrap().id();
        store.insert_text("B").unwrap();
        store.touch(a).unwrap();
        assert_eq!(texts(&store.fetch_all().unwrap()), vec!["A", "B"]);
    }

    #[test]
    fn test_missing_ids_are_not_found() {
        let store = HistoryStore::open_in_memory().unwrap();
        let ghost = EntryId::new();
        assert_eq!(store.touch(ghost), Err(PestoError::NotFound(ghost)));
        assert_eq!(store.toggle_pin(ghost), Err(PestoError::NotFound(ghost)));
        assert_eq!(store.delete(ghost), Err(PestoError::NotFound(ghost)));
        assert_eq!(store.get(ghost), Err(PestoError::NotFound(ghost)));
        assert_eq!(store.edit_text(ghost, "x"), Err(PestoError::NotFound(ghost)));
        assert!(store.last_error().is_none());
    }

    #[test]
    fn test_edit_text_rules() {
        let store = HistoryStore::open_in_memory().unwrap();
        let image = store.insert_or_touch(Candidate::image(vec![1, 2, 3], None)).unwrap().id();
        assert!(matches!(store.edit_text(image, "x"), Err(PestoError::InvalidInput(_))));

        let rich = store
            .insert_or_touch(Candidate::rich_text("bold", vec![7]))
            .unwrap()
            .id();
        assert!(matches!(store.edit_text(rich, ""), Err(PestoError::InvalidInput(_))));

        store.edit_text(rich, "plain").unwrap();
        let entry = store.get(rich).unwrap();
        assert_eq!(entry.payload, Payload::PlainText { text: "plain".into() });
        assert_eq!(entry.fingerprint, Fingerprint::of_text("plain"));
        assert_eq!(store.fetch_all().unwrap()[0].id, rich);
    }

    #[test]
    fn test_edit_into_existing_text_merges() {
        let store = HistoryStore::open_in_memory().unwrap();
        let a = store.insert_text("A").unwrap().id();
        let b = store.insert_text("B").unwrap().id();
        store.toggle_pin(b).unwrap();

        store.edit_text(a, "B").unwrap();
        let all = store.fetch_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, a);
        assert!(all[0].pinned);
    }

    #[test]
    fn test_search() {
        let store = HistoryStore::open_in_memory().unwrap();
        store.insert_text("Hello").unwrap();
        store.insert_text("world").unwrap();
        store.insert_or_touch(Candidate::image(vec![1], None)).unwrap();

        assert_eq!(texts(&store.search("hello").unwrap()), vec!["Hello"]);
        assert_eq!(store.search("").unwrap().len(), 3);
    }

    #[test]
    fn test_insert_text_rejects_empty() {
        let store = HistoryStore::open_in_memory().unwrap();
        assert!(matches!(store.insert_text(""), Err(PestoError::InvalidInput(_))));
    }

    #[test]
    fn test_apply_retention_after_lowering_limit() {
        let store = HistoryStore::open_in_memory().unwrap();
        for t in ["1", "2", "3", "4"] {
            store.insert_text(t).unwrap();
        }
        store
            .settings()
            .set_capture(CaptureSettings { max_items: 2, ..Default::default() })
            .unwrap();

        assert_eq!(store.apply_retention().unwrap().len(), 2);
        assert_eq!(texts(&store.fetch_all().unwrap()), vec!["4", "3"]);
        assert!(store.apply_retention().unwrap().is_empty());
    }

    #[test]
    fn test_delete_many_and_clear() {
        let store = HistoryStore::open_in_memory().unwrap();
        let a = store.insert_text("a").unwrap().id();
        let b = store.insert_text("b").unwrap().id();
        let c = store.insert_text("c").unwrap().id();
        store.toggle_pin(c).unwrap();

        assert_eq!(store.delete_many(&[a, EntryId::new()]).unwrap(), 1);
        assert_eq!(store.clear(true).unwrap(), 1);
        assert_eq!(store.fetch_all().unwrap()[0].id, c);
        assert!(store.get(b).is_err());
        assert_eq!(store.clear(false).unwrap(), 1);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_events_published() {
        let store = HistoryStore::open_in_memory().unwrap();
        let mut rx = store.events.subscribe();

        let id = store.insert_text("A").unwrap().id();
        store.insert_text("A").unwrap();
        store.toggle_pin(id).unwrap();

        assert_eq!(rx.recv().await.unwrap(), HistoryEvent::EntryCaptured { id });
        assert_eq!(rx.recv().await.unwrap(), HistoryEvent::EntryTouched { id });
        assert_eq!(rx.recv().await.unwrap(), HistoryEvent::StoreChanged);
    }

    #[test]
    fn test_timestamps_resume_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.sqlite");

        let newest = {
            let db = Arc::new(Database::open(&path).unwrap());
            let store = HistoryStore::new(db, SharedSettings::default(), EventBus::new()).unwrap();
            store.insert_text("x").unwrap();
            store.fetch_all().unwrap()[0].created_at
        };

        let db = Arc::new(Database::open(&path).unwrap());
        let store = HistoryStore::new(db, SharedSettings::default(), EventBus::new()).unwrap();
        assert!(store.next_timestamp() > newest);
    }
}
