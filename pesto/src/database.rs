//! SQLite database layer for clipboard history
//!
//! Single `entries` table keyed by id, UNIQUE on fingerprint, indexed on
//! createdAt for ordering. Uses r2d2 connection pooling to allow concurrent
//! reads without mutex blocking; every write runs in an IMMEDIATE transaction.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use thiserror::Error;

use crate::fingerprint::Fingerprint;
use crate::interface::CaptureOutcome;
use crate::models::{Candidate, EntryId, EntryKind, HistoryEntry, Payload};
use crate::retention::RetentionPolicy;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

#[derive(Debug, Error)]
#[error("unknown entry kind: {0}")]
struct UnknownKind(String);

const ENTRY_COLUMNS: &str =
    "id, kind, fingerprint, textContent, richData, imageData, filePaths, preview, pinned, createdAt";

/// Convert a stored microsecond timestamp back to DateTime<Utc>
fn from_db_micros(micros: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_micros(micros).unwrap_or_else(Utc::now)
}

fn conversion_error<E>(column: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
}

fn parse_id(s: &str) -> DatabaseResult<EntryId> {
    s.parse()
        .map_err(|e| DatabaseError::Corrupt(format!("bad entry id {:?}: {}", s, e)))
}

/// Thread-safe database wrapper using connection pooling
///
/// WAL mode enables readers to proceed without blocking each other.
/// Writers are expected to be serialized by the caller (see `HistoryStore`).
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    /// Open or create a database at the given path with connection pooling
    pub fn open<P: AsRef<Path>>(path: P) -> DatabaseResult<Self> {
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode=WAL;
                PRAGMA synchronous=NORMAL;
                PRAGMA busy_timeout=5000;
                PRAGMA cache_size=-16000;
            ",
            )?;
            Ok(())
        });

        let pool = Pool::builder().max_size(4).build(manager)?;

        let db = Self { pool };
        db.setup_schema()?;
        Ok(db)
    }

    /// Open an in-memory database (tests and tooling)
    pub fn open_in_memory() -> DatabaseResult<Self> {
        let manager = SqliteConnectionManager::memory();

        // In-memory needs a single connection that is never recycled
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)?;

        let db = Self { pool };
        db.setup_schema()?;
        Ok(db)
    }

    /// Get a connection from the pool
    fn get_conn(&self) -> DatabaseResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    fn setup_schema(&self) -> DatabaseResult<()> {
        let conn = self.get_conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                id TEXT PRIMARY KEY NOT NULL,
                kind TEXT NOT NULL,
                fingerprint TEXT NOT NULL,
                textContent TEXT,
                richData BLOB,
                imageData BLOB,
                filePaths TEXT,
                preview BLOB,
                pinned INTEGER NOT NULL DEFAULT 0,
                createdAt INTEGER NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_entries_fingerprint ON entries(fingerprint);
            CREATE INDEX IF NOT EXISTS idx_entries_created_at ON entries(createdAt);
        "#,
        )?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Row mapping
    // ─────────────────────────────────────────────────────────────────────────

    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<HistoryEntry> {
        let id_str: String = row.get(0)?;
        let id: EntryId = id_str.parse().map_err(|e| conversion_error(0, e))?;

        let kind_str: String = row.get(1)?;
        let kind = EntryKind::from_database_str(&kind_str)
            .ok_or_else(|| conversion_error(1, UnknownKind(kind_str.clone())))?;

        let fingerprint: String = row.get(2)?;
        let text: Option<String> = row.get(3)?;
        let rich: Option<Vec<u8>> = row.get(4)?;
        let image: Option<Vec<u8>> = row.get(5)?;
        let files: Option<String> = row.get(6)?;

        let payload = match kind {
            EntryKind::PlainText => Payload::PlainText {
                text: text.unwrap_or_default(),
            },
            EntryKind::RichText => Payload::RichText {
                text: text.unwrap_or_default(),
                rich: rich.unwrap_or_default(),
            },
            EntryKind::Image => Payload::Image { data: image },
            EntryKind::FileList => {
                let paths: Vec<String> = match files {
                    Some(json) => serde_json::from_str(&json).map_err(|e| conversion_error(6, e))?,
                    None => Vec::new(),
                };
                Payload::FileList {
                    paths: paths.into_iter().map(PathBuf::from).collect(),
                }
            }
        };

        Ok(HistoryEntry {
            id,
            created_at: from_db_micros(row.get(9)?),
            payload,
            preview: row.get(7)?,
            fingerprint: Fingerprint::from_stored(fingerprint),
            pinned: row.get(8)?,
        })
    }

    fn insert_entry(conn: &Connection, entry: &HistoryEntry) -> DatabaseResult<()> {
        let (text, rich, image, files) = match &entry.payload {
            Payload::PlainText { text } => (Some(text.as_str()), None, None, None),
            Payload::RichText { text, rich } => (Some(text.as_str()), Some(rich.as_slice()), None, None),
            Payload::Image { data } => (None, None, data.as_deref(), None),
            Payload::FileList { paths } => {
                let paths: Vec<String> = paths
                    .iter()
                    .map(|p| p.to_string_lossy().into_owned())
                    .collect();
                (None, None, None, Some(serde_json::to_string(&paths)?))
            }
        };

        conn.execute(
            r#"INSERT INTO entries (id, kind, fingerprint, textContent, richData, imageData, filePaths, preview, pinned, createdAt)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
            params![
                entry.id.to_string(),
                entry.kind().database_str(),
                entry.fingerprint.as_str(),
                text,
                rich,
                image,
                files,
                entry.preview,
                entry.pinned,
                entry.created_at.timestamp_micros(),
            ],
        )?;
        Ok(())
    }

    fn query_entries(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> DatabaseResult<Vec<HistoryEntry>> {
        let mut stmt = conn.prepare(sql)?;
        let entries = stmt
            .query_map(params, Self::row_to_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Evict the oldest unpinned entries past the cap with one bounded delete
    fn prune_unpinned(conn: &Connection, policy: RetentionPolicy) -> DatabaseResult<Vec<EntryId>> {
        let unpinned: i64 = conn.query_row("SELECT COUNT(*) FROM entries WHERE pinned = 0", [], |row| {
            row.get(0)
        })?;
        let excess = policy.excess(usize::try_from(unpinned).unwrap_or(0));
        if excess == 0 {
            return Ok(Vec::new());
        }
        let limit = i64::try_from(excess).unwrap_or(i64::MAX);

        let mut stmt = conn.prepare(
            "SELECT id FROM entries WHERE pinned = 0 ORDER BY createdAt ASC, id ASC LIMIT ?1",
        )?;
        let evicted = stmt
            .query_map([limit], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|id| parse_id(&id))
            .collect::<DatabaseResult<Vec<_>>>()?;

        conn.execute(
            r#"DELETE FROM entries WHERE id IN (
                   SELECT id FROM entries WHERE pinned = 0 ORDER BY createdAt ASC, id ASC LIMIT ?1
               )"#,
            [limit],
        )?;
        Ok(evicted)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the database size in bytes
    pub fn database_size(&self) -> DatabaseResult<i64> {
        let conn = self.get_conn()?;
        let page_count: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
        let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;
        Ok(page_count * page_size)
    }

    /// Get total number of entries in the database
    pub fn count_entries(&self) -> DatabaseResult<u64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Newest createdAt in microseconds, if any entry exists
    pub fn max_created_at(&self) -> DatabaseResult<Option<i64>> {
        let conn = self.get_conn()?;
        let max: Option<i64> =
            conn.query_row("SELECT MAX(createdAt) FROM entries", [], |row| row.get(0))?;
        Ok(max)
    }

    pub fn fetch_entry(&self, id: EntryId) -> DatabaseResult<Option<HistoryEntry>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM entries WHERE id = ?1", ENTRY_COLUMNS);
        let entry = conn
            .query_row(&sql, [id.to_string()], Self::row_to_entry)
            .optional()?;
        Ok(entry)
    }

    /// Find an existing entry by fingerprint (exact point lookup)
    pub fn find_by_fingerprint(&self, fingerprint: &Fingerprint) -> DatabaseResult<Option<HistoryEntry>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM entries WHERE fingerprint = ?1", ENTRY_COLUMNS);
        let entry = conn
            .query_row(&sql, [fingerprint.as_str()], Self::row_to_entry)
            .optional()?;
        Ok(entry)
    }

    /// All entries, newest first
    pub fn fetch_all(&self) -> DatabaseResult<Vec<HistoryEntry>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM entries ORDER BY createdAt DESC", ENTRY_COLUMNS);
        Self::query_entries(&conn, &sql, [])
    }

    /// Case-insensitive substring search over text bodies, newest first.
    ///
    /// Matching happens in Rust because SQLite's LIKE folds ASCII only.
    /// Image and file entries have no text body and never match.
    pub fn search_text(&self, query: &str) -> DatabaseResult<Vec<HistoryEntry>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM entries WHERE kind IN ('text', 'rtf') AND textContent IS NOT NULL ORDER BY createdAt DESC",
            ENTRY_COLUMNS
        );
        let query_lower = query.to_lowercase();
        let entries = Self::query_entries(&conn, &sql, [])?
            .into_iter()
            .filter(|entry| {
                entry
                    .text_content()
                    .is_some_and(|text| text.to_lowercase().contains(&query_lower))
            })
            .collect();
        Ok(entries)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a candidate, or bump the timestamp of the entry that already
    /// holds its fingerprint. Retention runs in the same transaction.
    pub fn insert_or_touch(
        &self,
        candidate: Candidate,
        now: DateTime<Utc>,
        policy: RetentionPolicy,
    ) -> DatabaseResult<CaptureOutcome> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM entries WHERE fingerprint = ?1",
                [candidate.fingerprint().as_str()],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(id_str) = existing {
            let id = parse_id(&id_str)?;
            tx.execute(
                "UPDATE entries SET createdAt = ?1 WHERE id = ?2",
                params![now.timestamp_micros(), id_str],
            )?;
            tx.commit()?;
            return Ok(CaptureOutcome::Touched { id });
        }

        let id = EntryId::new();
        let entry = candidate.into_entry(id, now);
        Self::insert_entry(&tx, &entry)?;
        let evicted = Self::prune_unpinned(&tx, policy)?;
        tx.commit()?;

        Ok(CaptureOutcome::Inserted { id, evicted })
    }

    /// Re-run retention outside of an insert. Returns evicted ids.
    pub fn apply_retention(&self, policy: RetentionPolicy) -> DatabaseResult<Vec<EntryId>> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let evicted = Self::prune_unpinned(&tx, policy)?;
        tx.commit()?;
        Ok(evicted)
    }

    /// Update the timestamp of an existing entry. Returns false if missing.
    pub fn update_created_at(&self, id: EntryId, now: DateTime<Utc>) -> DatabaseResult<bool> {
        let conn = self.get_conn()?;
        let changed = conn.execute(
            "UPDATE entries SET createdAt = ?1 WHERE id = ?2",
            params![now.timestamp_micros(), id.to_string()],
        )?;
        Ok(changed > 0)
    }

    /// Flip the pinned flag. Returns the new state, or None if missing.
    pub fn toggle_pinned(&self, id: EntryId) -> DatabaseResult<Option<bool>> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE entries SET pinned = NOT pinned WHERE id = ?1",
            [id.to_string()],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        let pinned: bool = tx.query_row(
            "SELECT pinned FROM entries WHERE id = ?1",
            [id.to_string()],
            |row| row.get(0),
        )?;
        tx.commit()?;
        Ok(Some(pinned))
    }

    /// Replace an entry's text, turning it into plain text.
    ///
    /// Any other entry already holding `fingerprint` is deleted first and its
    /// pin carried over. Returns the id of the merged-away entry, if any.
    pub fn update_text(
        &self,
        id: EntryId,
        text: &str,
        fingerprint: &Fingerprint,
        now: DateTime<Utc>,
    ) -> DatabaseResult<Option<EntryId>> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let collision: Option<(String, bool)> = tx
            .query_row(
                "SELECT id, pinned FROM entries WHERE fingerprint = ?1 AND id != ?2",
                params![fingerprint.as_str(), id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let (merged, merged_pinned) = match collision {
            Some((other, pinned)) => {
                tx.execute("DELETE FROM entries WHERE id = ?1", [&other])?;
                (Some(parse_id(&other)?), pinned)
            }
            None => (None, false),
        };

        tx.execute(
            r#"UPDATE entries
               SET kind = ?1, textContent = ?2, richData = NULL, fingerprint = ?3,
                   createdAt = ?4, pinned = (pinned OR ?5)
               WHERE id = ?6"#,
            params![
                EntryKind::PlainText.database_str(),
                text,
                fingerprint.as_str(),
                now.timestamp_micros(),
                merged_pinned,
                id.to_string(),
            ],
        )?;
        tx.commit()?;
        Ok(merged)
    }

    /// Delete an entry by ID. Returns false if it did not exist.
    pub fn delete_entry(&self, id: EntryId) -> DatabaseResult<bool> {
        let conn = self.get_conn()?;
        let changed = conn.execute("DELETE FROM entries WHERE id = ?1", [id.to_string()])?;
        Ok(changed > 0)
    }

    /// Delete several entries atomically. Returns how many existed.
    pub fn delete_entries(&self, ids: &[EntryId]) -> DatabaseResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut deleted = 0;
        for id in ids {
            deleted += tx.execute("DELETE FROM entries WHERE id = ?1", [id.to_string()])?;
        }
        tx.commit()?;
        Ok(deleted)
    }

    /// Delete unpinned entries, or everything when `keep_pinned` is false
    pub fn clear(&self, keep_pinned: bool) -> DatabaseResult<usize> {
        let conn = self.get_conn()?;
        let deleted = if keep_pinned {
            conn.execute("DELETE FROM entries WHERE pinned = 0", [])?
        } else {
            conn.execute("DELETE FROM entries", [])?
        };
        Ok(deleted)
    }
}
