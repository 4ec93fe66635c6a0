//! ritmo-ledger: append-only run history for scheduled tasks.
//!
//! A run record is created open when a task is dispatched and finalized
//! exactly once when it completes. The scheduler never deletes records;
//! retention and export are external concerns. `has_run_since` backs the
//! at-most-once-per-period check in the scheduler loop.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use tokio::sync::Mutex;

use ritmo_types::{Outcome, RunRecord};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Blocking task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Storage interface for the run ledger.
///
/// Implementations must keep records append-only: created open via
/// `append_start`, finalized exactly once, never mutated afterwards.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Insert an open record at dispatch time; returns its monotonic id.
    async fn append_start(&self, task_id: &str, started_at: DateTime<Utc>) -> Result<i64>;

    /// Set the terminal fields of an open record.
    async fn finalize(
        &self,
        run_id: i64,
        finished_at: DateTime<Utc>,
        outcome: Outcome,
        message: &str,
        payload: Option<serde_json::Value>,
    ) -> Result<()>;

    /// Whether any record for the task (open or finalized) started at or
    /// after `since`.
    async fn has_run_since(&self, task_id: &str, since: DateTime<Utc>) -> Result<bool>;

    /// Newest-first history, optionally filtered to one task.
    async fn recent(&self, task_id: Option<&str>, limit: usize) -> Result<Vec<RunRecord>>;
}

/// SQLite-backed run ledger.
pub struct SqliteRunStore {
    conn: Arc<Mutex<Connection>>,
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS run_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    outcome TEXT,
    message TEXT NOT NULL DEFAULT '',
    payload TEXT
);

CREATE INDEX IF NOT EXISTS idx_run_records_task_started
    ON run_records (task_id, started_at);";

impl SqliteRunStore {
    /// Open (or create) the ledger database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL keeps concurrent readers (history queries) cheap.
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.execute_batch(SCHEMA)?;

        tracing::info!("Run ledger opened: {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory ledger (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

// Timestamps are stored as fixed-width RFC 3339 so that string comparison
// in SQL matches chronological order.
fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        task_id: row.get(1)?,
        started_at: row
            .get::<_, String>(2)?
            .parse()
            .unwrap_or_else(|_| Utc::now()),
        finished_at: row
            .get::<_, Option<String>>(3)?
            .and_then(|s| s.parse().ok()),
        outcome: row
            .get::<_, Option<String>>(4)?
            .and_then(|s| match s.as_str() {
                "success" => Some(Outcome::Success),
                "failure" => Some(Outcome::Failure),
                _ => None,
            }),
        message: row.get(5)?,
        payload: row
            .get::<_, Option<String>>(6)?
            .and_then(|s| serde_json::from_str(&s).ok()),
    })
}

#[async_trait]
impl RunStore for SqliteRunStore {
    async fn append_start(&self, task_id: &str, started_at: DateTime<Utc>) -> Result<i64> {
        let conn = self.conn.clone();
        let task_id = task_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<i64> {
            let conn = conn.blocking_lock();
            conn.execute(
                "INSERT INTO run_records (task_id, started_at) VALUES (?1, ?2)",
                rusqlite::params![task_id, ts(started_at)],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await?
    }

    async fn finalize(
        &self,
        run_id: i64,
        finished_at: DateTime<Utc>,
        outcome: Outcome,
        message: &str,
        payload: Option<serde_json::Value>,
    ) -> Result<()> {
        let conn = self.conn.clone();
        let message = message.to_string();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = conn.blocking_lock();
            // The finished_at guard keeps finalized records immutable.
            conn.execute(
                "UPDATE run_records
                 SET finished_at = ?2, outcome = ?3, message = ?4, payload = ?5
                 WHERE id = ?1 AND finished_at IS NULL",
                rusqlite::params![
                    run_id,
                    ts(finished_at),
                    outcome.as_str(),
                    message,
                    payload.map(|p| p.to_string()),
                ],
            )?;
            Ok(())
        })
        .await?
    }

    async fn has_run_since(&self, task_id: &str, since: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn.clone();
        let task_id = task_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<bool> {
            let conn = conn.blocking_lock();
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM run_records WHERE task_id = ?1 AND started_at >= ?2",
                rusqlite::params![task_id, ts(since)],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
        .await?
    }

    async fn recent(&self, task_id: Option<&str>, limit: usize) -> Result<Vec<RunRecord>> {
        let conn = self.conn.clone();
        let task_id = task_id.map(String::from);
        tokio::task::spawn_blocking(move || -> Result<Vec<RunRecord>> {
            let conn = conn.blocking_lock();
            let records = match task_id {
                Some(task_id) => {
                    let mut stmt = conn.prepare(
                        "SELECT id, task_id, started_at, finished_at, outcome, message, payload
                         FROM run_records WHERE task_id = ?1
                         ORDER BY id DESC LIMIT ?2",
                    )?;
                    let rows = stmt
                        .query_map(rusqlite::params![task_id, limit as i64], row_to_record)?;
                    rows.collect::<std::result::Result<Vec<_>, _>>()?
                }
                None => {
                    let mut stmt = conn.prepare(
                        "SELECT id, task_id, started_at, finished_at, outcome, message, payload
                         FROM run_records
                         ORDER BY id DESC LIMIT ?1",
                    )?;
                    let rows = stmt.query_map(rusqlite::params![limit as i64], row_to_record)?;
                    rows.collect::<std::result::Result<Vec<_>, _>>()?
                }
            };
            Ok(records)
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 4, h, mi, s).unwrap()
    }

    #[tokio::test]
    async fn test_append_and_finalize_lifecycle() {
        let store = SqliteRunStore::open_in_memory().unwrap();

        let id = store.append_start("metrics", utc(8, 0, 0)).await.unwrap();
        let open = &store.recent(None, 10).await.unwrap()[0];
        assert_eq!(open.id, id);
        assert!(open.finished_at.is_none());
        assert!(open.outcome.is_none());

        store
            .finalize(
                id,
                utc(8, 0, 5),
                Outcome::Success,
                "analyzed 42 records",
                Some(serde_json::json!({ "records": 42 })),
            )
            .await
            .unwrap();

        let done = &store.recent(Some("metrics"), 10).await.unwrap()[0];
        assert_eq!(done.outcome, Some(Outcome::Success));
        assert_eq!(done.message, "analyzed 42 records");
        assert_eq!(done.finished_at, Some(utc(8, 0, 5)));
        assert_eq!(done.payload.as_ref().unwrap()["records"], 42);
    }

    #[tokio::test]
    async fn test_finalized_records_are_immutable() {
        let store = SqliteRunStore::open_in_memory().unwrap();
        let id = store.append_start("metrics", utc(8, 0, 0)).await.unwrap();

        store
            .finalize(id, utc(8, 0, 5), Outcome::Failure, "quota exceeded", None)
            .await
            .unwrap();
        // A second finalize is a no-op.
        store
            .finalize(id, utc(9, 0, 0), Outcome::Success, "overwritten", None)
            .await
            .unwrap();

        let record = &store.recent(None, 1).await.unwrap()[0];
        assert_eq!(record.outcome, Some(Outcome::Failure));
        assert_eq!(record.message, "quota exceeded");
        assert_eq!(record.finished_at, Some(utc(8, 0, 5)));
    }

    #[tokio::test]
    async fn test_has_run_since_boundaries() {
        let store = SqliteRunStore::open_in_memory().unwrap();
        store.append_start("metrics", utc(8, 0, 0)).await.unwrap();

        // A record starting exactly at `since` counts.
        assert!(store.has_run_since("metrics", utc(8, 0, 0)).await.unwrap());
        assert!(store.has_run_since("metrics", utc(7, 0, 0)).await.unwrap());
        assert!(!store.has_run_since("metrics", utc(8, 0, 1)).await.unwrap());
        // Other tasks are unaffected.
        assert!(!store.has_run_since("backup", utc(7, 0, 0)).await.unwrap());
    }

    #[tokio::test]
    async fn test_open_records_count_toward_idempotency() {
        let store = SqliteRunStore::open_in_memory().unwrap();
        // Dispatch without completion: still blocks the period.
        store.append_start("metrics", utc(8, 0, 0)).await.unwrap();
        assert!(store.has_run_since("metrics", utc(8, 0, 0)).await.unwrap());
    }

    #[tokio::test]
    async fn test_recent_ordering_filter_and_limit() {
        let store = SqliteRunStore::open_in_memory().unwrap();
        for (task, minute) in [("a", 0), ("b", 1), ("a", 2), ("a", 3)] {
            store.append_start(task, utc(8, minute, 0)).await.unwrap();
        }

        let all = store.recent(None, 10).await.unwrap();
        assert_eq!(all.len(), 4);
        // Newest first.
        assert!(all.windows(2).all(|w| w[0].id > w[1].id));

        let a_only = store.recent(Some("a"), 2).await.unwrap();
        assert_eq!(a_only.len(), 2);
        assert!(a_only.iter().all(|r| r.task_id == "a"));
        assert_eq!(a_only[0].started_at, utc(8, 3, 0));
    }
}
