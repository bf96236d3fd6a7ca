//! Rate-limit counters in a SQLite file.
//!
//! Every process pointed at the same file shares one set of buckets. A bucket
//! is a row keyed by (client key, window index); the increment is a single
//! upsert with `RETURNING`, so SQLite's write lock serializes concurrent
//! callers and no two of them can observe the same count.

use super::{Clock, CounterError, CounterStore, FixedWindow, RateDecision};
use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared fixed-window counters backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE rate_windows (
///     client_key   TEXT NOT NULL,
///     window_index INTEGER NOT NULL,
///     hits         INTEGER NOT NULL,
///     PRIMARY KEY (client_key, window_index)
/// );
/// ```
pub struct SqliteCounterStore {
    conn: Arc<Mutex<Connection>>,
    clock: Arc<dyn Clock>,
}

impl SqliteCounterStore {
    /// Opens (or creates) the counter database and ensures the table exists.
    pub fn new<P: AsRef<Path>>(db_path: P, clock: Arc<dyn Clock>) -> Result<Self> {
        let conn = Connection::open(db_path).context("Failed to open counter database")?;

        // Other processes may hold the write lock briefly
        conn.busy_timeout(Duration::from_secs(5))
            .context("Failed to set busy timeout")?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })
        .context("Failed to set journal mode")?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS rate_windows (
                client_key   TEXT NOT NULL,
                window_index INTEGER NOT NULL,
                hits         INTEGER NOT NULL,
                PRIMARY KEY (client_key, window_index)
            );",
        )
        .context("Failed to create rate_windows table")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            clock,
        })
    }

    /// Runs `op` against the connection on the blocking thread pool.
    ///
    /// A busy counter file can stall a statement for up to the busy timeout;
    /// that wait must not hold a runtime worker.
    async fn with_conn<T, F>(&self, op: F) -> Result<T, CounterError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| {
                CounterError::Corrupted("counter connection lock poisoned".to_string())
            })?;
            op(&*guard).map_err(|e| CounterError::Backend(e.to_string()))
        })
        .await
        .map_err(|e| CounterError::Backend(format!("spawn_blocking failed: {e}")))?
    }
}

#[async_trait]
impl CounterStore for SqliteCounterStore {
    async fn increment_and_check(
        &self,
        key: &str,
        window: Duration,
        capacity: u64,
    ) -> Result<RateDecision, CounterError> {
        let current = FixedWindow::at(self.clock.now_millis(), window);
        let key = key.to_string();

        let hits: i64 = self
            .with_conn(move |conn| {
                conn.query_row(
                    "INSERT INTO rate_windows (client_key, window_index, hits) VALUES (?1, ?2, 1)
                     ON CONFLICT(client_key, window_index) DO UPDATE SET hits = hits + 1
                     RETURNING hits",
                    params![key, current.index],
                    |row| row.get(0),
                )
            })
            .await?;

        Ok(RateDecision::from_hits(
            hits.max(0) as u64,
            capacity,
            current.reset_at_ms,
        ))
    }

    async fn purge_expired(&self, window: Duration) -> Result<usize, CounterError> {
        let current = FixedWindow::at(self.clock.now_millis(), window);
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM rate_windows WHERE window_index < ?1",
                params![current.index],
            )
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::ManualClock;

    const WINDOW: Duration = Duration::from_secs(10);

    fn in_memory_store(start_ms: i64) -> (SqliteCounterStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start_ms));
        let store = SqliteCounterStore::new(":memory:", clock.clone())
            .expect("in-memory counter store failed");
        (store, clock)
    }

    #[tokio::test]
    async fn test_admits_up_to_capacity_then_rejects() {
        let (store, _clock) = in_memory_store(500);

        for _ in 0..5 {
            assert!(store.increment_and_check("ip", WINDOW, 5).await.unwrap().admitted);
        }
        let d = store.increment_and_check("ip", WINDOW, 5).await.unwrap();
        assert!(!d.admitted);
        assert_eq!(d.remaining, 0);
        assert_eq!(d.limit, 5);
        assert_eq!(d.reset_at_ms, 10_000);
    }

    #[tokio::test]
    async fn test_new_window_gets_fresh_bucket() {
        let (store, clock) = in_memory_store(0);

        for _ in 0..6 {
            store.increment_and_check("ip", WINDOW, 5).await.unwrap();
        }
        clock.advance(WINDOW);

        let d = store.increment_and_check("ip", WINDOW, 5).await.unwrap();
        assert!(d.admitted);
        assert_eq!(d.remaining, 4);
        assert_eq!(d.reset_at_ms, 20_000);
    }

    #[tokio::test]
    async fn test_purge_expired_windows() {
        let (store, clock) = in_memory_store(0);

        store.increment_and_check("a", WINDOW, 5).await.unwrap();
        store.increment_and_check("b", WINDOW, 5).await.unwrap();
        clock.advance(WINDOW);
        store.increment_and_check("a", WINDOW, 5).await.unwrap();

        assert_eq!(store.purge_expired(WINDOW).await.unwrap(), 2);
        assert_eq!(store.purge_expired(WINDOW).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_two_handles_share_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counters.db");
        let clock = Arc::new(ManualClock::new(0));

        let first = SqliteCounterStore::new(&path, clock.clone()).unwrap();
        let second = SqliteCounterStore::new(&path, clock.clone()).unwrap();

        for _ in 0..3 {
            assert!(first.increment_and_check("ip", WINDOW, 5).await.unwrap().admitted);
        }
        for _ in 0..2 {
            assert!(second.increment_and_check("ip", WINDOW, 5).await.unwrap().admitted);
        }
        // Budget is shared: the sixth request is rejected whichever handle sees it
        assert!(!first.increment_and_check("ip", WINDOW, 5).await.unwrap().admitted);
        assert!(!second.increment_and_check("ip", WINDOW, 5).await.unwrap().admitted);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_handles_admit_exactly_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counters.db");
        let clock = Arc::new(ManualClock::new(0));

        let handles: Vec<Arc<SqliteCounterStore>> = (0..4)
            .map(|_| Arc::new(SqliteCounterStore::new(&path, clock.clone()).unwrap()))
            .collect();

        let mut tasks = Vec::new();
        for i in 0..60 {
            let store = Arc::clone(&handles[i % handles.len()]);
            tasks.push(tokio::spawn(async move {
                store.increment_and_check("burst", WINDOW, 5).await
            }));
        }

        let mut admitted = 0;
        for task in tasks {
            let decision = task.await.unwrap().expect("increment failed");
            if decision.admitted {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_locked_file_does_not_stall_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counters.db");
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(SqliteCounterStore::new(&path, clock).unwrap());

        // Another process holding the write lock
        let holder = Connection::open(&path).unwrap();
        holder.execute_batch("BEGIN IMMEDIATE;").unwrap();

        let mut pending = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            pending.push(tokio::spawn(async move {
                store.increment_and_check("ip", WINDOW, 5).await
            }));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        let started = std::time::Instant::now();
        let waited = tokio::spawn(async move { started.elapsed() }).await.unwrap();
        assert!(
            waited < Duration::from_millis(500),
            "unrelated task waited {:?}",
            waited
        );

        holder.execute_batch("COMMIT;").unwrap();
        for task in pending {
            assert!(task.await.unwrap().is_ok());
        }
    }
}
