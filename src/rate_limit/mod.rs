// Request admission for the lead-capture endpoints.
//
// Fixed-window counters keyed by client identifier. The counter lives behind
// `CounterStore` so the same filter runs against an in-process map or a
// shared SQLite file. Each in-scope request performs exactly one
// increment-and-check.

mod memory;
pub mod middleware;
mod sqlite;

pub use memory::MemoryCounterStore;
pub use middleware::{admission_middleware, client_identifier, AdmissionFilter};
pub use sqlite::SqliteCounterStore;

use crate::config::{CounterBackend, RateLimitConfig};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Source of "now" in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to. Used to step across window boundaries in tests.
#[derive(Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(start_millis),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }

    pub fn set(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Position of an instant within fixed windows of a given length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWindow {
    /// `floor(now / window)`
    pub index: i64,
    /// Epoch milliseconds at which the window ends
    pub reset_at_ms: i64,
}

impl FixedWindow {
    pub fn at(now_ms: i64, window: Duration) -> Self {
        let window_ms = (window.as_millis() as i64).max(1);
        let index = now_ms.div_euclid(window_ms);
        Self {
            index,
            reset_at_ms: (index + 1) * window_ms,
        }
    }
}

/// Outcome of a single increment-and-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub admitted: bool,
    /// Configured capacity
    pub limit: u64,
    /// Requests left in the current window (0 once over budget)
    pub remaining: u64,
    /// Epoch milliseconds at which the window resets
    pub reset_at_ms: i64,
}

impl RateDecision {
    /// Decide from the post-increment hit count of the current window.
    pub fn from_hits(hits: u64, capacity: u64, reset_at_ms: i64) -> Self {
        Self {
            admitted: hits <= capacity,
            limit: capacity,
            remaining: capacity.saturating_sub(hits),
            reset_at_ms,
        }
    }
}

/// Counter store errors
#[derive(Debug)]
pub enum CounterError {
    /// Backend could not be reached or the statement failed
    Backend(String),
    /// Backend state is unusable (e.g. poisoned lock)
    Corrupted(String),
}

impl std::fmt::Display for CounterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CounterError::Backend(msg) => write!(f, "counter backend error: {}", msg),
            CounterError::Corrupted(msg) => write!(f, "counter state corrupted: {}", msg),
        }
    }
}

impl std::error::Error for CounterError {}

/// Shared per-key counters with an atomic increment-and-check.
///
/// Implementations must make the increment and the read of the new count a
/// single atomic step across all concurrent callers, including callers in
/// other processes when the backend is shared.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Count one request for `key` in the current window and decide on it.
    async fn increment_and_check(
        &self,
        key: &str,
        window: Duration,
        capacity: u64,
    ) -> Result<RateDecision, CounterError>;

    /// Drop buckets of windows that have already ended. Returns how many were removed.
    async fn purge_expired(&self, window: Duration) -> Result<usize, CounterError>;
}

/// Build the counter store selected by configuration.
pub fn build_counter_store(cfg: &RateLimitConfig) -> Result<Arc<dyn CounterStore>> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store: Arc<dyn CounterStore> = match cfg.backend {
        CounterBackend::Memory => Arc::new(MemoryCounterStore::new(clock)),
        CounterBackend::Sqlite => Arc::new(
            SqliteCounterStore::new(&cfg.counter_database_path, clock).with_context(|| {
                format!(
                    "Failed to open rate-limit counter DB at {}",
                    cfg.counter_database_path
                )
            })?,
        ),
    };
    Ok(store)
}

/// Periodically purge expired buckets. Runs until the task is aborted.
pub async fn run_purge_loop(store: Arc<dyn CounterStore>, window: Duration, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        match store.purge_expired(window).await {
            Ok(0) => {}
            Ok(removed) => tracing::debug!(removed, "Purged expired rate-limit buckets"),
            Err(e) => tracing::warn!(error = %e, "Failed to purge rate-limit buckets"),
        }
    }
}
