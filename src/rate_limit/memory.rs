use super::{Clock, CounterError, CounterStore, FixedWindow, RateDecision};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

/// Hit count for one client in one window.
struct Bucket {
    window_index: i64,
    hits: u64,
}

/// In-process fixed-window counters.
///
/// Buckets are created lazily on first request. The DashMap entry lock makes
/// each increment-and-check atomic. State is per process and resets on restart.
pub struct MemoryCounterStore {
    buckets: DashMap<String, Bucket>,
    clock: Arc<dyn Clock>,
}

impl MemoryCounterStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            buckets: DashMap::new(),
            clock,
        }
    }

    /// Number of live buckets (including ones whose window has ended but not been purged).
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment_and_check(
        &self,
        key: &str,
        window: Duration,
        capacity: u64,
    ) -> Result<RateDecision, CounterError> {
        let current = FixedWindow::at(self.clock.now_millis(), window);

        let mut bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket {
                window_index: current.index,
                hits: 0,
            });

        // Rolled into a new window: start a fresh count
        if bucket.window_index != current.index {
            bucket.window_index = current.index;
            bucket.hits = 0;
        }
        bucket.hits += 1;

        Ok(RateDecision::from_hits(
            bucket.hits,
            capacity,
            current.reset_at_ms,
        ))
    }

    async fn purge_expired(&self, window: Duration) -> Result<usize, CounterError> {
        let current = FixedWindow::at(self.clock.now_millis(), window);
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| bucket.window_index >= current.index);
        Ok(before.saturating_sub(self.buckets.len()))
    }
}
