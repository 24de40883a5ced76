//! Lock-free counters plus a bounded history ring, persisted to storage on a
//! debounced interval.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::storage::StorageAdapter;

use super::record::{PeriodStats, RequestRecord};

const HISTORY_CAPACITY: usize = 10_000;
const SAVE_INTERVAL: Duration = Duration::from_secs(30);
const STORAGE_KEY: &str = "jetgate:metrics:history";

struct Counters {
    total_requests: AtomicU64,
    total_errors: AtomicU64,
    total_tool_calls: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    started_at_nanos: i64,
}

fn now_nanos() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}

/// Process-wide metrics core: atomic counters for the hot path, a bounded
/// ring buffer of recent [`RequestRecord`]s for the windowed stats queries,
/// and a background task that flushes the ring to storage periodically.
pub struct MetricsCore {
    counters: Arc<Counters>,
    history: Arc<Mutex<VecDeque<RequestRecord>>>,
}

impl Clone for MetricsCore {
    fn clone(&self) -> Self {
        Self {
            counters: self.counters.clone(),
            history: self.history.clone(),
        }
    }
}

impl MetricsCore {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        let core = Self {
            counters: Arc::new(Counters {
                total_requests: AtomicU64::new(0),
                total_errors: AtomicU64::new(0),
                total_tool_calls: AtomicU64::new(0),
                cache_hits: AtomicU64::new(0),
                cache_misses: AtomicU64::new(0),
                started_at_nanos: now_nanos(),
            }),
            history: Arc::new(Mutex::new(VecDeque::with_capacity(HISTORY_CAPACITY))),
        };
        core.spawn_save_worker(storage);
        core
    }

    fn spawn_save_worker(&self, storage: Arc<dyn StorageAdapter>) {
        let history = self.history.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SAVE_INTERVAL);
            loop {
                interval.tick().await;
                let snapshot: Vec<RequestRecord> = history.lock().await.iter().cloned().collect();
                if let Ok(blob) = serde_json::to_vec(&snapshot) {
                    if let Err(err) = storage.put(STORAGE_KEY, &blob).await {
                        log::warn!("failed to persist metrics history: {err}");
                    }
                }
            }
        });
    }

    pub fn record_request(&self, status: u16) {
        self.counters.total_requests.fetch_add(1, Ordering::Relaxed);
        if status >= 400 {
            self.counters.total_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_tool_call(&self) {
        self.counters.total_tool_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.counters.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Pushes a completed request into the bounded history ring, evicting
    /// the oldest entry on overflow.
    pub async fn push_record(&self, record: RequestRecord) {
        let mut guard = self.history.lock().await;
        if guard.len() >= HISTORY_CAPACITY {
            guard.pop_front();
        }
        guard.push_back(record);
    }

    /// Requests observed per second since process start.
    pub fn qps(&self) -> f64 {
        let elapsed_secs = (now_nanos() - self.counters.started_at_nanos) as f64 / 1e9;
        if elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.counters.total_requests.load(Ordering::Relaxed) as f64 / elapsed_secs
    }

    /// Total requests ever recorded into the history ring (bounded by
    /// [`HISTORY_CAPACITY`], so this is "records currently held", not a
    /// lifetime total).
    pub async fn total_records(&self) -> u64 {
        self.history.lock().await.len() as u64
    }

    /// Aggregate stats over the last `hours` hours of recorded history:
    /// request count, success rate, average response time, and QPS within
    /// that window specifically (not the process-wide [`Self::qps`]).
    pub async fn period_stats(&self, hours: u64) -> PeriodStats {
        let cutoff = now_nanos() - (hours as i64) * 3_600 * 1_000_000_000;
        let guard = self.history.lock().await;
        let in_window: Vec<&RequestRecord> = guard
            .iter()
            .filter(|r| r.timestamp_nanos >= cutoff)
            .collect();
        let requests = in_window.len() as u64;
        let successes = in_window.iter().filter(|r| r.status < 400).count() as u64;
        let success_rate = if requests == 0 {
            0.0
        } else {
            successes as f64 / requests as f64 * 100.0
        };
        let avg_response_time = if requests == 0 {
            0.0
        } else {
            in_window.iter().map(|r| r.duration_ms as f64).sum::<f64>() / requests as f64
        };
        let window_secs = (hours as f64) * 3_600.0;
        let qps = if window_secs <= 0.0 {
            0.0
        } else {
            requests as f64 / window_secs
        };

        PeriodStats {
            requests,
            success_rate,
            avg_response_time,
            qps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryStorage;

    #[tokio::test]
    async fn push_record_respects_the_capacity_bound() {
        let core = MetricsCore::new(Arc::new(InMemoryStorage::new()));
        for i in 0..5 {
            core.push_record(RequestRecord {
                timestamp_nanos: i,
                protocol: "openai",
                model: "gpt-4".to_string(),
                account_id: "a".to_string(),
                status: 200,
                duration_ms: 10,
                prompt_cache_hit: false,
            })
            .await;
        }
        let stats = core.period_stats(24).await;
        assert_eq!(stats.requests, 5);
    }

    #[tokio::test]
    async fn errors_are_counted_within_the_window() {
        let core = MetricsCore::new(Arc::new(InMemoryStorage::new()));
        core.push_record(RequestRecord {
            timestamp_nanos: now_nanos(),
            protocol: "anthropic",
            model: "claude-3".to_string(),
            account_id: "a".to_string(),
            status: 500,
            duration_ms: 1,
            prompt_cache_hit: false,
        })
        .await;
        let stats = core.period_stats(24).await;
        assert_eq!(stats.requests, 1);
        assert_eq!(stats.success_rate, 0.0);
    }
}
