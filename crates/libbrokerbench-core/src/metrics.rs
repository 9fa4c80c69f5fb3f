//! Thread-safe per-backend metrics aggregation

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use hdrhistogram::Histogram;

use crate::error::Result;
use crate::export::MetricsLog;
use crate::types::{BackendMetrics, LatencySummary};

/// Running statistics for every backend, plus the durable trail of updates.
///
/// Entries are created on a backend's first `record` and live for the life of
/// the aggregator. Writers to the same backend are serialized so that the
/// counter, the published snapshot and the log row always agree; readers only
/// touch the published snapshot and never wait on the log.
pub struct MetricsAggregator {
    backends: DashMap<String, Arc<BackendEntry>>,
    log: MetricsLog,
}

struct BackendEntry {
    message_count: AtomicU64,
    /// Serializes writers; holds the instant of the first record
    writer: Mutex<Option<Instant>>,
    latest: RwLock<BackendMetrics>,
    latencies: Mutex<Option<Histogram<u64>>>,
}

impl BackendEntry {
    fn new(broker: &str) -> Self {
        Self {
            message_count: AtomicU64::new(0),
            writer: Mutex::new(None),
            latest: RwLock::new(BackendMetrics::empty(broker)),
            // 1ms to 1 hour, 3 significant figures
            latencies: Mutex::new(Histogram::new_with_bounds(1, 3_600_000, 3).ok()),
        }
    }
}

impl MetricsAggregator {
    pub fn new(log: MetricsLog) -> Self {
        Self {
            backends: DashMap::new(),
            log,
        }
    }

    fn entry(&self, backend: &str) -> Arc<BackendEntry> {
        if let Some(entry) = self.backends.get(backend) {
            return Arc::clone(entry.value());
        }
        let entry = self
            .backends
            .entry(backend.to_string())
            .or_insert_with(|| Arc::new(BackendEntry::new(backend)));
        Arc::clone(entry.value())
    }

    /// Record one successful send and append the resulting row to the log.
    ///
    /// Returns the snapshot that was published. An error means the metrics
    /// trail could not be written; the backend's statistics are then left
    /// exactly as they were.
    pub fn record(
        &self,
        backend: &str,
        latency_ms: u64,
        memory_usage: f64,
        cpu_usage: f64,
    ) -> Result<BackendMetrics> {
        let entry = self.entry(backend);
        let mut started = entry.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let now = Instant::now();
        let first = started.unwrap_or(now);
        let count = entry.message_count.load(Ordering::Acquire) + 1;

        let snapshot = BackendMetrics {
            broker: backend.to_string(),
            message_count: count,
            throughput: throughput(count, now.saturating_duration_since(first)),
            latency: latency_ms as f64,
            memory_usage,
            cpu_usage,
            timestamp: Utc::now(),
        };

        // Row first: nothing is published unless it is on the trail. Holding
        // the writer lock keeps one backend's rows in count order.
        self.log.append(&snapshot)?;

        *started = Some(first);
        entry.message_count.store(count, Ordering::Release);
        *entry.latest.write().unwrap_or_else(PoisonError::into_inner) = snapshot.clone();
        if let Some(hist) = entry
            .latencies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            hist.saturating_record(latency_ms);
        }
        drop(started);

        Ok(snapshot)
    }

    /// Latest snapshot, or `None` if nothing has been recorded for `backend`
    pub fn get(&self, backend: &str) -> Option<BackendMetrics> {
        let entry = self.backends.get(backend).map(|e| Arc::clone(e.value()))?;
        let latest = entry.latest.read().unwrap_or_else(PoisonError::into_inner);
        if latest.message_count == 0 {
            None
        } else {
            Some(latest.clone())
        }
    }

    /// Backends with at least one record, sorted by name
    pub fn backends(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .backends
            .iter()
            .filter(|e| e.value().message_count.load(Ordering::Acquire) > 0)
            .map(|e| e.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Latency percentiles over every recorded send of `backend`
    pub fn latency_summary(&self, backend: &str) -> Option<LatencySummary> {
        let entry = self.backends.get(backend).map(|e| Arc::clone(e.value()))?;
        let guard = entry.latencies.lock().unwrap_or_else(PoisonError::into_inner);
        let hist = guard.as_ref()?;
        if hist.len() == 0 {
            return None;
        }
        Some(LatencySummary {
            samples: hist.len(),
            p50_ms: hist.value_at_quantile(0.50),
            p95_ms: hist.value_at_quantile(0.95),
            p99_ms: hist.value_at_quantile(0.99),
            max_ms: hist.max(),
        })
    }

    pub fn log(&self) -> &MetricsLog {
        &self.log
    }
}

/// Messages per second over `elapsed`; 0 when no time has passed
pub fn throughput(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    let rate = count as f64 / secs;
    if rate.is_finite() {
        rate
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BenchError;
    use tempfile::{tempdir, TempDir};

    fn aggregator() -> (TempDir, MetricsAggregator) {
        let dir = tempdir().unwrap();
        let log = MetricsLog::create(&dir.path().join("metrics.csv"), false).unwrap();
        (dir, MetricsAggregator::new(log))
    }

    #[test]
    fn test_unknown_backend_is_absent() {
        let (_dir, agg) = aggregator();
        assert!(agg.get("kafka").is_none());
        assert!(agg.latency_summary("kafka").is_none());
        assert!(agg.backends().is_empty());
    }

    #[test]
    fn test_first_record_reports_zero_throughput() {
        let (_dir, agg) = aggregator();
        let first = agg.record("kafka", 4, 100.0, 5.0).unwrap();
        assert_eq!(first.message_count, 1);
        assert_eq!(first.throughput, 0.0);
        assert_eq!(first.latency, 4.0);
    }

    #[test]
    fn test_record_overwrites_latest_values() {
        let (_dir, agg) = aggregator();
        agg.record("rabbitmq", 10, 100.0, 5.0).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        agg.record("rabbitmq", 3, 110.0, 7.5).unwrap();

        let m = agg.get("rabbitmq").unwrap();
        assert_eq!(m.message_count, 2);
        assert_eq!(m.latency, 3.0);
        assert_eq!(m.memory_usage, 110.0);
        assert_eq!(m.cpu_usage, 7.5);
        assert!(m.throughput > 0.0 && m.throughput.is_finite());
        // 2 messages over at least 20ms
        assert!(m.throughput <= 100.0);
    }

    #[test]
    fn test_backends_are_independent() {
        let (_dir, agg) = aggregator();
        agg.record("kafka", 1, 0.0, 0.0).unwrap();
        agg.record("kafka", 1, 0.0, 0.0).unwrap();
        agg.record("rabbitmq", 1, 0.0, 0.0).unwrap();

        assert_eq!(agg.get("kafka").unwrap().message_count, 2);
        assert_eq!(agg.get("rabbitmq").unwrap().message_count, 1);
        assert_eq!(agg.backends(), vec!["kafka", "rabbitmq"]);
        assert_eq!(agg.log().rows(), 3);
    }

    #[test]
    fn test_latency_summary() {
        let (_dir, agg) = aggregator();
        for ms in 1..=100 {
            agg.record("kafka", ms, 0.0, 0.0).unwrap();
        }
        let summary = agg.latency_summary("kafka").unwrap();
        assert_eq!(summary.samples, 100);
        assert_eq!(summary.p50_ms, 50);
        assert_eq!(summary.max_ms, 100);
        assert!(summary.p95_ms >= 95 && summary.p99_ms >= 99);
    }

    #[test]
    fn test_failed_log_write_leaves_state_untouched() {
        let (dir, agg) = aggregator();
        agg.record("kafka", 5, 100.0, 1.0).unwrap();
        agg.log().poison_writer();

        let err = agg.record("kafka", 9, 200.0, 2.0).unwrap_err();
        assert!(matches!(err, BenchError::MetricsLog(_)));

        let m = agg.get("kafka").unwrap();
        assert_eq!(m.message_count, 1);
        assert_eq!(m.latency, 5.0);
        assert_eq!(m.memory_usage, 100.0);
        assert_eq!(agg.latency_summary("kafka").unwrap().samples, 1);
        assert_eq!(agg.log().rows(), 1);

        // A backend that never made it onto the trail stays unknown
        assert!(agg.record("rabbitmq", 1, 0.0, 0.0).is_err());
        assert!(agg.get("rabbitmq").is_none());
        assert_eq!(agg.backends(), vec!["kafka"]);

        let content = std::fs::read_to_string(dir.path().join("metrics.csv")).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn test_throughput_edge_cases() {
        assert_eq!(throughput(10, Duration::ZERO), 0.0);
        assert_eq!(throughput(0, Duration::from_secs(1)), 0.0);
        assert_eq!(throughput(10, Duration::from_secs(2)), 5.0);
        assert!(throughput(u64::MAX, Duration::from_nanos(1)).is_finite());
    }
}
