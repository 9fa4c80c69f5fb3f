//! Benchmark driver - time-boxed, batch-at-a-time fan-out over every backend

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::adapter::SendAdapter;
use crate::config::BenchConfig;
use crate::error::{BenchError, Result};
use crate::types::Batch;

/// Lifecycle of a driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DriverState {
    #[default]
    Idle,
    Running,
    Draining,
    Stopped,
}

impl DriverState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverState::Idle => "Idle",
            DriverState::Running => "Running",
            DriverState::Draining => "Draining",
            DriverState::Stopped => "Stopped",
        }
    }
}

/// Timing parameters for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    pub test_duration: Duration,
    pub batch_pause: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            test_duration: Duration::from_secs(60),
            batch_pause: Duration::from_millis(100),
        }
    }
}

impl From<&BenchConfig> for DriverConfig {
    fn from(config: &BenchConfig) -> Self {
        Self {
            test_duration: config.duration(),
            batch_pause: config.batch_pause(),
        }
    }
}

/// Cloneable handle for stopping a run and observing its state
#[derive(Clone)]
pub struct StopHandle {
    stop_tx: Arc<watch::Sender<bool>>,
    state: Arc<Mutex<DriverState>>,
}

impl StopHandle {
    /// Request a stop. The current batch still completes.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    pub fn is_stop_requested(&self) -> bool {
        *self.stop_tx.borrow()
    }

    pub fn state(&self) -> DriverState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Totals for a completed run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub batches: u64,
    /// Send attempts across all backends
    pub payloads_dispatched: u64,
    pub succeeded: u64,
    pub failed: u64,
    #[serde(with = "serde_duration")]
    pub elapsed: Duration,
    /// True if the run ended on a stop request rather than the deadline
    pub cancelled: bool,
}

#[derive(Debug, Default, Clone, Copy)]
struct BatchTally {
    dispatched: u64,
    succeeded: u64,
    failed: u64,
}

impl BatchTally {
    fn merge(&mut self, other: BatchTally) {
        self.dispatched += other.dispatched;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
    }
}

/// Drives preloaded batches through every backend until the test duration
/// elapses or a stop is requested.
pub struct BenchmarkDriver {
    adapters: Vec<SendAdapter>,
    batches: Vec<Arc<Batch>>,
    config: DriverConfig,
    next_batch: usize,
    handle: StopHandle,
}

impl BenchmarkDriver {
    pub fn new(adapters: Vec<SendAdapter>, batches: Vec<Batch>, config: DriverConfig) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            adapters,
            batches: batches.into_iter().map(Arc::new).collect(),
            config,
            next_batch: 0,
            handle: StopHandle {
                stop_tx: Arc::new(stop_tx),
                state: Arc::new(Mutex::new(DriverState::Idle)),
            },
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> DriverState {
        self.handle.state()
    }

    fn set_state(&self, state: DriverState) {
        *self.handle.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
        debug!("Driver state: {}", state.as_str());
    }

    /// Round-robin over the preloaded batches
    fn select_batch(&mut self) -> Arc<Batch> {
        let batch = Arc::clone(&self.batches[self.next_batch]);
        self.next_batch = (self.next_batch + 1) % self.batches.len();
        batch
    }

    /// Run the benchmark to completion.
    ///
    /// Only a metrics log failure inside a send aborts the run early; it is
    /// returned after the batch in flight has been drained.
    pub async fn run(&mut self) -> Result<RunSummary> {
        if self.state() != DriverState::Idle {
            return Err(BenchError::Config("driver has already run".to_string()));
        }
        if self.batches.is_empty() {
            return Err(BenchError::Config("no batches to send".to_string()));
        }
        if self.adapters.is_empty() {
            return Err(BenchError::Config("no backends configured".to_string()));
        }

        let mut stop_rx = self.handle.stop_tx.subscribe();
        let mut summary = RunSummary::default();
        let start = Instant::now();
        self.set_state(DriverState::Running);
        info!(
            backends = self.adapters.len(),
            batches = self.batches.len(),
            "Starting performance test for {:?}",
            self.config.test_duration
        );

        let deadline = start.checked_add(self.config.test_duration);

        let outcome = loop {
            if start.elapsed() >= self.config.test_duration {
                break Ok(());
            }
            if *stop_rx.borrow() {
                summary.cancelled = true;
                break Ok(());
            }

            let batch = self.select_batch();
            let tally = match self.dispatch_batch(batch, &mut stop_rx, deadline).await {
                Ok(tally) => tally,
                Err(e) => break Err(e),
            };

            summary.batches += 1;
            summary.payloads_dispatched += tally.dispatched;
            summary.succeeded += tally.succeeded;
            summary.failed += tally.failed;
            info!(
                batch = summary.batches,
                failed = summary.failed,
                "Processed {} transactions total",
                summary.payloads_dispatched
            );

            // Stop or deadline arrived mid-batch: no pause, no next batch
            if self.state() == DriverState::Draining {
                summary.cancelled = *stop_rx.borrow();
                break Ok(());
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.batch_pause) => {}
                _ = stop_rx.wait_for(|stopped| *stopped) => {
                    summary.cancelled = true;
                    break Ok(());
                }
            }
        };

        if self.state() == DriverState::Running {
            self.set_state(DriverState::Draining);
        }
        summary.elapsed = start.elapsed();
        self.set_state(DriverState::Stopped);

        match outcome {
            Ok(()) => {
                info!(
                    cancelled = summary.cancelled,
                    "Performance test completed. Total duration: {:?}",
                    summary.elapsed
                );
                Ok(summary)
            }
            Err(e) => {
                error!("Performance test aborted after {:?}: {}", summary.elapsed, e);
                Err(e)
            }
        }
    }

    /// One task per backend; each walks the whole batch in order. Returns once
    /// every task has finished.
    ///
    /// A stop request or the deadline seen while tasks are still running moves
    /// the driver to `Draining`; the tasks are joined either way.
    async fn dispatch_batch(
        &self,
        batch: Arc<Batch>,
        stop_rx: &mut watch::Receiver<bool>,
        deadline: Option<Instant>,
    ) -> Result<BatchTally> {
        let mut tasks = JoinSet::new();
        for adapter in &self.adapters {
            let adapter = adapter.clone();
            let batch = Arc::clone(&batch);
            tasks.spawn(async move { send_batch(adapter, batch).await });
        }

        let mut tally = BatchTally::default();
        let mut fatal = None;
        let mut draining = false;
        loop {
            let joined = if draining {
                tasks.join_next().await
            } else {
                tokio::select! {
                    joined = tasks.join_next() => joined,
                    _ = stop_rx.wait_for(|stopped| *stopped) => {
                        draining = true;
                        self.set_state(DriverState::Draining);
                        continue;
                    }
                    _ = sleep_until(deadline) => {
                        draining = true;
                        self.set_state(DriverState::Draining);
                        continue;
                    }
                }
            };
            let Some(joined) = joined else {
                break;
            };

            match joined {
                Ok(Ok(backend_tally)) => tally.merge(backend_tally),
                Ok(Err(e)) => {
                    fatal.get_or_insert(e);
                }
                Err(e) => {
                    fatal.get_or_insert(BenchError::Join(e));
                }
            }
        }

        match fatal {
            Some(e) => Err(e),
            None => Ok(tally),
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

async fn send_batch(adapter: SendAdapter, batch: Arc<Batch>) -> Result<BatchTally> {
    let mut tally = BatchTally::default();
    for payload in batch.iter() {
        let outcome = adapter.send(payload).await?;
        tally.dispatched += 1;
        if outcome.success {
            tally.succeeded += 1;
        } else {
            tally.failed += 1;
        }
    }
    Ok(tally)
}

mod serde_duration {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::Backend;
    use crate::error::DispatchError;
    use crate::export::MetricsLog;
    use crate::metrics::MetricsAggregator;
    use crate::system::FixedSampler;
    use crate::types::Payload;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use serde_json::Map;
    use tempfile::tempdir;

    struct Echo(&'static str);

    #[async_trait]
    impl Backend for Echo {
        fn name(&self) -> &str {
            self.0
        }

        async fn dispatch(&self, _payload: &Payload, _body: Vec<u8>) -> std::result::Result<(), DispatchError> {
            Ok(())
        }
    }

    fn batch(prefix: &str, n: usize) -> Batch {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let payloads = (0..n)
            .map(|i| Payload::new(format!("{}-{}", prefix, i), ts, Map::new()))
            .collect();
        Batch::new(payloads).unwrap()
    }

    fn adapters(dir: &std::path::Path, names: &[&'static str]) -> (Arc<MetricsAggregator>, Vec<SendAdapter>) {
        let log = MetricsLog::create(&dir.join("metrics.csv"), false).unwrap();
        let metrics = Arc::new(MetricsAggregator::new(log));
        let sampler = Arc::new(FixedSampler::default());
        let adapters = names
            .iter()
            .map(|name| SendAdapter::new(Arc::new(Echo(*name)), Arc::clone(&metrics), sampler.clone()))
            .collect();
        (metrics, adapters)
    }

    #[test]
    fn test_round_robin_wraps() {
        let dir = tempdir().unwrap();
        let (_metrics, adapters) = adapters(dir.path(), &["a"]);
        let mut driver = BenchmarkDriver::new(
            adapters,
            vec![batch("x", 1), batch("y", 1), batch("z", 1)],
            DriverConfig::default(),
        );

        let order: Vec<String> = (0..7)
            .map(|_| driver.select_batch().payloads()[0].id().to_string())
            .collect();
        assert_eq!(order, vec!["x-0", "y-0", "z-0", "x-0", "y-0", "z-0", "x-0"]);
    }

    #[tokio::test]
    async fn test_rejects_empty_batch_set() {
        let dir = tempdir().unwrap();
        let (_metrics, adapters) = adapters(dir.path(), &["a"]);
        let mut driver = BenchmarkDriver::new(adapters, Vec::new(), DriverConfig::default());
        assert!(matches!(driver.run().await, Err(BenchError::Config(_))));
    }

    #[tokio::test]
    async fn test_runs_until_deadline() {
        let dir = tempdir().unwrap();
        let (metrics, adapters) = adapters(dir.path(), &["a", "b"]);
        let config = DriverConfig {
            test_duration: Duration::from_millis(150),
            batch_pause: Duration::from_millis(10),
        };
        let mut driver = BenchmarkDriver::new(adapters, vec![batch("x", 2)], config);

        let summary = driver.run().await.unwrap();
        assert!(summary.batches >= 1);
        assert!(!summary.cancelled);
        assert!(summary.elapsed >= Duration::from_millis(150));
        assert_eq!(summary.payloads_dispatched, summary.batches * 4);
        assert_eq!(metrics.get("a").unwrap().message_count, summary.batches * 2);
        assert_eq!(metrics.get("b").unwrap().message_count, summary.batches * 2);
        assert_eq!(driver.state(), DriverState::Stopped);
    }

    #[tokio::test]
    async fn test_second_run_is_rejected() {
        let dir = tempdir().unwrap();
        let (_metrics, adapters) = adapters(dir.path(), &["a"]);
        let config = DriverConfig {
            test_duration: Duration::ZERO,
            batch_pause: Duration::ZERO,
        };
        let mut driver = BenchmarkDriver::new(adapters, vec![batch("x", 1)], config);
        driver.run().await.unwrap();
        assert!(matches!(driver.run().await, Err(BenchError::Config(_))));
    }

    #[tokio::test]
    async fn test_stop_before_start_sends_nothing() {
        let dir = tempdir().unwrap();
        let (metrics, adapters) = adapters(dir.path(), &["a"]);
        let mut driver = BenchmarkDriver::new(adapters, vec![batch("x", 3)], DriverConfig::default());
        driver.stop_handle().stop();

        let summary = driver.run().await.unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.batches, 0);
        assert!(metrics.get("a").is_none());
    }

    #[tokio::test]
    async fn test_metrics_log_failure_aborts_run() {
        let dir = tempdir().unwrap();
        let (metrics, adapters) = adapters(dir.path(), &["a", "b"]);
        metrics.log().poison_writer();

        let mut driver = BenchmarkDriver::new(adapters, vec![batch("x", 3)], DriverConfig::default());
        let err = driver.run().await.unwrap_err();

        assert!(matches!(err, BenchError::MetricsLog(_)));
        assert_eq!(driver.state(), DriverState::Stopped);
        assert!(metrics.get("a").is_none());
        assert!(metrics.get("b").is_none());
        assert_eq!(metrics.log().rows(), 0);
    }
}
