//! Durable metrics trail and the read-only snapshot report

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};
use crate::metrics::MetricsAggregator;
use crate::types::{BackendMetrics, LatencySummary};

pub const CSV_HEADER: &str = "timestamp,broker,messageCount,throughput,latency,memoryUsage,cpuUsage";

/// Append-only CSV log with one row per aggregator update.
///
/// All writes go through one mutex so rows never interleave. Every row is
/// flushed to the OS before `append` returns; with `fsync` it is also synced
/// to disk.
pub struct MetricsLog {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
    fsync: bool,
    rows: AtomicU64,
}

impl MetricsLog {
    /// Create or truncate the log and write the header
    pub fn create(path: &Path, fsync: bool) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|e| {
                BenchError::MetricsLog(format!("cannot create {}: {}", path.display(), e))
            })?;

        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", CSV_HEADER)
            .and_then(|_| writer.flush())
            .map_err(|e| BenchError::MetricsLog(e.to_string()))?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(writer),
            fsync,
            rows: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row for `metrics`
    pub fn append(&self, metrics: &BackendMetrics) -> Result<()> {
        let row = format_row(metrics);
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| BenchError::MetricsLog("writer lock poisoned".to_string()))?;

        writer
            .write_all(row.as_bytes())
            .and_then(|_| writer.flush())
            .map_err(|e| BenchError::MetricsLog(format!("{}: {}", self.path.display(), e)))?;

        if self.fsync {
            writer
                .get_ref()
                .sync_data()
                .map_err(|e| BenchError::MetricsLog(format!("{}: {}", self.path.display(), e)))?;
        }

        self.rows.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Rows appended since creation, header excluded
    pub fn rows(&self) -> u64 {
        self.rows.load(Ordering::Relaxed)
    }

    /// Poison the writer lock so every later `append` fails
    #[cfg(test)]
    pub(crate) fn poison_writer(&self) {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = self.writer.lock();
            panic!("metrics log writer poisoned for test");
        }));
    }
}

fn format_row(m: &BackendMetrics) -> String {
    format!(
        "{},{},{},{:.2},{:.2},{:.2},{:.2}\n",
        m.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
        m.broker,
        m.message_count,
        m.throughput,
        m.latency,
        m.memory_usage,
        m.cpu_usage
    )
}

/// Per-backend view of the latest in-memory metrics.
///
/// Backends that have not recorded anything yet map to `None` and serialize
/// as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub generated_at: DateTime<Utc>,
    pub backends: BTreeMap<String, Option<BackendMetrics>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub latencies: BTreeMap<String, LatencySummary>,
}

impl MetricsReport {
    /// Snapshot the aggregator for the given backends. Never waits on the
    /// metrics log.
    pub fn collect<S: AsRef<str>>(aggregator: &MetricsAggregator, backends: &[S]) -> Self {
        let mut snapshot = BTreeMap::new();
        let mut latencies = BTreeMap::new();
        for backend in backends {
            let name = backend.as_ref();
            snapshot.insert(name.to_string(), aggregator.get(name));
            if let Some(summary) = aggregator.latency_summary(name) {
                latencies.insert(name.to_string(), summary);
            }
        }

        Self {
            generated_at: Utc::now(),
            backends: snapshot,
            latencies,
        }
    }

    pub fn get(&self, backend: &str) -> Option<&BackendMetrics> {
        self.backends.get(backend).and_then(Option::as_ref)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the report as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample(broker: &str, count: u64) -> BackendMetrics {
        BackendMetrics {
            broker: broker.to_string(),
            message_count: count,
            throughput: 12.5,
            latency: 3.0,
            memory_usage: 128.5,
            cpu_usage: 7.25,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_create_writes_header_and_truncates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        std::fs::write(&path, "stale\nrows\n").unwrap();

        let log = MetricsLog::create(&path, false).unwrap();
        assert_eq!(log.rows(), 0);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), format!("{}\n", CSV_HEADER));
    }

    #[test]
    fn test_append_is_visible_immediately() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("metrics.csv");
        let log = MetricsLog::create(&path, true).unwrap();

        log.append(&sample("kafka", 1)).unwrap();
        log.append(&sample("rabbitmq", 1)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(log.rows(), 2);

        let cols: Vec<&str> = lines[1].split(',').collect();
        assert_eq!(cols.len(), 7);
        assert_eq!(cols[1], "kafka");
        assert_eq!(cols[2], "1");
        assert_eq!(cols[3], "12.50");
        assert_eq!(cols[4], "3.00");
        assert_eq!(cols[5], "128.50");
        assert_eq!(cols[6], "7.25");
        assert!(DateTime::parse_from_rfc3339(cols[0]).is_ok());
    }

    #[test]
    fn test_append_fails_after_poisoned_writer() {
        let dir = tempdir().unwrap();
        let log = MetricsLog::create(&dir.path().join("metrics.csv"), false).unwrap();
        log.poison_writer();

        let err = log.append(&sample("kafka", 1)).unwrap_err();
        assert!(matches!(err, BenchError::MetricsLog(_)));
        assert_eq!(log.rows(), 0);
    }

    #[test]
    fn test_create_fails_for_directory_path() {
        let dir = tempdir().unwrap();
        let err = MetricsLog::create(dir.path(), false).err().unwrap();
        assert!(matches!(err, BenchError::MetricsLog(_)));
    }
}
