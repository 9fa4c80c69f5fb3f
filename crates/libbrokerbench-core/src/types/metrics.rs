//! Metric value types shared by the aggregator, the metrics log and reports

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Latest aggregate for one backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendMetrics {
    pub broker: String,
    pub message_count: u64,
    /// Messages per second since this backend's first recorded message
    pub throughput: f64,
    /// Milliseconds
    pub latency: f64,
    /// Megabytes of resident memory
    pub memory_usage: f64,
    /// Process CPU load, 0 to 100
    pub cpu_usage: f64,
    pub timestamp: DateTime<Utc>,
}

impl BackendMetrics {
    pub(crate) fn empty(broker: &str) -> Self {
        Self {
            broker: broker.to_string(),
            message_count: 0,
            throughput: 0.0,
            latency: 0.0,
            memory_usage: 0.0,
            cpu_usage: 0.0,
            timestamp: Utc::now(),
        }
    }
}

/// Process resource readings taken at the moment a send is acknowledged
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    pub memory_mb: f64,
    pub cpu_percent: f64,
}

/// Result of a single send attempt
#[derive(Debug, Clone, PartialEq)]
pub struct SendOutcome {
    pub backend: String,
    pub payload_id: String,
    pub success: bool,
    pub elapsed: Duration,
    pub failure: Option<String>,
    /// Present only for successful sends
    pub resources: Option<ResourceSample>,
}

impl SendOutcome {
    pub fn succeeded(backend: &str, payload_id: &str, elapsed: Duration, resources: ResourceSample) -> Self {
        Self {
            backend: backend.to_string(),
            payload_id: payload_id.to_string(),
            success: true,
            elapsed,
            failure: None,
            resources: Some(resources),
        }
    }

    pub fn failed(backend: &str, payload_id: &str, elapsed: Duration, reason: String) -> Self {
        Self {
            backend: backend.to_string(),
            payload_id: payload_id.to_string(),
            success: false,
            elapsed,
            failure: Some(reason),
            resources: None,
        }
    }

    /// Elapsed time truncated to whole milliseconds
    pub fn latency_ms(&self) -> u64 {
        self.elapsed.as_millis() as u64
    }
}

/// Latency percentiles
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub samples: u64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
    pub max_ms: u64,
}
