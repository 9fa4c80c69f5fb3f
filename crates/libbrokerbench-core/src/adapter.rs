//! Uniform send instrumentation over broker backends

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{DispatchError, Result};
use crate::metrics::MetricsAggregator;
use crate::system::ResourceSampler;
use crate::types::{Payload, SendOutcome};

/// A broker client able to deliver one encoded payload.
///
/// `dispatch` resolves once the backend acknowledges the message in its
/// natural unit of "sent" (a delivery report, a publisher confirm, ...).
/// Implementations must report every client failure as a `DispatchError`
/// and never panic.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Stable identifier used as the metrics key, e.g. `kafka`
    fn name(&self) -> &str;

    async fn dispatch(&self, payload: &Payload, body: Vec<u8>) -> std::result::Result<(), DispatchError>;
}

/// Wraps one backend with timing, resource sampling and metrics recording
#[derive(Clone)]
pub struct SendAdapter {
    backend: Arc<dyn Backend>,
    metrics: Arc<MetricsAggregator>,
    sampler: Arc<dyn ResourceSampler>,
}

impl SendAdapter {
    pub fn new(
        backend: Arc<dyn Backend>,
        metrics: Arc<MetricsAggregator>,
        sampler: Arc<dyn ResourceSampler>,
    ) -> Self {
        Self {
            backend,
            metrics,
            sampler,
        }
    }

    pub fn name(&self) -> &str {
        self.backend.name()
    }

    /// Send one payload and record the outcome.
    ///
    /// Send failures come back as `Ok` with `success == false` and leave the
    /// metrics untouched. `Err` is returned only when the metrics log could
    /// not be written.
    pub async fn send(&self, payload: &Payload) -> Result<SendOutcome> {
        let name = self.backend.name();
        let start = Instant::now();

        let dispatched = match payload.to_json_bytes() {
            Ok(body) => self.backend.dispatch(payload, body).await,
            Err(e) => Err(DispatchError::Serialize(e)),
        };
        let elapsed = start.elapsed();

        match dispatched {
            Ok(()) => {
                let resources = self.sampler.sample();
                let outcome = SendOutcome::succeeded(name, payload.id(), elapsed, resources);
                self.metrics.record(
                    name,
                    outcome.latency_ms(),
                    resources.memory_mb,
                    resources.cpu_percent,
                )?;
                debug!(backend = name, id = payload.id(), latency_ms = outcome.latency_ms(), "sent");
                Ok(outcome)
            }
            Err(e) => {
                warn!("Failed to send transaction to {}: {} - {}", name, payload.id(), e);
                Ok(SendOutcome::failed(name, payload.id(), elapsed, e.to_string()))
            }
        }
    }
}
