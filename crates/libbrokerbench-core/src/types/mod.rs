pub mod metrics;
pub mod payload;

pub use metrics::{BackendMetrics, LatencySummary, ResourceSample, SendOutcome};
pub use payload::{Batch, Payload};
