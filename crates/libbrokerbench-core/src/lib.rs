pub mod types;
pub mod error;
pub mod config;
pub mod loader;
pub mod generator;
pub mod metrics;
pub mod export;
pub mod system;
pub mod adapter;
pub mod driver;

pub use error::{BenchError, DispatchError, Result};
pub use types::{BackendMetrics, Batch, LatencySummary, Payload, ResourceSample, SendOutcome};
pub use config::{BenchConfig, KafkaConfig, RabbitConfig, DATA_DIR_ENV};
pub use loader::{load_all, load_batches, Manifest, MANIFEST_FILE};
pub use generator::{generate, TransactionGenerator};
pub use metrics::MetricsAggregator;
pub use export::{MetricsLog, MetricsReport, CSV_HEADER};
pub use system::{FixedSampler, ResourceSampler, SystemSampler};
pub use adapter::{Backend, SendAdapter};
pub use driver::{BenchmarkDriver, DriverConfig, DriverState, RunSummary, StopHandle};
