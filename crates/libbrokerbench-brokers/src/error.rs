//! Broker setup error types

use libbrokerbench_core::BenchError;
use thiserror::Error;

/// Errors raised while connecting to or configuring a broker.
///
/// Per-message failures never surface here; backends report those as
/// `DispatchError`.
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Kafka client could not be created
    #[error("Kafka error: {0}")]
    Kafka(String),

    /// RabbitMQ connection or channel setup failed
    #[error("RabbitMQ error: {0}")]
    Rabbit(String),

    /// Binary was built without any backend feature
    #[error("No broker backends enabled in this build")]
    NoBackends,
}

#[cfg(feature = "kafka")]
impl From<rdkafka::error::KafkaError> for BrokerError {
    fn from(e: rdkafka::error::KafkaError) -> Self {
        BrokerError::Kafka(e.to_string())
    }
}

#[cfg(feature = "rabbitmq")]
impl From<lapin::Error> for BrokerError {
    fn from(e: lapin::Error) -> Self {
        BrokerError::Rabbit(e.to_string())
    }
}

impl From<BrokerError> for BenchError {
    fn from(e: BrokerError) -> Self {
        BenchError::Backend(e.to_string())
    }
}
