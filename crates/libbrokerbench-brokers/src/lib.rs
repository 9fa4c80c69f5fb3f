//! Broker client backends for brokerbench
//!
//! Each backend implements `libbrokerbench_core::Backend`. Which ones are
//! compiled in is controlled by the `kafka` and `rabbitmq` features.

pub mod error;
#[cfg(feature = "kafka")]
pub mod kafka;
#[cfg(feature = "rabbitmq")]
pub mod rabbitmq;

use std::sync::Arc;

use libbrokerbench_core::{Backend, BenchConfig};
use tracing::info;

pub use error::BrokerError;
#[cfg(feature = "kafka")]
pub use kafka::KafkaBackend;
#[cfg(feature = "rabbitmq")]
pub use rabbitmq::RabbitBackend;

/// Every backend enabled in this build, connected and ready to send
pub struct BrokerSet {
    backends: Vec<Arc<dyn Backend>>,
    #[cfg(feature = "rabbitmq")]
    rabbit: Option<Arc<RabbitBackend>>,
}

impl BrokerSet {
    /// Connect all enabled backends, in a stable order
    #[cfg(any(feature = "kafka", feature = "rabbitmq"))]
    pub async fn connect(config: &BenchConfig) -> Result<Self, BrokerError> {
        let mut backends: Vec<Arc<dyn Backend>> = Vec::new();

        #[cfg(feature = "kafka")]
        backends.push(Arc::new(KafkaBackend::new(&config.kafka)?));

        #[cfg(feature = "rabbitmq")]
        let rabbit = {
            let rabbit = Arc::new(RabbitBackend::connect(&config.rabbitmq).await?);
            backends.push(rabbit.clone());
            Some(rabbit)
        };

        if backends.is_empty() {
            return Err(BrokerError::NoBackends);
        }
        info!("Connected {} broker backends", backends.len());

        Ok(Self {
            backends,
            #[cfg(feature = "rabbitmq")]
            rabbit,
        })
    }

    /// Built without any broker feature: nothing to connect
    #[cfg(not(any(feature = "kafka", feature = "rabbitmq")))]
    pub async fn connect(_config: &BenchConfig) -> Result<Self, BrokerError> {
        Err(BrokerError::NoBackends)
    }

    pub fn backends(&self) -> &[Arc<dyn Backend>] {
        &self.backends
    }

    pub fn names(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.name().to_string()).collect()
    }

    /// Release broker connections
    pub async fn shutdown(self) {
        #[cfg(feature = "rabbitmq")]
        {
            if let Some(rabbit) = &self.rabbit {
                rabbit.close().await;
            }
        }
    }
}

/// Names of the backends compiled into this build
pub fn enabled_backends() -> Vec<&'static str> {
    let mut names = Vec::new();
    #[cfg(feature = "kafka")]
    names.push(kafka::KafkaBackend::NAME);
    #[cfg(feature = "rabbitmq")]
    names.push(rabbitmq::RabbitBackend::NAME);
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enabled_backends_follow_features() {
        let names = enabled_backends();
        assert_eq!(names.contains(&"kafka"), cfg!(feature = "kafka"));
        assert_eq!(names.contains(&"rabbitmq"), cfg!(feature = "rabbitmq"));
    }

    #[cfg(not(any(feature = "kafka", feature = "rabbitmq")))]
    #[tokio::test]
    async fn test_connect_without_backends_fails() {
        let result = BrokerSet::connect(&BenchConfig::default()).await;
        assert!(matches!(result, Err(BrokerError::NoBackends)));
    }
}
