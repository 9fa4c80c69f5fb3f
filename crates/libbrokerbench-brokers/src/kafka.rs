//! Kafka producer backend

use std::time::Duration;

use async_trait::async_trait;
use libbrokerbench_core::{Backend, DispatchError, KafkaConfig, Payload};
use rdkafka::config::ClientConfig;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use tracing::info;

use crate::error::BrokerError;

/// Sends each payload as one record keyed by its id and waits for the
/// delivery report.
pub struct KafkaBackend {
    producer: FutureProducer,
    topic: String,
    timeout: Duration,
}

impl KafkaBackend {
    pub const NAME: &'static str = "kafka";

    /// Build the producer. librdkafka connects lazily, so an unreachable
    /// cluster shows up as failed sends rather than an error here.
    pub fn new(config: &KafkaConfig) -> Result<Self, BrokerError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", config.message_timeout_ms.to_string())
            .create()?;

        info!(brokers = %config.brokers, topic = %config.topic, "Kafka producer ready");

        Ok(Self {
            producer,
            topic: config.topic.clone(),
            timeout: Duration::from_millis(config.message_timeout_ms),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl Backend for KafkaBackend {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn dispatch(&self, payload: &Payload, body: Vec<u8>) -> Result<(), DispatchError> {
        let record = FutureRecord::to(&self.topic).key(payload.id()).payload(&body);
        match self.producer.send(record, Timeout::After(self.timeout)).await {
            Ok(_) => Ok(()),
            Err((e, _)) => Err(dispatch_error(e, self.timeout)),
        }
    }
}

fn dispatch_error(e: KafkaError, timeout: Duration) -> DispatchError {
    match e.rdkafka_error_code() {
        Some(RDKafkaErrorCode::MessageTimedOut) | Some(RDKafkaErrorCode::RequestTimedOut) => {
            DispatchError::Timeout(timeout)
        }
        Some(RDKafkaErrorCode::AllBrokersDown)
        | Some(RDKafkaErrorCode::BrokerTransportFailure)
        | Some(RDKafkaErrorCode::Resolve) => DispatchError::Connection(e.to_string()),
        _ => DispatchError::Rejected(e.to_string()),
    }
}
