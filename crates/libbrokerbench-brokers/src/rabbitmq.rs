//! RabbitMQ publisher backend

use std::time::Duration;

use async_trait::async_trait;
use lapin::options::{BasicPublishOptions, ConfirmSelectOptions, QueueDeclareOptions};
use lapin::publisher_confirm::Confirmation;
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use libbrokerbench_core::{Backend, DispatchError, Payload, RabbitConfig};
use tracing::{info, warn};

use crate::error::BrokerError;

const CONTENT_TYPE: &str = "application/json";

/// Publishes each payload on one confirm-mode channel and waits for the
/// broker's ack.
pub struct RabbitBackend {
    connection: Connection,
    channel: Channel,
    exchange: String,
    routing_key: String,
    confirm_timeout: Duration,
}

impl RabbitBackend {
    pub const NAME: &'static str = "rabbitmq";

    /// Connect, open a channel in confirm mode and, when publishing through
    /// the default exchange, declare the target queue.
    pub async fn connect(config: &RabbitConfig) -> Result<Self, BrokerError> {
        let connection = Connection::connect(&config.uri, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;

        if config.exchange.is_empty() {
            channel
                .queue_declare(
                    &config.routing_key,
                    QueueDeclareOptions {
                        durable: true,
                        ..QueueDeclareOptions::default()
                    },
                    FieldTable::default(),
                )
                .await?;
        }

        info!(
            exchange = %config.exchange,
            routing_key = %config.routing_key,
            "RabbitMQ channel ready"
        );

        Ok(Self {
            connection,
            channel,
            exchange: config.exchange.clone(),
            routing_key: config.routing_key.clone(),
            confirm_timeout: Duration::from_millis(config.confirm_timeout_ms),
        })
    }

    /// Close the connection
    pub async fn close(&self) {
        if let Err(e) = self.connection.close(200, "bye").await {
            warn!("Failed to close RabbitMQ connection: {}", e);
        }
    }
}

#[async_trait]
impl Backend for RabbitBackend {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn dispatch(&self, payload: &Payload, body: Vec<u8>) -> Result<(), DispatchError> {
        let properties = BasicProperties::default()
            .with_message_id(payload.id().into())
            .with_content_type(CONTENT_TYPE.into());

        let confirm = self
            .channel
            .basic_publish(
                &self.exchange,
                &self.routing_key,
                BasicPublishOptions::default(),
                &body,
                properties,
            )
            .await
            .map_err(dispatch_error)?;

        let confirmation = tokio::time::timeout(self.confirm_timeout, confirm)
            .await
            .map_err(|_| DispatchError::Timeout(self.confirm_timeout))?
            .map_err(dispatch_error)?;

        match confirmation {
            Confirmation::Nack(_) => Err(DispatchError::Rejected("publish nacked".to_string())),
            Confirmation::Ack(_) | Confirmation::NotRequested => Ok(()),
        }
    }
}

fn dispatch_error(e: lapin::Error) -> DispatchError {
    match e {
        lapin::Error::IOError(_)
        | lapin::Error::InvalidConnectionState(_)
        | lapin::Error::InvalidChannelState(_) => DispatchError::Connection(e.to_string()),
        other => DispatchError::Rejected(other.to_string()),
    }
}
