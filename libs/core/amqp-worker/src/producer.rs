//! Persistent, confirmed publishing.

use crate::config::Topology;
use crate::connection::{release, BrokerConnection};
use crate::error::AmqpError;
use chrono::Utc;
use lapin::options::{BasicPublishOptions, ConfirmSelectOptions};
use lapin::types::FieldTable;
use lapin::BasicProperties;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Delivery mode 2: the broker writes the message to disk.
pub const PERSISTENT: u8 = 2;

/// A message ready to be handed to the broker.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub routing_key: String,
    pub message_id: String,
    pub payload: Vec<u8>,
    pub headers: FieldTable,
    /// Per-message TTL in milliseconds.
    pub expiration_ms: Option<u64>,
}

impl OutgoingMessage {
    pub fn json<T: Serialize>(
        routing_key: impl Into<String>,
        message_id: impl Into<String>,
        body: &T,
    ) -> Result<Self, AmqpError> {
        Ok(Self::raw(routing_key, message_id, serde_json::to_vec(body)?))
    }

    pub fn raw(
        routing_key: impl Into<String>,
        message_id: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            routing_key: routing_key.into(),
            message_id: message_id.into(),
            payload,
            headers: FieldTable::default(),
            expiration_ms: None,
        }
    }

    pub fn with_headers(mut self, headers: FieldTable) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_expiration_ms(mut self, expiration_ms: u64) -> Self {
        self.expiration_ms = Some(expiration_ms);
        self
    }

    fn properties(&self) -> BasicProperties {
        let properties = BasicProperties::default()
            .with_delivery_mode(PERSISTENT)
            .with_content_type("application/json".into())
            .with_message_id(self.message_id.as_str().into())
            .with_timestamp(Utc::now().timestamp().max(0) as u64)
            .with_headers(self.headers.clone());

        match self.expiration_ms {
            Some(ms) => properties.with_expiration(ms.to_string().into()),
            None => properties,
        }
    }
}

/// Publishes to one exchange over a shared [`BrokerConnection`].
///
/// Each call runs on its own channel in confirm mode and resolves only once
/// the broker has taken responsibility for the message.
#[derive(Clone)]
pub struct AmqpProducer {
    connection: Arc<BrokerConnection>,
    exchange: String,
}

impl AmqpProducer {
    pub fn new(connection: Arc<BrokerConnection>) -> Self {
        let exchange = connection.exchange().to_string();
        Self {
            connection,
            exchange,
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Declares `topology` on a short-lived channel.
    pub async fn declare(&self, topology: &Topology) -> Result<(), AmqpError> {
        let channel = self.connection.channel().await?;
        let result = crate::topology::declare(&channel, topology).await;
        release(channel).await;
        result
    }

    pub async fn publish(&self, message: &OutgoingMessage) -> Result<(), AmqpError> {
        let channel = self.connection.channel().await?;
        let result = self.publish_on(&channel, message).await;
        release(channel).await;
        result
    }

    async fn publish_on(
        &self,
        channel: &lapin::Channel,
        message: &OutgoingMessage,
    ) -> Result<(), AmqpError> {
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;

        let confirmation = channel
            .basic_publish(
                &self.exchange,
                &message.routing_key,
                BasicPublishOptions::default(),
                &message.payload,
                message.properties(),
            )
            .await?
            .await?;

        if !confirmation.is_ack() {
            return Err(AmqpError::NotConfirmed {
                exchange: self.exchange.clone(),
                routing_key: message.routing_key.clone(),
            });
        }

        debug!(
            exchange = %self.exchange,
            routing_key = %message.routing_key,
            message_id = %message.message_id,
            bytes = message.payload.len(),
            "Published message"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_message_properties() {
        let message = OutgoingMessage::json("merchant.created", "m-1", &json!({"a": 1})).unwrap();
        let properties = message.properties();

        assert_eq!(message.payload, br#"{"a":1}"#.to_vec());
        assert_eq!(*properties.delivery_mode(), Some(PERSISTENT));
        assert_eq!(
            properties.content_type().as_ref().map(|c| c.as_str()),
            Some("application/json")
        );
        assert_eq!(
            properties.message_id().as_ref().map(|c| c.as_str()),
            Some("m-1")
        );
        assert!(properties.expiration().is_none());
    }

    #[test]
    fn test_expiration_is_rendered_in_milliseconds() {
        let message = OutgoingMessage::raw("merchant.created.retry", "m-1", Vec::new())
            .with_expiration_ms(4_000);
        let properties = message.properties();
        assert_eq!(
            properties.expiration().as_ref().map(|e| e.as_str()),
            Some("4000")
        );
    }
}
