//! Consumer session and delivered messages.

use crate::config::WorkerConfig;
use crate::connection::{release, BrokerConnection};
use crate::error::AmqpError;
use crate::topology;
use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{Channel, Consumer};
use tracing::info;

/// Header carrying how many times a message has already been retried.
pub const RETRY_COUNT_HEADER: &str = "x-retry-count";

/// A consumer bound to one queue on its own channel.
pub struct AmqpConsumer {
    channel: Channel,
    consumer: Consumer,
    tag: String,
}

impl AmqpConsumer {
    /// Opens a channel, declares the topology, applies the prefetch limit and
    /// starts consuming.
    pub async fn subscribe(
        connection: &BrokerConnection,
        config: &WorkerConfig,
    ) -> Result<Self, AmqpError> {
        let channel = connection.channel().await?;
        topology::declare(&channel, &config.topology).await?;

        channel
            .basic_qos(config.prefetch, BasicQosOptions::default())
            .await?;

        let consumer = channel
            .basic_consume(
                &config.topology.queue,
                &config.consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        info!(
            queue = %config.topology.queue,
            consumer_tag = %config.consumer_tag,
            prefetch = config.prefetch,
            "Consumer subscribed"
        );

        Ok(Self {
            channel,
            consumer,
            tag: config.consumer_tag.clone(),
        })
    }

    /// Waits for the next delivery.
    pub async fn next(&mut self) -> Result<AmqpMessage, AmqpError> {
        match self.consumer.next().await {
            Some(Ok(delivery)) => Ok(AmqpMessage::new(delivery)),
            Some(Err(e)) => Err(e.into()),
            None => Err(AmqpError::ConsumerCancelled(self.tag.clone())),
        }
    }

    pub async fn close(self) {
        release(self.channel).await;
    }
}

/// One delivery awaiting a verdict.
pub struct AmqpMessage {
    delivery: Delivery,
}

impl AmqpMessage {
    fn new(delivery: Delivery) -> Self {
        Self { delivery }
    }

    pub fn payload(&self) -> &[u8] {
        &self.delivery.data
    }

    pub fn message_id(&self) -> Option<String> {
        self.delivery
            .properties
            .message_id()
            .as_ref()
            .map(|id| id.as_str().to_string())
    }

    pub fn headers(&self) -> FieldTable {
        self.delivery
            .properties
            .headers()
            .clone()
            .unwrap_or_default()
    }

    /// Set by the broker when the message was delivered before but never acked.
    pub fn redelivered(&self) -> bool {
        self.delivery.redelivered
    }

    pub fn retry_count(&self) -> u32 {
        self.delivery
            .properties
            .headers()
            .as_ref()
            .map(retry_count_from)
            .unwrap_or(0)
    }

    pub async fn ack(&self) -> Result<(), AmqpError> {
        self.delivery.ack(BasicAckOptions::default()).await?;
        Ok(())
    }

    /// Returns the message to the queue (or drops it if `requeue` is false).
    pub async fn nack(&self, requeue: bool) -> Result<(), AmqpError> {
        self.delivery
            .nack(BasicNackOptions {
                requeue,
                ..BasicNackOptions::default()
            })
            .await?;
        Ok(())
    }
}

pub fn retry_count_from(headers: &FieldTable) -> u32 {
    headers
        .inner()
        .iter()
        .find(|(key, _)| key.as_str() == RETRY_COUNT_HEADER)
        .and_then(|(_, value)| match value {
            AMQPValue::ShortShortUInt(n) => Some(u32::from(*n)),
            AMQPValue::ShortUInt(n) => Some(u32::from(*n)),
            AMQPValue::LongUInt(n) => Some(*n),
            AMQPValue::ShortShortInt(n) => u32::try_from(*n).ok(),
            AMQPValue::ShortInt(n) => u32::try_from(*n).ok(),
            AMQPValue::LongInt(n) => u32::try_from(*n).ok(),
            AMQPValue::LongLongInt(n) => u32::try_from(*n).ok(),
            _ => None,
        })
        .unwrap_or(0)
}

/// Copy of `headers` with the retry counter set to `retry_count`.
pub fn with_retry_count(headers: &FieldTable, retry_count: u32) -> FieldTable {
    let mut next = headers.clone();
    next.insert(RETRY_COUNT_HEADER.into(), AMQPValue::LongUInt(retry_count));
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_header_means_first_attempt() {
        assert_eq!(retry_count_from(&FieldTable::default()), 0);
    }

    #[test]
    fn test_retry_count_round_trips_through_headers() {
        let headers = with_retry_count(&FieldTable::default(), 2);
        assert_eq!(retry_count_from(&headers), 2);

        let bumped = with_retry_count(&headers, 3);
        assert_eq!(retry_count_from(&bumped), 3);
    }

    #[test]
    fn test_retry_count_accepts_signed_encodings() {
        let mut headers = FieldTable::default();
        headers.insert(RETRY_COUNT_HEADER.into(), AMQPValue::LongLongInt(4));
        assert_eq!(retry_count_from(&headers), 4);

        let mut headers = FieldTable::default();
        headers.insert(RETRY_COUNT_HEADER.into(), AMQPValue::LongInt(-1));
        assert_eq!(retry_count_from(&headers), 0);
    }

    #[test]
    fn test_with_retry_count_keeps_other_headers() {
        let mut headers = FieldTable::default();
        headers.insert("x-source".into(), AMQPValue::LongString("outbox".into()));
        let next = with_retry_count(&headers, 1);
        assert!(next.inner().iter().any(|(k, _)| k.as_str() == "x-source"));
    }
}
