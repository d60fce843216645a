//! Relay from `outbox_messages` to the broker.
//!
//! Rows are written in the registration transaction, so an event exists iff
//! its merchant does. The relay publishes pending rows oldest first and marks
//! each published only after the broker confirms it. A crash between confirm
//! and mark republishes the row; consumers are idempotent by merchant id.

use amqp_worker::{AmqpError, AmqpProducer, OutgoingMessage};
use async_trait::async_trait;
use core_config::{ConfigError, FromEnv, env_parse_or};
use metrics::counter;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::{MerchantError, MerchantResult};
use crate::models::OutboxMessage;
use crate::repository::OutboxRepository;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Resolves once the broker has confirmed the message.
    async fn publish(&self, message: &OutgoingMessage) -> Result<(), AmqpError>;
}

#[async_trait]
impl EventPublisher for AmqpProducer {
    async fn publish(&self, message: &OutgoingMessage) -> Result<(), AmqpError> {
        AmqpProducer::publish(self, message).await
    }
}

/// - `OUTBOX_POLL_MS` (default 1000)
/// - `OUTBOX_BATCH_SIZE` (default 100)
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub poll_interval: Duration,
    pub batch_size: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            batch_size: 100,
        }
    }
}

impl FromEnv for RelayConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            poll_interval: Duration::from_millis(env_parse_or("OUTBOX_POLL_MS", 1000u64)?),
            batch_size: env_parse_or("OUTBOX_BATCH_SIZE", 100u64)?.max(1),
        })
    }
}

pub struct OutboxRelay {
    outbox: Arc<dyn OutboxRepository>,
    publisher: Arc<dyn EventPublisher>,
    signal: Arc<Notify>,
    config: RelayConfig,
}

fn to_message(row: &OutboxMessage) -> MerchantResult<OutgoingMessage> {
    let payload = serde_json::to_vec(&row.payload)
        .map_err(|e| MerchantError::Internal(format!("outbox payload {}: {e}", row.id)))?;
    Ok(OutgoingMessage::raw(
        row.routing_key.clone(),
        row.id.to_string(),
        payload,
    ))
}

impl OutboxRelay {
    pub fn new(
        outbox: Arc<dyn OutboxRepository>,
        publisher: Arc<dyn EventPublisher>,
        signal: Arc<Notify>,
        config: RelayConfig,
    ) -> Self {
        Self {
            outbox,
            publisher,
            signal,
            config,
        }
    }

    /// Publish one batch. Stops at the first failed publish so ordering is
    /// kept; returns how many rows were published.
    pub async fn drain_once(&self) -> MerchantResult<usize> {
        let rows = self.outbox.fetch_pending(self.config.batch_size).await?;
        let mut published = 0;

        for row in &rows {
            let message = to_message(row)?;
            match self.publisher.publish(&message).await {
                Ok(()) => {
                    self.outbox.mark_published(row.id).await?;
                    counter!("outbox_published_total", "routing_key" => row.routing_key.clone())
                        .increment(1);
                    debug!(outbox_id = %row.id, aggregate_id = %row.aggregate_id, "Outbox row published");
                    published += 1;
                }
                Err(e) => {
                    counter!("outbox_publish_failures_total", "routing_key" => row.routing_key.clone())
                        .increment(1);
                    warn!(
                        outbox_id = %row.id,
                        attempts = row.attempts + 1,
                        error = %e,
                        "Outbox publish failed, row stays pending"
                    );
                    self.outbox.mark_failed(row.id, &e.to_string()).await?;
                    break;
                }
            }
        }

        Ok(published)
    }

    /// Wake on the commit signal or the poll interval until `shutdown`
    /// resolves.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            poll_ms = self.config.poll_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            "Outbox relay started"
        );

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = self.signal.notified() => {}
                _ = ticker.tick() => {}
            }

            loop {
                match self.drain_once().await {
                    Ok(n) if n as u64 == self.config.batch_size => continue,
                    Ok(_) => break,
                    Err(e) => {
                        warn!(error = %e, "Outbox relay pass failed");
                        break;
                    }
                }
            }
        }

        info!("Outbox relay stopped");
    }
}
