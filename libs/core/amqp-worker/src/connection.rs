//! Owned broker connection.
//!
//! One [`BrokerConnection`] is opened at process start and closed at
//! shutdown. Callers never hold a long-lived channel: every publish or
//! consumer session opens its own channel from the connection and drops it
//! when done.

use crate::config::AmqpConfig;
use crate::error::AmqpError;
use lapin::{Channel, Connection, ConnectionProperties};
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct BrokerConnection {
    connection: Connection,
    config: AmqpConfig,
}

impl BrokerConnection {
    pub async fn connect(config: &AmqpConfig) -> Result<Self, AmqpError> {
        let connection = Connection::connect(&config.url, ConnectionProperties::default()).await?;

        info!(url = %config.redacted_url(), exchange = %config.exchange, "Connected to RabbitMQ");

        Ok(Self {
            connection,
            config: config.clone(),
        })
    }

    /// Connect, retrying with exponential backoff (200ms doubling, capped at 5s).
    pub async fn connect_with_retry(
        config: &AmqpConfig,
        max_retries: u32,
    ) -> Result<Self, AmqpError> {
        let mut attempt = 0;
        let mut delay = Duration::from_millis(200);

        loop {
            match Self::connect(config).await {
                Ok(connection) => return Ok(connection),
                Err(e) if attempt < max_retries => {
                    attempt += 1;
                    warn!(
                        error = %e,
                        attempt,
                        max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "RabbitMQ connection failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(5));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Opens a fresh channel scoped to one unit of work.
    pub async fn channel(&self) -> Result<Channel, AmqpError> {
        let channel = self.connection.create_channel().await?;
        debug!(channel_id = channel.id(), "Opened channel");
        Ok(channel)
    }

    pub fn exchange(&self) -> &str {
        &self.config.exchange
    }

    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    pub async fn close(&self) -> Result<(), AmqpError> {
        if !self.is_connected() {
            return Ok(());
        }
        self.connection.close(200, "shutdown").await?;
        info!("RabbitMQ connection closed");
        Ok(())
    }
}

/// Closes a scoped channel, logging instead of failing: the unit of work
/// it served has already completed.
pub(crate) async fn release(channel: Channel) {
    if channel.status().connected() {
        if let Err(e) = channel.close(200, "done").await {
            debug!(error = %e, "Channel close failed");
        }
    }
}
