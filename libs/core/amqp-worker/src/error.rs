//! Error types for the AMQP worker.

use messaging::ErrorCategory;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AmqpError {
    /// Connection, channel or protocol failure reported by the client.
    #[error("AMQP error: {0}")]
    Broker(#[from] lapin::Error),

    /// The broker answered a publish with a negative confirm.
    #[error("Publish to '{exchange}' with routing key '{routing_key}' was not confirmed")]
    NotConfirmed {
        exchange: String,
        routing_key: String,
    },

    /// The consumer stream ended without a shutdown request.
    #[error("Consumer '{0}' was cancelled by the broker")]
    ConsumerCancelled(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Processing error: {0}")]
    Processing(#[from] messaging::ProcessingError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AmqpError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            AmqpError::Broker(_) => ErrorCategory::Transient,
            AmqpError::NotConfirmed { .. } => ErrorCategory::Transient,
            AmqpError::ConsumerCancelled(_) => ErrorCategory::Transient,
            AmqpError::Serialization(_) => ErrorCategory::Permanent,
            AmqpError::Config(_) => ErrorCategory::Permanent,
            AmqpError::Processing(e) => e.category(),
        }
    }

    pub fn should_retry(&self, retry_count: u32) -> bool {
        self.category().should_retry(retry_count)
    }
}

impl From<core_config::ConfigError> for AmqpError {
    fn from(err: core_config::ConfigError) -> Self {
        AmqpError::Config(err.to_string())
    }
}
