//! RabbitMQ worker framework for background job processing.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  publish   ┌──────────────────────────┐
//! │ AmqpProducer │──────────▶ │ topic exchange (durable) │
//! └──────────────┘            └───┬──────────┬─────────┬─┘
//!                        {key}    │  {key}.retry       │ {key}.dlq
//!                     ┌───────────▼─┐  ┌─────▼──────┐ ┌▼──────────┐
//!                     │  {key}.q    │  │{key}.retry.q│ │ {key}.dlq │
//!                     └──────┬──────┘  └─────┬──────┘ └───────────┘
//!                            │   TTL expiry ─┘ (back to {key})
//!                     ┌──────▼──────┐
//!                     │ AmqpWorker  │──▶ Processor<J>
//!                     │ prefetch 1  │
//!                     └─────────────┘
//! ```
//!
//! - **Owned connection**: [`BrokerConnection`] is opened once and closed at
//!   shutdown; every publish and consumer session gets its own channel.
//! - **Persistent, confirmed publishes**: delivery mode 2 plus publisher confirms.
//! - **Retries without redelivery storms**: transient failures are parked in
//!   a TTL retry queue with an `x-retry-count` header, then dead-lettered
//!   once the budget is spent.
//!
//! # Example
//!
//! ```rust,ignore
//! use amqp_worker::{AmqpConfig, AmqpWorker, BrokerConnection, Topology, WorkerConfig};
//!
//! let config = AmqpConfig::from_env()?;
//! let connection = Arc::new(BrokerConnection::connect_with_retry(&config, 5).await?);
//! let topology = Topology::new(&config.exchange, "merchant.created");
//!
//! let worker = AmqpWorker::<MerchantCreated, _>::new(
//!     connection.clone(),
//!     processor,
//!     WorkerConfig::from_env(topology)?,
//! );
//! worker.run(shutdown_rx).await?;
//! connection.close().await?;
//! ```

mod config;
mod connection;
mod consumer;
mod dlq;
mod error;
pub mod metrics;
mod producer;
pub mod topology;
mod worker;

pub use config::{AmqpConfig, Topology, WorkerConfig, DEFAULT_EXCHANGE};
pub use connection::BrokerConnection;
pub use consumer::{retry_count_from, with_retry_count, AmqpConsumer, AmqpMessage, RETRY_COUNT_HEADER};
pub use dlq::{DlqEntry, DlqManager};
pub use error::AmqpError;
pub use crate::metrics::WorkerMetrics;
pub use producer::{AmqpProducer, OutgoingMessage, PERSISTENT};
pub use worker::{disposition, AmqpWorker, Disposition};

pub use messaging::{ErrorCategory, FailingProcessor, Job, ProcessingError, Processor};
