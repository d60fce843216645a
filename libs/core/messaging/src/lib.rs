//! Broker-agnostic job processing abstractions.
//!
//! ```text
//! ┌──────────────────┐        ┌──────────────────────┐
//! │  MerchantCreated │──Job──▶│      amqp-worker     │
//! │  (domain event)  │        │  (RabbitMQ consumer) │
//! └──────────────────┘        └──────────┬───────────┘
//!                                        │ process()
//!                             ┌──────────▼───────────┐
//!                             │  Processor<J> impl   │
//!                             └──────────┬───────────┘
//!                                        │ Err(ProcessingError)
//!                             ErrorCategory → retry / dead-letter
//! ```
//!
//! Domain crates implement [`Job`] and [`Processor`]; transport crates own
//! delivery, acknowledgement and retry topology.

mod error;
mod job;
mod processor;

pub use error::{ErrorCategory, ProcessingError};
pub use job::Job;
pub use processor::{FailingProcessor, Processor};
