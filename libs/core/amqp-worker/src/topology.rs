//! Idempotent declaration of exchange, queues and bindings.
//!
//! Both the publisher and the consumer call [`declare`] at startup; RabbitMQ
//! treats a redeclaration with identical arguments as a no-op, so whichever
//! side starts first creates the topology.

use crate::config::Topology;
use crate::error::AmqpError;
use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{Channel, ExchangeKind};
use tracing::info;

pub async fn declare(channel: &Channel, topology: &Topology) -> Result<(), AmqpError> {
    declare_exchange(channel, &topology.exchange).await?;

    declare_bound_queue(
        channel,
        &topology.exchange,
        &topology.queue,
        &topology.routing_key,
        FieldTable::default(),
    )
    .await?;

    declare_bound_queue(
        channel,
        &topology.exchange,
        &topology.retry_queue,
        &topology.retry_routing_key,
        retry_queue_arguments(topology),
    )
    .await?;

    declare_bound_queue(
        channel,
        &topology.exchange,
        &topology.dlq_queue,
        &topology.dlq_routing_key,
        FieldTable::default(),
    )
    .await?;

    info!(
        exchange = %topology.exchange,
        queue = %topology.queue,
        retry_queue = %topology.retry_queue,
        dlq = %topology.dlq_queue,
        "Broker topology declared"
    );
    Ok(())
}

pub async fn declare_exchange(channel: &Channel, exchange: &str) -> Result<(), AmqpError> {
    channel
        .exchange_declare(
            exchange,
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                durable: true,
                ..ExchangeDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await?;
    Ok(())
}

async fn declare_bound_queue(
    channel: &Channel,
    exchange: &str,
    queue: &str,
    routing_key: &str,
    arguments: FieldTable,
) -> Result<(), AmqpError> {
    channel
        .queue_declare(
            queue,
            QueueDeclareOptions {
                durable: true,
                ..QueueDeclareOptions::default()
            },
            arguments,
        )
        .await?;

    channel
        .queue_bind(
            queue,
            exchange,
            routing_key,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;
    Ok(())
}

/// Messages parked in the retry queue carry a per-message TTL; on expiry
/// RabbitMQ dead-letters them back onto the main routing key.
pub fn retry_queue_arguments(topology: &Topology) -> FieldTable {
    let mut arguments = FieldTable::default();
    arguments.insert(
        "x-dead-letter-exchange".into(),
        AMQPValue::LongString(topology.exchange.as_str().into()),
    );
    arguments.insert(
        "x-dead-letter-routing-key".into(),
        AMQPValue::LongString(topology.routing_key.as_str().into()),
    );
    arguments
}
