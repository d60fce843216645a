//! Sequential consumer loop.

use crate::config::WorkerConfig;
use crate::connection::BrokerConnection;
use crate::consumer::{with_retry_count, AmqpConsumer, AmqpMessage};
use crate::dlq::{DlqEntry, DlqManager};
use crate::error::AmqpError;
use crate::metrics::WorkerMetrics;
use crate::producer::{AmqpProducer, OutgoingMessage};
use messaging::{ErrorCategory, Job, ProcessingError, Processor};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// What happens to a message whose processing failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Park in the retry queue for `delay_ms`, then redeliver with the counter bumped.
    Retry { delay_ms: u64, next_retry_count: u32 },
    DeadLetter,
}

/// Transient and rate-limited failures are retried while both the category
/// budget and the job's own limit allow it; everything else is dead-lettered.
pub fn disposition(error: &ProcessingError, retry_count: u32, max_retries: u32) -> Disposition {
    match error.category() {
        ErrorCategory::Permanent => Disposition::DeadLetter,
        ErrorCategory::Transient | ErrorCategory::RateLimited => {
            if error.should_retry(retry_count) && retry_count < max_retries {
                Disposition::Retry {
                    delay_ms: error.backoff_delay_ms(retry_count),
                    next_retry_count: retry_count + 1,
                }
            } else {
                Disposition::DeadLetter
            }
        }
    }
}

/// Consumes one queue with prefetch 1, running each message to completion
/// before receiving the next.
pub struct AmqpWorker<J: Job, P: Processor<J>> {
    connection: Arc<BrokerConnection>,
    producer: AmqpProducer,
    dlq: DlqManager,
    processor: Arc<P>,
    config: WorkerConfig,
    metrics: WorkerMetrics,
    _marker: PhantomData<J>,
}

impl<J: Job, P: Processor<J>> AmqpWorker<J, P> {
    pub fn new(connection: Arc<BrokerConnection>, processor: P, config: WorkerConfig) -> Self {
        let producer = AmqpProducer::new(connection.clone());
        let dlq = DlqManager::new(producer.clone(), &config.topology);
        let metrics = WorkerMetrics::new(&config.topology.queue, processor.name());

        Self {
            connection,
            producer,
            dlq,
            processor: Arc::new(processor),
            config,
            metrics,
            _marker: PhantomData,
        }
    }

    /// Runs until `shutdown_rx` flips to `true`.
    ///
    /// A broker error tears down the consumer session; the loop waits
    /// `reconnect_delay` and subscribes again. Unacked messages are
    /// redelivered by the broker, so nothing is lost across sessions.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) -> Result<(), AmqpError> {
        info!(
            queue = %self.config.topology.queue,
            consumer_tag = %self.config.consumer_tag,
            processor = self.processor.name(),
            "Starting AMQP worker"
        );

        match self.processor.health_check().await {
            Ok(true) => {}
            Ok(false) => warn!(processor = self.processor.name(), "Processor reports unhealthy"),
            Err(e) => warn!(processor = self.processor.name(), error = %e, "Processor health check failed"),
        }

        while !*shutdown_rx.borrow() {
            let mut consumer = match AmqpConsumer::subscribe(&self.connection, &self.config).await
            {
                Ok(consumer) => consumer,
                Err(e) if !self.connection.is_connected() => return Err(e),
                Err(e) => {
                    error!(error = %e, "Failed to subscribe, retrying");
                    tokio::time::sleep(self.config.reconnect_delay).await;
                    continue;
                }
            };

            let session = self.consume(&mut consumer, &mut shutdown_rx).await;
            consumer.close().await;

            match session {
                Ok(()) => break,
                Err(e) if !self.connection.is_connected() => return Err(e),
                Err(e) => {
                    error!(error = %e, "Consumer session failed, resubscribing");
                    tokio::time::sleep(self.config.reconnect_delay).await;
                }
            }
        }

        info!("AMQP worker stopped");
        Ok(())
    }

    async fn consume(
        &self,
        consumer: &mut AmqpConsumer,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<(), AmqpError> {
        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping consumer");
                        return Ok(());
                    }
                }
                delivery = consumer.next() => {
                    self.handle(delivery?).await?;
                }
            }
        }
    }

    /// Decides the fate of one delivery. Every path ends in exactly one ack
    /// or nack of the original.
    async fn handle(&self, message: AmqpMessage) -> Result<(), AmqpError> {
        self.metrics.message_received();
        let retry_count = message.retry_count();

        let job: J = match serde_json::from_slice(message.payload()) {
            Ok(job) => job,
            Err(e) => {
                warn!(error = %e, message_id = ?message.message_id(), "Undecodable message");
                self.metrics.message_failed(&ErrorCategory::Permanent.to_string());
                let entry = DlqEntry::for_undecodable(
                    message.payload(),
                    &e.to_string(),
                    retry_count,
                    &self.config.topology.routing_key,
                );
                return self.dead_letter(&message, &entry).await;
            }
        };

        let job_id = job.job_id();
        if message.redelivered() {
            debug!(job_id = %job_id, "Processing redelivered message");
        }

        let start = Instant::now();
        let result = self.processor.process(&job).await;
        self.processor.on_complete(&job, &result).await;

        match result {
            Ok(()) => {
                message.ack().await?;
                self.metrics.message_processed(start.elapsed());
                debug!(
                    job_id = %job_id,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Message processed"
                );
                Ok(())
            }
            Err(e) => self.handle_error(&message, &job, e, retry_count).await,
        }
    }

    async fn handle_error(
        &self,
        message: &AmqpMessage,
        job: &J,
        error: ProcessingError,
        retry_count: u32,
    ) -> Result<(), AmqpError> {
        let job_id = job.job_id();
        let category = error.category();
        self.metrics.message_failed(&category.to_string());

        match disposition(&error, retry_count, job.max_retries()) {
            Disposition::Retry {
                delay_ms,
                next_retry_count,
            } => {
                warn!(
                    job_id = %job_id,
                    error = %error,
                    retry_count,
                    delay_ms,
                    "Processing failed, scheduling retry"
                );

                let retry = OutgoingMessage::raw(
                    &self.config.topology.retry_routing_key,
                    message.message_id().unwrap_or_else(|| job_id.clone()),
                    message.payload().to_vec(),
                )
                .with_headers(with_retry_count(&message.headers(), next_retry_count))
                .with_expiration_ms(delay_ms);

                if let Err(e) = self.producer.publish(&retry).await {
                    error!(job_id = %job_id, error = %e, "Failed to schedule retry, requeueing");
                    message.nack(true).await?;
                    return Ok(());
                }

                message.ack().await?;
                self.metrics.message_retried();
                Ok(())
            }
            Disposition::DeadLetter => {
                if category == ErrorCategory::Permanent {
                    warn!(job_id = %job_id, error = %error, "Permanent failure, moving to DLQ");
                } else {
                    error!(job_id = %job_id, error = %error, retry_count, "Retries exhausted, moving to DLQ");
                }

                let entry = DlqEntry::for_job(
                    job_id,
                    serde_json::to_value(job)?,
                    &error.to_string(),
                    category,
                    retry_count,
                    &self.config.topology.routing_key,
                );
                self.dead_letter(message, &entry).await
            }
        }
    }

    async fn dead_letter(&self, message: &AmqpMessage, entry: &DlqEntry) -> Result<(), AmqpError> {
        if let Err(e) = self.dlq.move_to_dlq(entry).await {
            error!(error = %e, "Failed to publish to DLQ, requeueing");
            message.nack(true).await?;
            return Ok(());
        }

        message.ack().await?;
        self.metrics.message_dead_lettered();
        Ok(())
    }
}
