//! Worker metrics, recorded through the `metrics` facade.

use metrics::{counter, histogram};
use std::time::Duration;

#[derive(Clone)]
pub struct WorkerMetrics {
    queue: String,
    processor: String,
}

impl WorkerMetrics {
    pub fn new(queue: &str, processor: &str) -> Self {
        Self {
            queue: queue.to_string(),
            processor: processor.to_string(),
        }
    }

    pub fn message_received(&self) {
        counter!(
            "amqp_worker_messages_received_total",
            "queue" => self.queue.clone(),
            "processor" => self.processor.clone()
        )
        .increment(1);
    }

    pub fn message_processed(&self, duration: Duration) {
        counter!(
            "amqp_worker_messages_processed_total",
            "queue" => self.queue.clone(),
            "processor" => self.processor.clone()
        )
        .increment(1);

        histogram!(
            "amqp_worker_processing_duration_seconds",
            "queue" => self.queue.clone(),
            "processor" => self.processor.clone()
        )
        .record(duration.as_secs_f64());
    }

    pub fn message_failed(&self, category: &str) {
        counter!(
            "amqp_worker_messages_failed_total",
            "queue" => self.queue.clone(),
            "processor" => self.processor.clone(),
            "category" => category.to_string()
        )
        .increment(1);
    }

    pub fn message_retried(&self) {
        counter!(
            "amqp_worker_messages_retried_total",
            "queue" => self.queue.clone(),
            "processor" => self.processor.clone()
        )
        .increment(1);
    }

    pub fn message_dead_lettered(&self) {
        counter!(
            "amqp_worker_messages_dead_lettered_total",
            "queue" => self.queue.clone(),
            "processor" => self.processor.clone()
        )
        .increment(1);
    }
}

/// Installs the global Prometheus recorder.
#[cfg(feature = "prometheus")]
pub fn init_metrics() -> Result<
    metrics_exporter_prometheus::PrometheusHandle,
    metrics_exporter_prometheus::BuildError,
> {
    metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()
}
