//! Dead letter queue.
//!
//! Messages that fail permanently, cannot be decoded, or exhaust their
//! retries are wrapped in a [`DlqEntry`] and published to the dead-letter
//! routing key for inspection and manual replay.

use crate::config::Topology;
use crate::error::AmqpError;
use crate::producer::{AmqpProducer, OutgoingMessage};
use chrono::{DateTime, Utc};
use messaging::ErrorCategory;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DlqEntry {
    /// `None` when the payload could not be decoded.
    pub job_id: Option<String>,
    /// Decoded job, when decoding succeeded.
    pub job_data: Option<serde_json::Value>,
    /// Original bytes (lossy UTF-8), kept when decoding failed.
    pub raw_payload: Option<String>,
    pub error: String,
    pub error_category: String,
    pub retry_count: u32,
    pub source_routing_key: String,
    pub failed_at: DateTime<Utc>,
}

impl DlqEntry {
    pub fn for_job(
        job_id: String,
        job_data: serde_json::Value,
        error: &str,
        category: ErrorCategory,
        retry_count: u32,
        source_routing_key: &str,
    ) -> Self {
        Self {
            job_id: Some(job_id),
            job_data: Some(job_data),
            raw_payload: None,
            error: error.to_string(),
            error_category: category.to_string(),
            retry_count,
            source_routing_key: source_routing_key.to_string(),
            failed_at: Utc::now(),
        }
    }

    pub fn for_undecodable(
        payload: &[u8],
        error: &str,
        retry_count: u32,
        source_routing_key: &str,
    ) -> Self {
        Self {
            job_id: None,
            job_data: None,
            raw_payload: Some(String::from_utf8_lossy(payload).into_owned()),
            error: error.to_string(),
            error_category: ErrorCategory::Permanent.to_string(),
            retry_count,
            source_routing_key: source_routing_key.to_string(),
            failed_at: Utc::now(),
        }
    }
}

/// Publishes [`DlqEntry`] records to the dead-letter routing key.
#[derive(Clone)]
pub struct DlqManager {
    producer: AmqpProducer,
    routing_key: String,
    queue: String,
}

impl DlqManager {
    pub fn new(producer: AmqpProducer, topology: &Topology) -> Self {
        Self {
            producer,
            routing_key: topology.dlq_routing_key.clone(),
            queue: topology.dlq_queue.clone(),
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub async fn move_to_dlq(&self, entry: &DlqEntry) -> Result<(), AmqpError> {
        let message_id = entry
            .job_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let message = OutgoingMessage::json(&self.routing_key, message_id, entry)?;
        self.producer.publish(&message).await?;

        info!(
            job_id = ?entry.job_id,
            dlq = %self.queue,
            error = %entry.error,
            retry_count = entry.retry_count,
            "Moved message to DLQ"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_undecodable_entry_keeps_raw_payload() {
        let entry = DlqEntry::for_undecodable(b"{oops", "expected value", 0, "merchant.created");
        assert_eq!(entry.job_id, None);
        assert_eq!(entry.raw_payload.as_deref(), Some("{oops"));
        assert_eq!(entry.error_category, "permanent");
    }

    #[test]
    fn test_job_entry_serializes_job_data() {
        let entry = DlqEntry::for_job(
            "0xabc".to_string(),
            json!({"merchant_id": "0xabc"}),
            "gateway timeout",
            ErrorCategory::Transient,
            3,
            "merchant.created",
        );
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["job_id"], "0xabc");
        assert_eq!(value["job_data"]["merchant_id"], "0xabc");
        assert_eq!(value["error_category"], "transient");
        assert_eq!(value["retry_count"], 3);
        assert!(value["raw_payload"].is_null());
    }
}
