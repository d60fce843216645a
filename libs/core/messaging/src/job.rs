//! Job trait for messages consumed by a worker.

use serde::{de::DeserializeOwned, Serialize};

/// A message body a worker knows how to process.
///
/// Retry bookkeeping lives in the transport envelope (e.g. an AMQP header),
/// not in the job itself, so domain events can be used as jobs unchanged.
///
/// ```rust
/// use messaging::Job;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Clone, Serialize, Deserialize)]
/// struct InvoicePaid {
///     invoice_id: String,
/// }
///
/// impl Job for InvoicePaid {
///     fn job_id(&self) -> String {
///         self.invoice_id.clone()
///     }
/// }
/// ```
pub trait Job: Serialize + DeserializeOwned + Send + Sync + Clone + 'static {
    /// Stable identifier, identical across redeliveries of the same message.
    fn job_id(&self) -> String;

    /// Upper bound on transient retries before the message is dead-lettered.
    fn max_retries(&self) -> u32 {
        3
    }

    /// Name used in logs and metric labels.
    fn job_type(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Clone, Serialize, Deserialize)]
    struct Ping {
        id: String,
    }

    impl Job for Ping {
        fn job_id(&self) -> String {
            self.id.clone()
        }
    }

    #[test]
    fn test_job_defaults() {
        let job = Ping {
            id: "ping-1".to_string(),
        };
        assert_eq!(job.job_id(), "ping-1");
        assert_eq!(job.max_retries(), 3);
        assert!(job.job_type().ends_with("Ping"));
    }
}
