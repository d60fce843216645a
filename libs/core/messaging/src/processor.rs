//! Processor trait for job execution.

use crate::error::ProcessingError;
use crate::job::Job;
use async_trait::async_trait;

/// Executes one job.
///
/// The returned error's [`category`](ProcessingError::category) decides
/// whether the consumer retries or dead-letters the message.
#[async_trait]
pub trait Processor<J: Job>: Send + Sync {
    async fn process(&self, job: &J) -> Result<(), ProcessingError>;

    /// Used for logging and metric labels.
    fn name(&self) -> &'static str;

    /// Checked once before the consumer starts.
    async fn health_check(&self) -> Result<bool, ProcessingError> {
        Ok(true)
    }

    async fn on_complete(&self, _job: &J, _result: &Result<(), ProcessingError>) {}
}

/// Always fails with the configured category.
#[derive(Debug, Clone)]
pub struct FailingProcessor {
    transient: bool,
}

impl FailingProcessor {
    pub fn transient() -> Self {
        Self { transient: true }
    }

    pub fn permanent() -> Self {
        Self { transient: false }
    }
}

#[async_trait]
impl<J: Job> Processor<J> for FailingProcessor {
    async fn process(&self, _job: &J) -> Result<(), ProcessingError> {
        if self.transient {
            Err(ProcessingError::transient("simulated outage"))
        } else {
            Err(ProcessingError::permanent("simulated rejection"))
        }
    }

    fn name(&self) -> &'static str {
        "failing_processor"
    }
}
