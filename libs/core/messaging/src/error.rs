//! Error types for message processing.

use std::fmt;
use thiserror::Error;

/// Error categories determine what a consumer does with a failed message.
///
/// - **Transient**: retried with exponential backoff, then dead-lettered
/// - **Permanent**: dead-lettered immediately
/// - **RateLimited**: retried with longer delays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network timeout, upstream 5xx, broker hiccup.
    /// Retry 3x with 1-30s exponential backoff
    Transient,

    /// Malformed payload, rejected by upstream. No retry.
    Permanent,

    /// Upstream asked us to slow down.
    /// Retry 5x with 5-120s exponential backoff
    RateLimited,
}

impl ErrorCategory {
    pub fn max_retries(&self) -> u32 {
        match self {
            ErrorCategory::Transient => 3,
            ErrorCategory::Permanent => 0,
            ErrorCategory::RateLimited => 5,
        }
    }

    pub fn base_backoff_ms(&self) -> u64 {
        match self {
            ErrorCategory::Transient => 1_000,
            ErrorCategory::Permanent => 0,
            ErrorCategory::RateLimited => 5_000,
        }
    }

    pub fn max_backoff_ms(&self) -> u64 {
        match self {
            ErrorCategory::Transient => 30_000,
            ErrorCategory::Permanent => 0,
            ErrorCategory::RateLimited => 120_000,
        }
    }

    /// `base * 2^retry_count`, capped at [`max_backoff_ms`](Self::max_backoff_ms).
    pub fn backoff_delay_ms(&self, retry_count: u32) -> u64 {
        if *self == ErrorCategory::Permanent {
            return 0;
        }

        self.base_backoff_ms()
            .saturating_mul(2u64.saturating_pow(retry_count))
            .min(self.max_backoff_ms())
    }

    /// Whether a message that has already been retried `retry_count` times may be retried again.
    pub fn should_retry(&self, retry_count: u32) -> bool {
        retry_count < self.max_retries()
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Transient => write!(f, "transient"),
            ErrorCategory::Permanent => write!(f, "permanent"),
            ErrorCategory::RateLimited => write!(f, "rate_limited"),
        }
    }
}

/// Failure returned by a [`Processor`](crate::Processor).
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("transient error: {message}")]
    Transient {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("permanent error: {message}")]
    Permanent {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after_ms: Option<u64>,
    },

    /// Payload could not be decoded into the expected job type.
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl ProcessingError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            source: None,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            message: message.into(),
            source: None,
        }
    }

    pub fn rate_limited(message: impl Into<String>, retry_after_ms: Option<u64>) -> Self {
        Self::RateLimited {
            message: message.into(),
            retry_after_ms,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ProcessingError::Transient { .. } => ErrorCategory::Transient,
            ProcessingError::Permanent { .. } => ErrorCategory::Permanent,
            ProcessingError::RateLimited { .. } => ErrorCategory::RateLimited,
            ProcessingError::Malformed(_) => ErrorCategory::Permanent,
        }
    }

    pub fn should_retry(&self, retry_count: u32) -> bool {
        self.category().should_retry(retry_count)
    }

    /// Backoff before the next attempt. A `retry_after_ms` hint wins over the category curve
    /// but is still capped at the rate-limited maximum.
    pub fn backoff_delay_ms(&self, retry_count: u32) -> u64 {
        if let ProcessingError::RateLimited {
            retry_after_ms: Some(ms),
            ..
        } = self
        {
            return (*ms).min(ErrorCategory::RateLimited.max_backoff_ms());
        }
        self.category().backoff_delay_ms(retry_count)
    }
}
