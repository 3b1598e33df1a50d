//! Worker-side error sentinels.

use thiserror::Error;

/// A handler's verdict on its own failure. `SkipRetry` is the "permanent
/// failure" signal (§4.8, §9 glossary: "Skip-retry"): it short-circuits
/// straight to dead-letter instead of being retried up to `max_retry`.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("skip retry: {0}")]
    SkipRetry(String),
    #[error("{0}")]
    Retryable(String),
}

impl WorkerError {
    pub fn skip_retry(message: impl Into<String>) -> Self {
        Self::SkipRetry(message.into())
    }

    pub fn retryable(message: impl Into<String>) -> Self {
        Self::Retryable(message.into())
    }

    pub fn is_skip_retry(&self) -> bool {
        matches!(self, WorkerError::SkipRetry(_))
    }
}
