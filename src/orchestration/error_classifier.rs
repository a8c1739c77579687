//! # Plugin Error Classification
//!
//! Maps a `PluginError` raised by a batch to the action the worker pool takes:
//! retry the unfinished objects after a delay, or record them as failed.
//!
//! ## Usage
//!
//! ```rust
//! use jobs_core::orchestration::{BackoffPolicy, ErrorCategory, ErrorClassifier};
//! use jobs_core::plugins::PluginError;
//!
//! let classifier = ErrorClassifier::new(BackoffPolicy::default());
//! let classification = classifier.classify(&PluginError::infrastructure("index down"), 1);
//! assert_eq!(classification.category, ErrorCategory::Transient);
//! assert!(classification.is_retryable);
//! ```

use super::backoff::BackoffPolicy;
use crate::plugins::PluginError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Job cannot be set up with the given parameters or plugin state
    Configuration,
    /// Object selection could not be resolved
    Selection,
    /// Error specific to the objects of the batch; retrying will not help
    Permanent,
    /// Collaborator unavailable; may succeed on retry
    Transient,
    Timeout,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configuration => "configuration",
            Self::Selection => "selection",
            Self::Permanent => "permanent",
            Self::Transient => "transient",
            Self::Timeout => "timeout",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorClassification {
    pub category: ErrorCategory,
    pub is_retryable: bool,
    /// Set only when the error will be retried
    pub retry_delay: Option<Duration>,
    pub is_final_attempt: bool,
    pub error_code: String,
    pub error_message: String,
}

#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier {
    policy: BackoffPolicy,
}

impl ErrorClassifier {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Classify an error raised by attempt number `attempt` (1-based)
    pub fn classify(&self, error: &PluginError, attempt: u32) -> ErrorClassification {
        let (category, error_code) = match error {
            PluginError::Configuration(_) => (ErrorCategory::Configuration, "PLUGIN_CONFIGURATION"),
            PluginError::Resolution(_) => (ErrorCategory::Selection, "SELECTION_UNRESOLVED"),
            PluginError::Object(_) | PluginError::PartialObject(_) => {
                (ErrorCategory::Permanent, "OBJECT_FAILURE")
            }
            PluginError::Infrastructure(_) => (ErrorCategory::Transient, "INFRASTRUCTURE_UNAVAILABLE"),
            PluginError::Timeout(_) => (ErrorCategory::Timeout, "BATCH_TIMEOUT"),
        };

        let is_final_attempt = !self.policy.has_attempts_left(attempt);
        let is_retryable = category == ErrorCategory::Transient && !is_final_attempt;
        let retry_delay = is_retryable.then(|| self.policy.delay_for_attempt(attempt));

        ErrorClassification {
            category,
            is_retryable,
            retry_delay,
            is_final_attempt,
            error_code: error_code.to_string(),
            error_message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> ErrorClassifier {
        ErrorClassifier::new(BackoffPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
        })
    }

    #[test]
    fn test_infrastructure_errors_retry_until_final_attempt() {
        let classifier = classifier();
        let error = PluginError::infrastructure("model down");

        let first = classifier.classify(&error, 1);
        assert!(first.is_retryable);
        assert_eq!(first.retry_delay, Some(Duration::from_millis(50)));

        let second = classifier.classify(&error, 2);
        assert_eq!(second.retry_delay, Some(Duration::from_millis(100)));

        let last = classifier.classify(&error, 3);
        assert!(!last.is_retryable);
        assert!(last.is_final_attempt);
        assert_eq!(last.retry_delay, None);
    }

    #[test]
    fn test_object_and_timeout_errors_are_not_retried() {
        let classifier = classifier();
        let object = classifier.classify(&PluginError::object("bad checksum"), 1);
        assert_eq!(object.category, ErrorCategory::Permanent);
        assert!(!object.is_retryable);

        let timeout = classifier.classify(&PluginError::Timeout(Duration::from_secs(1)), 1);
        assert_eq!(timeout.category, ErrorCategory::Timeout);
        assert_eq!(timeout.error_code, "BATCH_TIMEOUT");
        assert!(!timeout.is_retryable);
    }
}
