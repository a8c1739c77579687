use serde::{Deserialize, Serialize};

/// Events that can trigger job state transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum JobEvent {
    /// Setup finished, first batch about to be dispatched
    Start,
    /// All steps and batches finished
    Complete,
    /// Setup failed before any object was processed
    FailCreation(String),
}

impl JobEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Complete => "complete",
            Self::FailCreation(_) => "fail_creation",
        }
    }

    /// Extract error message if this is a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::FailCreation(msg) => Some(msg),
            _ => None,
        }
    }

    /// Create a creation failure event with the given error message
    pub fn fail_with_error(error: impl Into<String>) -> Self {
        Self::FailCreation(error.into())
    }
}
