//! # Plugin Error Taxonomy
//!
//! How a failure inside a plugin is classified decides what the engine does
//! with it:
//!
//! | Variant          | Effect                                                     |
//! |------------------|------------------------------------------------------------|
//! | `Configuration`  | job ends `FailedDuringCreation`                            |
//! | `Resolution`     | job ends `FailedDuringCreation`                            |
//! | `Object`         | FAILURE item for the object, job continues                 |
//! | `PartialObject`  | PARTIAL_SUCCESS item, counted as success                   |
//! | `Infrastructure` | batch retried with backoff, then downgraded to `Object`    |
//! | `Timeout`        | unfinished objects of the batch recorded as FAILURE        |

use super::parameter::ParameterError;
use crate::services::{IndexError, ModelError};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Selection could not be resolved: {0}")]
    Resolution(String),
    #[error("{0}")]
    Object(String),
    #[error("{0}")]
    PartialObject(String),
    #[error("Infrastructure unavailable: {0}")]
    Infrastructure(String),
    #[error("Batch timed out after {0:?}")]
    Timeout(Duration),
}

impl PluginError {
    pub fn object(message: impl Into<String>) -> Self {
        Self::Object(message.into())
    }

    pub fn partial(message: impl Into<String>) -> Self {
        Self::PartialObject(message.into())
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        Self::Infrastructure(message.into())
    }

    /// Errors that abort job setup rather than a single object
    pub fn is_setup_failure(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Resolution(_))
    }
}

impl From<ParameterError> for PluginError {
    fn from(error: ParameterError) -> Self {
        PluginError::Configuration(error.to_string())
    }
}

impl From<ModelError> for PluginError {
    fn from(error: ModelError) -> Self {
        if error.is_unavailable() {
            PluginError::Infrastructure(error.to_string())
        } else {
            PluginError::Object(error.to_string())
        }
    }
}

impl From<IndexError> for PluginError {
    fn from(error: IndexError) -> Self {
        if error.is_unavailable() {
            PluginError::Infrastructure(error.to_string())
        } else {
            PluginError::Object(error.to_string())
        }
    }
}

pub type PluginResult<T> = Result<T, PluginError>;
