use thiserror::Error;
use uuid::Uuid;

use crate::plugins::ParameterError;
use crate::services::StoreError;
use crate::state_machine::StateMachineError;

/// Errors surfaced to callers of the orchestrator API.
///
/// Processing outcomes never show up here: an object that fails is a report item,
/// a job that cannot be set up is a `FailedDuringCreation` job.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum JobsError {
    #[error("Plugin not found: {0}")]
    PluginNotFound(String),
    #[error("Job not found: {0}")]
    JobNotFound(Uuid),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Invalid parameter: {0}")]
    Parameter(#[from] ParameterError),
    #[error("State transition error: {0}")]
    StateTransition(#[from] StateMachineError),
    #[error("Job store error: {0}")]
    Store(#[from] StoreError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<config::ConfigError> for JobsError {
    fn from(error: config::ConfigError) -> Self {
        JobsError::Configuration(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, JobsError>;
