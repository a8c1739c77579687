use serde::{Deserialize, Serialize};
use std::fmt;

/// Job lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Submitted, nothing dispatched yet
    #[default]
    Created,
    /// Setup succeeded and object processing is under way
    Started,
    /// Every step and batch finished, whatever the per-object outcomes
    Completed,
    /// Configuration, selection resolution or plugin init failed before any object was processed
    FailedDuringCreation,
}

impl JobState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::FailedDuringCreation)
    }

    /// Check if the job is being processed
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Started)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Started => write!(f, "started"),
            Self::Completed => write!(f, "completed"),
            Self::FailedDuringCreation => write!(f, "failed_during_creation"),
        }
    }
}

impl std::str::FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "started" => Ok(Self::Started),
            "completed" => Ok(Self::Completed),
            "failed_during_creation" => Ok(Self::FailedDuringCreation),
            _ => Err(format!("Invalid job state: {s}")),
        }
    }
}
