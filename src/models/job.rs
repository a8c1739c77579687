//! # Job Model
//!
//! Durable description of "run plugin P with parameters X over selection S".
//! The orchestrator owns the live copy; callers receive snapshots through
//! `Orchestrator::get_job` with the progress counters refreshed.

use super::selection::ObjectSelection;
use crate::state_machine::JobState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Parallelism hint picking the worker pool size for a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobParallelism {
    #[default]
    Normal,
    /// Jobs touching shared resources run with `limited_worker_count` workers
    Limited,
}

/// Point-in-time copy of a job's progress counters.
///
/// `processed_with_success + processed_with_failure + objects_waiting +
/// objects_being_processed == total_objects` holds for every snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct JobStats {
    pub total_objects: usize,
    pub objects_waiting: usize,
    pub objects_being_processed: usize,
    pub processed_with_success: usize,
    pub processed_with_failure: usize,
    /// 0.0 to 100.0
    pub completion_percentage: f64,
    /// Enabled steps of a multi-step job, zero for single-step jobs
    pub total_steps: usize,
    pub completed_steps: usize,
}

impl JobStats {
    pub fn processed(&self) -> usize {
        self.processed_with_success + self.processed_with_failure
    }

    pub fn is_consistent(&self) -> bool {
        self.processed() + self.objects_waiting + self.objects_being_processed == self.total_objects
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub name: String,
    pub username: String,
    pub plugin_id: String,
    pub parameters: HashMap<String, String>,
    pub selection: ObjectSelection,
    pub state: JobState,
    /// Reason recorded with `FailedDuringCreation`
    pub state_details: Option<String>,
    pub parallelism: JobParallelism,
    pub created_on: DateTime<Utc>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub stats: JobStats,
    pub cancel_requested: bool,
}

impl Job {
    pub fn new(
        name: impl Into<String>,
        username: impl Into<String>,
        plugin_id: impl Into<String>,
        parameters: HashMap<String, String>,
        selection: ObjectSelection,
        parallelism: JobParallelism,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            username: username.into(),
            plugin_id: plugin_id.into(),
            parameters,
            selection,
            state: JobState::Created,
            state_details: None,
            parallelism,
            created_on: Utc::now(),
            start_date: None,
            end_date: None,
            stats: JobStats::default(),
            cancel_requested: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }
}
