//! # Report Model
//!
//! Append-only outcome records of a job run. A `Report` is an ordered list of
//! `ReportItem`s; each item may nest the items of the sub-plugin steps that
//! worked on it.

use super::lite_reference::LiteReference;
use super::object::ObjectType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Outcome state of a report item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginState {
    /// Processing started, no outcome yet
    Running,
    Success,
    PartialSuccess,
    Failure,
    Skipped,
}

impl PluginState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Whether the outcome counts toward `processed_with_success`
    pub fn counts_as_success(&self) -> bool {
        matches!(self, Self::Success | Self::PartialSuccess)
    }
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::PartialSuccess => write!(f, "partial_success"),
            Self::Failure => write!(f, "failure"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReportError {
    #[error("Report item {item_id} already has terminal outcome {current}, refusing {attempted}")]
    OutcomeAlreadySet {
        item_id: Uuid,
        current: PluginState,
        attempted: PluginState,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportItem {
    pub id: Uuid,
    pub job_id: Option<Uuid>,
    pub plugin_id: String,
    pub plugin_name: String,
    pub plugin_version: String,
    pub source_object_id: Option<String>,
    pub source_object_type: Option<ObjectType>,
    pub outcome_object_id: Option<String>,
    pub outcome_object_type: Option<ObjectType>,
    /// Position of the step in a multi-step job
    pub step_index: Option<usize>,
    state: PluginState,
    pub details: String,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
    pub items: Vec<ReportItem>,
}

impl ReportItem {
    pub fn new(plugin_id: impl Into<String>, plugin_name: impl Into<String>, plugin_version: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            job_id: None,
            plugin_id: plugin_id.into(),
            plugin_name: plugin_name.into(),
            plugin_version: plugin_version.into(),
            source_object_id: None,
            source_object_type: None,
            outcome_object_id: None,
            outcome_object_type: None,
            step_index: None,
            state: PluginState::Running,
            details: String::new(),
            created_on: now,
            updated_on: now,
            items: Vec::new(),
        }
    }

    pub fn for_object(mut self, lite: &LiteReference) -> Self {
        self.source_object_id = Some(lite.id.clone());
        self.source_object_type = Some(lite.object_type.clone());
        self
    }

    pub fn in_job(mut self, job_id: Uuid) -> Self {
        self.job_id = Some(job_id);
        self
    }

    pub fn at_step(mut self, step_index: usize) -> Self {
        self.step_index = Some(step_index);
        self
    }

    pub fn state(&self) -> PluginState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Set the terminal outcome.
    ///
    /// Setting the same terminal state again is a no-op; changing a terminal state
    /// is refused. Corrections go into `details` or a new nested item.
    pub fn set_outcome(&mut self, state: PluginState) -> Result<(), ReportError> {
        if self.state.is_terminal() && self.state != state {
            return Err(ReportError::OutcomeAlreadySet {
                item_id: self.id,
                current: self.state,
                attempted: state,
            });
        }
        self.state = state;
        self.updated_on = Utc::now();
        Ok(())
    }

    /// Append to the details, one line per call
    pub fn add_details(&mut self, details: impl AsRef<str>) {
        let details = details.as_ref();
        if details.is_empty() {
            return;
        }
        if !self.details.is_empty() {
            self.details.push('\n');
        }
        self.details.push_str(details);
        self.updated_on = Utc::now();
    }

    pub fn with_outcome_object(mut self, lite: &LiteReference) -> Self {
        self.set_outcome_object(lite);
        self
    }

    pub fn set_outcome_object(&mut self, lite: &LiteReference) {
        self.outcome_object_id = Some(lite.id.clone());
        self.outcome_object_type = Some(lite.object_type.clone());
    }

    /// Reference the next step should work on: the outcome object when one was
    /// produced, otherwise the source
    pub fn forward_reference(&self) -> Option<LiteReference> {
        match (&self.outcome_object_id, &self.outcome_object_type) {
            (Some(id), Some(object_type)) => Some(LiteReference::new(object_type.clone(), id)),
            _ => match (&self.source_object_id, &self.source_object_type) {
                (Some(id), Some(object_type)) => {
                    Some(LiteReference::new(object_type.clone(), id))
                }
                _ => None,
            },
        }
    }

    pub fn add_item(&mut self, item: ReportItem) {
        self.items.push(item);
        self.updated_on = Utc::now();
    }
}

/// Ordered collection of report items produced by one job run or one hook call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub items: Vec<ReportItem>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_item(&mut self, item: ReportItem) {
        self.items.push(item);
    }

    pub fn extend(&mut self, other: Report) {
        self.items.extend(other.items);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn find_by_object(&self, object_id: &str) -> Option<&ReportItem> {
        self.items
            .iter()
            .find(|item| item.source_object_id.as_deref() == Some(object_id))
    }

    /// Number of top-level items in the given state
    pub fn count(&self, state: PluginState) -> usize {
        self.items.iter().filter(|item| item.state() == state).count()
    }
}
