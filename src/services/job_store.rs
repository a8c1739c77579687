//! # Job Store
//!
//! Persistence for job records and report items. Items are keyed by
//! `(job_id, object_id, step_index)`, so re-saving an object's item replaces the
//! earlier write instead of duplicating it.

use crate::models::{Job, ReportItem};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Job store unavailable: {0}")]
    Unavailable(String),
    #[error("Job store serialization failed: {0}")]
    Serialization(String),
}

/// Identity of one persisted report record within a job
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReportKey {
    /// Source object id, or the item id for items that are not about one object
    pub object_id: String,
    pub step_index: Option<usize>,
}

impl ReportKey {
    pub fn new(object_id: impl Into<String>, step_index: Option<usize>) -> Self {
        Self {
            object_id: object_id.into(),
            step_index,
        }
    }

    /// Key an item by its source object, falling back to the item id
    pub fn for_item(item: &ReportItem) -> Self {
        let object_id = item
            .source_object_id
            .clone()
            .unwrap_or_else(|| item.id.to_string());
        Self::new(object_id, item.step_index)
    }
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn save_job(&self, job: &Job) -> Result<(), StoreError>;

    async fn load_job(&self, job_id: Uuid) -> Result<Option<Job>, StoreError>;

    /// Insert or replace the record stored under `key`
    async fn save_report_item(
        &self,
        job_id: Uuid,
        key: &ReportKey,
        item: &ReportItem,
    ) -> Result<(), StoreError>;

    async fn report_items(&self, job_id: Uuid) -> Result<Vec<(ReportKey, ReportItem)>, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: DashMap<Uuid, Job>,
    items: DashMap<(Uuid, ReportKey), ReportItem>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn save_job(&self, job: &Job) -> Result<(), StoreError> {
        self.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn load_job(&self, job_id: Uuid) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.get(&job_id).map(|job| job.value().clone()))
    }

    async fn save_report_item(
        &self,
        job_id: Uuid,
        key: &ReportKey,
        item: &ReportItem,
    ) -> Result<(), StoreError> {
        self.items.insert((job_id, key.clone()), item.clone());
        Ok(())
    }

    async fn report_items(&self, job_id: Uuid) -> Result<Vec<(ReportKey, ReportItem)>, StoreError> {
        let mut items: Vec<(ReportKey, ReportItem)> = self
            .items
            .iter()
            .filter(|entry| entry.key().0 == job_id)
            .map(|entry| (entry.key().1.clone(), entry.value().clone()))
            .collect();
        items.sort_by(|a, b| {
            a.1.created_on
                .cmp(&b.1.created_on)
                .then_with(|| a.0.cmp(&b.0))
        });
        Ok(items)
    }
}
