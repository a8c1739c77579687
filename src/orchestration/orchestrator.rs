//! # Orchestrator
//!
//! Public entry point of the engine: submit jobs, query their state and
//! reports, cancel them, and wait for them to finish.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use jobs_core::config::OrchestratorConfig;
//! use jobs_core::models::{ObjectSelection, ObjectType};
//! use jobs_core::orchestration::{JobRequest, Orchestrator};
//! use jobs_core::plugins::{register_builtin_plugins, LIFT_DISPOSAL_HOLD_PLUGIN_ID};
//! use jobs_core::registry::PluginRegistry;
//! use jobs_core::services::Collaborators;
//! use std::sync::Arc;
//!
//! # async fn example() -> jobs_core::Result<()> {
//! let registry = Arc::new(PluginRegistry::new());
//! register_builtin_plugins(&registry);
//! let (collaborators, _model, _index) = Collaborators::in_memory();
//!
//! let orchestrator = Orchestrator::new(OrchestratorConfig::default(), registry, collaborators);
//! let job_id = orchestrator
//!     .submit(
//!         JobRequest::new(
//!             LIFT_DISPOSAL_HOLD_PLUGIN_ID,
//!             ObjectSelection::AllOfType { object_type: ObjectType::AIP },
//!         )
//!         .as_user("archivist")
//!         .with_parameter("disposal_hold_lift_all", "true"),
//!     )
//!     .await?;
//!
//! let job = orchestrator.wait_for_completion(job_id).await?;
//! println!("{} succeeded", job.stats.processed_with_success);
//! # Ok(())
//! # }
//! ```

use super::job_runner::{JobHandle, JobRunner};
use crate::config::OrchestratorConfig;
use crate::error::{JobsError, Result};
use crate::logging::log_job_operation;
use crate::models::{Job, JobParallelism, ObjectSelection, Report};
use crate::plugins::PluginInfo;
use crate::registry::PluginRegistry;
use crate::services::Collaborators;
use crate::state_machine::JobState;
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

/// What a caller asks the engine to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub name: String,
    pub username: String,
    pub plugin_id: String,
    pub parameters: HashMap<String, String>,
    pub selection: ObjectSelection,
    pub parallelism: JobParallelism,
}

impl JobRequest {
    pub fn new(plugin_id: impl Into<String>, selection: ObjectSelection) -> Self {
        let plugin_id = plugin_id.into();
        Self {
            name: plugin_id.clone(),
            username: "admin".to_string(),
            plugin_id,
            parameters: HashMap::new(),
            selection,
            parallelism: JobParallelism::default(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn as_user(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn with_parameter(mut self, id: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(id.into(), value.into());
        self
    }

    pub fn with_parallelism(mut self, parallelism: JobParallelism) -> Self {
        self.parallelism = parallelism;
        self
    }
}

/// Live handles of running jobs plus the most recently finished ones.
///
/// Finished jobs past the retention limit are evicted oldest first; the job
/// store still holds their record and report.
#[derive(Default)]
struct JobTable {
    handles: DashMap<Uuid, Arc<JobHandle>>,
    finished: Mutex<VecDeque<Uuid>>,
}

impl JobTable {
    fn retire(&self, job_id: Uuid, retained: usize) {
        let evicted: Vec<Uuid> = {
            let mut finished = self.finished.lock();
            finished.push_back(job_id);
            let excess = finished.len().saturating_sub(retained);
            finished.drain(..excess).collect()
        };
        for id in evicted {
            self.handles.remove(&id);
            debug!(job_id = %id, "Evicted finished job handle");
        }
    }
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    registry: Arc<PluginRegistry>,
    collaborators: Collaborators,
    jobs: Arc<JobTable>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        registry: Arc<PluginRegistry>,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            config,
            registry,
            collaborators,
            jobs: Arc::new(JobTable::default()),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Create a job and start running it in the background.
    ///
    /// Only an unknown plugin id is refused here; every other problem ends the
    /// job in `FailedDuringCreation`.
    pub async fn submit(&self, request: JobRequest) -> Result<Uuid> {
        if !self.registry.contains(&request.plugin_id) {
            return Err(JobsError::PluginNotFound(request.plugin_id));
        }

        let job = Job::new(
            request.name,
            request.username,
            request.plugin_id,
            request.parameters,
            request.selection,
            request.parallelism,
        );
        let job_id = job.id;
        self.collaborators.store.save_job(&job).await?;
        log_job_operation("submit", job_id, &job.plugin_id, &job.state.to_string(), None);

        let handle = Arc::new(JobHandle::new(job));
        self.jobs.handles.insert(job_id, Arc::clone(&handle));

        let runner = JobRunner::new(
            self.config.clone(),
            Arc::clone(&self.registry),
            self.collaborators.clone(),
            handle,
        );
        let jobs = Arc::clone(&self.jobs);
        let retained = self.config.retained_finished_jobs;
        tokio::spawn(async move {
            runner.run().await;
            jobs.retire(job_id, retained);
        });
        Ok(job_id)
    }

    fn handle(&self, job_id: Uuid) -> Result<Arc<JobHandle>> {
        self.jobs
            .handles
            .get(&job_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(JobsError::JobNotFound(job_id))
    }

    /// Job with live progress counters; jobs of earlier runs come from the store
    pub async fn get_job(&self, job_id: Uuid) -> Result<Job> {
        if let Ok(handle) = self.handle(job_id) {
            return Ok(handle.snapshot());
        }
        self.collaborators
            .store
            .load_job(job_id)
            .await?
            .ok_or(JobsError::JobNotFound(job_id))
    }

    /// Report so far; complete once the job is terminal
    pub async fn get_reports(&self, job_id: Uuid) -> Result<Report> {
        if let Ok(handle) = self.handle(job_id) {
            return Ok(handle.report());
        }
        if self.collaborators.store.load_job(job_id).await?.is_none() {
            return Err(JobsError::JobNotFound(job_id));
        }
        let mut report = Report::new();
        for (_, item) in self.collaborators.store.report_items(job_id).await? {
            report.add_item(item);
        }
        Ok(report)
    }

    /// Stop dispatching new batches; running batches finish.
    ///
    /// Returns false when the job already finished or was already cancelled.
    /// Finished jobs evicted from memory are reported as `JobNotFound`.
    pub fn cancel(&self, job_id: Uuid) -> Result<bool> {
        let requested = self.handle(job_id)?.request_cancel();
        if requested {
            info!(job_id = %job_id, "🛑 Cancellation requested");
        }
        Ok(requested)
    }

    pub fn subscribe(&self, job_id: Uuid) -> Result<watch::Receiver<JobState>> {
        Ok(self.handle(job_id)?.subscribe())
    }

    pub async fn wait_for_completion(&self, job_id: Uuid) -> Result<Job> {
        let Ok(mut receiver) = self.subscribe(job_id) else {
            // no live handle: evicted after finishing, or unknown
            return self.get_job(job_id).await;
        };
        receiver
            .wait_for(|state| state.is_terminal())
            .await
            .map(|_| ())
            .map_err(|_| JobsError::Internal(format!("Job {job_id} runner went away")))?;
        self.get_job(job_id).await
    }

    pub async fn wait_for_all(&self, job_ids: &[Uuid]) -> Result<Vec<Job>> {
        join_all(job_ids.iter().map(|&id| self.wait_for_completion(id)))
            .await
            .into_iter()
            .collect()
    }

    /// Jobs held in memory (running or recently finished), newest first
    pub fn list_jobs(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .jobs
            .handles
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        jobs.sort_by(|a, b| b.created_on.cmp(&a.created_on));
        jobs
    }

    pub fn list_plugins(&self, listable_only: bool) -> Vec<PluginInfo> {
        self.registry.list_plugins(listable_only)
    }
}
