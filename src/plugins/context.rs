//! # Plugin Contexts
//!
//! What a plugin sees while a job runs. `JobContext` is shared by the hooks that
//! run once per job; `BatchContext` wraps it for one `execute` call and carries
//! the recorder that objects of the batch report their outcomes through.

use crate::logging::log_error;
use crate::models::{Job, LiteReference, PluginState, ReportItem};
use crate::orchestration::{JobPluginInfo, OutcomeRecorder, ReportSink};
use crate::registry::PluginRegistry;
use crate::services::{Collaborators, IndexService, JobStore, ModelService, ReportKey};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use super::errors::PluginError;
use super::plugin::PluginInfo;

pub struct JobContext {
    job: Job,
    collaborators: Collaborators,
    registry: Arc<PluginRegistry>,
    info: Arc<JobPluginInfo>,
    sink: Arc<ReportSink>,
    cancel: Arc<AtomicBool>,
    commit_between_steps: bool,
}

impl JobContext {
    pub fn new(
        job: Job,
        collaborators: Collaborators,
        registry: Arc<PluginRegistry>,
        info: Arc<JobPluginInfo>,
        sink: Arc<ReportSink>,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            job,
            collaborators,
            registry,
            info,
            sink,
            cancel,
            commit_between_steps: true,
        }
    }

    pub fn with_commit_between_steps(mut self, commit: bool) -> Self {
        self.commit_between_steps = commit;
        self
    }

    /// Snapshot of the job taken when processing started
    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn job_id(&self) -> Uuid {
        self.job.id
    }

    /// User the job runs as; plugins update objects on their behalf
    pub fn username(&self) -> &str {
        &self.job.username
    }

    pub fn model(&self) -> &Arc<dyn ModelService> {
        &self.collaborators.model
    }

    pub fn index(&self) -> &Arc<dyn IndexService> {
        &self.collaborators.index
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub(crate) fn store(&self) -> &Arc<dyn JobStore> {
        &self.collaborators.store
    }

    pub(crate) fn info(&self) -> &Arc<JobPluginInfo> {
        &self.info
    }

    pub(crate) fn sink(&self) -> &Arc<ReportSink> {
        &self.sink
    }

    pub(crate) fn commit_between_steps(&self) -> bool {
        self.commit_between_steps
    }

    /// Append an item that is not tied to one batch: pre-flight and post-flight
    /// results, step headers, selection failures
    pub(crate) async fn record_job_item(&self, mut item: ReportItem) -> usize {
        item.job_id = Some(self.job.id);
        let position = self.sink.push(item.clone());
        self.persist(&item).await;
        position
    }

    pub(crate) async fn persist(&self, item: &ReportItem) {
        let key = ReportKey::for_item(item);
        if let Err(error) = self
            .collaborators
            .store
            .save_report_item(self.job.id, &key, item)
            .await
        {
            log_error(
                "job_context",
                "save_report_item",
                &error.to_string(),
                Some(&key.object_id),
            );
        }
    }

    /// The selection stopped yielding references mid-run: record why and count
    /// the objects that will never be dispatched as failed
    pub(crate) async fn record_selection_failure(
        &self,
        plugin: &PluginInfo,
        error: &PluginError,
        undispatched: usize,
    ) {
        let mut item = ReportItem::new(&plugin.id, &plugin.name, &plugin.version);
        item.add_details(format!(
            "Object selection failed after dispatch started, {undispatched} object(s) not processed: {error}"
        ));
        if item.set_outcome(PluginState::Failure).is_ok() {
            self.record_job_item(item).await;
        }
        self.info.fail_waiting(undispatched);
    }
}

/// Context of one `execute` call
pub struct BatchContext {
    job: Arc<JobContext>,
    recorder: Arc<OutcomeRecorder>,
}

impl BatchContext {
    pub fn new(job: Arc<JobContext>, recorder: Arc<OutcomeRecorder>) -> Self {
        Self { job, recorder }
    }

    pub fn job(&self) -> &JobContext {
        &self.job
    }

    pub(crate) fn job_handle(&self) -> &Arc<JobContext> {
        &self.job
    }

    pub fn job_id(&self) -> Uuid {
        self.job.job_id()
    }

    /// Position of the running step in a multi-step job
    pub fn step_index(&self) -> Option<usize> {
        self.recorder.step_index()
    }

    /// Blank `Running` item for an object, attributed to `plugin`
    pub fn new_item(&self, plugin: &PluginInfo, reference: &LiteReference) -> ReportItem {
        self.recorder.new_item(plugin, reference)
    }

    /// Make the object visible as being processed before risky work starts
    pub async fn report_partial(&self, item: &ReportItem) {
        self.recorder.report_partial(item).await;
    }

    /// Record the object's terminal outcome, counted exactly once
    pub async fn record_outcome(&self, item: ReportItem) -> bool {
        self.recorder.record(item).await
    }

    /// Whether the object already has an outcome, e.g. from an earlier attempt
    pub fn is_finished(&self, object_id: &str) -> bool {
        self.recorder.is_finished(object_id)
    }
}
