//! # Outcome Recorder
//!
//! Single point through which per-object outcomes of one job (or one step of a
//! multi-step job) are recorded.
//!
//! ## Overview
//!
//! Recording an outcome does, at most once per object:
//!
//! 1. remember the terminal item (batch retries skip finished objects)
//! 2. count it on the job's progress aggregator
//! 3. upsert it into the live report tree
//! 4. persist it to the job store keyed by `(job, object, step)`
//!
//! A second outcome for the same object is dropped with a warning, so an
//! object is never counted twice even when a timed-out batch races with the
//! engine filling in its unfinished objects.

use super::job_plugin_info::JobPluginInfo;
use super::report_sink::ReportSink;
use crate::logging::log_error;
use crate::models::{LiteReference, PluginState, ReportItem};
use crate::plugins::PluginInfo;
use crate::services::{JobStore, ReportKey};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Which counters an outcome moves
#[derive(Clone)]
enum Progress {
    None,
    /// Job-level success/failure counters
    Job(Arc<JobPluginInfo>),
    /// Step progress of a multi-step job; job counters are settled per object later
    Step(Arc<JobPluginInfo>),
}

pub struct OutcomeRecorder {
    job_id: Uuid,
    step_index: Option<usize>,
    progress: Progress,
    report: Option<(Arc<ReportSink>, Option<usize>)>,
    store: Option<Arc<dyn JobStore>>,
    outcomes: DashMap<String, ReportItem>,
}

impl OutcomeRecorder {
    /// Recorder that only remembers outcomes
    pub fn detached(job_id: Uuid, step_index: Option<usize>) -> Self {
        Self {
            job_id,
            step_index,
            progress: Progress::None,
            report: None,
            store: None,
            outcomes: DashMap::new(),
        }
    }

    pub fn with_report(mut self, sink: Arc<ReportSink>, section: Option<usize>) -> Self {
        self.report = Some((sink, section));
        self
    }

    pub fn with_store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_job_counters(mut self, info: Arc<JobPluginInfo>) -> Self {
        self.progress = Progress::Job(info);
        self
    }

    pub fn with_step_progress(mut self, info: Arc<JobPluginInfo>) -> Self {
        self.progress = Progress::Step(info);
        self
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn step_index(&self) -> Option<usize> {
        self.step_index
    }

    /// Blank item for `reference`, attributed to `plugin` within this job and step
    pub fn new_item(&self, plugin: &PluginInfo, reference: &LiteReference) -> ReportItem {
        let mut item = ReportItem::new(&plugin.id, &plugin.name, &plugin.version)
            .for_object(reference)
            .in_job(self.job_id);
        item.step_index = self.step_index;
        item
    }

    /// A batch was handed to a worker
    pub fn on_dispatch(&self, count: usize) {
        if let Progress::Job(info) = &self.progress {
            info.start_processing(count);
        }
    }

    pub fn is_finished(&self, object_id: &str) -> bool {
        self.outcomes.contains_key(object_id)
    }

    /// Terminal item recorded for an object
    pub fn outcome(&self, object_id: &str) -> Option<ReportItem> {
        self.outcomes.get(object_id).map(|item| item.value().clone())
    }

    pub fn finished_count(&self) -> usize {
        self.outcomes.len()
    }

    /// Count of recorded outcomes that are not successes
    pub fn failure_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|item| !item.value().state().counts_as_success())
            .count()
    }

    /// Write a `Running` item so a crash mid-object still shows the object in flight
    pub async fn report_partial(&self, item: &ReportItem) {
        let Some(key) = item.source_object_id.clone() else {
            return;
        };
        if self.is_finished(&key) {
            return;
        }
        if let Some((sink, section)) = &self.report {
            sink.upsert(*section, &key, item.clone());
        }
        self.persist(&key, item).await;
    }

    /// Record the terminal outcome of one object.
    ///
    /// Returns false when the item is not terminal or the object already has an
    /// outcome.
    pub async fn record(&self, mut item: ReportItem) -> bool {
        if !item.is_terminal() {
            warn!(
                job_id = %self.job_id,
                object_id = ?item.source_object_id,
                "Ignoring report item without terminal outcome"
            );
            return false;
        }

        item.job_id = Some(self.job_id);
        if item.step_index.is_none() {
            item.step_index = self.step_index;
        }
        let key = item
            .source_object_id
            .clone()
            .unwrap_or_else(|| item.id.to_string());

        match self.outcomes.entry(key.clone()) {
            Entry::Occupied(_) => {
                debug!(job_id = %self.job_id, object_id = %key, "Outcome already recorded, dropping duplicate");
                return false;
            }
            Entry::Vacant(slot) => {
                slot.insert(item.clone());
            }
        }

        match &self.progress {
            Progress::Job(info) => info.increment(item.state()),
            Progress::Step(info) => info.step_object_done(),
            Progress::None => {}
        }

        if let Some((sink, section)) = &self.report {
            sink.upsert(*section, &key, item.clone());
        }
        self.persist(&key, &item).await;
        true
    }

    /// Record a FAILURE for every object of `batch` that has no outcome yet
    pub async fn fail_unfinished(&self, plugin: &PluginInfo, batch: &[LiteReference], details: &str) {
        self.settle_unfinished(plugin, batch, PluginState::Failure, details)
            .await;
    }

    /// Record a SKIPPED item for objects that were never dispatched
    pub async fn skip(&self, plugin: &PluginInfo, batch: &[LiteReference], details: &str) {
        self.settle_unfinished(plugin, batch, PluginState::Skipped, details)
            .await;
    }

    async fn settle_unfinished(
        &self,
        plugin: &PluginInfo,
        batch: &[LiteReference],
        state: PluginState,
        details: &str,
    ) {
        for reference in batch {
            if self.is_finished(&reference.id) {
                continue;
            }
            let mut item = self.new_item(plugin, reference);
            item.add_details(details);
            if item.set_outcome(state).is_ok() {
                self.record(item).await;
            }
        }
    }

    async fn persist(&self, object_id: &str, item: &ReportItem) {
        let Some(store) = &self.store else {
            return;
        };
        let key = ReportKey::new(object_id, self.step_index);
        if let Err(error) = store.save_report_item(self.job_id, &key, item).await {
            log_error(
                "outcome_recorder",
                "save_report_item",
                &error.to_string(),
                Some(object_id),
            );
        }
    }
}
