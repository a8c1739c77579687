//! # Multi-Step Composition
//!
//! A composition chains atomic plugins over one working set of objects.
//!
//! ## Overview
//!
//! Steps run in declaration order. Each enabled step receives the objects of its
//! declared type from the current working set; objects of other types pass
//! through untouched. When a step produces an outcome object (a SIP becoming an
//! AIP, say), later steps work on the outcome object instead of the source.
//!
//! - A disabled step never instantiates its plugin and is recorded as SKIPPED.
//! - A step flagged `stop_on_failure` that ends with any FAILURE skips every
//!   later step.
//! - Each step plugin only receives the parent's parameters it declares itself.
//!
//! The driver (`run_composition`) is shared by two executors: the orchestrator
//! runs each step across its worker pool and reports one item per step nesting
//! the per-object items, while `MultipleStepPlugin::execute` runs the steps
//! inline for one batch and reports one item per object nesting its step items.

use super::context::{BatchContext, JobContext};
use super::errors::{PluginError, PluginResult};
use super::plugin::{configure_plugin, CompositionView, Plugin, PluginInfo};
use super::parameter::ParameterValues;
use crate::constants::details;
use crate::logging::log_plugin_operation;
use crate::models::{LiteReference, ObjectType, PluginState, ReportItem};
use crate::orchestration::OutcomeRecorder;
use crate::registry::PluginRegistry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One stage of a composition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub plugin_id: String,
    /// Objects of this type are handed to the step; `None` takes the whole working set
    pub object_type: Option<ObjectType>,
    /// Boolean parameter of the composition that switches the step on or off
    pub parameter_id: Option<String>,
    pub enabled_by_default: bool,
    pub stop_on_failure: bool,
}

impl Step {
    pub fn new(plugin_id: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            object_type: None,
            parameter_id: None,
            enabled_by_default: true,
            stop_on_failure: false,
        }
    }

    pub fn for_type(mut self, object_type: ObjectType) -> Self {
        self.object_type = Some(object_type);
        self
    }

    pub fn toggled_by(mut self, parameter_id: impl Into<String>) -> Self {
        self.parameter_id = Some(parameter_id.into());
        self
    }

    pub fn disabled_by_default(mut self) -> Self {
        self.enabled_by_default = false;
        self
    }

    pub fn stop_on_failure(mut self) -> Self {
        self.stop_on_failure = true;
        self
    }

    pub fn is_enabled(&self, values: &ParameterValues) -> bool {
        self.parameter_id
            .as_deref()
            .and_then(|id| values.get_bool(id))
            .unwrap_or(self.enabled_by_default)
    }

    pub fn targets(&self, object_type: &ObjectType) -> bool {
        self.object_type
            .as_ref()
            .map_or(true, |declared| declared == object_type)
    }
}

/// A step with its plugin configured and initialized, or `None` when disabled
pub struct PreparedStep {
    pub index: usize,
    pub step: Step,
    pub info: PluginInfo,
    pub plugin: Option<Arc<dyn Plugin>>,
}

impl PreparedStep {
    pub fn is_enabled(&self) -> bool {
        self.plugin.is_some()
    }
}

/// Instantiate, configure and initialize every enabled step.
///
/// On failure the steps prepared so far are shut down before returning.
pub async fn prepare_steps(
    steps: &[Step],
    values: &ParameterValues,
    registry: &PluginRegistry,
) -> PluginResult<Vec<PreparedStep>> {
    let mut prepared = Vec::with_capacity(steps.len());
    for (index, step) in steps.iter().enumerate() {
        match prepare_step(index, step, values, registry).await {
            Ok(ready) => prepared.push(ready),
            Err(error) => {
                shutdown_steps(&prepared).await;
                return Err(error);
            }
        }
    }
    Ok(prepared)
}

async fn prepare_step(
    index: usize,
    step: &Step,
    values: &ParameterValues,
    registry: &PluginRegistry,
) -> PluginResult<PreparedStep> {
    let mut plugin = registry.create(&step.plugin_id).ok_or_else(|| {
        PluginError::Configuration(format!(
            "Step {index} uses unregistered plugin '{}'",
            step.plugin_id
        ))
    })?;
    let info = plugin.info();

    if !step.is_enabled(values) {
        debug!(step_index = index, plugin_id = %step.plugin_id, "Step disabled, plugin not initialized");
        return Ok(PreparedStep {
            index,
            step: step.clone(),
            info,
            plugin: None,
        });
    }

    let declared: Vec<String> = plugin.parameters().into_iter().map(|p| p.id).collect();
    let raw = values.raw_subset(declared.iter().map(String::as_str));
    configure_plugin(plugin.as_mut(), &raw, |id| registry.contains(id))?;

    if let Err(error) = plugin.init().await {
        plugin.shutdown().await;
        return Err(error);
    }

    Ok(PreparedStep {
        index,
        step: step.clone(),
        info,
        plugin: Some(Arc::from(plugin)),
    })
}

pub async fn shutdown_steps(steps: &[PreparedStep]) {
    for step in steps {
        if let Some(plugin) = &step.plugin {
            plugin.shutdown().await;
        }
    }
}

/// Runs one enabled step over its share of the working set
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Every reference must end with an outcome in `recorder`. Errors are only
    /// returned for failures the caller should retry as a whole.
    async fn run_step(
        &self,
        job: &Arc<JobContext>,
        step: &PreparedStep,
        plugin: Arc<dyn Plugin>,
        references: Vec<LiteReference>,
        recorder: Arc<OutcomeRecorder>,
    ) -> PluginResult<()>;
}

/// Runs a step as a single `execute` call in the caller's task
pub struct InlineStepExecutor;

#[async_trait]
impl StepExecutor for InlineStepExecutor {
    async fn run_step(
        &self,
        job: &Arc<JobContext>,
        step: &PreparedStep,
        plugin: Arc<dyn Plugin>,
        references: Vec<LiteReference>,
        recorder: Arc<OutcomeRecorder>,
    ) -> PluginResult<()> {
        let ctx = BatchContext::new(Arc::clone(job), Arc::clone(&recorder));
        match plugin.execute(&ctx, references.clone()).await {
            Ok(()) => {
                recorder
                    .fail_unfinished(&step.info, &references, details::NO_OUTCOME_REPORTED)
                    .await;
                Ok(())
            }
            Err(error @ PluginError::Infrastructure(_)) => Err(error),
            Err(error) => {
                recorder
                    .fail_unfinished(&step.info, &references, &error.to_string())
                    .await;
                Ok(())
            }
        }
    }
}

/// How the driver lays out step results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportLayout {
    /// One top-level item per step nesting per-object items, written live into
    /// the job report and counted on step progress
    JobSteps,
    /// Per-object step items collected on the slots for the caller to nest
    Nested,
}

/// Result of threading one source object through the composition
#[derive(Debug, Clone)]
pub struct SlotOutcome {
    pub source: LiteReference,
    /// Reference after the last step, the outcome object when one was produced
    pub current: LiteReference,
    /// Failed or was never processed by at least one enabled step
    pub failed: bool,
    /// Step items for this object, filled in `Nested` layout
    pub items: Vec<ReportItem>,
}

fn step_state(targeted: usize, failures: usize) -> PluginState {
    if failures == 0 {
        PluginState::Success
    } else if failures == targeted {
        PluginState::Failure
    } else {
        PluginState::PartialSuccess
    }
}

/// Thread `references` through `steps` in order
pub async fn run_composition(
    steps: &[PreparedStep],
    owner: &PluginInfo,
    references: Vec<LiteReference>,
    job: &Arc<JobContext>,
    layout: ReportLayout,
    executor: &dyn StepExecutor,
) -> PluginResult<Vec<SlotOutcome>> {
    let job_id = job.job_id();
    let mut slots: Vec<SlotOutcome> = references
        .into_iter()
        .map(|reference| SlotOutcome {
            source: reference.clone(),
            current: reference,
            failed: false,
            items: Vec::new(),
        })
        .collect();

    // unresolved references are reported once and leave the working set
    for slot in slots.iter_mut().filter(|slot| !slot.source.is_resolved()) {
        slot.failed = true;
        let mut item = ReportItem::new(&owner.id, &owner.name, &owner.version)
            .for_object(&slot.source)
            .in_job(job_id);
        item.add_details(format!(
            "Could not resolve {}: {}",
            slot.source,
            slot.source.cause.as_deref().unwrap_or_default()
        ));
        if item.set_outcome(PluginState::Failure).is_ok() {
            match layout {
                ReportLayout::JobSteps => {
                    job.record_job_item(item).await;
                }
                ReportLayout::Nested => slot.items.push(item),
            }
        }
    }

    if layout == ReportLayout::JobSteps {
        job.info()
            .begin_steps(steps.iter().filter(|step| step.is_enabled()).count());
    }

    let mut halted: Option<&'static str> = None;
    let mut previous_ran = false;

    for step in steps {
        let targeted: Vec<usize> = slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| {
                slot.current.is_resolved() && step.step.targets(&slot.current.object_type)
            })
            .map(|(position, _)| position)
            .collect();

        if halted.is_none() && job.is_cancelled() {
            info!(job_id = %job_id, step_index = step.index, "🛑 Job cancelled, skipping remaining steps");
            halted = Some(details::JOB_CANCELLED);
            for slot in slots.iter_mut().filter(|slot| slot.current.is_resolved()) {
                slot.failed = true;
            }
        }

        let skip_reason = match (halted, &step.plugin) {
            (Some(reason), _) => Some(reason),
            (None, None) => Some(details::STEP_DISABLED),
            (None, Some(_)) => None,
        };

        let plugin = match (skip_reason, &step.plugin) {
            (None, Some(plugin)) => Arc::clone(plugin),
            (reason, _) => {
                let reason = reason.unwrap_or(details::STEP_DISABLED);
                log_plugin_operation("step", job_id, &step.info.id, Some(step.index), "skipped");
                record_skipped_step(step, &mut slots, &targeted, reason, job, layout).await;
                continue;
            }
        };

        if previous_ran && job.commit_between_steps() {
            let types: BTreeSet<ObjectType> = targeted
                .iter()
                .map(|&position| slots[position].current.object_type.clone())
                .collect();
            for object_type in types {
                if let Err(error) = job.index().commit(&object_type).await {
                    warn!(job_id = %job_id, object_type = %object_type, error = %error, "Index commit between steps failed");
                }
            }
        }

        let references: Vec<LiteReference> = targeted
            .iter()
            .map(|&position| slots[position].current.clone())
            .collect();

        let mut recorder = OutcomeRecorder::detached(job_id, Some(step.index));
        let section = match layout {
            ReportLayout::JobSteps => {
                let header = ReportItem::new(&step.info.id, &step.info.name, &step.info.version)
                    .in_job(job_id)
                    .at_step(step.index);
                let section = job.record_job_item(header).await;
                job.info().begin_step(references.len());
                recorder = recorder
                    .with_report(Arc::clone(job.sink()), Some(section))
                    .with_store(Arc::clone(job.store()))
                    .with_step_progress(Arc::clone(job.info()));
                Some(section)
            }
            ReportLayout::Nested => None,
        };
        let recorder = Arc::new(recorder);

        log_plugin_operation("step", job_id, &step.info.id, Some(step.index), "started");
        executor
            .run_step(job, step, plugin, references, Arc::clone(&recorder))
            .await?;

        let mut failures = 0;
        let mut hard_failures = 0;
        for &position in &targeted {
            let slot = &mut slots[position];
            match recorder.outcome(&slot.current.id) {
                Some(item) => {
                    if !item.state().counts_as_success() {
                        failures += 1;
                        slot.failed = true;
                    }
                    if item.state() == PluginState::Failure {
                        hard_failures += 1;
                    }
                    if let Some(next) = item.forward_reference() {
                        slot.current = next;
                    }
                    if layout == ReportLayout::Nested {
                        slot.items.push(item);
                    }
                }
                None => {
                    failures += 1;
                    hard_failures += 1;
                    slot.failed = true;
                }
            }
        }

        let state = step_state(targeted.len(), failures);
        if let Some(section) = section {
            let summary = format!(
                "{} of {} object(s) processed successfully",
                targeted.len() - failures,
                targeted.len()
            );
            if let Some(header) = job.sink().settle(section, state, Some(&summary)) {
                job.persist(&header).await;
            }
            job.info().finish_step();
        }
        log_plugin_operation("step", job_id, &step.info.id, Some(step.index), &state.to_string());

        if step.step.stop_on_failure && hard_failures > 0 {
            info!(
                job_id = %job_id,
                step_index = step.index,
                failures = hard_failures,
                "⛔ Step failed with stop-on-failure set, skipping remaining steps"
            );
            halted = Some(details::STEP_STOPPED);
        }
        previous_ran = true;
    }

    Ok(slots)
}

async fn record_skipped_step(
    step: &PreparedStep,
    slots: &mut [SlotOutcome],
    targeted: &[usize],
    reason: &str,
    job: &Arc<JobContext>,
    layout: ReportLayout,
) {
    let job_id = job.job_id();
    let skipped_item = |reference: &LiteReference| {
        let mut item = ReportItem::new(&step.info.id, &step.info.name, &step.info.version)
            .for_object(reference)
            .in_job(job_id)
            .at_step(step.index);
        item.add_details(reason);
        let _ = item.set_outcome(PluginState::Skipped);
        item
    };

    match layout {
        ReportLayout::JobSteps => {
            let mut header = ReportItem::new(&step.info.id, &step.info.name, &step.info.version)
                .in_job(job_id)
                .at_step(step.index);
            header.add_details(reason);
            let _ = header.set_outcome(PluginState::Skipped);
            let children: Vec<ReportItem> = targeted
                .iter()
                .map(|&position| skipped_item(&slots[position].current))
                .collect();
            for child in &children {
                job.persist(child).await;
            }
            for child in children {
                header.add_item(child);
            }
            job.record_job_item(header).await;
        }
        ReportLayout::Nested => {
            for &position in targeted {
                let item = skipped_item(&slots[position].current);
                slots[position].items.push(item);
            }
        }
    }
}

/// Composition plugin: runs its steps in order and is itself a `Plugin`
pub struct MultipleStepPlugin {
    info: PluginInfo,
    steps: Vec<Step>,
    values: ParameterValues,
}

impl MultipleStepPlugin {
    pub fn new(info: PluginInfo, steps: Vec<Step>) -> Self {
        Self {
            info,
            steps,
            values: ParameterValues::new(),
        }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

#[async_trait]
impl Plugin for MultipleStepPlugin {
    fn info(&self) -> PluginInfo {
        self.info.clone()
    }

    fn set_parameter_values(&mut self, values: ParameterValues) -> PluginResult<()> {
        self.values = values;
        Ok(())
    }

    async fn execute(&self, ctx: &BatchContext, batch: Vec<LiteReference>) -> PluginResult<()> {
        let job = Arc::clone(ctx.job_handle());
        let prepared = prepare_steps(&self.steps, &self.values, job.registry()).await?;
        let result = run_composition(
            &prepared,
            &self.info,
            batch,
            &job,
            ReportLayout::Nested,
            &InlineStepExecutor,
        )
        .await;
        shutdown_steps(&prepared).await;

        for slot in result? {
            if ctx.is_finished(&slot.source.id) {
                continue;
            }
            let mut item = ctx.new_item(&self.info, &slot.source);
            if slot.current != slot.source {
                item.set_outcome_object(&slot.current);
            }
            for child in slot.items {
                item.add_item(child);
            }
            let state = if slot.failed {
                PluginState::Failure
            } else {
                PluginState::Success
            };
            if item.set_outcome(state).is_ok() {
                ctx.record_outcome(item).await;
            }
        }
        Ok(())
    }

    fn clone_me(&self) -> Box<dyn Plugin> {
        Box::new(Self::new(self.info.clone(), self.steps.clone()))
    }

    fn composition(&self) -> Option<CompositionView<'_>> {
        Some(CompositionView {
            steps: &self.steps,
            values: &self.values,
        })
    }
}
