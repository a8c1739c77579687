//! # Job Runner
//!
//! Drives one job from `Created` to a terminal state.
//!
//! ## Lifecycle
//!
//! ```text
//! set up:   configure parameters ─▶ open selection ─▶ init ─▶ prepare steps
//!              │ any failure: FailCreation, plugin shut down, no report items
//!              ▼
//! Start ─▶ before_all_execute ─▶ batches (worker pool) or steps ─▶ after_all_execute
//!              │ hook errors become FAILURE items, the job still completes
//!              ▼
//! shutdown ─▶ Complete
//! ```
//!
//! `shutdown` is called on the job's plugin exactly once on every path that
//! created it, and on every step plugin that was initialized.

use super::job_plugin_info::JobPluginInfo;
use super::outcome_recorder::OutcomeRecorder;
use super::report_sink::ReportSink;
use super::selection_resolver::{ReferenceStream, SelectionResolver};
use super::step_execution::PooledStepExecutor;
use super::worker_pool::{PoolPolicy, WorkerPool};
use crate::config::OrchestratorConfig;
use crate::logging::{log_error, log_job_operation, log_plugin_operation};
use crate::models::{Job, LiteReference, PluginState, Report, ReportItem};
use crate::plugins::{
    configure_plugin, prepare_steps, run_composition, shutdown_steps, JobContext, Plugin,
    PluginError, PluginInfo, PluginResult, PreparedStep, ReportLayout,
};
use crate::registry::PluginRegistry;
use crate::services::Collaborators;
use crate::state_machine::{JobEvent, JobState, JobStateMachine};
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

/// Live state of a submitted job, shared between its runner and the orchestrator
pub struct JobHandle {
    job: Mutex<Job>,
    machine: Mutex<JobStateMachine>,
    info: Arc<JobPluginInfo>,
    sink: Arc<ReportSink>,
    cancel: Arc<AtomicBool>,
    state_tx: watch::Sender<JobState>,
}

impl JobHandle {
    pub fn new(job: Job) -> Self {
        let (state_tx, _) = watch::channel(job.state);
        Self {
            machine: Mutex::new(JobStateMachine::new(job.id)),
            job: Mutex::new(job),
            info: Arc::new(JobPluginInfo::new()),
            sink: Arc::new(ReportSink::new()),
            cancel: Arc::new(AtomicBool::new(false)),
            state_tx,
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.job.lock().id
    }

    pub fn state(&self) -> JobState {
        *self.state_tx.borrow()
    }

    /// Copy of the job with live counters
    pub fn snapshot(&self) -> Job {
        let mut job = self.job.lock().clone();
        job.stats = self.info.snapshot();
        job.cancel_requested = self.cancel.load(Ordering::SeqCst);
        job
    }

    pub fn report(&self) -> Report {
        self.sink.snapshot()
    }

    /// Ask the runner to stop dispatching; false once the job is terminal
    pub fn request_cancel(&self) -> bool {
        if self.state().is_terminal() {
            return false;
        }
        !self.cancel.swap(true, Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> watch::Receiver<JobState> {
        self.state_tx.subscribe()
    }
}

pub struct JobRunner {
    config: OrchestratorConfig,
    registry: Arc<PluginRegistry>,
    collaborators: Collaborators,
    handle: Arc<JobHandle>,
}

/// Everything set up before the job starts
struct Prepared {
    plugin: Arc<dyn Plugin>,
    steps: Vec<PreparedStep>,
    stream: ReferenceStream,
}

impl JobRunner {
    pub fn new(
        config: OrchestratorConfig,
        registry: Arc<PluginRegistry>,
        collaborators: Collaborators,
        handle: Arc<JobHandle>,
    ) -> Self {
        Self {
            config,
            registry,
            collaborators,
            handle,
        }
    }

    pub async fn run(self) {
        let job = self.handle.snapshot();
        log_job_operation("run", job.id, &job.plugin_id, &job.state.to_string(), None);

        let Some(plugin) = self.registry.create(&job.plugin_id) else {
            let reason = format!("Plugin '{}' is not registered", job.plugin_id);
            self.transition(JobEvent::fail_with_error(reason)).await;
            return;
        };

        let prepared = match self.set_up(plugin, &job).await {
            Ok(prepared) => prepared,
            Err(error) => {
                self.transition(JobEvent::fail_with_error(error.to_string()))
                    .await;
                return;
            }
        };

        if self.transition(JobEvent::Start).await.is_none() {
            shutdown_steps(&prepared.steps).await;
            prepared.plugin.shutdown().await;
            return;
        }

        self.process(&prepared.plugin, &prepared.steps, prepared.stream)
            .await;

        shutdown_steps(&prepared.steps).await;
        prepared.plugin.shutdown().await;
        log_plugin_operation("shutdown", job.id, &job.plugin_id, None, "done");

        self.transition(JobEvent::Complete).await;
    }

    /// Configure, resolve, initialize. The plugin is shut down here when any
    /// of it fails.
    async fn set_up(&self, mut plugin: Box<dyn Plugin>, job: &Job) -> PluginResult<Prepared> {
        let registry = &self.registry;
        let configured = configure_plugin(plugin.as_mut(), &job.parameters, |id| {
            registry.contains(id)
        });
        if let Err(error) = configured {
            plugin.shutdown().await;
            return Err(error);
        }

        let resolver = SelectionResolver::new(
            Arc::clone(&self.collaborators.model),
            Arc::clone(&self.collaborators.index),
            &self.config,
        );
        let stream = match resolver.open(&job.selection).await {
            Ok(stream) => stream,
            Err(error) => {
                plugin.shutdown().await;
                return Err(error);
            }
        };

        if let Err(error) = plugin.init().await {
            plugin.shutdown().await;
            return Err(error);
        }
        log_plugin_operation("init", job.id, &job.plugin_id, None, "done");

        let composition = plugin
            .composition()
            .map(|view| (view.steps.to_vec(), view.values.clone()));
        let steps = match composition {
            Some((steps, values)) => match prepare_steps(&steps, &values, &self.registry).await {
                Ok(steps) => steps,
                Err(error) => {
                    plugin.shutdown().await;
                    return Err(error);
                }
            },
            None => Vec::new(),
        };

        Ok(Prepared {
            plugin: Arc::from(plugin),
            steps,
            stream,
        })
    }

    async fn process(&self, plugin: &Arc<dyn Plugin>, steps: &[PreparedStep], mut stream: ReferenceStream) {
        let handle = &self.handle;
        let info = plugin.info();
        handle.info.set_total(stream.total());

        let ctx = Arc::new(
            JobContext::new(
                handle.snapshot(),
                self.collaborators.clone(),
                Arc::clone(&self.registry),
                Arc::clone(&handle.info),
                Arc::clone(&handle.sink),
                Arc::clone(&handle.cancel),
            )
            .with_commit_between_steps(self.config.commit_index_before_resolve),
        );

        match plugin.before_all_execute(&ctx).await {
            Ok(report) => {
                for item in report.items {
                    ctx.record_job_item(item).await;
                }
            }
            Err(error) => record_hook_failure(&ctx, &info, "before_all_execute", &error).await,
        }

        let policy = PoolPolicy::for_job(&self.config, ctx.job().parallelism);
        if steps.is_empty() {
            let recorder = Arc::new(
                OutcomeRecorder::detached(ctx.job_id(), None)
                    .with_report(Arc::clone(&handle.sink), None)
                    .with_store(Arc::clone(&self.collaborators.store))
                    .with_job_counters(Arc::clone(&handle.info)),
            );
            WorkerPool::new(policy)
                .run(Arc::clone(plugin), Arc::clone(&ctx), recorder, &mut stream)
                .await;
        } else {
            self.process_steps(&info, steps, &ctx, policy, &mut stream)
                .await;
        }

        match plugin.after_all_execute(&ctx).await {
            Ok(report) => {
                for item in report.items {
                    ctx.record_job_item(item).await;
                }
            }
            Err(error) => record_hook_failure(&ctx, &info, "after_all_execute", &error).await,
        }
    }

    /// A composition needs its whole working set to thread it through the steps
    async fn process_steps(
        &self,
        info: &PluginInfo,
        steps: &[PreparedStep],
        ctx: &Arc<JobContext>,
        policy: PoolPolicy,
        stream: &mut ReferenceStream,
    ) {
        let mut references: Vec<LiteReference> = Vec::with_capacity(stream.total());
        loop {
            match stream.next_batch(policy.batch_size).await {
                Ok(Some(batch)) => references.extend(batch),
                Ok(None) => break,
                Err(error) => {
                    ctx.record_selection_failure(info, &error, stream.remaining())
                        .await;
                    break;
                }
            }
        }

        let progress = &self.handle.info;
        progress.start_processing(references.len());
        debug!(job_id = %ctx.job_id(), objects = references.len(), steps = steps.len(), "Running composition");

        let executor = PooledStepExecutor::new(policy);
        match run_composition(
            steps,
            info,
            references.clone(),
            ctx,
            ReportLayout::JobSteps,
            &executor,
        )
        .await
        {
            Ok(slots) => {
                for slot in slots {
                    if slot.failed {
                        progress.increment_failure();
                    } else {
                        progress.increment_success();
                    }
                }
            }
            Err(error) => {
                record_hook_failure(ctx, info, "execute", &error).await;
                for _ in &references {
                    progress.increment_failure();
                }
            }
        }
    }

    async fn transition(&self, event: JobEvent) -> Option<JobState> {
        let handle = &self.handle;
        let job_id = handle.job_id();
        let result = handle.machine.lock().transition(event.clone());
        let state = match result {
            Ok(state) => state,
            Err(error) => {
                log_error("job_runner", "transition", &error.to_string(), Some(&job_id.to_string()));
                return None;
            }
        };

        {
            let now = Utc::now();
            let mut job = handle.job.lock();
            job.state = state;
            match &event {
                JobEvent::Start => job.start_date = Some(now),
                JobEvent::Complete => job.end_date = Some(now),
                JobEvent::FailCreation(reason) => {
                    job.state_details = Some(reason.clone());
                    job.end_date = Some(now);
                }
            }
        }

        let snapshot = handle.snapshot();
        if let Err(error) = self.collaborators.store.save_job(&snapshot).await {
            log_error("job_runner", "save_job", &error.to_string(), Some(&job_id.to_string()));
        }
        handle.state_tx.send_replace(state);

        log_job_operation(
            event.event_type(),
            job_id,
            &snapshot.plugin_id,
            &state.to_string(),
            event.error_message(),
        );
        if state.is_terminal() {
            info!(
                job_id = %job_id,
                state = %state,
                success = snapshot.stats.processed_with_success,
                failure = snapshot.stats.processed_with_failure,
                total = snapshot.stats.total_objects,
                "🏁 Job finished"
            );
        }
        Some(state)
    }
}

/// A hook or the composition failed as a whole; recorded, never fatal to the job
async fn record_hook_failure(ctx: &JobContext, plugin: &PluginInfo, hook: &str, error: &PluginError) {
    log_plugin_operation(hook, ctx.job_id(), &plugin.id, None, "failed");
    let mut item = ReportItem::new(&plugin.id, &plugin.name, &plugin.version);
    item.add_details(format!("{hook} failed: {error}"));
    if item.set_outcome(PluginState::Failure).is_ok() {
        ctx.record_job_item(item).await;
    }
}
