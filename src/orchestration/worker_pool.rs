//! # Worker Pool
//!
//! Bounded pool that pulls batches from a `ReferenceStream` and runs
//! `Plugin::execute` on each of them in its own task.
//!
//! ## Overview
//!
//! ```text
//! ReferenceStream ──▶ [Semaphore] ──▶ spawn(run_batch) ──▶ Plugin::execute
//!                                          │
//!                                          ├─ Infrastructure ─▶ backoff, retry unfinished objects
//!                                          ├─ other error    ─▶ unfinished objects FAILURE
//!                                          └─ Ok             ─▶ unreported objects FAILURE
//! ```
//!
//! A permit is taken before the next batch is pulled, so at most `workers`
//! batches are in flight and the stream is never read ahead of the workers.
//! Cancellation is checked between batches: batches already running finish,
//! everything not yet dispatched is recorded as SKIPPED. A stalled batch is
//! aborted after `batch_timeout` and its unfinished objects recorded as
//! FAILURE.

use super::backoff::BackoffPolicy;
use super::error_classifier::ErrorClassifier;
use super::outcome_recorder::OutcomeRecorder;
use super::selection_resolver::ReferenceStream;
use crate::config::OrchestratorConfig;
use crate::constants::details;
use crate::logging::{log_error, log_plugin_operation};
use crate::models::{JobParallelism, LiteReference};
use crate::plugins::{BatchContext, JobContext, Plugin, PluginError, PluginInfo, PluginResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Sizing and failure policy of one pool run
#[derive(Debug, Clone, PartialEq)]
pub struct PoolPolicy {
    pub workers: usize,
    pub batch_size: usize,
    pub batch_timeout: Option<Duration>,
    pub backoff: BackoffPolicy,
}

impl PoolPolicy {
    pub fn for_job(config: &OrchestratorConfig, parallelism: JobParallelism) -> Self {
        let workers = match parallelism {
            JobParallelism::Normal => config.worker_count,
            JobParallelism::Limited => config.limited_worker_count,
        };
        Self {
            workers: workers.max(1),
            batch_size: config.batch_size.max(1),
            batch_timeout: config.batch_timeout(),
            backoff: BackoffPolicy::from(&config.retry),
        }
    }
}

/// What a pool run dispatched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolSummary {
    pub batches: usize,
    pub objects: usize,
    pub skipped: usize,
    /// Objects lost because the stream failed mid-run
    pub unresolved: usize,
}

pub struct WorkerPool {
    policy: PoolPolicy,
    classifier: ErrorClassifier,
}

impl WorkerPool {
    pub fn new(policy: PoolPolicy) -> Self {
        let classifier = ErrorClassifier::new(policy.backoff.clone());
        Self { policy, classifier }
    }

    pub fn policy(&self) -> &PoolPolicy {
        &self.policy
    }

    /// Dispatch every batch of `stream` and wait for all of them
    pub async fn run(
        &self,
        plugin: Arc<dyn Plugin>,
        job: Arc<JobContext>,
        recorder: Arc<OutcomeRecorder>,
        stream: &mut ReferenceStream,
    ) -> PoolSummary {
        let info = plugin.info();
        let job_id = job.job_id();
        let semaphore = Arc::new(Semaphore::new(self.policy.workers));
        let mut tasks = JoinSet::new();
        let mut summary = PoolSummary::default();

        info!(
            job_id = %job_id,
            plugin_id = %info.id,
            workers = self.policy.workers,
            batch_size = self.policy.batch_size,
            total = stream.total(),
            "🚀 Dispatching batches"
        );

        loop {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };

            if job.is_cancelled() {
                drop(permit);
                summary.skipped = self.skip_remaining(&info, &job, &recorder, stream).await;
                break;
            }

            let batch = match stream.next_batch(self.policy.batch_size).await {
                Ok(Some(batch)) => batch,
                Ok(None) => break,
                Err(error) => {
                    summary.unresolved = stream.remaining();
                    job.record_selection_failure(&info, &error, summary.unresolved)
                        .await;
                    break;
                }
            };

            recorder.on_dispatch(batch.len());
            summary.batches += 1;
            summary.objects += batch.len();
            debug!(job_id = %job_id, batch = summary.batches, size = batch.len(), "Batch dispatched");

            let task = BatchTask {
                plugin: Arc::clone(&plugin),
                info: info.clone(),
                job: Arc::clone(&job),
                recorder: Arc::clone(&recorder),
                timeout: self.policy.batch_timeout,
                classifier: self.classifier.clone(),
            };
            tasks.spawn(async move {
                let _permit = permit;
                task.run(batch).await;
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(error) = joined {
                log_error("worker_pool", "join_batch", &error.to_string(), Some(&job_id.to_string()));
            }
        }

        info!(
            job_id = %job_id,
            plugin_id = %info.id,
            batches = summary.batches,
            objects = summary.objects,
            skipped = summary.skipped,
            "✅ All batches finished"
        );
        summary
    }

    async fn skip_remaining(
        &self,
        info: &PluginInfo,
        job: &JobContext,
        recorder: &OutcomeRecorder,
        stream: &mut ReferenceStream,
    ) -> usize {
        info!(job_id = %job.job_id(), remaining = stream.remaining(), "🛑 Job cancelled, skipping undispatched objects");
        let mut skipped = 0;
        loop {
            match stream.next_batch(self.policy.batch_size).await {
                Ok(Some(batch)) => {
                    skipped += batch.len();
                    recorder.skip(info, &batch, details::JOB_CANCELLED).await;
                }
                Ok(None) => break,
                Err(error) => {
                    job.record_selection_failure(info, &error, stream.remaining())
                        .await;
                    break;
                }
            }
        }
        skipped
    }
}

/// Everything one spawned batch needs
struct BatchTask {
    plugin: Arc<dyn Plugin>,
    info: PluginInfo,
    job: Arc<JobContext>,
    recorder: Arc<OutcomeRecorder>,
    timeout: Option<Duration>,
    classifier: ErrorClassifier,
}

impl BatchTask {
    async fn run(self, batch: Vec<LiteReference>) {
        let job_id = self.job.job_id();
        let mut attempt = 1;
        loop {
            let pending: Vec<LiteReference> = batch
                .iter()
                .filter(|reference| !self.recorder.is_finished(&reference.id))
                .cloned()
                .collect();
            if pending.is_empty() {
                return;
            }

            let ctx = BatchContext::new(Arc::clone(&self.job), Arc::clone(&self.recorder));
            let result =
                execute_guarded(Arc::clone(&self.plugin), ctx, pending.clone(), self.timeout).await;

            let error = match result {
                Ok(()) => {
                    self.recorder
                        .fail_unfinished(&self.info, &pending, details::NO_OUTCOME_REPORTED)
                        .await;
                    return;
                }
                Err(error) => error,
            };

            let classification = self.classifier.classify(&error, attempt);
            if let Some(delay) = classification.retry_delay {
                warn!(
                    job_id = %job_id,
                    plugin_id = %self.info.id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    unfinished = pending.len(),
                    error = %error,
                    "🔄 Batch hit unavailable infrastructure, retrying unfinished objects"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            log_plugin_operation("execute", job_id, &self.info.id, self.recorder.step_index(), &classification.error_code);
            debug!(
                job_id = %job_id,
                category = %classification.category,
                attempt,
                error = %error,
                "Batch failed, recording unfinished objects"
            );
            self.recorder
                .fail_unfinished(&self.info, &pending, &error.to_string())
                .await;
            return;
        }
    }
}

/// Run `execute` in its own task so a panic or a stall is contained to the batch
async fn execute_guarded(
    plugin: Arc<dyn Plugin>,
    ctx: BatchContext,
    batch: Vec<LiteReference>,
    timeout: Option<Duration>,
) -> PluginResult<()> {
    let mut handle = tokio::spawn(async move { plugin.execute(&ctx, batch).await });

    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                handle.abort();
                // wait for the aborted task so nothing records after we settle the batch
                let _ = handle.await;
                return Err(PluginError::Timeout(limit));
            }
        },
        None => handle.await,
    };

    joined.unwrap_or_else(|join_error| {
        Err(PluginError::object(format!(
            "Plugin task ended abnormally: {join_error}"
        )))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limited_jobs_use_limited_worker_count() {
        let config = OrchestratorConfig {
            worker_count: 8,
            limited_worker_count: 2,
            batch_timeout_ms: Some(500),
            ..Default::default()
        };
        let normal = PoolPolicy::for_job(&config, JobParallelism::Normal);
        let limited = PoolPolicy::for_job(&config, JobParallelism::Limited);
        assert_eq!(normal.workers, 8);
        assert_eq!(limited.workers, 2);
        assert_eq!(limited.batch_timeout, Some(Duration::from_millis(500)));
    }
}
