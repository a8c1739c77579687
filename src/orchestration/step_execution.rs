//! Runs composition steps across the worker pool.

use super::outcome_recorder::OutcomeRecorder;
use super::selection_resolver::ReferenceStream;
use super::worker_pool::{PoolPolicy, WorkerPool};
use crate::models::LiteReference;
use crate::plugins::{JobContext, Plugin, PluginResult, PreparedStep, StepExecutor};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Each step's share of the working set is batched and dispatched exactly like
/// a single-plugin job, with the same retry and timeout policy.
pub struct PooledStepExecutor {
    pool: WorkerPool,
}

impl PooledStepExecutor {
    pub fn new(policy: PoolPolicy) -> Self {
        Self {
            pool: WorkerPool::new(policy),
        }
    }
}

#[async_trait]
impl StepExecutor for PooledStepExecutor {
    async fn run_step(
        &self,
        job: &Arc<JobContext>,
        step: &PreparedStep,
        plugin: Arc<dyn Plugin>,
        references: Vec<LiteReference>,
        recorder: Arc<OutcomeRecorder>,
    ) -> PluginResult<()> {
        debug!(
            job_id = %job.job_id(),
            step_index = step.index,
            objects = references.len(),
            "Running step on worker pool"
        );
        let mut stream = ReferenceStream::fixed(references);
        self.pool
            .run(plugin, Arc::clone(job), recorder, &mut stream)
            .await;
        Ok(())
    }
}
