//! # Orchestration
//!
//! Everything that runs a job: resolving its selection, dispatching batches to
//! the worker pool, recording outcomes, aggregating progress, and driving the
//! job state machine.

pub mod backoff;
pub mod error_classifier;
pub mod job_plugin_info;
pub mod job_runner;
pub mod orchestrator;
pub mod outcome_recorder;
pub mod report_sink;
pub mod selection_resolver;
pub mod step_execution;
pub mod worker_pool;

pub use backoff::BackoffPolicy;
pub use error_classifier::{ErrorCategory, ErrorClassification, ErrorClassifier};
pub use job_plugin_info::JobPluginInfo;
pub use job_runner::{JobHandle, JobRunner};
pub use orchestrator::{JobRequest, Orchestrator};
pub use outcome_recorder::OutcomeRecorder;
pub use report_sink::ReportSink;
pub use selection_resolver::{ReferenceStream, SelectionResolver};
pub use step_execution::PooledStepExecutor;
pub use worker_pool::{PoolPolicy, PoolSummary, WorkerPool};
