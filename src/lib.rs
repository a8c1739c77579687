#![allow(clippy::doc_markdown)] // Allow technical terms like AIP, SIP, DIP in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Jobs Core
//!
//! Plugin orchestration and job execution engine for archival object processing.
//!
//! ## Overview
//!
//! A **job** runs one **plugin** with a set of parameters over a selection of
//! objects. The engine resolves the selection into batches of lightweight
//! references, hands the batches to a bounded worker pool, records one report
//! item per object, and keeps live progress counters that can be read at any
//! time without blocking the workers.
//!
//! The engine does not know what an AIP is. Objects are opaque typed records
//! reached through three collaborators: the object model, the search index and
//! the job store.
//!
//! ## Architecture
//!
//! ```text
//! Orchestrator::submit ──▶ JobRunner ──▶ SelectionResolver ──▶ ReferenceStream
//!                              │                                     │
//!                              ▼                                     ▼
//!                       JobStateMachine                    WorkerPool ──▶ Plugin::execute
//!                                                                    │
//!                                                  OutcomeRecorder ◀─┘
//!                                                   │          │
//!                                          JobPluginInfo   ReportSink ──▶ JobStore
//! ```
//!
//! ## Key Features
//!
//! - **Typed parameters**: validated before any object is touched; a job that
//!   cannot be configured ends `FailedDuringCreation`
//! - **Exactly one outcome per object**: failures become report items, never
//!   lost errors
//! - **Multi-step compositions**: steps thread a working set, with per-step
//!   toggles, type filtering and stop-on-failure
//! - **Bounded retries**: unavailable infrastructure is retried with
//!   exponential backoff at batch level
//! - **Cancellation and timeouts**: between batches and per batch
//!
//! ## Module Organization
//!
//! - [`models`] - Jobs, reports, object references and selections
//! - [`state_machine`] - Job lifecycle states and transitions
//! - [`plugins`] - Plugin contract, parameters, compositions and built-in plugins
//! - [`registry`] - Plugin lookup by identifier
//! - [`services`] - Model, index and job store collaborators
//! - [`orchestration`] - Worker pool, job runner and the `Orchestrator` API
//! - [`config`] - Layered configuration
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use jobs_core::config::OrchestratorConfig;
//! use jobs_core::models::{ObjectSelection, ObjectType};
//! use jobs_core::orchestration::{JobRequest, Orchestrator};
//! use jobs_core::plugins::{instance_identifier_plugin_id, register_builtin_plugins};
//! use jobs_core::registry::PluginRegistry;
//! use jobs_core::services::Collaborators;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(PluginRegistry::new());
//! register_builtin_plugins(&registry);
//! let (collaborators, _model, _index) = Collaborators::in_memory();
//! let orchestrator = Orchestrator::new(OrchestratorConfig::load()?, registry, collaborators);
//!
//! let job_id = orchestrator
//!     .submit(
//!         JobRequest::new(
//!             instance_identifier_plugin_id(&ObjectType::AIP),
//!             ObjectSelection::AllOfType { object_type: ObjectType::AIP },
//!         )
//!         .with_parameter("instance_id", "site-a"),
//!     )
//!     .await?;
//! let job = orchestrator.wait_for_completion(job_id).await?;
//! println!("{:.0}% complete", job.stats.completion_percentage);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod plugins;
pub mod registry;
pub mod services;
pub mod state_machine;

pub use config::{OrchestratorConfig, RetryConfig};
pub use error::{JobsError, Result};
pub use models::{
    Job, JobParallelism, JobStats, LiteReference, ObjectSelection, ObjectType, PluginState,
    Report, ReportItem,
};
pub use orchestration::{JobPluginInfo, JobRequest, Orchestrator};
pub use plugins::{Plugin, PluginError, PluginInfo, PluginResult};
pub use registry::PluginRegistry;
pub use state_machine::{JobEvent, JobState};
