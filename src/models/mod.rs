//! # Data Model
//!
//! Values exchanged between callers, the orchestrator and plugins. Archival
//! objects themselves stay opaque: the engine only sees type tags, identifiers
//! and schemaless fields.

pub mod job;
pub mod lite_reference;
pub mod object;
pub mod report;
pub mod selection;

pub use job::{Job, JobParallelism, JobStats};
pub use lite_reference::LiteReference;
pub use object::{ObjectType, StoredObject};
pub use report::{PluginState, Report, ReportError, ReportItem};
pub use selection::{Filter, FilterParameter, ObjectSelection, Sorter, Sublist};
