//! # Collaborator Services
//!
//! The engine talks to the object model, the search index and the job store only
//! through these traits. In-memory implementations back the demo binary and the
//! test suite.

pub mod index;
pub mod job_store;
pub mod model;

pub use index::{InMemoryIndexService, IndexError, IndexResult, IndexService};
pub use job_store::{InMemoryJobStore, JobStore, ReportKey, StoreError};
pub use model::{InMemoryModelService, ModelError, ModelService};

use std::sync::Arc;

/// Shared handles to every collaborator a job needs
#[derive(Clone)]
pub struct Collaborators {
    pub model: Arc<dyn ModelService>,
    pub index: Arc<dyn IndexService>,
    pub store: Arc<dyn JobStore>,
}

impl Collaborators {
    pub fn new(
        model: Arc<dyn ModelService>,
        index: Arc<dyn IndexService>,
        store: Arc<dyn JobStore>,
    ) -> Self {
        Self { model, index, store }
    }

    /// Model, index and store all kept in process memory
    pub fn in_memory() -> (Self, Arc<InMemoryModelService>, Arc<InMemoryIndexService>) {
        let model = Arc::new(InMemoryModelService::new());
        let index = Arc::new(InMemoryIndexService::new(Arc::clone(&model)));
        let collaborators = Self::new(
            model.clone(),
            index.clone(),
            Arc::new(InMemoryJobStore::new()),
        );
        (collaborators, model, index)
    }
}
