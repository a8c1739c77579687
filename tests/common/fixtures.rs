//! Orchestrator wired to in-memory collaborators.

use jobs_core::config::{OrchestratorConfig, RetryConfig};
use jobs_core::constants::fields;
use jobs_core::models::{Job, ObjectSelection, ObjectType, Report, StoredObject};
use jobs_core::orchestration::{JobRequest, Orchestrator};
use jobs_core::plugins::{register_builtin_plugins, Plugin};
use jobs_core::registry::PluginRegistry;
use jobs_core::services::{
    Collaborators, InMemoryIndexService, InMemoryJobStore, InMemoryModelService,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

pub struct Fixture {
    pub orchestrator: Orchestrator,
    pub model: Arc<InMemoryModelService>,
    pub index: Arc<InMemoryIndexService>,
    pub store: Arc<InMemoryJobStore>,
    pub registry: Arc<PluginRegistry>,
}

/// Small batches and millisecond backoff so tests run fast
pub fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        worker_count: 2,
        limited_worker_count: 1,
        batch_size: 2,
        index_page_size: 3,
        batch_timeout_ms: None,
        commit_index_before_resolve: true,
        retained_finished_jobs: 16,
        retry: RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
            multiplier: 2.0,
        },
    }
}

pub fn fixture(plugins: Vec<Box<dyn Plugin>>) -> Fixture {
    fixture_with(test_config(), plugins)
}

pub fn fixture_with(config: OrchestratorConfig, plugins: Vec<Box<dyn Plugin>>) -> Fixture {
    let registry = Arc::new(PluginRegistry::new());
    register_builtin_plugins(&registry);
    for plugin in plugins {
        registry.register_prototype(plugin);
    }

    let model = Arc::new(InMemoryModelService::new());
    let index = Arc::new(
        InMemoryIndexService::new(Arc::clone(&model))
            .with_schema(ObjectType::AIP, [fields::STATE, fields::DISPOSAL_HOLDS]),
    );
    let store = Arc::new(InMemoryJobStore::new());
    let collaborators = Collaborators::new(model.clone(), index.clone(), store.clone());

    Fixture {
        orchestrator: Orchestrator::new(config, Arc::clone(&registry), collaborators),
        model,
        index,
        store,
        registry,
    }
}

impl Fixture {
    /// AIPs `aip-1` ..= `aip-<count>`
    pub fn seed_aips(&self, count: usize) -> Vec<String> {
        (1..=count)
            .map(|n| {
                let id = format!("aip-{n}");
                self.model.insert(
                    StoredObject::new(ObjectType::AIP, &id).with_field(fields::STATE, json!("active")),
                );
                id
            })
            .collect()
    }

    /// Submit and wait, bounded so a hung job fails the test instead of the suite
    pub async fn run(&self, request: JobRequest) -> (Job, Report) {
        let job_id = self
            .orchestrator
            .submit(request)
            .await
            .expect("job submitted");
        let job = tokio::time::timeout(
            Duration::from_secs(10),
            self.orchestrator.wait_for_completion(job_id),
        )
        .await
        .expect("job finished in time")
        .expect("job known to the orchestrator");
        let report = self
            .orchestrator
            .get_reports(job_id)
            .await
            .expect("report available");
        (job, report)
    }
}

pub fn all_aips() -> ObjectSelection {
    ObjectSelection::AllOfType {
        object_type: ObjectType::AIP,
    }
}

pub fn explicit_aips(ids: &[&str]) -> ObjectSelection {
    ObjectSelection::explicit(ObjectType::AIP, ids.iter().copied())
}
