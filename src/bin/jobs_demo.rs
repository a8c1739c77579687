//! # Jobs Demo
//!
//! Runs the built-in plugins against an in-memory archive: stamps an instance
//! identifier on every AIP, then lifts a disposal hold from a few of them and
//! prints the resulting report.
//!
//! Configuration is read from `jobs.toml` (or the path given as the first
//! argument) and `JOBS_*` environment variables.

use anyhow::{Context, Result};
use jobs_core::constants::{fields, hold_states, params};
use jobs_core::logging::init_structured_logging;
use jobs_core::models::{ObjectSelection, ObjectType, StoredObject};
use jobs_core::orchestration::{JobRequest, Orchestrator};
use jobs_core::plugins::{
    instance_identifier_plugin_id, register_builtin_plugins, LIFT_DISPOSAL_HOLD_PLUGIN_ID,
};
use jobs_core::registry::PluginRegistry;
use jobs_core::services::{Collaborators, InMemoryModelService};
use jobs_core::{Job, OrchestratorConfig, Report};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

const HOLD_ID: &str = "hold-litigation-2024";

fn seed(model: &InMemoryModelService) {
    model.insert(
        StoredObject::new(ObjectType::DISPOSAL_HOLD, HOLD_ID)
            .with_field(fields::STATE, json!(hold_states::ACTIVE)),
    );
    for n in 1..=6 {
        let holds = if n <= 3 { json!([HOLD_ID]) } else { json!([]) };
        model.insert(
            StoredObject::new(ObjectType::AIP, format!("aip-{n}"))
                .with_field(fields::DISPOSAL_HOLDS, holds),
        );
    }
}

fn print_summary(job: &Job, report: &Report) {
    println!(
        "{} [{}] {}/{} ok, {} failed, {:.0}%",
        job.name,
        job.state,
        job.stats.processed_with_success,
        job.stats.total_objects,
        job.stats.processed_with_failure,
        job.stats.completion_percentage
    );
    for item in &report.items {
        println!(
            "  {:<16} {:<24} {}",
            item.state(),
            item.source_object_id.as_deref().unwrap_or("-"),
            item.details.lines().next().unwrap_or_default()
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_structured_logging();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = OrchestratorConfig::load_from(config_path.as_deref())
        .context("loading orchestrator configuration")?;

    let registry = Arc::new(PluginRegistry::new());
    register_builtin_plugins(&registry);

    let (collaborators, model, _index) = Collaborators::in_memory();
    seed(&model);

    let orchestrator = Orchestrator::new(config, registry, collaborators);
    info!(plugins = orchestrator.registry().len(), "Orchestrator ready");

    let stamp = orchestrator
        .submit(
            JobRequest::new(
                instance_identifier_plugin_id(&ObjectType::AIP),
                ObjectSelection::AllOfType {
                    object_type: ObjectType::AIP,
                },
            )
            .named("Stamp instance identifier")
            .with_parameter(params::INSTANCE_ID, "demo-instance"),
        )
        .await?;
    // both jobs rewrite AIPs, so they run one after the other
    let stamped = orchestrator.wait_for_completion(stamp).await?;
    print_summary(&stamped, &orchestrator.get_reports(stamp).await?);

    let lift = orchestrator
        .submit(
            JobRequest::new(
                LIFT_DISPOSAL_HOLD_PLUGIN_ID,
                ObjectSelection::explicit(ObjectType::AIP, ["aip-1", "aip-2", "aip-3", "aip-9"]),
            )
            .named("Lift litigation hold")
            .as_user("records-manager")
            .with_parameter(params::DISPOSAL_HOLD_ID, HOLD_ID),
        )
        .await?;

    let lifted = orchestrator.wait_for_completion(lift).await?;
    print_summary(&lifted, &orchestrator.get_reports(lift).await?);

    let hold = model
        .get(&ObjectType::DISPOSAL_HOLD, HOLD_ID)
        .context("disposal hold disappeared")?;
    println!(
        "hold {HOLD_ID} is {}",
        hold.str_field(fields::STATE).unwrap_or("unknown")
    );
    Ok(())
}
