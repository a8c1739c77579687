//! Lifting disposal holds from AIPs.

mod common;

use common::*;
use jobs_core::constants::{fields, hold_states, params};
use jobs_core::models::{
    Filter, FilterParameter, ObjectSelection, ObjectType, PluginState, StoredObject,
};
use jobs_core::orchestration::JobRequest;
use jobs_core::plugins::LIFT_DISPOSAL_HOLD_PLUGIN_ID;
use jobs_core::state_machine::JobState;
use serde_json::{json, Value};

fn seed_holds(fx: &Fixture, holds: &[&str]) {
    for hold in holds {
        fx.model.insert(
            StoredObject::new(ObjectType::DISPOSAL_HOLD, *hold)
                .with_field(fields::STATE, json!(hold_states::ACTIVE)),
        );
    }
}

fn seed_aip(fx: &Fixture, id: &str, holds: &[&str]) {
    fx.model.insert(
        StoredObject::new(ObjectType::AIP, id)
            .with_field(fields::STATE, json!("active"))
            .with_field(fields::DISPOSAL_HOLDS, json!(holds)),
    );
}

fn hold_state(fx: &Fixture, hold: &str) -> Option<String> {
    fx.model
        .get(&ObjectType::DISPOSAL_HOLD, hold)
        .and_then(|hold| hold.str_field(fields::STATE).map(str::to_string))
}

fn active_holds(fx: &Fixture, aip: &str) -> Vec<String> {
    fx.model
        .get(&ObjectType::AIP, aip)
        .map(|aip| aip.str_list(fields::DISPOSAL_HOLDS))
        .unwrap_or_default()
}

fn lift(hold: &str, aips: &[&str]) -> JobRequest {
    JobRequest::new(LIFT_DISPOSAL_HOLD_PLUGIN_ID, explicit_aips(aips))
        .as_user("records-officer")
        .with_parameter(params::DISPOSAL_HOLD_ID, hold)
}

fn lift_all(aips: &[&str]) -> JobRequest {
    JobRequest::new(LIFT_DISPOSAL_HOLD_PLUGIN_ID, explicit_aips(aips))
        .as_user("records-officer")
        .with_parameter(params::DISPOSAL_HOLD_LIFT_ALL, "true")
}

#[tokio::test]
async fn test_hold_without_remaining_associations_is_lifted() {
    let fx = fixture(vec![]);
    seed_holds(&fx, &["h1", "h2"]);
    seed_aip(&fx, "aip-1", &["h1"]);
    seed_aip(&fx, "aip-2", &["h1", "h2"]);

    let (job, report) = fx.run(lift("h1", &["aip-1", "aip-2"])).await;

    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.stats.processed_with_success, 2);
    assert_eq!(report.find_by_object("aip-1").unwrap().state(), PluginState::Success);

    assert!(active_holds(&fx, "aip-1").is_empty());
    assert_eq!(active_holds(&fx, "aip-2"), vec!["h2".to_string()]);

    let aip = fx.model.get(&ObjectType::AIP, "aip-2").unwrap();
    assert_eq!(aip.str_field(fields::UPDATED_BY), Some("records-officer"));
    let history = aip
        .field(fields::LIFTED_DISPOSAL_HOLDS)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["id"], "h1");
    assert_eq!(history[0][fields::LIFTED_BY], "records-officer");

    assert_eq!(hold_state(&fx, "h1").as_deref(), Some(hold_states::LIFTED));
    assert_eq!(hold_state(&fx, "h2").as_deref(), Some(hold_states::ACTIVE));
    let hold_item = report.find_by_object("h1").unwrap();
    assert_eq!(hold_item.state(), PluginState::Success);
    assert_eq!(hold_item.source_object_type, Some(ObjectType::DISPOSAL_HOLD));
}

#[tokio::test]
async fn test_hold_still_associated_elsewhere_stays_active() {
    let fx = fixture(vec![]);
    seed_holds(&fx, &["h1"]);
    seed_aip(&fx, "aip-1", &["h1"]);
    seed_aip(&fx, "aip-2", &["h1"]);

    let (job, report) = fx.run(lift("h1", &["aip-1"])).await;

    assert_eq!(job.state, JobState::Completed);
    assert!(active_holds(&fx, "aip-1").is_empty());
    assert_eq!(active_holds(&fx, "aip-2"), vec!["h1".to_string()]);
    assert_eq!(hold_state(&fx, "h1").as_deref(), Some(hold_states::ACTIVE));

    let hold_item = report.find_by_object("h1").unwrap();
    assert_eq!(hold_item.state(), PluginState::Skipped);
    assert!(hold_item.details.contains("remains active"));
}

#[tokio::test]
async fn test_lift_all_clears_every_hold() {
    let fx = fixture(vec![]);
    seed_holds(&fx, &["h1", "h2"]);
    seed_aip(&fx, "aip-1", &["h1", "h2"]);
    seed_aip(&fx, "aip-2", &["h2"]);

    let (job, _) = fx.run(lift_all(&["aip-1", "aip-2"])).await;

    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.stats.processed_with_success, 2);
    assert!(active_holds(&fx, "aip-1").is_empty());
    assert!(active_holds(&fx, "aip-2").is_empty());
    assert_eq!(hold_state(&fx, "h1").as_deref(), Some(hold_states::LIFTED));
    assert_eq!(hold_state(&fx, "h2").as_deref(), Some(hold_states::LIFTED));
}

#[tokio::test]
async fn test_aip_not_associated_with_hold_fails() {
    let fx = fixture(vec![]);
    seed_holds(&fx, &["h1", "h2"]);
    seed_aip(&fx, "aip-1", &["h2"]);

    let (job, report) = fx.run(lift("h1", &["aip-1"])).await;

    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.stats.processed_with_failure, 1);
    let item = report.find_by_object("aip-1").unwrap();
    assert_eq!(item.state(), PluginState::Failure);
    assert!(item.details.contains("not associated"));
    assert_eq!(active_holds(&fx, "aip-1"), vec!["h2".to_string()]);
    assert_eq!(hold_state(&fx, "h1").as_deref(), Some(hold_states::ACTIVE));
    assert!(report.find_by_object("h1").is_none());
}

#[tokio::test]
async fn test_unknown_hold_gives_partial_success() {
    let fx = fixture(vec![]);
    seed_holds(&fx, &["h1"]);
    seed_aip(&fx, "aip-1", &["h1", "ghost"]);

    let (job, report) = fx.run(lift_all(&["aip-1"])).await;

    assert_eq!(job.state, JobState::Completed);
    let item = report.find_by_object("aip-1").unwrap();
    assert_eq!(item.state(), PluginState::PartialSuccess);
    assert!(item.details.contains("ghost"));
    assert_eq!(job.stats.processed_with_success, 1);
    assert_eq!(job.stats.processed_with_failure, 0);

    assert_eq!(active_holds(&fx, "aip-1"), vec!["ghost".to_string()]);
    assert_eq!(hold_state(&fx, "h1").as_deref(), Some(hold_states::LIFTED));
}

#[tokio::test]
async fn test_missing_hold_parameter_fails_creation() {
    let fx = fixture(vec![]);
    seed_aip(&fx, "aip-1", &["h1"]);

    let (job, report) = fx
        .run(JobRequest::new(LIFT_DISPOSAL_HOLD_PLUGIN_ID, explicit_aips(&["aip-1"])))
        .await;

    assert_eq!(job.state, JobState::FailedDuringCreation);
    assert!(report.is_empty());
    assert_eq!(active_holds(&fx, "aip-1"), vec!["h1".to_string()]);
}

#[tokio::test]
async fn test_lifting_a_hold_selected_by_that_hold_reaches_every_aip() {
    let fx = fixture(vec![]);
    seed_holds(&fx, &["h1"]);
    let aips: Vec<String> = (1..=9).map(|n| format!("aip-{n}")).collect();
    for aip in &aips {
        seed_aip(&fx, aip, &["h1"]);
    }

    // each page of 3 is read after earlier AIPs already lost h1
    let held_by_h1 = ObjectSelection::Filter {
        object_type: ObjectType::AIP,
        filter: Filter::all().with(FilterParameter::simple(fields::DISPOSAL_HOLDS, "h1")),
    };
    let request = JobRequest::new(LIFT_DISPOSAL_HOLD_PLUGIN_ID, held_by_h1)
        .as_user("records-officer")
        .with_parameter(params::DISPOSAL_HOLD_ID, "h1");
    let (job, report) = fx.run(request).await;

    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.stats.total_objects, 9);
    assert_eq!(job.stats.processed_with_success, 9);
    assert_eq!(job.stats.processed_with_failure, 0);
    assert!(job.stats.is_consistent());
    for aip in &aips {
        assert_eq!(report.find_by_object(aip).map(|item| item.state()), Some(PluginState::Success));
        assert!(active_holds(&fx, aip).is_empty(), "{aip} still holds h1");
    }
    assert_eq!(hold_state(&fx, "h1").as_deref(), Some(hold_states::LIFTED));
}
