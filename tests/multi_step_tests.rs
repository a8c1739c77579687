//! Multi-step compositions run as jobs.

mod common;

use common::*;
use jobs_core::constants::details;
use jobs_core::models::{ObjectType, PluginState};
use jobs_core::orchestration::JobRequest;
use jobs_core::plugins::{
    MultipleStepPlugin, PluginInfo, PluginParameter, PluginParameterType, PluginType, Step,
    LOCAL_INSTANCE_REGISTER_PLUGIN_ID,
};
use jobs_core::state_machine::JobState;

fn composition(id: &str, steps: Vec<Step>, parameters: Vec<PluginParameter>) -> MultipleStepPlugin {
    let mut info = PluginInfo::new(id, format!("Composition {id}"), "1.0")
        .with_type(PluginType::Multi)
        .for_object_type(ObjectType::AIP);
    for parameter in parameters {
        info = info.with_parameter(parameter);
    }
    MultipleStepPlugin::new(info, steps)
}

fn toggle(id: &str, default: &str) -> PluginParameter {
    PluginParameter::new(id, id, PluginParameterType::Boolean).with_default(default)
}

#[tokio::test]
async fn test_disabled_step_is_skipped_between_enabled_steps() {
    let a = TestPlugin::new("step.a");
    let b = TestPlugin::new("step.b");
    let c = TestPlugin::new("step.c");
    let (probe_a, probe_b, probe_c) = (a.probe.clone(), b.probe.clone(), c.probe.clone());

    let chain = composition(
        "chain.abc",
        vec![
            Step::new("step.a").toggled_by("run_a"),
            Step::new("step.b").toggled_by("run_b"),
            Step::new("step.c").toggled_by("run_c"),
        ],
        vec![toggle("run_a", "true"), toggle("run_b", "false"), toggle("run_c", "true")],
    );
    let fx = fixture(vec![Box::new(a), Box::new(b), Box::new(c), Box::new(chain)]);
    fx.seed_aips(1);

    let (job, report) = fx.run(JobRequest::new("chain.abc", all_aips())).await;

    assert_eq!(job.state, JobState::Completed);
    let headers: Vec<(&str, PluginState)> = report
        .items
        .iter()
        .map(|item| (item.plugin_id.as_str(), item.state()))
        .collect();
    assert_eq!(
        headers,
        vec![
            ("step.a", PluginState::Success),
            ("step.b", PluginState::Skipped),
            ("step.c", PluginState::Success),
        ]
    );
    assert_eq!(report.items[1].items.len(), 1);
    assert_eq!(report.items[1].items[0].state(), PluginState::Skipped);
    assert_eq!(report.items[1].items[0].details, details::STEP_DISABLED);
    assert_eq!(report.items[2].items[0].source_object_id.as_deref(), Some("aip-1"));

    assert_eq!(probe_a.execute_calls(), 1);
    assert_eq!(probe_b.inits(), 0);
    assert_eq!(probe_b.execute_calls(), 0);
    assert_eq!(probe_c.execute_calls(), 1);
    assert_eq!(probe_a.shutdowns(), 1);
    assert_eq!(probe_c.shutdowns(), 1);

    assert_eq!(job.stats.total_steps, 2);
    assert_eq!(job.stats.completed_steps, 2);
    assert_eq!(job.stats.processed_with_success, 1);
    assert_eq!(job.stats.completion_percentage, 100.0);
}

#[tokio::test]
async fn test_stop_on_failure_skips_remaining_steps_for_every_object() {
    let a = TestPlugin::new("step.gate").failing_everything();
    let b = TestPlugin::new("step.after");
    let probe_b = b.probe.clone();

    let chain = composition(
        "chain.gated",
        vec![
            Step::new("step.gate").stop_on_failure(),
            Step::new("step.after"),
            Step::new("step.after"),
        ],
        vec![],
    );
    let fx = fixture(vec![Box::new(a), Box::new(b), Box::new(chain)]);
    fx.seed_aips(3);

    let (job, report) = fx.run(JobRequest::new("chain.gated", all_aips())).await;

    assert_eq!(job.state, JobState::Completed);
    assert_eq!(report.len(), 3);
    assert_eq!(report.items[0].state(), PluginState::Failure);
    for header in &report.items[1..] {
        assert_eq!(header.state(), PluginState::Skipped);
        assert_eq!(header.items.len(), 3);
        assert!(header
            .items
            .iter()
            .all(|item| item.state() == PluginState::Skipped && item.details == details::STEP_STOPPED));
    }
    assert_eq!(probe_b.execute_calls(), 0);
    assert_eq!(job.stats.processed_with_failure, 3);
    assert!(job.stats.is_consistent());
}

#[tokio::test]
async fn test_failures_without_stop_flag_continue_to_later_steps() {
    let a = TestPlugin::new("step.lossy").failing_on(&["aip-1"]);
    let b = TestPlugin::new("step.next");
    let probe_b = b.probe.clone();

    let chain = composition(
        "chain.lossy",
        vec![Step::new("step.lossy"), Step::new("step.next")],
        vec![],
    );
    let fx = fixture(vec![Box::new(a), Box::new(b), Box::new(chain)]);
    fx.seed_aips(2);

    let (job, report) = fx.run(JobRequest::new("chain.lossy", all_aips())).await;

    assert_eq!(report.items[0].state(), PluginState::PartialSuccess);
    assert_eq!(report.items[1].state(), PluginState::Success);
    assert_eq!(probe_b.seen(), vec!["aip-1".to_string(), "aip-2".to_string()]);
    assert_eq!(job.stats.processed_with_failure, 1);
    assert_eq!(job.stats.processed_with_success, 1);
}

#[tokio::test]
async fn test_steps_receive_only_their_declared_parameters() {
    let step = TestPlugin::new("step.scoped").with_parameter(PluginParameter::new(
        "target",
        "Target",
        PluginParameterType::String,
    ));
    let probe = step.probe.clone();

    let chain = composition(
        "chain.scoped",
        vec![Step::new("step.scoped")],
        vec![
            PluginParameter::new("target", "Target", PluginParameterType::String),
            PluginParameter::new("secret", "Secret", PluginParameterType::String),
        ],
    );
    let fx = fixture(vec![Box::new(step), Box::new(chain)]);
    fx.seed_aips(1);

    let (job, _) = fx
        .run(
            JobRequest::new("chain.scoped", all_aips())
                .with_parameter("target", "vault")
                .with_parameter("secret", "hunter2"),
        )
        .await;

    assert_eq!(job.state, JobState::Completed);
    assert_eq!(*probe.received_parameters.lock(), vec!["target=vault".to_string()]);
}

#[tokio::test]
async fn test_steps_filter_by_type_and_follow_outcome_objects() {
    let convert = TestPlugin::new("step.convert")
        .for_type(ObjectType::AIP)
        .producing(ObjectType::DIP);
    let on_dip = TestPlugin::new("step.on_dip").for_type(ObjectType::DIP);
    let on_sip = TestPlugin::new("step.on_sip").for_type(ObjectType::SIP);
    let (probe_dip, probe_sip) = (on_dip.probe.clone(), on_sip.probe.clone());

    let chain = composition(
        "chain.typed",
        vec![
            Step::new("step.convert").for_type(ObjectType::AIP),
            Step::new("step.on_sip").for_type(ObjectType::SIP),
            Step::new("step.on_dip").for_type(ObjectType::DIP),
        ],
        vec![],
    );
    let fx = fixture(vec![
        Box::new(convert),
        Box::new(on_dip),
        Box::new(on_sip),
        Box::new(chain),
    ]);
    fx.seed_aips(2);

    let (job, report) = fx.run(JobRequest::new("chain.typed", all_aips())).await;

    assert_eq!(job.state, JobState::Completed);
    assert_eq!(probe_sip.execute_calls(), 0);
    assert!(report.items[1].items.is_empty());
    assert_eq!(
        probe_dip.seen(),
        vec!["dip-of-aip-1".to_string(), "dip-of-aip-2".to_string()]
    );
    let converted = &report.items[0].items[0];
    assert_eq!(converted.outcome_object_type, Some(ObjectType::DIP));
    assert_eq!(job.stats.processed_with_success, 2);
}

#[tokio::test]
async fn test_nested_composition_reports_step_items_per_object() {
    let inner_a = TestPlugin::new("inner.a");
    let inner_b = TestPlugin::new("inner.b").failing_on(&["aip-2"]);
    let inner = composition(
        "chain.inner",
        vec![Step::new("inner.a"), Step::new("inner.b")],
        vec![],
    );
    let outer = composition("chain.outer", vec![Step::new("chain.inner")], vec![]);
    let fx = fixture(vec![
        Box::new(inner_a),
        Box::new(inner_b),
        Box::new(inner),
        Box::new(outer),
    ]);
    fx.seed_aips(2);

    let (job, report) = fx.run(JobRequest::new("chain.outer", all_aips())).await;

    assert_eq!(job.state, JobState::Completed);
    assert_eq!(report.len(), 1);
    let header = &report.items[0];
    assert_eq!(header.plugin_id, "chain.inner");
    assert_eq!(header.items.len(), 2);

    let mut per_object: Vec<_> = header.items.iter().collect();
    per_object.sort_by(|a, b| a.source_object_id.cmp(&b.source_object_id));
    let steps_of = |index: usize| -> Vec<(String, PluginState)> {
        per_object[index]
            .items
            .iter()
            .map(|item| (item.plugin_id.clone(), item.state()))
            .collect()
    };
    assert_eq!(per_object[0].state(), PluginState::Success);
    assert_eq!(
        steps_of(0),
        vec![
            ("inner.a".to_string(), PluginState::Success),
            ("inner.b".to_string(), PluginState::Success),
        ]
    );
    assert_eq!(per_object[1].state(), PluginState::Failure);
    assert_eq!(steps_of(1)[1], ("inner.b".to_string(), PluginState::Failure));

    assert_eq!(job.stats.processed_with_success, 1);
    assert_eq!(job.stats.processed_with_failure, 1);
}

#[tokio::test]
async fn test_local_instance_register_stamps_selected_type() {
    let fx = fixture(vec![]);
    fx.seed_aips(3);

    let (job, report) = fx
        .run(
            JobRequest::new(LOCAL_INSTANCE_REGISTER_PLUGIN_ID, all_aips())
                .with_parameter("instance_id", "central-7"),
        )
        .await;

    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.stats.processed_with_success, 3);
    assert_eq!(report.len(), 4);
    assert_eq!(report.items[0].items.len(), 3);
    for id in ["aip-1", "aip-2", "aip-3"] {
        let aip = fx.model.get(&ObjectType::AIP, id).unwrap();
        assert_eq!(aip.str_field("instance_id"), Some("central-7"));
    }
}

#[tokio::test]
async fn test_read_only_step_toggle_cannot_be_switched_off() {
    let fx = fixture(vec![]);
    fx.seed_aips(1);

    let (job, report) = fx
        .run(
            JobRequest::new(LOCAL_INSTANCE_REGISTER_PLUGIN_ID, all_aips())
                .with_parameter("instance_id", "central-7")
                .with_parameter("do_instance_identifier_aip", "false"),
        )
        .await;

    assert_eq!(job.state, JobState::FailedDuringCreation);
    assert!(report.is_empty());
    let untouched = fx.model.get(&ObjectType::AIP, "aip-1").unwrap();
    assert!(untouched.str_field("instance_id").is_none());
}
