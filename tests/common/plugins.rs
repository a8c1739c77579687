//! Configurable test plugins sharing their observations through `Probe`.

use async_trait::async_trait;
use jobs_core::models::{LiteReference, ObjectType, PluginState, Report, ReportItem};
use jobs_core::plugins::{
    BatchContext, JobContext, ParameterValues, Plugin, PluginError, PluginInfo, PluginParameter,
    PluginParameterType, PluginResult, PluginType,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What every instance of one test plugin saw, shared across `clone_me`
#[derive(Debug, Default)]
pub struct Probe {
    pub inits: AtomicUsize,
    pub shutdowns: AtomicUsize,
    pub execute_calls: AtomicUsize,
    pub before_all_calls: AtomicUsize,
    pub after_all_calls: AtomicUsize,
    pub seen: Mutex<Vec<String>>,
    pub received_parameters: Mutex<Vec<String>>,
    /// Remaining `execute` calls that fail as unavailable infrastructure
    pub infrastructure_failures: AtomicUsize,
}

impl Probe {
    pub fn inits(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    pub fn execute_calls(&self) -> usize {
        self.execute_calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<String> {
        let mut seen = self.seen.lock().clone();
        seen.sort();
        seen
    }
}

#[derive(Clone)]
pub struct TestPlugin {
    pub id: String,
    pub object_type: ObjectType,
    pub probe: Arc<Probe>,
    pub fail_ids: HashSet<String>,
    pub fail_everything: bool,
    pub silent: bool,
    pub batch_delay: Option<Duration>,
    pub outcome_type: Option<ObjectType>,
    pub parameters: Vec<PluginParameter>,
    pub fail_before_all: bool,
    pub fail_after_all: bool,
    pub fail_init: bool,
    values: ParameterValues,
}

impl TestPlugin {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            object_type: ObjectType::AIP,
            probe: Arc::new(Probe::default()),
            fail_ids: HashSet::new(),
            fail_everything: false,
            silent: false,
            batch_delay: None,
            outcome_type: None,
            parameters: Vec::new(),
            fail_before_all: false,
            fail_after_all: false,
            fail_init: false,
            values: ParameterValues::new(),
        }
    }

    pub fn for_type(mut self, object_type: ObjectType) -> Self {
        self.object_type = object_type;
        self
    }

    pub fn failing_on(mut self, ids: &[&str]) -> Self {
        self.fail_ids = ids.iter().map(|id| id.to_string()).collect();
        self
    }

    pub fn failing_everything(mut self) -> Self {
        self.fail_everything = true;
        self
    }

    /// Returns from `execute` without reporting any object
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = Some(delay);
        self
    }

    /// Each object produces an outcome object `<type>-of-<id>`
    pub fn producing(mut self, object_type: ObjectType) -> Self {
        self.outcome_type = Some(object_type);
        self
    }

    pub fn with_parameter(mut self, parameter: PluginParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_mandatory_string(self, id: &str) -> Self {
        self.with_parameter(PluginParameter::new(id, id, PluginParameterType::String).mandatory())
    }

    pub fn unavailable_for(self, calls: usize) -> Self {
        self.probe
            .infrastructure_failures
            .store(calls, Ordering::SeqCst);
        self
    }

    pub fn failing_hooks(mut self) -> Self {
        self.fail_before_all = true;
        self.fail_after_all = true;
        self
    }

    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    fn should_fail(&self, id: &str) -> bool {
        self.fail_everything || self.fail_ids.contains(id)
    }

    fn take_infrastructure_failure(&self) -> bool {
        self.probe
            .infrastructure_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Plugin for TestPlugin {
    fn info(&self) -> PluginInfo {
        let mut info = PluginInfo::new(&self.id, format!("Test {}", self.id), "1.0")
            .with_type(PluginType::Misc)
            .for_object_type(self.object_type.clone());
        for parameter in &self.parameters {
            info = info.with_parameter(parameter.clone());
        }
        info
    }

    fn set_parameter_values(&mut self, values: ParameterValues) -> PluginResult<()> {
        self.probe
            .received_parameters
            .lock()
            .extend(values.ids().map(|id| format!("{id}={}", values.raw(id).unwrap_or_default())));
        self.values = values;
        Ok(())
    }

    async fn init(&mut self) -> PluginResult<()> {
        self.probe.inits.fetch_add(1, Ordering::SeqCst);
        if self.fail_init {
            return Err(PluginError::Configuration("storage handle could not be opened".to_string()));
        }
        Ok(())
    }

    async fn before_all_execute(&self, _ctx: &JobContext) -> PluginResult<Report> {
        self.probe.before_all_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_before_all {
            return Err(PluginError::object("pre-flight check failed"));
        }
        Ok(Report::new())
    }

    async fn execute(&self, ctx: &BatchContext, batch: Vec<LiteReference>) -> PluginResult<()> {
        self.probe.execute_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.batch_delay {
            tokio::time::sleep(delay).await;
        }
        if self.take_infrastructure_failure() {
            return Err(PluginError::infrastructure("storage offline"));
        }
        if self.silent {
            return Ok(());
        }

        let info = self.info();
        for reference in batch {
            self.probe.seen.lock().push(reference.id.clone());
            let mut item: ReportItem = ctx.new_item(&info, &reference);
            ctx.report_partial(&item).await;

            let state = if !reference.is_resolved() || self.should_fail(&reference.id) {
                item.add_details(format!("{} refused {}", self.id, reference.id));
                PluginState::Failure
            } else {
                if let Some(outcome_type) = &self.outcome_type {
                    let outcome = LiteReference::new(
                        outcome_type.clone(),
                        format!("{outcome_type}-of-{}", reference.id),
                    );
                    item.set_outcome_object(&outcome);
                }
                PluginState::Success
            };
            item.set_outcome(state).map_err(|e| PluginError::object(e.to_string()))?;
            ctx.record_outcome(item).await;
        }
        Ok(())
    }

    async fn after_all_execute(&self, _ctx: &JobContext) -> PluginResult<Report> {
        self.probe.after_all_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_after_all {
            return Err(PluginError::object("post-flight aggregation failed"));
        }
        Ok(Report::new())
    }

    async fn shutdown(&self) {
        self.probe.shutdowns.fetch_add(1, Ordering::SeqCst);
    }

    fn clone_me(&self) -> Box<dyn Plugin> {
        let mut fresh = self.clone();
        fresh.values = ParameterValues::new();
        Box::new(fresh)
    }
}
