//! # Lift Disposal Hold
//!
//! AIP → AIP plugin that lifts one disposal hold, or every active hold, from
//! each AIP of the job.
//!
//! Lifting moves the association from the AIP's `disposal_holds` list into
//! `lifted_disposal_holds`, stamped with the job's user and the time.
//!
//! After all batches the plugin looks at every hold it lifted at least one
//! association of. A hold becomes `LIFTED` exactly when, after an index commit,
//! no AIP is associated with it anymore; holds still associated elsewhere stay
//! `ACTIVE`.

use super::context::{BatchContext, JobContext};
use super::errors::{PluginError, PluginResult};
use super::parameter::{ParameterError, ParameterValues, PluginParameter, PluginParameterType};
use super::plugin::{Plugin, PluginInfo, PluginType};
use super::processing::{process_objects, ObjectProcessor};
use crate::constants::{categories, fields, hold_states, params};
use crate::models::{
    Filter, FilterParameter, LiteReference, ObjectType, PluginState, Report, ReportItem, Sorter,
    StoredObject, Sublist,
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tracing::{debug, info};

pub const LIFT_DISPOSAL_HOLD_PLUGIN_ID: &str = "plugin.lift_disposal_hold";

#[derive(Default)]
pub struct LiftDisposalHoldPlugin {
    values: ParameterValues,
    /// Holds this job lifted at least one association of
    lifted: Mutex<BTreeSet<String>>,
}

impl LiftDisposalHoldPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    fn lift_all(&self) -> bool {
        self.values
            .get_bool(params::DISPOSAL_HOLD_LIFT_ALL)
            .unwrap_or(false)
    }

    fn hold_id(&self) -> Option<&str> {
        self.values
            .get_string(params::DISPOSAL_HOLD_ID)
            .filter(|id| !id.trim().is_empty())
    }

    /// Holds a hold should be lifted from the given AIP, or why none can be
    fn targets(&self, aip: &StoredObject) -> Result<Vec<String>, PluginError> {
        let active = aip.str_list(fields::DISPOSAL_HOLDS);
        if self.lift_all() {
            if active.is_empty() {
                return Err(PluginError::object(format!(
                    "AIP '{}' has no active disposal holds",
                    aip.id
                )));
            }
            return Ok(active);
        }

        let hold_id = self.hold_id().ok_or_else(|| {
            PluginError::Configuration("no disposal hold given".to_string())
        })?;
        if !active.iter().any(|id| id == hold_id) {
            return Err(PluginError::object(format!(
                "AIP '{}' is not associated with disposal hold '{hold_id}'",
                aip.id
            )));
        }
        Ok(vec![hold_id.to_string()])
    }

    async fn finalize_hold(&self, ctx: &JobContext, hold_id: &str) -> ReportItem {
        let info = self.info();
        let reference = LiteReference::new(ObjectType::DISPOSAL_HOLD, hold_id);
        let mut item = ReportItem::new(&info.id, &info.name, &info.version)
            .for_object(&reference)
            .in_job(ctx.job_id());

        let state = match self.transition_hold(ctx, hold_id).await {
            Ok(0) => {
                item.add_details(format!(
                    "Disposal hold '{hold_id}' has no remaining associations and is now lifted"
                ));
                PluginState::Success
            }
            Ok(remaining) => {
                item.add_details(format!(
                    "Disposal hold '{hold_id}' remains active, still associated with {remaining} AIP(s)"
                ));
                PluginState::Skipped
            }
            Err(error) => {
                item.add_details(format!("Unable to update disposal hold '{hold_id}': {error}"));
                PluginState::Failure
            }
        };
        let _ = item.set_outcome(state);
        item
    }

    /// Returns the number of AIPs still associated; the hold is lifted when zero
    async fn transition_hold(&self, ctx: &JobContext, hold_id: &str) -> PluginResult<usize> {
        ctx.index().commit(&ObjectType::AIP).await?;
        let filter =
            Filter::all().with(FilterParameter::simple(fields::DISPOSAL_HOLDS, hold_id));
        let remaining = ctx
            .index()
            .find(&ObjectType::AIP, &filter, &Sorter::default(), Sublist::new(0, 0))
            .await?
            .total_count;
        if remaining > 0 {
            return Ok(remaining);
        }

        let mut hold = ctx.model().load(&ObjectType::DISPOSAL_HOLD, hold_id).await?;
        if hold.str_field(fields::STATE) != Some(hold_states::LIFTED) {
            hold.set_field(fields::STATE, Value::String(hold_states::LIFTED.to_string()));
            hold.set_field(fields::LIFTED_ON, Value::String(Utc::now().to_rfc3339()));
            hold.set_field(fields::LIFTED_BY, Value::String(ctx.username().to_string()));
            ctx.model().update(&hold, ctx.username()).await?;
            info!(job_id = %ctx.job_id(), hold_id, "🔓 Disposal hold lifted");
        }
        Ok(0)
    }
}

#[async_trait]
impl ObjectProcessor for LiftDisposalHoldPlugin {
    async fn process_object(
        &self,
        ctx: &BatchContext,
        mut aip: StoredObject,
        item: &mut ReportItem,
    ) -> Result<(), PluginError> {
        let targets = self.targets(&aip)?;
        let username = ctx.job().username().to_string();
        let now = Utc::now().to_rfc3339();

        let mut lifted = Vec::new();
        let mut problems = Vec::new();
        for hold_id in &targets {
            match ctx.job().model().load(&ObjectType::DISPOSAL_HOLD, hold_id).await {
                Ok(_) => lifted.push(hold_id.clone()),
                Err(error) if error.is_unavailable() => return Err(error.into()),
                Err(error) => problems.push(format!("'{hold_id}': {error}")),
            }
        }

        if lifted.is_empty() {
            return Err(PluginError::object(format!(
                "No disposal hold could be lifted from AIP '{}': {}",
                aip.id,
                problems.join("; ")
            )));
        }

        let remaining: Vec<Value> = aip
            .str_list(fields::DISPOSAL_HOLDS)
            .into_iter()
            .filter(|id| !lifted.contains(id))
            .map(Value::String)
            .collect();
        let mut history: Vec<Value> = aip
            .field(fields::LIFTED_DISPOSAL_HOLDS)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        history.extend(lifted.iter().map(|id| {
            let mut entry = Map::new();
            entry.insert("id".to_string(), Value::String(id.clone()));
            entry.insert(fields::LIFTED_ON.to_string(), Value::String(now.clone()));
            entry.insert(fields::LIFTED_BY.to_string(), Value::String(username.clone()));
            Value::Object(entry)
        }));
        aip.set_field(fields::DISPOSAL_HOLDS, Value::Array(remaining));
        aip.set_field(fields::LIFTED_DISPOSAL_HOLDS, Value::Array(history));

        ctx.job().model().update(&aip, &username).await?;
        self.lifted.lock().extend(lifted.iter().cloned());
        debug!(aip_id = %aip.id, holds = ?lifted, "Disposal holds lifted from AIP");

        item.add_details(format!("Lifted disposal hold(s): {}", lifted.join(", ")));
        if problems.is_empty() {
            Ok(())
        } else {
            Err(PluginError::partial(format!(
                "Could not lift {}",
                problems.join("; ")
            )))
        }
    }
}

#[async_trait]
impl Plugin for LiftDisposalHoldPlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo::new(LIFT_DISPOSAL_HOLD_PLUGIN_ID, "Lift disposal hold", "1.0")
            .with_description("Lifts a disposal hold, or all of them, from the selected AIPs")
            .with_type(PluginType::AipToAip)
            .for_object_type(ObjectType::AIP)
            .with_category(categories::NOT_LISTABLE)
            .with_category(categories::DISPOSAL)
            .with_parameter(
                PluginParameter::new(
                    params::DISPOSAL_HOLD_ID,
                    "Disposal hold",
                    PluginParameterType::String,
                )
                .with_description("Identifier of the disposal hold to lift"),
            )
            .with_parameter(
                PluginParameter::new(
                    params::DISPOSAL_HOLD_LIFT_ALL,
                    "Lift all disposal holds",
                    PluginParameterType::Boolean,
                )
                .with_default("false")
                .with_description("Lift every active disposal hold of each AIP"),
            )
    }

    fn are_parameter_values_valid(&self, values: &ParameterValues) -> Result<(), ParameterError> {
        let lift_all = values
            .get_bool(params::DISPOSAL_HOLD_LIFT_ALL)
            .unwrap_or(false);
        let has_hold = values
            .get_string(params::DISPOSAL_HOLD_ID)
            .is_some_and(|id| !id.trim().is_empty());
        if !lift_all && !has_hold {
            return Err(ParameterError::Invalid(format!(
                "'{}' is required unless '{}' is set",
                params::DISPOSAL_HOLD_ID,
                params::DISPOSAL_HOLD_LIFT_ALL
            )));
        }
        Ok(())
    }

    fn set_parameter_values(&mut self, values: ParameterValues) -> PluginResult<()> {
        self.values = values;
        Ok(())
    }

    async fn execute(&self, ctx: &BatchContext, batch: Vec<LiteReference>) -> PluginResult<()> {
        process_objects(ctx, &self.info(), batch, self).await
    }

    async fn after_all_execute(&self, ctx: &JobContext) -> PluginResult<Report> {
        let holds: Vec<String> = self.lifted.lock().iter().cloned().collect();
        let mut report = Report::new();
        for hold_id in holds {
            report.add_item(self.finalize_hold(ctx, &hold_id).await);
        }
        Ok(report)
    }

    fn clone_me(&self) -> Box<dyn Plugin> {
        Box::new(Self::new())
    }
}
