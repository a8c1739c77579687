//! # Instance Identifier Plugins
//!
//! `InstanceIdentifierPlugin` stamps the repository instance identifier on every
//! object of one type; one is registered per supported type. The local instance
//! register composition chains them so a single job marks AIPs, DIPs,
//! preservation metadata and job records in one pass.

use super::context::BatchContext;
use super::errors::{PluginError, PluginResult};
use super::multiple_step::{MultipleStepPlugin, Step};
use super::parameter::{ParameterValues, PluginParameter, PluginParameterType};
use super::plugin::{Plugin, PluginInfo, PluginType};
use super::processing::{process_objects, ObjectProcessor};
use crate::constants::{categories, fields, params};
use crate::models::{LiteReference, ObjectType, ReportItem, StoredObject};
use async_trait::async_trait;
use serde_json::Value;

pub const LOCAL_INSTANCE_REGISTER_PLUGIN_ID: &str = "plugin.local_instance_register";

/// Identifier under which the stamping plugin for `object_type` is registered
pub fn instance_identifier_plugin_id(object_type: &ObjectType) -> String {
    format!("plugin.instance_identifier.{object_type}")
}

fn instance_id_parameter() -> PluginParameter {
    PluginParameter::new(params::INSTANCE_ID, "Instance identifier", PluginParameterType::String)
        .mandatory()
        .with_description("Identifier of the repository instance the objects belong to")
}

pub struct InstanceIdentifierPlugin {
    object_type: ObjectType,
    values: ParameterValues,
}

impl InstanceIdentifierPlugin {
    pub fn new(object_type: ObjectType) -> Self {
        Self {
            object_type,
            values: ParameterValues::new(),
        }
    }

    fn instance_id(&self) -> PluginResult<&str> {
        self.values
            .get_string(params::INSTANCE_ID)
            .ok_or_else(|| PluginError::Configuration("instance identifier not configured".to_string()))
    }
}

#[async_trait]
impl ObjectProcessor for InstanceIdentifierPlugin {
    async fn process_object(
        &self,
        ctx: &BatchContext,
        mut object: StoredObject,
        item: &mut ReportItem,
    ) -> Result<(), PluginError> {
        let instance_id = self.instance_id()?;
        let previous = object.str_field(fields::INSTANCE_ID).map(str::to_string);
        object.set_field(fields::INSTANCE_ID, Value::String(instance_id.to_string()));
        ctx.job().model().update(&object, ctx.job().username()).await?;

        match previous {
            Some(previous) if previous != instance_id => item.add_details(format!(
                "Instance identifier changed from '{previous}' to '{instance_id}'"
            )),
            _ => item.add_details(format!("Instance identifier set to '{instance_id}'")),
        }
        Ok(())
    }
}

#[async_trait]
impl Plugin for InstanceIdentifierPlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo::new(
            instance_identifier_plugin_id(&self.object_type),
            format!("Instance identifier ({})", self.object_type),
            "1.0",
        )
        .with_description(format!(
            "Stamps the repository instance identifier on {} objects",
            self.object_type
        ))
        .with_type(PluginType::Internal)
        .for_object_type(self.object_type.clone())
        .with_category(categories::NOT_LISTABLE)
        .with_category(categories::SYNCHRONIZATION)
        .with_parameter(instance_id_parameter())
    }

    fn set_parameter_values(&mut self, values: ParameterValues) -> PluginResult<()> {
        self.values = values;
        Ok(())
    }

    async fn execute(&self, ctx: &BatchContext, batch: Vec<LiteReference>) -> PluginResult<()> {
        process_objects(ctx, &self.info(), batch, self).await
    }

    fn clone_me(&self) -> Box<dyn Plugin> {
        Box::new(Self::new(self.object_type.clone()))
    }
}

/// Types covered by the local instance register, with the toggle of each step
pub fn instance_register_targets() -> Vec<(ObjectType, &'static str)> {
    vec![
        (ObjectType::AIP, params::DO_INSTANCE_IDENTIFIER_AIP),
        (
            ObjectType::PRESERVATION_METADATA,
            params::DO_INSTANCE_IDENTIFIER_PRESERVATION_METADATA,
        ),
        (ObjectType::DIP, params::DO_INSTANCE_IDENTIFIER_DIP),
        (ObjectType::JOB, params::DO_INSTANCE_IDENTIFIER_JOB),
    ]
}

/// Composition stamping the instance identifier on every supported type.
///
/// Step toggles are read-only and on, so the job always runs every step; only
/// `instance_id` is forwarded to the steps.
pub fn local_instance_register_plugin() -> MultipleStepPlugin {
    let mut info = PluginInfo::new(
        LOCAL_INSTANCE_REGISTER_PLUGIN_ID,
        "Object instance identifier",
        "1.0",
    )
    .with_description(
        "Adds the instance identifier to stored objects so a central repository can tell which instance they come from",
    )
    .with_type(PluginType::Multi)
    .with_category(categories::NOT_LISTABLE)
    .with_category(categories::SYNCHRONIZATION)
    .with_parameter(instance_id_parameter());

    let mut steps = Vec::new();
    for (object_type, toggle) in instance_register_targets() {
        info = info.with_parameter(
            PluginParameter::new(
                toggle,
                format!("Instance identifier on {object_type}"),
                PluginParameterType::Boolean,
            )
            .with_default("true")
            .mandatory()
            .read_only(),
        );
        steps.push(
            Step::new(instance_identifier_plugin_id(&object_type))
                .for_type(object_type)
                .toggled_by(toggle),
        );
    }

    MultipleStepPlugin::new(info, steps)
}
