//! # Plugins
//!
//! The plugin contract, its parameter model and error taxonomy, the contexts a
//! plugin works in, multi-step composition, and the built-in plugins.

pub mod context;
pub mod disposal;
pub mod errors;
pub mod instance_identifier;
pub mod multiple_step;
pub mod parameter;
pub mod plugin;
pub mod processing;

pub use context::{BatchContext, JobContext};
pub use disposal::{LiftDisposalHoldPlugin, LIFT_DISPOSAL_HOLD_PLUGIN_ID};
pub use errors::{PluginError, PluginResult};
pub use instance_identifier::{
    instance_identifier_plugin_id, instance_register_targets, local_instance_register_plugin,
    InstanceIdentifierPlugin, LOCAL_INSTANCE_REGISTER_PLUGIN_ID,
};
pub use multiple_step::{
    prepare_steps, run_composition, shutdown_steps, InlineStepExecutor, MultipleStepPlugin,
    PreparedStep, ReportLayout, SlotOutcome, Step, StepExecutor,
};
pub use parameter::{
    ParameterError, ParameterValue, ParameterValues, PluginParameter, PluginParameterType,
};
pub use plugin::{configure_plugin, CompositionView, Plugin, PluginInfo, PluginType};
pub use processing::{process_objects, ObjectProcessor};

use crate::registry::PluginRegistry;

/// Register every plugin shipped with the engine
pub fn register_builtin_plugins(registry: &PluginRegistry) {
    registry.register_prototype(Box::new(LiftDisposalHoldPlugin::new()));
    for (object_type, _) in instance_register_targets() {
        registry.register_prototype(Box::new(InstanceIdentifierPlugin::new(object_type)));
    }
    registry.register_prototype(Box::new(local_instance_register_plugin()));
}
