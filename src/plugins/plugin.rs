//! # Plugin Contract
//!
//! A plugin is the unit of work a job runs over its objects.
//!
//! ## Lifecycle
//!
//! ```text
//! clone_me → set_parameter_values → init → before_all_execute
//!          → execute (once per batch, possibly concurrently)
//!          → after_all_execute → shutdown
//! ```
//!
//! Each job works on its own instance produced by the registry, so instances
//! never share mutable state across jobs. `execute` takes `&self` because batches
//! of one job run concurrently; state a plugin accumulates across batches lives
//! behind its own lock.

use super::context::{BatchContext, JobContext};
use super::errors::{PluginError, PluginResult};
use super::multiple_step::Step;
use super::parameter::{ParameterError, ParameterValues, PluginParameter};
use crate::constants::categories;
use crate::models::{LiteReference, ObjectType, Report};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PluginType {
    #[default]
    Misc,
    AipToAip,
    SipToAip,
    /// Composition of other plugins
    Multi,
    /// Engine-internal action, not meant to be started by users
    Internal,
}

/// Static description of a plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub plugin_type: PluginType,
    /// Object types the plugin accepts; empty means any
    pub object_types: Vec<ObjectType>,
    pub categories: Vec<String>,
    pub parameters: Vec<PluginParameter>,
}

impl PluginInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            description: String::new(),
            plugin_type: PluginType::Misc,
            object_types: Vec::new(),
            categories: Vec::new(),
            parameters: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_type(mut self, plugin_type: PluginType) -> Self {
        self.plugin_type = plugin_type;
        self
    }

    pub fn for_object_type(mut self, object_type: ObjectType) -> Self {
        self.object_types.push(object_type);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.categories.push(category.into());
        self
    }

    pub fn with_parameter(mut self, parameter: PluginParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Whether callers may see this plugin when listing
    pub fn is_listable(&self) -> bool {
        !self.categories.iter().any(|c| c == categories::NOT_LISTABLE)
    }

    pub fn accepts(&self, object_type: &ObjectType) -> bool {
        self.object_types.is_empty() || self.object_types.contains(object_type)
    }
}

/// Steps and parameter values of a multi-step composition
#[derive(Debug, Clone, Copy)]
pub struct CompositionView<'a> {
    pub steps: &'a [Step],
    pub values: &'a ParameterValues,
}

#[async_trait]
pub trait Plugin: Send + Sync {
    fn info(&self) -> PluginInfo;

    /// Declared parameter set
    fn parameters(&self) -> Vec<PluginParameter> {
        self.info().parameters
    }

    /// Plugin-specific rules on top of the declarations, e.g. "one of these two
    /// parameters must be set"
    fn are_parameter_values_valid(&self, _values: &ParameterValues) -> Result<(), ParameterError> {
        Ok(())
    }

    /// Store the validated values; called once per instance
    fn set_parameter_values(&mut self, values: ParameterValues) -> PluginResult<()>;

    async fn init(&mut self) -> PluginResult<()> {
        Ok(())
    }

    /// Pre-flight checks, runs once before the first batch
    async fn before_all_execute(&self, _ctx: &JobContext) -> PluginResult<Report> {
        Ok(Report::new())
    }

    /// Process one batch, recording exactly one outcome per object through `ctx`
    async fn execute(&self, ctx: &BatchContext, batch: Vec<LiteReference>) -> PluginResult<()>;

    /// Finalization, runs once after every batch finished or failed
    async fn after_all_execute(&self, _ctx: &JobContext) -> PluginResult<Report> {
        Ok(Report::new())
    }

    async fn shutdown(&self) {}

    /// Fresh, unconfigured instance of the same plugin
    fn clone_me(&self) -> Box<dyn Plugin>;

    /// Present when the plugin is a multi-step composition
    fn composition(&self) -> Option<CompositionView<'_>> {
        None
    }
}

/// Validate `raw` against the plugin's declarations and hand the result to it.
///
/// Runs every configuration check before the job touches an object: declared
/// parameters, plugin references, then the plugin's own rules.
pub fn configure_plugin<F>(
    plugin: &mut dyn Plugin,
    raw: &HashMap<String, String>,
    is_registered: F,
) -> PluginResult<()>
where
    F: Fn(&str) -> bool,
{
    let values = ParameterValues::from_raw(&plugin.parameters(), raw)?;
    values.check_plugin_references(is_registered)?;
    plugin
        .are_parameter_values_valid(&values)
        .map_err(PluginError::from)?;
    plugin.set_parameter_values(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::parameter::PluginParameterType;

    struct Echo {
        values: ParameterValues,
    }

    #[async_trait]
    impl Plugin for Echo {
        fn info(&self) -> PluginInfo {
            PluginInfo::new("plugin.echo", "Echo", "1.0")
                .with_parameter(
                    PluginParameter::new("message", "Message", PluginParameterType::String)
                        .mandatory(),
                )
                .with_parameter(PluginParameter::new(
                    "shout",
                    "Shout",
                    PluginParameterType::Boolean,
                ))
        }

        fn are_parameter_values_valid(&self, values: &ParameterValues) -> Result<(), ParameterError> {
            if values.get_string("message") == Some("forbidden") {
                return Err(ParameterError::Invalid("message is forbidden".into()));
            }
            Ok(())
        }

        fn set_parameter_values(&mut self, values: ParameterValues) -> PluginResult<()> {
            self.values = values;
            Ok(())
        }

        async fn execute(&self, _ctx: &BatchContext, _batch: Vec<LiteReference>) -> PluginResult<()> {
            Ok(())
        }

        fn clone_me(&self) -> Box<dyn Plugin> {
            Box::new(Echo {
                values: ParameterValues::new(),
            })
        }
    }

    fn raw(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_configure_applies_declarations_and_custom_rules() {
        let mut plugin = Echo {
            values: ParameterValues::new(),
        };
        configure_plugin(&mut plugin, &raw(&[("message", "hi")]), |_| true).unwrap();
        assert_eq!(plugin.values.get_string("message"), Some("hi"));

        let mut fresh = Echo {
            values: ParameterValues::new(),
        };
        let error = configure_plugin(&mut fresh, &raw(&[("message", "forbidden")]), |_| true)
            .unwrap_err();
        assert!(matches!(error, PluginError::Configuration(_)));

        let error = configure_plugin(&mut fresh, &raw(&[("other", "x")]), |_| true).unwrap_err();
        assert!(error.is_setup_failure());
    }

    #[test]
    fn test_listing_honours_not_listable_category() {
        let info = PluginInfo::new("p", "P", "1").with_category(categories::NOT_LISTABLE);
        assert!(!info.is_listable());
        assert!(PluginInfo::new("q", "Q", "1").is_listable());
    }

    #[test]
    fn test_accepts_any_type_when_none_declared() {
        let any = PluginInfo::new("p", "P", "1");
        assert!(any.accepts(&ObjectType::DIP));
        let aip_only = PluginInfo::new("p", "P", "1").for_object_type(ObjectType::AIP);
        assert!(aip_only.accepts(&ObjectType::AIP));
        assert!(!aip_only.accepts(&ObjectType::DIP));
    }
}
