//! # Plugin Registry
//!
//! Explicit map from a stable plugin identifier to a factory producing a fresh,
//! unconfigured instance.
//!
//! ## Overview
//!
//! Every job asks the registry for its own instance, so two jobs running the
//! same plugin never share mutable state. Plugins are registered up front; there
//! is no runtime discovery.
//!
//! ## Usage
//!
//! ```rust
//! use jobs_core::plugins::{register_builtin_plugins, LIFT_DISPOSAL_HOLD_PLUGIN_ID};
//! use jobs_core::registry::PluginRegistry;
//!
//! let registry = PluginRegistry::new();
//! register_builtin_plugins(&registry);
//!
//! let plugin = registry.create(LIFT_DISPOSAL_HOLD_PLUGIN_ID).unwrap();
//! assert_eq!(plugin.info().id, LIFT_DISPOSAL_HOLD_PLUGIN_ID);
//!
//! // hidden plugins stay out of the listing shown to users
//! assert!(registry.list_plugins(true).iter().all(|info| info.is_listable()));
//! ```

use crate::plugins::{Plugin, PluginInfo};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Produces a fresh plugin instance
pub type PluginFactory = Arc<dyn Fn() -> Box<dyn Plugin> + Send + Sync>;

#[derive(Default)]
pub struct PluginRegistry {
    factories: RwLock<HashMap<String, PluginFactory>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `plugin_id`, replacing any earlier registration
    pub fn register<F>(&self, plugin_id: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Plugin> + Send + Sync + 'static,
    {
        let plugin_id = plugin_id.into();
        let previous = self
            .factories
            .write()
            .insert(plugin_id.clone(), Arc::new(factory));
        if previous.is_some() {
            warn!(plugin_id = %plugin_id, "Plugin registration replaced");
        } else {
            info!(plugin_id = %plugin_id, "🔧 Plugin registered");
        }
    }

    /// Register a plugin by example; new instances come from its `clone_me`
    pub fn register_prototype(&self, prototype: Box<dyn Plugin>) {
        let plugin_id = prototype.info().id;
        let prototype: Arc<dyn Plugin> = Arc::from(prototype);
        self.register(plugin_id, move || prototype.clone_me());
    }

    /// Fresh, unconfigured instance
    pub fn create(&self, plugin_id: &str) -> Option<Box<dyn Plugin>> {
        let factory = self.factories.read().get(plugin_id).cloned();
        match factory {
            Some(factory) => {
                debug!(plugin_id, "Creating plugin instance");
                Some(factory())
            }
            None => {
                debug!(plugin_id, "Plugin not registered");
                None
            }
        }
    }

    pub fn contains(&self, plugin_id: &str) -> bool {
        self.factories.read().contains_key(plugin_id)
    }

    pub fn plugin_info(&self, plugin_id: &str) -> Option<PluginInfo> {
        self.create(plugin_id).map(|plugin| plugin.info())
    }

    /// Registered plugins ordered by id; `listable_only` hides `not_listable` ones
    pub fn list_plugins(&self, listable_only: bool) -> Vec<PluginInfo> {
        let factories: Vec<PluginFactory> = self.factories.read().values().cloned().collect();
        let mut infos: Vec<PluginInfo> = factories
            .into_iter()
            .map(|factory| factory().info())
            .filter(|info| !listable_only || info.is_listable())
            .collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    pub fn len(&self) -> usize {
        self.factories.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.read().is_empty()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<String> = self.factories.read().keys().cloned().collect();
        ids.sort();
        f.debug_struct("PluginRegistry").field("plugins", &ids).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::{
        instance_identifier_plugin_id, register_builtin_plugins, InstanceIdentifierPlugin,
        LOCAL_INSTANCE_REGISTER_PLUGIN_ID,
    };
    use crate::models::ObjectType;

    #[test]
    fn test_create_returns_independent_instances() {
        let registry = PluginRegistry::new();
        registry.register("plugin.instance_identifier.aip", || {
            Box::new(InstanceIdentifierPlugin::new(ObjectType::AIP))
        });
        let first = registry.create("plugin.instance_identifier.aip").unwrap();
        let second = registry.create("plugin.instance_identifier.aip").unwrap();
        assert_eq!(first.info(), second.info());
        assert!(registry.create("plugin.unknown").is_none());
        assert!(!registry.contains("plugin.unknown"));
    }

    #[test]
    fn test_builtin_plugins_are_registered_but_hidden() {
        let registry = PluginRegistry::new();
        register_builtin_plugins(&registry);

        assert!(registry.contains(LOCAL_INSTANCE_REGISTER_PLUGIN_ID));
        assert!(registry.contains(&instance_identifier_plugin_id(&ObjectType::DIP)));
        assert_eq!(registry.len(), 6);
        assert_eq!(registry.list_plugins(false).len(), 6);
        assert!(registry.list_plugins(true).is_empty());
    }

    #[test]
    fn test_listing_is_sorted() {
        let registry = PluginRegistry::new();
        register_builtin_plugins(&registry);
        let ids: Vec<String> = registry.list_plugins(false).into_iter().map(|i| i.id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }
}
