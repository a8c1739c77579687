//! # Registry
//!
//! Lookup of plugins by identifier.

pub mod plugin_registry;

pub use plugin_registry::{PluginFactory, PluginRegistry};
