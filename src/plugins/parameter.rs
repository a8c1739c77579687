//! # Plugin Parameter Model
//!
//! Typed, named configuration a plugin declares it accepts, and the validated
//! value set a job hands to its plugin instance.
//!
//! ## Overview
//!
//! Callers submit parameters as a raw `id → string` map. `ParameterValues::from_raw`
//! merges that map with the declared defaults and rejects, before any object is
//! touched:
//!
//! - keys the plugin does not declare
//! - missing mandatory values
//! - values that do not parse as the declared type
//! - overrides of read-only parameters that differ from the default
//!
//! Once built, a `ParameterValues` is never mutated. Each value keeps its raw
//! string so multi-step compositions can forward it to their steps unchanged.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginParameterType {
    String,
    Boolean,
    Integer,
    /// Identifier of a registered SIP → AIP plugin
    PluginSipToAip,
    /// Identifier of a registered AIP → AIP plugin
    PluginAipToAip,
    /// Identifier of an archival object
    ObjectId,
}

impl PluginParameterType {
    /// Whether values of this type name another plugin
    pub fn references_plugin(&self) -> bool {
        matches!(self, Self::PluginSipToAip | Self::PluginAipToAip)
    }
}

impl fmt::Display for PluginParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::PluginSipToAip => "plugin_sip_to_aip",
            Self::PluginAipToAip => "plugin_aip_to_aip",
            Self::ObjectId => "object_id",
        };
        f.write_str(name)
    }
}

/// Declaration of one accepted parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginParameter {
    pub id: String,
    pub name: String,
    pub parameter_type: PluginParameterType,
    pub default_value: Option<String>,
    pub mandatory: bool,
    pub read_only: bool,
    pub description: String,
}

impl PluginParameter {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        parameter_type: PluginParameterType,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parameter_type,
            default_value: None,
            mandatory: false,
            read_only: false,
            description: String::new(),
        }
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParameterError {
    #[error("Unknown parameter '{0}'")]
    Unknown(String),
    #[error("Parameter '{0}' is declared more than once")]
    DuplicateDeclaration(String),
    #[error("Missing mandatory parameter '{0}'")]
    MissingMandatory(String),
    #[error("Parameter '{id}' has invalid value '{value}', expected {expected}")]
    InvalidValue {
        id: String,
        value: String,
        expected: PluginParameterType,
    },
    #[error("Parameter '{id}' is read-only and cannot be changed from '{default}'")]
    ReadOnly { id: String, default: String },
    #[error("Parameter '{id}' names plugin '{plugin_id}' which is not registered")]
    UnknownPlugin { id: String, plugin_id: String },
    #[error("Invalid parameters: {0}")]
    Invalid(String),
}

/// A parsed parameter value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ParameterValue {
    String(String),
    Boolean(bool),
    Integer(i64),
    Plugin(String),
    ObjectId(String),
}

impl ParameterValue {
    fn parse(parameter_type: PluginParameterType, raw: &str) -> Option<Self> {
        match parameter_type {
            PluginParameterType::String => Some(Self::String(raw.to_string())),
            PluginParameterType::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
                "true" => Some(Self::Boolean(true)),
                "false" => Some(Self::Boolean(false)),
                _ => None,
            },
            PluginParameterType::Integer => raw.trim().parse().ok().map(Self::Integer),
            PluginParameterType::PluginSipToAip | PluginParameterType::PluginAipToAip => {
                let id = raw.trim();
                (!id.is_empty()).then(|| Self::Plugin(id.to_string()))
            }
            PluginParameterType::ObjectId => {
                let id = raw.trim();
                (!id.is_empty()).then(|| Self::ObjectId(id.to_string()))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Entry {
    value: ParameterValue,
    raw: String,
}

/// Validated, immutable parameter set owned by one plugin instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterValues {
    entries: BTreeMap<String, Entry>,
}

impl ParameterValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate caller overrides against the declarations and merge in defaults
    pub fn from_raw(
        declared: &[PluginParameter],
        raw: &HashMap<String, String>,
    ) -> Result<Self, ParameterError> {
        let mut seen = HashSet::new();
        for parameter in declared {
            if !seen.insert(parameter.id.as_str()) {
                return Err(ParameterError::DuplicateDeclaration(parameter.id.clone()));
            }
        }

        let mut unknown: Vec<&String> = raw.keys().filter(|key| !seen.contains(key.as_str())).collect();
        if !unknown.is_empty() {
            unknown.sort();
            return Err(ParameterError::Unknown(unknown[0].clone()));
        }

        let mut entries = BTreeMap::new();
        for parameter in declared {
            let supplied = raw.get(&parameter.id);

            if parameter.read_only {
                if let Some(value) = supplied {
                    let default = parameter.default_value.clone().unwrap_or_default();
                    if *value != default {
                        return Err(ParameterError::ReadOnly {
                            id: parameter.id.clone(),
                            default,
                        });
                    }
                }
            }

            let Some(raw_value) = supplied.or(parameter.default_value.as_ref()) else {
                if parameter.mandatory {
                    return Err(ParameterError::MissingMandatory(parameter.id.clone()));
                }
                continue;
            };

            if raw_value.trim().is_empty() {
                if parameter.mandatory {
                    return Err(ParameterError::MissingMandatory(parameter.id.clone()));
                }
                if parameter.parameter_type != PluginParameterType::String {
                    continue;
                }
            }

            let value = ParameterValue::parse(parameter.parameter_type, raw_value).ok_or_else(|| {
                ParameterError::InvalidValue {
                    id: parameter.id.clone(),
                    value: raw_value.clone(),
                    expected: parameter.parameter_type,
                }
            })?;

            entries.insert(
                parameter.id.clone(),
                Entry {
                    value,
                    raw: raw_value.clone(),
                },
            );
        }

        Ok(Self { entries })
    }

    /// Reject plugin-typed values that name an unregistered plugin
    pub fn check_plugin_references<F>(&self, is_registered: F) -> Result<(), ParameterError>
    where
        F: Fn(&str) -> bool,
    {
        for (id, entry) in &self.entries {
            if let ParameterValue::Plugin(plugin_id) = &entry.value {
                if !is_registered(plugin_id) {
                    return Err(ParameterError::UnknownPlugin {
                        id: id.clone(),
                        plugin_id: plugin_id.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&ParameterValue> {
        self.entries.get(id).map(|entry| &entry.value)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn raw(&self, id: &str) -> Option<&str> {
        self.entries.get(id).map(|entry| entry.raw.as_str())
    }

    pub fn get_string(&self, id: &str) -> Option<&str> {
        match self.get(id)? {
            ParameterValue::String(value)
            | ParameterValue::Plugin(value)
            | ParameterValue::ObjectId(value) => Some(value),
            _ => None,
        }
    }

    pub fn get_bool(&self, id: &str) -> Option<bool> {
        match self.get(id)? {
            ParameterValue::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub fn get_integer(&self, id: &str) -> Option<i64> {
        match self.get(id)? {
            ParameterValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Raw values restricted to `ids`, used to hand a step only what it declares
    pub fn raw_subset<'a, I>(&self, ids: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        ids.into_iter()
            .filter_map(|id| {
                self.entries
                    .get(id)
                    .map(|entry| (id.to_string(), entry.raw.clone()))
            })
            .collect()
    }

    /// Identifiers holding a value, in sorted order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
