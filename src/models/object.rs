use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::fmt;

/// Type tag of an object handed to a plugin.
///
/// The engine treats these as opaque labels; the well-known tags exist so plugins
/// and selections agree on spelling.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectType(Cow<'static, str>);

impl ObjectType {
    pub const AIP: ObjectType = ObjectType(Cow::Borrowed("aip"));
    pub const SIP: ObjectType = ObjectType(Cow::Borrowed("sip"));
    pub const DIP: ObjectType = ObjectType(Cow::Borrowed("dip"));
    pub const REPRESENTATION: ObjectType = ObjectType(Cow::Borrowed("representation"));
    pub const FILE: ObjectType = ObjectType(Cow::Borrowed("file"));
    pub const PRESERVATION_METADATA: ObjectType =
        ObjectType(Cow::Borrowed("preservation_metadata"));
    pub const DISPOSAL_HOLD: ObjectType = ObjectType(Cow::Borrowed("disposal_hold"));
    pub const JOB: ObjectType = ObjectType(Cow::Borrowed("job"));

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// An object as loaded from the model collaborator.
///
/// Fields are schemaless; whatever a plugin changes is written back through
/// `ModelService::update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredObject {
    pub id: String,
    pub object_type: ObjectType,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl StoredObject {
    pub fn new(object_type: ObjectType, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            object_type,
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, name: &str, value: Value) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// String entries of an array field; non-string entries are ignored
    pub fn str_list(&self, name: &str) -> Vec<String> {
        self.fields
            .get(name)
            .and_then(Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set_field(&mut self, name: &str, value: Value) {
        self.fields.insert(name.to_string(), value);
    }
}
