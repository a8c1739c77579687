use super::object::ObjectType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lazy, serializable handle to a target object.
///
/// A reference that could not be resolved keeps its slot in the batch and carries
/// the captured cause, so the object is reported as a failure instead of vanishing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LiteReference {
    pub id: String,
    pub object_type: ObjectType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl LiteReference {
    pub fn new(object_type: ObjectType, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            object_type,
            cause: None,
        }
    }

    /// Reference whose resolution already failed
    pub fn failed(object_type: ObjectType, id: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            object_type,
            cause: Some(cause.into()),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.cause.is_none()
    }
}

impl fmt::Display for LiteReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.object_type, self.id)
    }
}
