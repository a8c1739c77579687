//! # Model Collaborator
//!
//! Read and update access to archival objects. The engine only resolves
//! identifiers, loads objects and writes them back; what an object means is the
//! plugin's business.

use crate::constants::fields;
use crate::models::{LiteReference, ObjectType, StoredObject};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("Object not found: {object_type}:{id}")]
    NotFound { object_type: ObjectType, id: String },
    #[error("Request invalid: {0}")]
    RequestInvalid(String),
    /// Storage temporarily unreachable; the only retryable case
    #[error("Model storage unavailable: {0}")]
    Unavailable(String),
    #[error("Model error: {0}")]
    Generic(String),
}

impl ModelError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

#[async_trait]
pub trait ModelService: Send + Sync {
    /// Turn caller-provided identifiers into references.
    ///
    /// Identifiers that do not exist come back as failed references keeping their
    /// slot; only a malformed request fails the whole call.
    async fn resolve(
        &self,
        object_type: &ObjectType,
        ids: &[String],
    ) -> Result<Vec<LiteReference>, ModelError>;

    async fn load(&self, object_type: &ObjectType, id: &str) -> Result<StoredObject, ModelError>;

    /// Write an object back on behalf of `actor`
    async fn update(&self, object: &StoredObject, actor: &str) -> Result<(), ModelError>;
}

/// Process-local object store used by the demo binary and tests
#[derive(Debug, Default)]
pub struct InMemoryModelService {
    objects: DashMap<(ObjectType, String), StoredObject>,
}

impl InMemoryModelService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, object: StoredObject) {
        self.objects
            .insert((object.object_type.clone(), object.id.clone()), object);
    }

    pub fn get(&self, object_type: &ObjectType, id: &str) -> Option<StoredObject> {
        self.objects
            .get(&(object_type.clone(), id.to_string()))
            .map(|entry| entry.value().clone())
    }

    /// Every stored object of a type, ordered by identifier
    pub fn objects_of_type(&self, object_type: &ObjectType) -> Vec<StoredObject> {
        let mut objects: Vec<StoredObject> = self
            .objects
            .iter()
            .filter(|entry| &entry.key().0 == object_type)
            .map(|entry| entry.value().clone())
            .collect();
        objects.sort_by(|a, b| a.id.cmp(&b.id));
        objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl ModelService for InMemoryModelService {
    async fn resolve(
        &self,
        object_type: &ObjectType,
        ids: &[String],
    ) -> Result<Vec<LiteReference>, ModelError> {
        if ids.iter().any(|id| id.trim().is_empty()) {
            return Err(ModelError::RequestInvalid(
                "object identifiers must not be empty".to_string(),
            ));
        }

        Ok(ids
            .iter()
            .map(|id| {
                if self
                    .objects
                    .contains_key(&(object_type.clone(), id.clone()))
                {
                    LiteReference::new(object_type.clone(), id.clone())
                } else {
                    let cause = ModelError::NotFound {
                        object_type: object_type.clone(),
                        id: id.clone(),
                    };
                    LiteReference::failed(object_type.clone(), id.clone(), cause.to_string())
                }
            })
            .collect())
    }

    async fn load(&self, object_type: &ObjectType, id: &str) -> Result<StoredObject, ModelError> {
        self.get(object_type, id).ok_or_else(|| ModelError::NotFound {
            object_type: object_type.clone(),
            id: id.to_string(),
        })
    }

    async fn update(&self, object: &StoredObject, actor: &str) -> Result<(), ModelError> {
        let key = (object.object_type.clone(), object.id.clone());
        if !self.objects.contains_key(&key) {
            return Err(ModelError::NotFound {
                object_type: object.object_type.clone(),
                id: object.id.clone(),
            });
        }

        let mut stored = object.clone();
        stored.set_field(fields::UPDATED_BY, Value::String(actor.to_string()));
        debug!(object_type = %object.object_type, object_id = %object.id, actor, "📝 Object updated");
        self.objects.insert(key, stored);
        Ok(())
    }
}
