//! # Index Collaborator
//!
//! Query interface returning matching identifiers page by page. Writes made
//! through the model may only become visible after `commit`.

use super::model::InMemoryModelService;
use crate::models::{Filter, FilterParameter, ObjectType, Sorter, StoredObject, Sublist};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    #[error("Index request invalid: {0}")]
    RequestInvalid(String),
    #[error("Index unavailable: {0}")]
    Unavailable(String),
    #[error("Index error: {0}")]
    Generic(String),
}

impl IndexError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// One page of matching identifiers plus the total hit count
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexResult {
    pub total_count: usize,
    pub ids: Vec<String>,
}

#[async_trait]
pub trait IndexService: Send + Sync {
    async fn find(
        &self,
        object_type: &ObjectType,
        filter: &Filter,
        sorter: &Sorter,
        sublist: Sublist,
    ) -> Result<IndexResult, IndexError>;

    /// Flush pending writes for a type before a dependent read
    async fn commit(&self, object_type: &ObjectType) -> Result<(), IndexError>;
}

/// Index over an `InMemoryModelService`.
///
/// Types registered with `with_schema` reject filters on undeclared fields the
/// way a real index rejects unknown fields; other types accept any field.
pub struct InMemoryIndexService {
    model: Arc<InMemoryModelService>,
    schemas: DashMap<ObjectType, BTreeSet<String>>,
    commits: AtomicUsize,
}

impl InMemoryIndexService {
    pub fn new(model: Arc<InMemoryModelService>) -> Self {
        Self {
            model,
            schemas: DashMap::new(),
            commits: AtomicUsize::new(0),
        }
    }

    pub fn with_schema<I, S>(self, object_type: ObjectType, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.schemas
            .insert(object_type, fields.into_iter().map(Into::into).collect());
        self
    }

    /// Number of `commit` calls served so far
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    fn check_fields(&self, object_type: &ObjectType, filter: &Filter) -> Result<(), IndexError> {
        let Some(schema) = self.schemas.get(object_type) else {
            return Ok(());
        };
        for parameter in &filter.parameters {
            let field = parameter.field();
            if field != "id" && !schema.contains(field) {
                return Err(IndexError::RequestInvalid(format!(
                    "Unknown field '{field}' for {object_type}"
                )));
            }
        }
        Ok(())
    }
}

fn value_matches(value: Option<&Value>, expected: &str) -> bool {
    match value {
        Some(Value::String(s)) => s == expected,
        Some(Value::Array(values)) => values.iter().any(|v| value_matches(Some(v), expected)),
        Some(Value::Bool(b)) => b.to_string() == expected,
        Some(Value::Number(n)) => n.to_string() == expected,
        _ => false,
    }
}

fn field_value<'a>(object: &'a StoredObject, field: &str, id: &'a Value) -> Option<&'a Value> {
    if field == "id" {
        Some(id)
    } else {
        object.field(field)
    }
}

fn parameter_matches(object: &StoredObject, parameter: &FilterParameter) -> bool {
    let id = Value::String(object.id.clone());
    match parameter {
        FilterParameter::Simple { field, value } => {
            value_matches(field_value(object, field, &id), value)
        }
        FilterParameter::OneOf { field, values } => values
            .iter()
            .any(|value| value_matches(field_value(object, field, &id), value)),
        FilterParameter::Not { parameter } => !parameter_matches(object, parameter),
    }
}

fn compare(a: &StoredObject, b: &StoredObject, sorter: &Sorter) -> CmpOrdering {
    for (field, descending) in &sorter.fields {
        let (left, right) = if field == "id" {
            (a.id.clone(), b.id.clone())
        } else {
            (
                a.field(field).map(Value::to_string).unwrap_or_default(),
                b.field(field).map(Value::to_string).unwrap_or_default(),
            )
        };
        let ordering = if *descending {
            right.cmp(&left)
        } else {
            left.cmp(&right)
        };
        if ordering != CmpOrdering::Equal {
            return ordering;
        }
    }
    a.id.cmp(&b.id)
}

#[async_trait]
impl IndexService for InMemoryIndexService {
    async fn find(
        &self,
        object_type: &ObjectType,
        filter: &Filter,
        sorter: &Sorter,
        sublist: Sublist,
    ) -> Result<IndexResult, IndexError> {
        self.check_fields(object_type, filter)?;

        let mut matches: Vec<StoredObject> = self
            .model
            .objects_of_type(object_type)
            .into_iter()
            .filter(|object| {
                filter
                    .parameters
                    .iter()
                    .all(|parameter| parameter_matches(object, parameter))
            })
            .collect();
        matches.sort_by(|a, b| compare(a, b, sorter));

        let total_count = matches.len();
        let after = sublist.after.as_deref();
        let ids = matches
            .into_iter()
            .filter(|object| after.map_or(true, |after| object.id.as_str() > after))
            .skip(sublist.offset)
            .take(sublist.limit)
            .map(|object| object.id)
            .collect();

        Ok(IndexResult { total_count, ids })
    }

    async fn commit(&self, _object_type: &ObjectType) -> Result<(), IndexError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seeded() -> InMemoryIndexService {
        let model = Arc::new(InMemoryModelService::new());
        for (id, holds) in [("a1", json!(["h1"])), ("a2", json!(["h1", "h2"])), ("a3", json!([]))] {
            model.insert(StoredObject::new(ObjectType::AIP, id).with_field("disposal_holds", holds));
        }
        model.insert(StoredObject::new(ObjectType::DIP, "d1"));
        InMemoryIndexService::new(model).with_schema(ObjectType::AIP, ["disposal_holds"])
    }

    #[tokio::test]
    async fn test_find_pages_through_matches() {
        let index = seeded();
        let filter = Filter::all().with(FilterParameter::simple("disposal_holds", "h1"));

        let first = index
            .find(&ObjectType::AIP, &filter, &Sorter::by_id(), Sublist::new(0, 1))
            .await
            .unwrap();
        assert_eq!(first.total_count, 2);
        assert_eq!(first.ids, vec!["a1"]);

        let second = index
            .find(&ObjectType::AIP, &filter, &Sorter::by_id(), Sublist::new(1, 1))
            .await
            .unwrap();
        assert_eq!(second.ids, vec!["a2"]);
    }

    #[tokio::test]
    async fn test_keyset_page_starts_after_cursor() {
        let index = seeded();
        let page = index
            .find(&ObjectType::AIP, &Filter::all(), &Sorter::by_id(), Sublist::after("a1", 10))
            .await
            .unwrap();
        assert_eq!(page.ids, vec!["a2", "a3"]);
        // the count covers the whole query, not only what follows the cursor
        assert_eq!(page.total_count, 3);
    }

    #[tokio::test]
    async fn test_unknown_field_is_rejected() {
        let index = seeded();
        let filter = Filter::all().with(FilterParameter::simple("colour", "red"));
        let result = index
            .find(&ObjectType::AIP, &filter, &Sorter::default(), Sublist::new(0, 10))
            .await;
        assert!(matches!(result, Err(IndexError::RequestInvalid(_))));
    }

    #[tokio::test]
    async fn test_not_and_one_of_filters() {
        let index = seeded();
        let not_h2 = Filter::all().with(FilterParameter::Not {
            parameter: Box::new(FilterParameter::simple("disposal_holds", "h2")),
        });
        let result = index
            .find(&ObjectType::AIP, &not_h2, &Sorter::by_id(), Sublist::new(0, 10))
            .await
            .unwrap();
        assert_eq!(result.ids, vec!["a1", "a3"]);

        let one_of = Filter::all().with(FilterParameter::OneOf {
            field: "id".to_string(),
            values: vec!["a3".to_string(), "a9".to_string()],
        });
        let result = index
            .find(&ObjectType::AIP, &one_of, &Sorter::by_id(), Sublist::new(0, 10))
            .await
            .unwrap();
        assert_eq!(result.ids, vec!["a3"]);

        index.commit(&ObjectType::AIP).await.unwrap();
        assert_eq!(index.commit_count(), 1);
    }
}
