use super::object::ObjectType;
use serde::{Deserialize, Serialize};

/// A single filter condition evaluated by the index collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterParameter {
    /// Field equals value (or, for multi-valued fields, contains it)
    Simple { field: String, value: String },
    /// Field is one of the values
    OneOf { field: String, values: Vec<String> },
    /// Negation of the nested condition
    Not { parameter: Box<FilterParameter> },
}

impl FilterParameter {
    pub fn simple(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Simple {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn field(&self) -> &str {
        match self {
            Self::Simple { field, .. } | Self::OneOf { field, .. } => field,
            Self::Not { parameter } => parameter.field(),
        }
    }
}

/// Conjunction of filter parameters; an empty filter matches everything
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub parameters: Vec<FilterParameter>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with(mut self, parameter: FilterParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sorter {
    /// (field, descending)
    pub fields: Vec<(String, bool)>,
}

impl Sorter {
    /// Ascending by identifier, keeps paging stable while a job walks the index
    pub fn by_id() -> Self {
        Self {
            fields: vec![("id".to_string(), false)],
        }
    }
}

/// Page window into an index result.
///
/// With `after` set the page starts at the first match whose id sorts after
/// it, and `offset` counts from there. Only meaningful with an id sort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sublist {
    pub offset: usize,
    pub limit: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
}

impl Sublist {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit,
            after: None,
        }
    }

    /// Keyset page: up to `limit` matches with an id greater than `id`
    pub fn after(id: impl Into<String>, limit: usize) -> Self {
        Self {
            offset: 0,
            limit,
            after: Some(id.into()),
        }
    }
}

/// Which objects a job runs over
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObjectSelection {
    /// Caller-provided identifiers, resolved through the model collaborator
    Explicit {
        object_type: ObjectType,
        ids: Vec<String>,
    },
    /// Every indexed object of a type
    AllOfType { object_type: ObjectType },
    /// Index query, e.g. a saved search
    Filter {
        object_type: ObjectType,
        filter: Filter,
    },
}

impl ObjectSelection {
    pub fn explicit<I, S>(object_type: ObjectType, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Explicit {
            object_type,
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn object_type(&self) -> &ObjectType {
        match self {
            Self::Explicit { object_type, .. }
            | Self::AllOfType { object_type }
            | Self::Filter { object_type, .. } => object_type,
        }
    }

    /// Whether resolving this selection reads from the index
    pub fn is_index_backed(&self) -> bool {
        !matches!(self, Self::Explicit { .. })
    }
}
