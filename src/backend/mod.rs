//! Identity and document persistence capabilities.
//!
//! Both are consumed through traits so wellness services can run against the
//! managed Firebase backend or the in-process local one.

pub mod firebase;
pub mod firestore;
pub mod local;
pub mod value;

use std::fmt;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::AtemateError;

/// Free-form document body.
pub type Fields = Map<String, Value>;

/// The signed-in account.
#[derive(Clone, PartialEq, Eq)]
pub struct UserHandle {
    pub uid: String,
    pub email: String,
    /// Bearer token for the document store, when the backend issues one.
    pub id_token: Option<String>,
}

impl fmt::Debug for UserHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserHandle")
            .field("uid", &self.uid)
            .field("email", &self.email)
            .field("id_token", &self.id_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<UserHandle, AtemateError>;

    /// Create the account and sign it in.
    async fn sign_up(&self, email: &str, password: &str) -> Result<UserHandle, AtemateError>;

    async fn sign_out(&self) -> Result<(), AtemateError>;

    fn current_user(&self) -> Option<UserHandle>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup(&self.fields, &FieldPath::parse(path))
    }

    pub fn str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }
}

/// Dotted path into nested maps. Segments may contain any character; the
/// Firestore encoding quotes them as needed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Split on `.`; use `new` when a segment itself contains a dot.
    pub fn parse(path: &str) -> Self {
        Self::new(path.split('.'))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Firestore field path syntax: simple segments bare, others backquoted.
    pub fn to_firestore(&self) -> String {
        self.0
            .iter()
            .map(|s| {
                let simple = s
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                    && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
                if simple {
                    s.clone()
                } else {
                    format!("`{}`", s.replace('\\', "\\\\").replace('`', "\\`"))
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

/// Equality filters (ANDed), at most one ordering, optional limit.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<u32>,
}

impl Query {
    pub fn collection(name: &str) -> Self {
        Self {
            collection: name.to_string(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: &str, descending: bool) -> Self {
        self.order_by = Some(OrderBy {
            field: field.to_string(),
            descending,
        });
        self
    }

    pub fn limit(mut self, n: u32) -> Self {
        self.limit = Some(n);
        self
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, AtemateError>;

    /// Write `fields` at `collection/id`. Without `merge` the document is
    /// replaced; with it only the given top-level keys change.
    async fn set(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
        merge: bool,
    ) -> Result<(), AtemateError>;

    /// Create a document with a generated id and return that id.
    async fn add(&self, collection: &str, fields: Fields) -> Result<String, AtemateError>;

    /// Change individual (possibly nested) fields of an existing document.
    /// `NotFound` when the document does not exist.
    async fn update(
        &self,
        collection: &str,
        id: &str,
        updates: Vec<(FieldPath, Value)>,
    ) -> Result<(), AtemateError>;

    async fn query(&self, query: &Query) -> Result<Vec<Document>, AtemateError>;

    /// Deleting a missing document is not an error.
    async fn delete(&self, collection: &str, id: &str) -> Result<(), AtemateError>;
}

pub(crate) fn lookup<'a>(fields: &'a Fields, path: &FieldPath) -> Option<&'a Value> {
    let (first, rest) = path.segments().split_first()?;
    let mut current = fields.get(first)?;
    for segment in rest {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Set `value` at `path`, creating (or replacing non-map) intermediate maps.
pub(crate) fn assign(fields: &mut Fields, path: &FieldPath, value: Value) {
    let Some((last, parents)) = path.segments().split_last() else {
        return;
    };
    let mut current = fields;
    for segment in parents {
        let entry = current
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(map) = entry else {
            return;
        };
        current = map;
    }
    current.insert(last.clone(), value);
}
