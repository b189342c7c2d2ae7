//! Filter descriptor types.

use bson::{Bson, Document};
use serde::{Deserialize, Deserializer};

use crate::{AdapterError, Result};

/// Operator kinds recognized inside a where-clause condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorKind {
    /// Inclusive two-element range
    Between,
    /// Set membership, elements normalized as identifiers
    Inq,
    /// Set exclusion
    Nin,
    /// Greater than
    Gt,
    /// Greater than or equal
    Gte,
    /// Less than
    Lt,
    /// Less than or equal
    Lte,
    /// Not equal
    Neq,
    /// Regular expression match
    Like,
    /// Negated regular expression match
    Nlike,
    /// Anything else, forwarded to the database as `$<key>`
    Other(String),
}

impl OperatorKind {
    /// Maps an ORM operator key to its kind.
    pub fn from_key(key: &str) -> Self {
        match key {
            "between" => OperatorKind::Between,
            "inq" => OperatorKind::Inq,
            "nin" => OperatorKind::Nin,
            "gt" => OperatorKind::Gt,
            "gte" => OperatorKind::Gte,
            "lt" => OperatorKind::Lt,
            "lte" => OperatorKind::Lte,
            "neq" => OperatorKind::Neq,
            "like" => OperatorKind::Like,
            "nlike" => OperatorKind::Nlike,
            other => OperatorKind::Other(other.to_string()),
        }
    }

    /// Returns the ORM operator key.
    pub fn as_key(&self) -> &str {
        match self {
            OperatorKind::Between => "between",
            OperatorKind::Inq => "inq",
            OperatorKind::Nin => "nin",
            OperatorKind::Gt => "gt",
            OperatorKind::Gte => "gte",
            OperatorKind::Lt => "lt",
            OperatorKind::Lte => "lte",
            OperatorKind::Neq => "neq",
            OperatorKind::Like => "like",
            OperatorKind::Nlike => "nlike",
            OperatorKind::Other(key) => key,
        }
    }
}

/// A single where-clause condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Equality against a literal value
    Literal(Bson),
    /// Operator applied to a value
    Operator(OperatorKind, Bson),
}

impl Condition {
    pub fn literal(value: impl Into<Bson>) -> Self {
        Condition::Literal(value.into())
    }

    pub fn operator(kind: OperatorKind, value: impl Into<Bson>) -> Self {
        Condition::Operator(kind, value.into())
    }

    /// Decides the shape of a raw condition value.
    ///
    /// A sub-document with exactly one key that is not `$`-prefixed is an
    /// operator condition; anything else is a literal.
    pub fn from_bson(value: Bson) -> Self {
        if let Bson::Document(doc) = &value {
            if doc.len() == 1 {
                if let Some((key, inner)) = doc.iter().next() {
                    if !key.starts_with('$') {
                        return Condition::Operator(OperatorKind::from_key(key), inner.clone());
                    }
                }
            }
        }
        Condition::Literal(value)
    }

    pub(crate) fn is_null_literal(&self) -> bool {
        matches!(self, Condition::Literal(Bson::Null))
    }
}

/// Ordered list of `(field, condition)` pairs.
///
/// Inserting a field that is already present replaces its condition in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereClause {
    conditions: Vec<(String, Condition)>,
}

impl WhereClause {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a where clause from a raw document, deciding each condition's shape.
    pub fn from_document(doc: Document) -> Self {
        let mut clause = Self::new();
        for (field, value) in doc {
            clause.insert(field, Condition::from_bson(value));
        }
        clause
    }

    pub fn insert(&mut self, field: impl Into<String>, condition: Condition) {
        let field = field.into();
        match self.conditions.iter_mut().find(|(f, _)| *f == field) {
            Some(entry) => entry.1 = condition,
            None => self.conditions.push((field, condition)),
        }
    }

    /// Chaining form of [`WhereClause::insert`].
    pub fn with(mut self, field: impl Into<String>, condition: Condition) -> Self {
        self.insert(field, condition);
        self
    }

    pub fn get(&self, field: &str) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, c)| c)
    }

    pub fn remove(&mut self, field: &str) -> Option<Condition> {
        let pos = self.conditions.iter().position(|(f, _)| f == field)?;
        Some(self.conditions.remove(pos).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Condition)> {
        self.conditions.iter().map(|(f, c)| (f.as_str(), c))
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

impl<'de> Deserialize<'de> for WhereClause {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let doc = Document::deserialize(deserializer)?;
        Ok(WhereClause::from_document(doc))
    }
}

/// Ordering as supplied by the ORM.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Order {
    /// Comma-delimited list, e.g. `"name DESC, age"`
    Text(String),
    /// One token per key, e.g. `["name DESC", "age"]`
    Tokens(Vec<String>),
}

impl From<&str> for Order {
    fn from(value: &str) -> Self {
        Order::Text(value.to_string())
    }
}

impl From<Vec<&str>> for Order {
    fn from(value: Vec<&str>) -> Self {
        Order::Tokens(value.into_iter().map(str::to_string).collect())
    }
}

/// Sort order direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl OrderDirection {
    /// Returns the native sort direction.
    pub fn to_native(&self) -> i32 {
        match self {
            OrderDirection::Asc => 1,
            OrderDirection::Desc => -1,
        }
    }
}

/// One parsed ordering key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: OrderDirection,
}

/// ORM-level query descriptor.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FilterDescriptor {
    #[serde(rename = "where")]
    pub where_clause: WhereClause,
    pub order: Option<Order>,
    pub limit: Option<i64>,
    pub skip: Option<u64>,
    /// Alias for `skip`; `skip` wins when both are set
    pub offset: Option<u64>,
    /// Relation inclusion spec, handed to the model's relation resolver
    pub include: Option<Bson>,
}

impl FilterDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a descriptor from its JSON form.
    ///
    /// # Errors
    /// Returns `InvalidFilter` if the value does not have the descriptor shape.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| AdapterError::InvalidFilter(e.to_string()))
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.where_clause.insert(field, Condition::literal(value));
        self
    }

    pub fn where_op(mut self, field: impl Into<String>, kind: OperatorKind, value: impl Into<Bson>) -> Self {
        self.where_clause.insert(field, Condition::operator(kind, value));
        self
    }

    pub fn where_clause(mut self, clause: WhereClause) -> Self {
        self.where_clause = clause;
        self
    }

    pub fn order(mut self, order: impl Into<Order>) -> Self {
        self.order = Some(order.into());
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn include(mut self, include: impl Into<Bson>) -> Self {
        self.include = Some(include.into());
        self
    }
}

/// Native query plus cursor directives produced by translation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranslatedQuery {
    pub filter: Document,
    pub sort: Option<Document>,
    pub limit: Option<i64>,
    pub skip: Option<u64>,
}
