//! Collection, record and query descriptor types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Untyped row submitted to or returned by the remote service
pub type Record = serde_json::Map<String, Value>;

/// Name of a remote record set
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Collection(String);

impl Collection {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Collection {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Collection {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// What `select_one` should do when nothing matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Existence {
    /// Zero rows yields `Ok(None)`
    #[default]
    Optional,
    /// Zero rows yields `Error::NotFound`
    Required,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    ILike,
    In,
    Is,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Neq => "neq",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
            FilterOp::Like => "like",
            FilterOp::ILike => "ilike",
            FilterOp::In => "in",
            FilterOp::Is => "is",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ordering {
    pub column: String,
    pub direction: Direction,
}

/// Filter, sort and pagination parameters for one call
///
/// Builder methods consume and return the descriptor; once handed to the
/// data access layer it is only read.
///
/// # Example
/// ```
/// use basekit_core::{Direction, QueryDescriptor};
///
/// let query = QueryDescriptor::new()
///     .columns(["id", "title"])
///     .eq("status", "published")
///     .order_by("created_at", Direction::Descending)
///     .limit(20);
/// assert_eq!(query.filters().len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryDescriptor {
    columns: Vec<String>,
    filters: Vec<Filter>,
    order: Vec<Ordering>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl QueryDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict the returned columns (all columns when empty)
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter(mut self, column: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            column: column.into(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(column, FilterOp::Eq, value)
    }

    pub fn neq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(column, FilterOp::Neq, value)
    }

    pub fn gt(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(column, FilterOp::Gt, value)
    }

    pub fn gte(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(column, FilterOp::Gte, value)
    }

    pub fn lt(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(column, FilterOp::Lt, value)
    }

    pub fn lte(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(column, FilterOp::Lte, value)
    }

    pub fn like(self, column: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.filter(column, FilterOp::Like, Value::String(pattern.into()))
    }

    pub fn ilike(self, column: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.filter(column, FilterOp::ILike, Value::String(pattern.into()))
    }

    pub fn is_in<I, V>(self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.filter(column, FilterOp::In, Value::Array(values))
    }

    pub fn is_null(self, column: impl Into<String>) -> Self {
        self.filter(column, FilterOp::Is, Value::Null)
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.order.push(Ordering {
            column: column.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn selected_columns(&self) -> &[String] {
        &self.columns
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn ordering(&self) -> &[Ordering] {
        &self.order
    }

    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    pub fn offset_value(&self) -> Option<u64> {
        self.offset
    }

    pub fn has_filters(&self) -> bool {
        !self.filters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_accumulates_filters_and_order() {
        let query = QueryDescriptor::new()
            .columns(["id", "name"])
            .eq("team_id", 7)
            .is_in("role", ["admin", "owner"])
            .is_null("deleted_at")
            .order_by("name", Direction::Ascending)
            .limit(10)
            .offset(30);

        assert_eq!(query.selected_columns(), ["id", "name"]);
        assert_eq!(query.filters().len(), 3);
        assert_eq!(query.filters()[0].value, json!(7));
        assert_eq!(query.filters()[1].op, FilterOp::In);
        assert_eq!(query.filters()[1].value, json!(["admin", "owner"]));
        assert_eq!(query.filters()[2].value, Value::Null);
        assert_eq!(query.ordering()[0].direction, Direction::Ascending);
        assert_eq!(query.limit_value(), Some(10));
        assert_eq!(query.offset_value(), Some(30));
    }

    #[test]
    fn test_empty_descriptor_has_no_filters() {
        let query = QueryDescriptor::new();
        assert!(!query.has_filters());
        assert!(query.selected_columns().is_empty());
        assert_eq!(query.limit_value(), None);
    }

    #[test]
    fn test_collection_display_and_serde() {
        let collection = Collection::from("profiles");
        assert_eq!(collection.to_string(), "profiles");
        assert_eq!(serde_json::to_value(&collection).unwrap(), json!("profiles"));
    }

    #[test]
    fn test_existence_defaults_to_optional() {
        assert_eq!(Existence::default(), Existence::Optional);
    }
}
