//! Typed filter descriptors for remote reads and change channels.
//!
//! Filters are validated when they are built, so a malformed descriptor
//! never reaches the store. The legacy `column=op.value` wire form is
//! still accepted through [`Filter::parse`] and produced by `Display`.
//!
//! ## Example
//!
//! ```
//! use cuizly_sync::{Filter, FilterOp, Query};
//!
//! let by_owner = Filter::eq("favorites", "user_id", "user-1").unwrap();
//! assert_eq!(by_owner.to_string(), "user_id=eq.user-1");
//!
//! let parsed = Filter::parse("favorites", "user_id=eq.user-1").unwrap();
//! assert_eq!(parsed, by_owner);
//! assert_eq!(parsed.op(), FilterOp::Eq);
//!
//! let query = Query::new("favorites")
//!     .filter(by_owner)
//!     .unwrap()
//!     .order_desc("created_at")
//!     .limit(20);
//! assert_eq!(query.filters().len(), 1);
//! ```

mod parse;
mod query;

use std::cmp::Ordering;
use std::fmt::{self, Write as _};

use serde_json::Value;

use crate::store::Row;

pub use query::{Order, Query};

/// Error raised when a filter or query is malformed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    #[error("invalid identifier {0:?}: expected [A-Za-z0-9_]+")]
    InvalidIdentifier(String),

    #[error("operator {op} does not accept value {value}")]
    InvalidValue { op: FilterOp, value: String },

    #[error("unknown filter operator {0:?}")]
    UnknownOperator(String),

    #[error("malformed filter expression {0:?}")]
    Malformed(String),

    #[error("filter targets table {filter} but the query reads {query}")]
    TableMismatch { query: String, filter: String },
}

/// Comparison operator of a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
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
            FilterOp::In => "in",
            FilterOp::Is => "is",
        }
    }

    fn is_ordering(&self) -> bool {
        matches!(
            self,
            FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte
        )
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Right-hand side of a filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Text(String),
    Int(i64),
    Bool(bool),
    Null,
    List(Vec<FilterValue>),
}

impl FilterValue {
    /// Scalar equality against a row value. Text and integers compare by
    /// their textual form so `user_id=eq.42` matches both `42` and `"42"`.
    fn matches_scalar(&self, value: &Value) -> bool {
        match (self, value) {
            (FilterValue::Null, Value::Null) => true,
            (FilterValue::Bool(b), Value::Bool(v)) => b == v,
            (FilterValue::Int(i), Value::Number(n)) => n.as_i64() == Some(*i),
            (FilterValue::Int(i), Value::String(s)) => s == &i.to_string(),
            (FilterValue::Text(t), Value::String(s)) => t == s,
            (FilterValue::Text(t), Value::Number(n)) => &n.to_string() == t,
            _ => false,
        }
    }

    fn compare(&self, value: &Value) -> Option<Ordering> {
        match (value, self) {
            (Value::Number(n), FilterValue::Int(i)) => n.as_f64()?.partial_cmp(&(*i as f64)),
            (Value::String(s), FilterValue::Text(t)) => Some(s.as_str().cmp(t.as_str())),
            _ => None,
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Text(s) => write_text(f, s),
            FilterValue::Int(i) => write!(f, "{}", i),
            FilterValue::Bool(b) => write!(f, "{}", b),
            FilterValue::Null => f.write_str("null"),
            FilterValue::List(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Text that would read back as another scalar, or that clashes with the
/// list syntax, is written in double quotes with `"` and `\` escaped.
fn write_text(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    if !needs_quotes(text) {
        return f.write_str(text);
    }
    f.write_char('"')?;
    for c in text.chars() {
        if c == '"' || c == '\\' {
            f.write_char('\\')?;
        }
        f.write_char(c)?;
    }
    f.write_char('"')
}

fn needs_quotes(text: &str) -> bool {
    text.is_empty()
        || text.trim() != text
        || text.parse::<i64>().is_ok()
        || matches!(text, "true" | "false" | "null")
        || text.contains(['"', ',', '(', ')'])
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Text(value)
    }
}

impl From<&String> for FilterValue {
    fn from(value: &String) -> Self {
        FilterValue::Text(value.clone())
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Int(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        FilterValue::Bool(value)
    }
}

/// A validated `{table, column, operator, value}` predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    table: String,
    column: String,
    op: FilterOp,
    value: FilterValue,
}

impl Filter {
    /// Build a filter, rejecting bad identifiers and operator/value
    /// combinations that could never match.
    pub fn new(
        table: impl Into<String>,
        column: impl Into<String>,
        op: FilterOp,
        value: impl Into<FilterValue>,
    ) -> Result<Self, FilterError> {
        let table = validate_identifier(table.into())?;
        let column = validate_identifier(column.into())?;
        let value = value.into();

        let valid = match (&op, &value) {
            (FilterOp::In, FilterValue::List(items)) => {
                !items.is_empty() && items.iter().all(|v| !matches!(v, FilterValue::List(_)))
            }
            (FilterOp::In, _) => false,
            (_, FilterValue::List(_)) => false,
            (FilterOp::Is, FilterValue::Null | FilterValue::Bool(_)) => true,
            (FilterOp::Is, _) => false,
            (op, FilterValue::Text(_) | FilterValue::Int(_)) if op.is_ordering() => true,
            (op, _) if op.is_ordering() => false,
            (FilterOp::Eq | FilterOp::Neq, FilterValue::Null) => false,
            _ => true,
        };

        if !valid {
            return Err(FilterError::InvalidValue {
                op,
                value: value.to_string(),
            });
        }

        Ok(Self {
            table,
            column,
            op,
            value,
        })
    }

    pub fn eq(
        table: impl Into<String>,
        column: impl Into<String>,
        value: impl Into<FilterValue>,
    ) -> Result<Self, FilterError> {
        Self::new(table, column, FilterOp::Eq, value)
    }

    pub fn neq(
        table: impl Into<String>,
        column: impl Into<String>,
        value: impl Into<FilterValue>,
    ) -> Result<Self, FilterError> {
        Self::new(table, column, FilterOp::Neq, value)
    }

    /// Parse the legacy `column=op.value` form for the given table.
    pub fn parse(table: impl Into<String>, expr: &str) -> Result<Self, FilterError> {
        let (column, op, value) = parse::parse_expression(expr)?;
        Self::new(table, column, op, value)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn op(&self) -> FilterOp {
        self.op
    }

    pub fn value(&self) -> &FilterValue {
        &self.value
    }

    /// Evaluate the filter against a row.
    ///
    /// A missing column only satisfies `is.null`.
    pub fn matches(&self, row: &Row) -> bool {
        let Some(actual) = row.get(&self.column) else {
            return matches!((self.op, &self.value), (FilterOp::Is, FilterValue::Null));
        };

        match self.op {
            FilterOp::Eq => self.value.matches_scalar(actual),
            FilterOp::Neq => !actual.is_null() && !self.value.matches_scalar(actual),
            FilterOp::Gt => self.value.compare(actual) == Some(Ordering::Greater),
            FilterOp::Gte => matches!(
                self.value.compare(actual),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOp::Lt => self.value.compare(actual) == Some(Ordering::Less),
            FilterOp::Lte => matches!(
                self.value.compare(actual),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOp::In => match &self.value {
                FilterValue::List(items) => items.iter().any(|v| v.matches_scalar(actual)),
                _ => false,
            },
            FilterOp::Is => self.value.matches_scalar(actual),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}.{}", self.column, self.op, self.value)
    }
}

pub(crate) fn validate_identifier(name: String) -> Result<String, FilterError> {
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(name)
    } else {
        Err(FilterError::InvalidIdentifier(name))
    }
}
