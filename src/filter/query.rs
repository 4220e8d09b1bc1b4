//! Select queries: table + filters + ordering + limit.

use std::cmp::Ordering;
use std::fmt;

use serde_json::Value;

use super::{validate_identifier, Filter, FilterError};
use crate::store::Row;

/// Sort order on a single column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub descending: bool,
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = if self.descending { "desc" } else { "asc" };
        write!(f, "{}.{}", self.column, dir)
    }
}

impl Order {
    /// Parse `column.asc` / `column.desc` (direction defaults to ascending).
    pub fn parse(expr: &str) -> Result<Self, FilterError> {
        let (column, descending) = match expr.rsplit_once('.') {
            Some((column, "desc")) => (column, true),
            Some((column, "asc")) => (column, false),
            Some(_) => return Err(FilterError::Malformed(expr.to_string())),
            None => (expr, false),
        };
        Ok(Self {
            column: validate_identifier(column.to_string())?,
            descending,
        })
    }
}

/// A read against one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    table: String,
    filters: Vec<Filter>,
    order: Option<Order>,
    limit: Option<usize>,
}

impl Query {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    /// Add a filter. The filter must target the query's table.
    pub fn filter(mut self, filter: Filter) -> Result<Self, FilterError> {
        if filter.table() != self.table {
            return Err(FilterError::TableMismatch {
                query: self.table,
                filter: filter.table().to_string(),
            });
        }
        self.filters.push(filter);
        Ok(self)
    }

    pub fn order_by(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }

    pub fn order_asc(self, column: impl Into<String>) -> Self {
        self.order_by(Order {
            column: column.into(),
            descending: false,
        })
    }

    pub fn order_desc(self, column: impl Into<String>) -> Self {
        self.order_by(Order {
            column: column.into(),
            descending: true,
        })
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn order(&self) -> Option<&Order> {
        self.order.as_ref()
    }

    pub fn max_rows(&self) -> Option<usize> {
        self.limit
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }

    /// Filter, sort (stable) and truncate an iterator of rows.
    pub fn apply<'a>(&self, rows: impl IntoIterator<Item = &'a Row>) -> Vec<Row> {
        let mut selected: Vec<Row> = rows
            .into_iter()
            .filter(|row| self.matches(row))
            .cloned()
            .collect();

        if let Some(order) = &self.order {
            selected.sort_by(|a, b| {
                let ord = compare_values(a.get(&order.column), b.get(&order.column));
                if order.descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }

        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }
        selected
    }
}

/// Missing and null values sort last in ascending order.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Greater,
        (_, None | Some(Value::Null)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}
