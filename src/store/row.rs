use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::StoreError;

/// Trait for typed records stored in a remote table.
///
/// Usually derived with `#[derive(TableRow)]`.
pub trait TableRow: Serialize + DeserializeOwned + Clone + Send + Sync {
    /// Table name ("favorites", "notifications", ...).
    const TABLE: &'static str;

    /// Primary key of this record.
    fn id(&self) -> &str;
}

/// A row as stored by the remote store: a JSON object whose `id` column is
/// the primary key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(Map<String, Value>);

impl Row {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap a JSON value; only objects are rows.
    pub fn from_value(value: Value) -> Result<Self, StoreError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(StoreError::Serde(format!(
                "expected a JSON object, got {}",
                other
            ))),
        }
    }

    pub fn encode<R: Serialize>(record: &R) -> Result<Self, StoreError> {
        let value = serde_json::to_value(record).map_err(|e| StoreError::Serde(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn decode<R: DeserializeOwned>(&self) -> Result<R, StoreError> {
        serde_json::from_value(Value::Object(self.0.clone()))
            .map_err(|e| StoreError::Serde(e.to_string()))
    }

    pub fn id(&self) -> Option<&str> {
        self.get_str("id")
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.0.get(column).and_then(Value::as_str)
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(column.into(), value.into());
    }

    /// Builder-style [`Row::set`].
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    pub fn contains(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    /// Overwrite every column present in `patch`.
    pub fn merge(&mut self, patch: &Row) {
        for (k, v) in &patch.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}
