//! TypedTable - typed accessor over a `RowStore` for one `TableRow` type.

use std::marker::PhantomData;

use super::{Row, RowStore, StoreError, TableRow};
use crate::filter::{Filter, Query};

/// Typed wrapper for reading and writing records of a specific table.
pub struct TypedTable<'a, S: ?Sized, R> {
    store: &'a S,
    _marker: PhantomData<R>,
}

impl<'a, S: RowStore + ?Sized, R: TableRow> TypedTable<'a, S, R> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }

    /// A query on this table.
    pub fn query(&self) -> Query {
        Query::new(R::TABLE)
    }

    /// Build an equality filter on this table.
    pub fn eq(&self, column: &str, value: &str) -> Result<Filter, StoreError> {
        Ok(Filter::eq(R::TABLE, column, value)?)
    }

    pub fn find(&self, query: &Query) -> Result<Vec<R>, StoreError> {
        self.store
            .select(query)?
            .iter()
            .map(|row| row.decode::<R>())
            .collect()
    }

    pub fn all(&self) -> Result<Vec<R>, StoreError> {
        self.find(&self.query())
    }

    pub fn get(&self, id: &str) -> Result<Option<R>, StoreError> {
        self.store
            .get(R::TABLE, id)?
            .map(|row| row.decode::<R>())
            .transpose()
    }

    /// Insert a record and return it as stored.
    pub fn insert(&self, record: &R) -> Result<R, StoreError> {
        let mut row = Row::encode(record)?;
        if record.id().is_empty() {
            // let the store generate the key
            row = Row::from_value(strip_id(row.into_value()))?;
        }
        self.store.insert(R::TABLE, row)?.decode()
    }

    /// Merge `patch` into the record with the given id.
    pub fn update(&self, id: &str, patch: Row) -> Result<R, StoreError> {
        self.store.update(R::TABLE, id, patch)?.decode()
    }

    pub fn delete(&self, id: &str) -> Result<bool, StoreError> {
        self.store.delete(R::TABLE, id)
    }
}

fn strip_id(mut value: serde_json::Value) -> serde_json::Value {
    if let Some(map) = value.as_object_mut() {
        map.remove("id");
    }
    value
}

/// Extension trait for typed table access on any `RowStore`.
pub trait TablesExt: RowStore {
    fn table<R: TableRow>(&self) -> TypedTable<'_, Self, R> {
        TypedTable::new(self)
    }
}

impl<S: RowStore + ?Sized> TablesExt for S {}
