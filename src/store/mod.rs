//! Remote Row Store - the authoritative backend the caches synchronize with.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 RemoteStore (per session)                     │
//! │   RowStore: select / get / insert / update / delete          │
//! │   Changefeed: open_channel(spec) -> ChangeChannel            │
//! └──────────────────────────────────────────────────────────────┘
//!                    │                          │
//!                    ▼                          ▼
//! ┌─────────────────────────────┐   ┌─────────────────────────────┐
//! │ InMemoryBackend::connect()  │   │ hosted backend adapters     │
//! │ (included, RLS stand-in,    │   │ (external)                  │
//! │  fault injection)           │   │                             │
//! └─────────────────────────────┘   └─────────────────────────────┘
//! ```
//!
//! Change events are delivered at least once, in commit order per row.
//! Consumers must treat them as a trigger to reconcile, never as the
//! complete authoritative state.

mod faults;
mod in_memory;
mod row;
mod typed;

use std::sync::Arc;
use std::time::Duration;

use crate::filter::{Filter, FilterError, Query};

pub use faults::FaultPlan;
pub use in_memory::{InMemoryBackend, InMemoryChannel, InMemoryRowStore};
pub use row::{Row, TableRow};
pub use typed::{TablesExt, TypedTable};

/// Error type for remote store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Transport failure; retrying may succeed.
    #[error("network error: {0}")]
    Network(String),

    /// A unique or check constraint rejected the write.
    #[error("constraint violation on {table}: {detail}")]
    Constraint { table: String, detail: String },

    #[error("row not found: {table}/{id}")]
    NotFound { table: String, id: String },

    /// The session may not touch this table or row.
    #[error("access to {table} denied by row-level policy")]
    Forbidden { table: String },

    /// The session token is missing or expired.
    #[error("session is not authorized")]
    Unauthorized,

    #[error("serialization error: {0}")]
    Serde(String),

    #[error("invalid filter: {0}")]
    Filter(#[from] FilterError),

    #[error("store lock poisoned during {0}")]
    Poisoned(&'static str),
}

/// Kind of row change carried by a change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
        }
    }
}

/// A row-level change notification.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// Commit sequence number assigned by the store.
    pub seq: u64,
    pub table: String,
    pub kind: ChangeKind,
    /// Row after the change (inserts and updates).
    pub new: Option<Row>,
    /// Row before the change (updates and deletes).
    pub old: Option<Row>,
}

impl ChangeEvent {
    /// The most recent image of the row touched by this event.
    pub fn row(&self) -> Option<&Row> {
        self.new.as_ref().or(self.old.as_ref())
    }

    /// Primary key of the changed row.
    pub fn row_id(&self) -> Option<&str> {
        self.row().and_then(Row::id)
    }

    /// Whether the payload carries the full new row, so consumers can
    /// patch in place instead of reloading.
    pub fn carries_full_row(&self) -> bool {
        match self.kind {
            ChangeKind::Insert | ChangeKind::Update => {
                self.new.as_ref().map(|r| r.id().is_some()).unwrap_or(false)
            }
            ChangeKind::Delete => self.old.as_ref().map(|r| r.id().is_some()).unwrap_or(false),
        }
    }
}

/// Which change kinds a channel delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventMask {
    #[default]
    All,
    Only(ChangeKind),
}

impl EventMask {
    pub fn accepts(&self, kind: ChangeKind) -> bool {
        match self {
            EventMask::All => true,
            EventMask::Only(k) => *k == kind,
        }
    }
}

/// What a push channel listens to: one table, a change mask and an
/// optional typed filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    table: String,
    events: EventMask,
    filter: Option<Filter>,
}

impl ChannelSpec {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            events: EventMask::All,
            filter: None,
        }
    }

    pub fn events(mut self, events: EventMask) -> Self {
        self.events = events;
        self
    }

    /// Restrict the channel with a filter on the same table.
    pub fn with_filter(mut self, filter: Filter) -> Result<Self, FilterError> {
        if filter.table() != self.table {
            return Err(FilterError::TableMismatch {
                query: self.table,
                filter: filter.table().to_string(),
            });
        }
        self.filter = Some(filter);
        Ok(self)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn mask(&self) -> EventMask {
        self.events
    }

    pub fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    /// Whether an event should be delivered on this channel. Filters are
    /// evaluated on the new row, falling back to the old one for deletes.
    pub fn accepts(&self, event: &ChangeEvent) -> bool {
        if event.table != self.table || !self.events.accepts(event.kind) {
            return false;
        }
        match (&self.filter, event.row()) {
            (None, _) => true,
            (Some(filter), Some(row)) => filter.matches(row),
            (Some(_), None) => false,
        }
    }
}

/// CRUD access to remote tables.
pub trait RowStore: Send + Sync {
    fn select(&self, query: &Query) -> Result<Vec<Row>, StoreError>;

    fn get(&self, table: &str, id: &str) -> Result<Option<Row>, StoreError>;

    /// Insert a row; returns the stored row (with generated columns).
    fn insert(&self, table: &str, row: Row) -> Result<Row, StoreError>;

    /// Merge `patch` into the row with the given id.
    fn update(&self, table: &str, id: &str, patch: Row) -> Result<Row, StoreError>;

    /// Delete a row by id. Returns true if it existed.
    fn delete(&self, table: &str, id: &str) -> Result<bool, StoreError>;
}

/// An open push channel.
pub trait ChangeChannel: Send {
    /// Wait up to `timeout` for the next matching change.
    fn poll(&mut self, timeout: Duration) -> Result<Option<ChangeEvent>, StoreError>;

    /// Close the channel. Idempotent.
    fn close(&mut self);
}

/// Publish/subscribe changefeed keyed by table + filter.
pub trait Changefeed: Send + Sync {
    fn open_channel(&self, spec: &ChannelSpec) -> Result<Box<dyn ChangeChannel>, StoreError>;
}

/// Combined trait for a session-scoped remote store.
pub trait RemoteStore: RowStore + Changefeed {}

// Blanket implementation
impl<T: RowStore + Changefeed> RemoteStore for T {}

impl<S: RowStore + ?Sized> RowStore for Arc<S> {
    fn select(&self, query: &Query) -> Result<Vec<Row>, StoreError> {
        (**self).select(query)
    }

    fn get(&self, table: &str, id: &str) -> Result<Option<Row>, StoreError> {
        (**self).get(table, id)
    }

    fn insert(&self, table: &str, row: Row) -> Result<Row, StoreError> {
        (**self).insert(table, row)
    }

    fn update(&self, table: &str, id: &str, patch: Row) -> Result<Row, StoreError> {
        (**self).update(table, id, patch)
    }

    fn delete(&self, table: &str, id: &str) -> Result<bool, StoreError> {
        (**self).delete(table, id)
    }
}

impl<S: Changefeed + ?Sized> Changefeed for Arc<S> {
    fn open_channel(&self, spec: &ChannelSpec) -> Result<Box<dyn ChangeChannel>, StoreError> {
        (**self).open_channel(spec)
    }
}
