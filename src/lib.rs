//! Optimistic local caches kept in sync with a remote row store.
//!
//! A [`CacheSlot`] holds the last known value of one resource. An
//! [`OptimisticMutator`] writes to it before the remote write lands, a
//! [`Reconciler`] reloads or patches it on push events and timers, and a
//! [`SubscriptionManager`] owns the push channels. [`ResourceBuilder`]
//! wires the pieces together inside a [`ViewScope`], which tears all of it
//! down when dropped.

// The derive macro expands to `::cuizly_sync::...` paths.
extern crate self as cuizly_sync;

mod activity;
mod config;
mod error;
mod filter;
mod lifetime;
mod mutation;
mod reconcile;
mod resource;
mod session;
mod slot;
mod storage;
mod store;
mod subscription;
mod view;

pub mod resources;

#[cfg(feature = "http")]
pub mod http;

pub use activity::{
    ActivityEvent, ActivityFlusher, ActivityStats, ActivityTracker, FlushStats, ACTIVITY_TABLE,
};
pub use config::{ConfigError, SyncConfig};
pub use error::{Locale, SyncError, VendorError, VendorErrorKind};
pub use filter::{Filter, FilterError, FilterOp, FilterValue, Order, Query};
pub use lifetime::{Lifetime, LifetimeToken};
pub use mutation::{
    Mutation, MutationHandle, MutationQueue, MutationQueues, MutationState, MutationStats,
    OptimisticMutator, QueueTicket,
};
pub use reconcile::{
    Fetcher, Patcher, PollStats, PollingThread, ReconcileStats, Reconciler, RetryPolicy,
};
pub use resource::{Resource, ResourceBuilder, ResourceIdentity};
pub use resources::SyncContext;
pub use session::{
    now_ms, AuthError, AuthProvider, InMemoryAuth, Session, SessionChange, SESSION_CHANGED,
};
pub use slot::{CacheSlot, LoadOutcome, LoadTicket, ObserverId, RemoteWrite, SlotSnapshot};
pub use storage::{InMemoryBucket, ObjectStorage, StorageError};
pub use store::{
    ChangeChannel, ChangeEvent, ChangeKind, Changefeed, ChannelSpec, EventMask, FaultPlan,
    InMemoryBackend, InMemoryChannel, InMemoryRowStore, RemoteStore, Row, RowStore, StoreError,
    TableRow, TablesExt, TypedTable,
};
pub use subscription::{
    handler_fn, ChannelHandler, ChannelState, FnHandler, ListenerConfig, SubscriptionGuard,
    SubscriptionManager, SubscriptionStats,
};
pub use view::{ReleaseStats, ViewScope};

pub use cuizly_sync_macros::TableRow;

// Re-export the EventEmitter from the event_emitter_rs crate
#[cfg(feature = "emitter")]
pub use event_emitter_rs::EventEmitter;
