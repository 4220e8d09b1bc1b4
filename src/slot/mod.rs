//! Local Cache Slot - the last-known-good value of one resource.
//!
//! A slot holds `{ value, is_loading, last_error, version }`. Local writes
//! (optimistic mutations, rollbacks) replace the value synchronously and
//! never touch the network. Authoritative loads go through a
//! [`LoadTicket`]: the ticket remembers the slot's write generation, and a
//! load that resolves after a newer local write is discarded instead of
//! overwriting it. A load that resolves while a remote write is still in
//! flight is discarded as well, since it may predate the commit.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, trace};

use crate::error::SyncError;
use crate::lifetime::LifetimeToken;

/// Point-in-time view of a slot.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotSnapshot<T> {
    pub value: Option<T>,
    pub is_loading: bool,
    pub last_error: Option<SyncError>,
    /// Incremented on every accepted authoritative reload or patch.
    pub version: u64,
}

/// Proof that a load was started, consumed by [`CacheSlot::finish_load`].
#[derive(Debug)]
#[must_use = "a started load must be finished"]
pub struct LoadTicket {
    generation: u64,
}

/// What happened to a finished load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The value replaced the slot contents.
    Accepted,
    /// The load failed; `last_error` was set and the value kept.
    Failed,
    /// A local write happened while the load was in flight; result dropped.
    Stale,
    /// The owning view is gone; result dropped.
    Detached,
}

/// Handle for removing an observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Observer<T> = Arc<dyn Fn(&SlotSnapshot<T>) + Send + Sync>;

struct SlotState<T> {
    value: Option<T>,
    pending_loads: usize,
    last_error: Option<SyncError>,
    version: u64,
    write_generation: u64,
    in_flight: usize,
}

struct SlotInner<T> {
    identity: String,
    state: Mutex<SlotState<T>>,
    observers: Mutex<Vec<(ObserverId, Observer<T>)>>,
    next_observer: AtomicU64,
    lifetime: LifetimeToken,
}

/// Thread-safe cache slot. Clone-friendly via `Arc`; clones share state.
pub struct CacheSlot<T> {
    inner: Arc<SlotInner<T>>,
}

impl<T> Clone for CacheSlot<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + 'static> CacheSlot<T> {
    /// An empty slot not bound to any view lifetime.
    pub fn new(identity: impl Into<String>) -> Self {
        Self::with_lifetime(identity, LifetimeToken::detached())
    }

    /// An empty slot whose load results are ignored once `lifetime` ends.
    pub fn with_lifetime(identity: impl Into<String>, lifetime: LifetimeToken) -> Self {
        Self {
            inner: Arc::new(SlotInner {
                identity: identity.into(),
                state: Mutex::new(SlotState {
                    value: None,
                    pending_loads: 0,
                    last_error: None,
                    version: 0,
                    write_generation: 0,
                    in_flight: 0,
                }),
                observers: Mutex::new(Vec::new()),
                next_observer: AtomicU64::new(1),
                lifetime,
            }),
        }
    }

    pub fn identity(&self) -> &str {
        &self.inner.identity
    }

    pub fn lifetime(&self) -> &LifetimeToken {
        &self.inner.lifetime
    }

    /// Current snapshot. Never blocks on the network.
    pub fn read(&self) -> SlotSnapshot<T> {
        snapshot(&self.lock())
    }

    pub fn value(&self) -> Option<T> {
        self.lock().value.clone()
    }

    pub fn version(&self) -> u64 {
        self.lock().version
    }

    /// Replace the value locally. Any load started before this write
    /// will be discarded when it finishes. Ignored once the lifetime ended.
    pub fn write(&self, value: T) {
        if !self.inner.lifetime.is_alive() {
            return;
        }
        let snap = {
            let mut state = self.lock();
            state.value = Some(value);
            state.write_generation += 1;
            trace!(identity = %self.inner.identity, generation = state.write_generation, "slot write");
            snapshot(&state)
        };
        self.notify(&snap);
    }

    /// Replace the value with `f(current)` as one local write and return
    /// the previous value.
    pub fn replace_with<F>(&self, f: F) -> Option<T>
    where
        F: FnOnce(Option<&T>) -> T,
    {
        let (previous, snap) = {
            let mut state = self.lock();
            let next = f(state.value.as_ref());
            let previous = state.value.replace(next);
            state.write_generation += 1;
            (previous, snapshot(&state))
        };
        self.notify(&snap);
        previous
    }

    /// Put back a value captured earlier, including "no value yet".
    /// Returns false, leaving the slot untouched, once the lifetime ended.
    pub fn restore(&self, value: Option<T>) -> bool {
        if !self.inner.lifetime.is_alive() {
            return false;
        }
        let snap = {
            let mut state = self.lock();
            state.value = value;
            state.write_generation += 1;
            snapshot(&state)
        };
        self.notify(&snap);
        true
    }

    /// Mark a remote write as in flight until the returned guard drops.
    /// Loads finishing in between are discarded, and so are loads that
    /// started before the guard drops.
    pub fn begin_remote_write(&self) -> RemoteWrite<T> {
        self.lock().in_flight += 1;
        RemoteWrite {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn has_pending_writes(&self) -> bool {
        self.lock().in_flight > 0
    }

    /// Apply an authoritative in-place patch (e.g. from a push event that
    /// carries the full row). Counts as an authoritative update.
    pub fn patch(&self, value: T) {
        let snap = {
            let mut state = self.lock();
            state.value = Some(value);
            state.version += 1;
            state.write_generation += 1;
            debug!(identity = %self.inner.identity, version = state.version, "slot patched");
            snapshot(&state)
        };
        self.notify(&snap);
    }

    /// Patch the current value in place if `f` returns a new one. Returns
    /// whether a patch was applied; an empty slot is never patched.
    pub fn patch_with<F>(&self, f: F) -> bool
    where
        F: FnOnce(&T) -> Option<T>,
    {
        if !self.inner.lifetime.is_alive() {
            return false;
        }
        let snap = {
            let mut state = self.lock();
            let Some(next) = state.value.as_ref().and_then(f) else {
                return false;
            };
            state.value = Some(next);
            state.version += 1;
            state.write_generation += 1;
            debug!(identity = %self.inner.identity, version = state.version, "slot patched");
            snapshot(&state)
        };
        self.notify(&snap);
        true
    }

    pub fn start_load(&self) -> LoadTicket {
        let (ticket, snap) = {
            let mut state = self.lock();
            state.pending_loads += 1;
            let ticket = LoadTicket {
                generation: state.write_generation,
            };
            (ticket, snapshot(&state))
        };
        self.notify(&snap);
        ticket
    }

    /// Finish a load started with [`CacheSlot::start_load`].
    pub fn finish_load(&self, ticket: LoadTicket, result: Result<T, SyncError>) -> LoadOutcome {
        let (outcome, snap) = {
            let mut state = self.lock();
            state.pending_loads = state.pending_loads.saturating_sub(1);

            let outcome = if !self.inner.lifetime.is_alive() {
                LoadOutcome::Detached
            } else if ticket.generation != state.write_generation || state.in_flight > 0 {
                LoadOutcome::Stale
            } else {
                match result {
                    Ok(value) => {
                        state.value = Some(value);
                        state.last_error = None;
                        state.version += 1;
                        LoadOutcome::Accepted
                    }
                    Err(err) => {
                        state.last_error = Some(err);
                        LoadOutcome::Failed
                    }
                }
            };
            debug!(
                identity = %self.inner.identity,
                version = state.version,
                ?outcome,
                "load finished"
            );
            (outcome, snapshot(&state))
        };
        if outcome != LoadOutcome::Detached {
            self.notify(&snap);
        }
        outcome
    }

    /// Record an error without touching the value.
    pub fn set_error(&self, err: SyncError) {
        if !self.inner.lifetime.is_alive() {
            return;
        }
        let snap = {
            let mut state = self.lock();
            state.last_error = Some(err);
            snapshot(&state)
        };
        self.notify(&snap);
    }

    pub fn clear_error(&self) {
        let snap = {
            let mut state = self.lock();
            if state.last_error.take().is_none() {
                return;
            }
            snapshot(&state)
        };
        self.notify(&snap);
    }

    /// Register a callback run after every state change, on the thread
    /// that made the change.
    pub fn on_change<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&SlotSnapshot<T>) + Send + Sync + 'static,
    {
        let id = ObserverId(self.inner.next_observer.fetch_add(1, Ordering::SeqCst));
        self.observers().push((id, Arc::new(observer)));
        id
    }

    pub fn remove_observer(&self, id: ObserverId) -> bool {
        let mut observers = self.observers();
        let before = observers.len();
        observers.retain(|(oid, _)| *oid != id);
        observers.len() != before
    }

    fn notify(&self, snap: &SlotSnapshot<T>) {
        // Observers run outside the lock so they may read the slot.
        let observers: Vec<Observer<T>> =
            self.observers().iter().map(|(_, o)| Arc::clone(o)).collect();
        for observer in observers {
            observer(snap);
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn observers(&self) -> MutexGuard<'_, Vec<(ObserverId, Observer<T>)>> {
        self.inner.observers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Guard for a remote write in flight, see [`CacheSlot::begin_remote_write`].
#[must_use = "the write counts as in flight only while the guard is held"]
pub struct RemoteWrite<T> {
    inner: Arc<SlotInner<T>>,
}

impl<T> Drop for RemoteWrite<T> {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
        state.in_flight = state.in_flight.saturating_sub(1);
        state.write_generation += 1;
        trace!(identity = %self.inner.identity, in_flight = state.in_flight, "remote write resolved");
    }
}

fn snapshot<T: Clone>(state: &SlotState<T>) -> SlotSnapshot<T> {
    SlotSnapshot {
        value: state.value.clone(),
        is_loading: state.pending_loads > 0,
        last_error: state.last_error.clone(),
        version: state.version,
    }
}
