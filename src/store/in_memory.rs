//! In-memory backend for tests, demos and the HTTP surface.
//!
//! Tables are plain `Vec<Row>`s in insertion order. Every committed write
//! is appended to a change log; push channels read that log from the
//! position they were opened at and block on a condition variable until
//! new changes arrive.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, trace};

use super::{
    ChangeChannel, ChangeEvent, ChangeKind, Changefeed, ChannelSpec, FaultPlan, Row, RowStore,
    StoreError,
};
use crate::filter::Query;
use crate::session::Session;

#[derive(Default)]
struct Tables {
    rows: HashMap<String, Vec<Row>>,
    log: Vec<ChangeEvent>,
    next_seq: u64,
    next_id: u64,
    clock: u64,
    drop_generation: u64,
}

impl Tables {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn record(&mut self, table: &str, kind: ChangeKind, new: Option<Row>, old: Option<Row>) {
        self.next_seq += 1;
        self.log.push(ChangeEvent {
            seq: self.next_seq,
            table: table.to_string(),
            kind,
            new,
            old,
        });
    }
}

#[derive(Default)]
struct Policies {
    /// table -> owner column compared against the session's user id
    owners: HashMap<String, String>,
    /// table -> column sets that must be unique together
    uniques: HashMap<String, Vec<Vec<String>>>,
}

impl Policies {
    fn visible(&self, table: &str, session: Option<&Session>, row: &Row) -> bool {
        match self.owners.get(table) {
            None => true,
            Some(column) => match session {
                Some(s) => row.get_str(column) == Some(s.user_id.as_str()),
                None => false,
            },
        }
    }

    fn check_unique(
        &self,
        table: &str,
        rows: &[Row],
        candidate: &Row,
        skip_id: Option<&str>,
    ) -> Result<(), StoreError> {
        let Some(sets) = self.uniques.get(table) else {
            return Ok(());
        };
        for columns in sets {
            let key: Vec<Option<&Value>> = columns.iter().map(|c| candidate.get(c)).collect();
            if key.iter().any(|v| v.is_none()) {
                continue;
            }
            let clash = rows.iter().filter(|r| r.id() != skip_id).any(|r| {
                columns
                    .iter()
                    .zip(&key)
                    .all(|(c, v)| r.get(c) == *v)
            });
            if clash {
                return Err(StoreError::Constraint {
                    table: table.to_string(),
                    detail: format!("duplicate key on ({})", columns.join(", ")),
                });
            }
        }
        Ok(())
    }
}

struct BackendInner {
    state: Mutex<Tables>,
    changed: Condvar,
    policies: RwLock<Policies>,
    faults: Mutex<FaultPlan>,
    open_channels: AtomicUsize,
    opened_total: AtomicUsize,
}

/// Shared in-memory backend: tables, change log, policies and faults.
///
/// Clone-friendly via `Arc`. Use [`InMemoryBackend::connect`] to obtain a
/// session-scoped [`InMemoryRowStore`] client.
///
/// ## Example
///
/// ```
/// use cuizly_sync::{Filter, InMemoryBackend, Query, Row, RowStore, Session};
///
/// let backend = InMemoryBackend::new()
///     .with_unique("favorites", &["user_id", "restaurant_id"])
///     .restrict_to_owner("favorites", "user_id");
///
/// let store = backend.connect(Session::new("user-1", "token-1"));
/// store
///     .insert("favorites", Row::new().with("restaurant_id", "r1"))
///     .unwrap();
///
/// let query = Query::new("favorites")
///     .filter(Filter::eq("favorites", "user_id", "user-1").unwrap())
///     .unwrap();
/// assert_eq!(store.select(&query).unwrap().len(), 1);
///
/// // Other users cannot see the row.
/// let other = backend.connect(Session::new("user-2", "token-2"));
/// assert!(other.select(&Query::new("favorites")).unwrap().is_empty());
/// ```
#[derive(Clone)]
pub struct InMemoryBackend {
    inner: Arc<BackendInner>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BackendInner {
                state: Mutex::new(Tables::default()),
                changed: Condvar::new(),
                policies: RwLock::new(Policies::default()),
                faults: Mutex::new(FaultPlan::default()),
                open_channels: AtomicUsize::new(0),
                opened_total: AtomicUsize::new(0),
            }),
        }
    }

    /// Require the given columns to be unique together in `table`.
    pub fn with_unique(self, table: &str, columns: &[&str]) -> Self {
        if let Ok(mut policies) = self.inner.policies.write() {
            policies
                .uniques
                .entry(table.to_string())
                .or_default()
                .push(columns.iter().map(|c| c.to_string()).collect());
        }
        self
    }

    /// Only let a session see and write rows whose `column` equals its
    /// user id.
    pub fn restrict_to_owner(self, table: &str, column: &str) -> Self {
        if let Ok(mut policies) = self.inner.policies.write() {
            policies
                .owners
                .insert(table.to_string(), column.to_string());
        }
        self
    }

    /// Replace the current fault plan.
    pub fn set_faults(&self, plan: FaultPlan) {
        *self.faults() = plan;
    }

    /// Make the next `count` reads fail with a network error.
    pub fn fail_reads(&self, count: usize) {
        let mut faults = self.faults();
        *faults = faults.clone().fail_reads(count);
    }

    /// Make the next `count` writes fail with a network error.
    pub fn fail_writes(&self, count: usize) {
        let mut faults = self.faults();
        *faults = faults.clone().fail_writes(count);
    }

    /// Break every open channel once; their next poll reports a network
    /// error.
    pub fn drop_channels(&self) {
        if let Ok(mut state) = self.inner.state.lock() {
            state.drop_generation += 1;
        }
        self.inner.changed.notify_all();
    }

    /// Load fixture rows without policy checks or change events.
    pub fn seed(&self, table: &str, rows: impl IntoIterator<Item = Row>) -> Result<(), StoreError> {
        let mut state = self.lock_state()?;
        for mut row in rows {
            if row.id().is_none() {
                state.next_id += 1;
                let id = format!("{}-{}", table, state.next_id);
                row.set("id", id);
            }
            if !row.contains("created_at") {
                let at = state.tick();
                row.set("created_at", at);
            }
            state.rows.entry(table.to_string()).or_default().push(row);
        }
        Ok(())
    }

    /// All rows of a table, bypassing policies.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.inner
            .state
            .lock()
            .map(|s| s.rows.get(table).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Number of committed changes.
    pub fn change_count(&self) -> usize {
        self.inner.state.lock().map(|s| s.log.len()).unwrap_or(0)
    }

    /// Number of currently open push channels.
    pub fn open_channels(&self) -> usize {
        self.inner.open_channels.load(Ordering::SeqCst)
    }

    /// Number of channels ever opened.
    pub fn channels_opened(&self) -> usize {
        self.inner.opened_total.load(Ordering::SeqCst)
    }

    /// A client scoped to `session`.
    pub fn connect(&self, session: Session) -> InMemoryRowStore {
        InMemoryRowStore {
            backend: self.clone(),
            session: Some(session),
        }
    }

    /// A client without a session; restricted tables are invisible to it.
    pub fn anonymous(&self) -> InMemoryRowStore {
        InMemoryRowStore {
            backend: self.clone(),
            session: None,
        }
    }

    fn faults(&self) -> MutexGuard<'_, FaultPlan> {
        self.inner.faults.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.inner
            .state
            .lock()
            .map_err(|_| StoreError::Poisoned("table access"))
    }

    fn before_read(&self) -> Result<(), StoreError> {
        let (fail, delay) = {
            let mut faults = self.faults();
            (faults.take_read_failure(), faults.read_delay())
        };
        if let Some(delay) = delay {
            thread::sleep(delay);
        }
        if fail {
            return Err(StoreError::Network("injected read failure".into()));
        }
        Ok(())
    }

    fn before_write(&self) -> Result<(), StoreError> {
        let (fail, delay) = {
            let mut faults = self.faults();
            (faults.take_write_failure(), faults.write_delay())
        };
        if let Some(delay) = delay {
            thread::sleep(delay);
        }
        if fail {
            return Err(StoreError::Network("injected write failure".into()));
        }
        Ok(())
    }

    fn policies(&self) -> Result<std::sync::RwLockReadGuard<'_, Policies>, StoreError> {
        self.inner
            .policies
            .read()
            .map_err(|_| StoreError::Poisoned("policy access"))
    }
}

/// Session-scoped client over an [`InMemoryBackend`].
#[derive(Clone)]
pub struct InMemoryRowStore {
    backend: InMemoryBackend,
    session: Option<Session>,
}

impl InMemoryRowStore {
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn backend(&self) -> &InMemoryBackend {
        &self.backend
    }

    fn authorize(&self) -> Result<(), StoreError> {
        match &self.session {
            Some(session) if session.is_expired() => Err(StoreError::Unauthorized),
            _ => Ok(()),
        }
    }

    fn owner_column(&self, table: &str) -> Result<Option<String>, StoreError> {
        Ok(self.backend.policies()?.owners.get(table).cloned())
    }
}

impl RowStore for InMemoryRowStore {
    fn select(&self, query: &Query) -> Result<Vec<Row>, StoreError> {
        self.authorize()?;
        self.backend.before_read()?;

        let policies = self.backend.policies()?;
        let state = self.backend.lock_state()?;
        let table = query.table();
        let rows = state.rows.get(table).map(Vec::as_slice).unwrap_or(&[]);
        let visible = rows
            .iter()
            .filter(|row| policies.visible(table, self.session.as_ref(), row));
        let selected = query.apply(visible);
        trace!(table, rows = selected.len(), "select");
        Ok(selected)
    }

    fn get(&self, table: &str, id: &str) -> Result<Option<Row>, StoreError> {
        self.authorize()?;
        self.backend.before_read()?;

        let policies = self.backend.policies()?;
        let state = self.backend.lock_state()?;
        Ok(state
            .rows
            .get(table)
            .and_then(|rows| rows.iter().find(|r| r.id() == Some(id)))
            .filter(|row| policies.visible(table, self.session.as_ref(), row))
            .cloned())
    }

    fn insert(&self, table: &str, mut row: Row) -> Result<Row, StoreError> {
        self.authorize()?;
        if let Some(column) = self.owner_column(table)? {
            let session = self.session.as_ref().ok_or_else(|| StoreError::Forbidden {
                table: table.to_string(),
            })?;
            match row.get_str(&column) {
                None => row.set(column, session.user_id.clone()),
                Some(owner) if owner == session.user_id => {}
                Some(_) => {
                    return Err(StoreError::Forbidden {
                        table: table.to_string(),
                    })
                }
            }
        }
        self.backend.before_write()?;

        let policies = self.backend.policies()?;
        let mut state = self.backend.lock_state()?;

        if row.id().is_none() {
            state.next_id += 1;
            let id = format!("{}-{}", table, state.next_id);
            row.set("id", id);
        }
        if !row.contains("created_at") {
            let at = state.tick();
            row.set("created_at", at);
        }

        let rows = state.rows.entry(table.to_string()).or_default();
        if rows.iter().any(|r| r.id() == row.id()) {
            return Err(StoreError::Constraint {
                table: table.to_string(),
                detail: format!("duplicate primary key {}", row.id().unwrap_or_default()),
            });
        }
        policies.check_unique(table, rows, &row, None)?;
        rows.push(row.clone());

        state.record(table, ChangeKind::Insert, Some(row.clone()), None);
        drop(state);
        self.backend.inner.changed.notify_all();
        debug!(table, id = row.id().unwrap_or_default(), "insert");
        Ok(row)
    }

    fn update(&self, table: &str, id: &str, mut patch: Row) -> Result<Row, StoreError> {
        self.authorize()?;
        let owner_column = self.owner_column(table)?;
        if let (Some(column), Some(session)) = (&owner_column, &self.session) {
            if let Some(owner) = patch.get_str(column) {
                if owner != session.user_id {
                    return Err(StoreError::Forbidden {
                        table: table.to_string(),
                    });
                }
            }
        }
        self.backend.before_write()?;

        let policies = self.backend.policies()?;
        let mut state = self.backend.lock_state()?;
        let not_found = || StoreError::NotFound {
            table: table.to_string(),
            id: id.to_string(),
        };

        let rows = state.rows.get_mut(table).ok_or_else(not_found)?;
        let index = rows
            .iter()
            .position(|r| r.id() == Some(id))
            .filter(|&i| policies.visible(table, self.session.as_ref(), &rows[i]))
            .ok_or_else(not_found)?;

        patch.set("id", id);
        let old = rows[index].clone();
        let mut new = old.clone();
        new.merge(&patch);
        policies.check_unique(table, rows, &new, Some(id))?;
        rows[index] = new.clone();

        state.record(table, ChangeKind::Update, Some(new.clone()), Some(old));
        drop(state);
        self.backend.inner.changed.notify_all();
        debug!(table, id, "update");
        Ok(new)
    }

    fn delete(&self, table: &str, id: &str) -> Result<bool, StoreError> {
        self.authorize()?;
        self.backend.before_write()?;

        let policies = self.backend.policies()?;
        let mut state = self.backend.lock_state()?;
        let Some(rows) = state.rows.get_mut(table) else {
            return Ok(false);
        };
        let Some(index) = rows
            .iter()
            .position(|r| r.id() == Some(id))
            .filter(|&i| policies.visible(table, self.session.as_ref(), &rows[i]))
        else {
            return Ok(false);
        };

        let old = rows.remove(index);
        state.record(table, ChangeKind::Delete, None, Some(old));
        drop(state);
        self.backend.inner.changed.notify_all();
        debug!(table, id, "delete");
        Ok(true)
    }
}

impl Changefeed for InMemoryRowStore {
    fn open_channel(&self, spec: &ChannelSpec) -> Result<Box<dyn ChangeChannel>, StoreError> {
        self.authorize()?;
        let (position, drop_generation) = {
            let state = self.backend.lock_state()?;
            (state.log.len(), state.drop_generation)
        };

        self.backend.inner.open_channels.fetch_add(1, Ordering::SeqCst);
        self.backend.inner.opened_total.fetch_add(1, Ordering::SeqCst);
        debug!(table = spec.table(), "channel opened");

        Ok(Box::new(InMemoryChannel {
            backend: self.backend.clone(),
            spec: spec.clone(),
            session: self.session.clone(),
            position,
            drop_generation,
            closed: false,
        }))
    }
}

/// Push channel over the backend's change log.
pub struct InMemoryChannel {
    backend: InMemoryBackend,
    spec: ChannelSpec,
    session: Option<Session>,
    position: usize,
    drop_generation: u64,
    closed: bool,
}

impl InMemoryChannel {
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl ChangeChannel for InMemoryChannel {
    fn poll(&mut self, timeout: Duration) -> Result<Option<ChangeEvent>, StoreError> {
        if self.closed {
            return Ok(None);
        }
        if self.session.as_ref().map(Session::is_expired).unwrap_or(false) {
            return Err(StoreError::Unauthorized);
        }

        let deadline = Instant::now() + timeout;
        let policies = self.backend.policies()?;
        let mut state = self.backend.lock_state()?;

        loop {
            if state.drop_generation != self.drop_generation {
                self.drop_generation = state.drop_generation;
                return Err(StoreError::Network("channel dropped".into()));
            }

            while self.position < state.log.len() {
                let event = &state.log[self.position];
                self.position += 1;
                let visible = event
                    .row()
                    .map(|row| policies.visible(&event.table, self.session.as_ref(), row))
                    .unwrap_or(false);
                if visible && self.spec.accepts(event) {
                    return Ok(Some(event.clone()));
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let (guard, _) = self
                .backend
                .inner
                .changed
                .wait_timeout(state, deadline - now)
                .map_err(|_| StoreError::Poisoned("channel wait"))?;
            state = guard;
        }
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.backend
                .inner
                .open_channels
                .fetch_sub(1, Ordering::SeqCst);
            debug!(table = self.spec.table(), "channel closed");
        }
    }
}

impl Drop for InMemoryChannel {
    fn drop(&mut self) {
        self.close();
    }
}
