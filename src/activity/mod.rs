//! Batched user activity tracking.
//!
//! Events are buffered in memory and written to the `user_activity` table
//! in batches, either when the buffer fills up or when an
//! [`ActivityFlusher`] ticks. A failed batch goes back to the head of the
//! buffer; events that keep failing are dropped after `max_attempts`.

mod flusher;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::session::{now_ms, Session};
use crate::store::{Row, RowStore, StoreError};

pub use flusher::{ActivityFlusher, FlushStats};

/// Table the tracker writes to.
pub const ACTIVITY_TABLE: &str = "user_activity";

/// One thing the user did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub event_type: String,
    pub restaurant_id: Option<String>,
    pub payload: Value,
    pub occurred_at_ms: u64,
}

impl ActivityEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        ActivityEvent {
            event_type: event_type.into(),
            restaurant_id: None,
            payload: Value::Null,
            occurred_at_ms: now_ms(),
        }
    }

    pub fn restaurant(mut self, restaurant_id: impl Into<String>) -> Self {
        self.restaurant_id = Some(restaurant_id.into());
        self
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn at(mut self, occurred_at_ms: u64) -> Self {
        self.occurred_at_ms = occurred_at_ms;
        self
    }

    fn to_row(&self, user_id: &str) -> Row {
        Row::new()
            .with("user_id", user_id)
            .with("event_type", self.event_type.as_str())
            .with("restaurant_id", self.restaurant_id.clone())
            .with("payload", self.payload.clone())
            .with("occurred_at", self.occurred_at_ms)
    }
}

/// Counters since the tracker was created.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ActivityStats {
    pub tracked: usize,
    pub written: usize,
    pub failed_flushes: usize,
    pub dropped: usize,
}

#[derive(Debug, Clone)]
struct Pending {
    event: ActivityEvent,
    attempts: u32,
}

#[derive(Default)]
struct Buffer {
    pending: VecDeque<Pending>,
    stats: ActivityStats,
}

/// Buffers activity events for one session. Clones share the buffer.
pub struct ActivityTracker<S> {
    store: Arc<S>,
    session: Session,
    batch_size: usize,
    max_attempts: u32,
    buffer: Arc<Mutex<Buffer>>,
}

impl<S> Clone for ActivityTracker<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            session: self.session.clone(),
            batch_size: self.batch_size,
            max_attempts: self.max_attempts,
            buffer: Arc::clone(&self.buffer),
        }
    }
}

impl<S: RowStore + 'static> ActivityTracker<S> {
    pub fn new(store: S, session: Session) -> Self {
        Self::from_arc(Arc::new(store), session)
    }

    pub fn from_arc(store: Arc<S>, session: Session) -> Self {
        let defaults = SyncConfig::default();
        Self {
            store,
            session,
            batch_size: defaults.activity_batch_size,
            max_attempts: defaults.activity_max_attempts,
            buffer: Arc::new(Mutex::new(Buffer::default())),
        }
    }

    pub fn with_config(self, config: &SyncConfig) -> Self {
        self.with_batch_size(config.activity_batch_size)
            .with_max_attempts(config.activity_max_attempts)
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Buffer `event`, flushing once the buffer holds a full batch.
    ///
    /// A failed flush keeps the events buffered and returns the error.
    pub fn track(&self, event: ActivityEvent) -> Result<(), SyncError> {
        let full = {
            let mut buffer = self.lock()?;
            buffer.pending.push_back(Pending { event, attempts: 0 });
            buffer.stats.tracked += 1;
            buffer.pending.len() >= self.batch_size
        };
        if full {
            self.flush()?;
        }
        Ok(())
    }

    /// Number of buffered events.
    pub fn pending(&self) -> usize {
        self.buffer.lock().map(|b| b.pending.len()).unwrap_or(0)
    }

    pub fn stats(&self) -> ActivityStats {
        self.buffer
            .lock()
            .map(|b| b.stats.clone())
            .unwrap_or_default()
    }

    /// Write up to one batch. Returns how many events were written.
    pub fn flush(&self) -> Result<usize, SyncError> {
        let batch: Vec<Pending> = {
            let mut buffer = self.lock()?;
            let n = buffer.pending.len().min(self.batch_size);
            buffer.pending.drain(..n).collect()
        };
        if batch.is_empty() {
            return Ok(0);
        }

        let user_id = self.session.user_id.as_str();
        let mut written = 0;
        let mut failure = None;
        for pending in &batch {
            let result = self
                .session
                .ensure_valid()
                .map_err(SyncError::from)
                .and_then(|_| {
                    self.store
                        .insert(ACTIVITY_TABLE, pending.event.to_row(user_id))
                        .map_err(SyncError::from)
                });
            match result {
                Ok(_) => written += 1,
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        let mut buffer = self.lock()?;
        buffer.stats.written += written;

        let Some(err) = failure else {
            debug!(user_id, written, "activity batch flushed");
            return Ok(written);
        };

        buffer.stats.failed_flushes += 1;
        let mut dropped = 0;
        // Requeue the unwritten tail at the head, oldest first.
        for mut pending in batch.into_iter().skip(written).rev() {
            pending.attempts += 1;
            if pending.attempts >= self.max_attempts {
                dropped += 1;
            } else {
                buffer.pending.push_front(pending);
            }
        }
        buffer.stats.dropped += dropped;
        warn!(
            user_id,
            written,
            dropped,
            requeued = buffer.pending.len(),
            error = %err,
            "activity flush failed"
        );
        Err(err)
    }

    /// Flush until the buffer is empty or a flush fails.
    pub fn flush_all(&self) -> Result<usize, SyncError> {
        let mut total = 0;
        while self.pending() > 0 {
            total += self.flush()?;
        }
        Ok(total)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Buffer>, SyncError> {
        self.buffer
            .lock()
            .map_err(|_| SyncError::Store(StoreError::Poisoned("activity buffer")))
    }
}
