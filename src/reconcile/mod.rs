//! Reconciler - re-establishes authoritative state in a cache slot.
//!
//! Two modes share one reconciler:
//!
//! - time-based: a [`PollingThread`] calls [`Reconciler::reload`] on a
//!   fixed interval as a safety net against missed push events;
//! - event-based: the subscription listener hands every change event to
//!   [`Reconciler::handle_event`], which patches in place when the event
//!   carries the full row and a patcher accepts it, and reloads otherwise.
//!
//! Failed reloads are retried per [`RetryPolicy`] and then leave the slot
//! with its last-known value and `last_error` set.

mod poller;
mod retry;

use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::error::SyncError;
use crate::slot::{CacheSlot, LoadOutcome};
use crate::store::ChangeEvent;

pub use poller::{PollStats, PollingThread};
pub use retry::RetryPolicy;

/// Fetches the authoritative value of a resource.
pub type Fetcher<T> = Arc<dyn Fn() -> Result<T, SyncError> + Send + Sync>;

/// Computes a patched value from the current one and a change event, or
/// `None` to fall back to a full reload.
pub type Patcher<T> = Arc<dyn Fn(&T, &ChangeEvent) -> Option<T> + Send + Sync>;

/// Counters collected by a reconciler.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Reloads whose result was accepted.
    pub reloads: usize,
    /// Events applied as in-place patches.
    pub patches: usize,
    /// Reloads that gave up after the retry budget.
    pub failures: usize,
    /// Reloads dropped as stale or detached.
    pub discarded: usize,
    /// Fetch attempts, retries included.
    pub attempts: usize,
}

struct ReconcilerInner<T> {
    slot: CacheSlot<T>,
    fetch: Fetcher<T>,
    patch: Option<Patcher<T>>,
    retry: RetryPolicy,
    stats: Mutex<ReconcileStats>,
}

/// Reloads or patches one cache slot. Clone-friendly via `Arc`.
pub struct Reconciler<T> {
    inner: Arc<ReconcilerInner<T>>,
}

impl<T> Clone for Reconciler<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + 'static> Reconciler<T> {
    pub fn new<F>(slot: CacheSlot<T>, fetch: F) -> Self
    where
        F: Fn() -> Result<T, SyncError> + Send + Sync + 'static,
    {
        Self::from_parts(slot, Arc::new(fetch), None, RetryPolicy::default())
    }

    pub fn from_parts(
        slot: CacheSlot<T>,
        fetch: Fetcher<T>,
        patch: Option<Patcher<T>>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(ReconcilerInner {
                slot,
                fetch,
                patch,
                retry,
                stats: Mutex::new(ReconcileStats::default()),
            }),
        }
    }

    /// Set the in-place patcher for change events.
    pub fn with_patcher<F>(self, patch: F) -> Self
    where
        F: Fn(&T, &ChangeEvent) -> Option<T> + Send + Sync + 'static,
    {
        self.rebuild(|parts| parts.patch = Some(Arc::new(patch)))
    }

    pub fn with_retry(self, retry: RetryPolicy) -> Self {
        self.rebuild(|parts| parts.retry = retry)
    }

    pub fn slot(&self) -> &CacheSlot<T> {
        &self.inner.slot
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.inner.retry
    }

    pub fn stats(&self) -> ReconcileStats {
        self.inner
            .stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Re-fetch authoritative state and replace the slot wholesale.
    ///
    /// Returns the load outcome, or the last fetch error once the retry
    /// budget is spent. Stale and detached results are not errors.
    pub fn reload(&self) -> Result<LoadOutcome, SyncError> {
        let slot = &self.inner.slot;
        let retry = self.inner.retry;
        let ticket = slot.start_load();

        let mut attempt = 0;
        let result = loop {
            attempt += 1;
            self.record(|s| s.attempts += 1);
            match (self.inner.fetch)() {
                Ok(value) => break Ok(value),
                Err(err) => {
                    let retry_left = attempt < retry.max_attempts() && retry.should_retry(&err);
                    if !retry_left {
                        break Err(err);
                    }
                    warn!(
                        identity = %slot.identity(),
                        attempt,
                        error = %err,
                        "reload failed, retrying"
                    );
                    if !retry.pause(slot.lifetime()) {
                        break Err(err);
                    }
                }
            }
        };

        let error = result.as_ref().err().cloned();
        let outcome = slot.finish_load(ticket, result);
        match outcome {
            LoadOutcome::Accepted => self.record(|s| s.reloads += 1),
            LoadOutcome::Failed => self.record(|s| s.failures += 1),
            LoadOutcome::Stale | LoadOutcome::Detached => self.record(|s| s.discarded += 1),
        }

        match (outcome, error) {
            (LoadOutcome::Failed, Some(err)) => {
                warn!(identity = %slot.identity(), attempts = attempt, error = %err, "reload gave up");
                Err(err)
            }
            (outcome, _) => Ok(outcome),
        }
    }

    /// React to a push event: patch in place when possible, reload
    /// otherwise.
    pub fn handle_event(&self, event: &ChangeEvent) -> Result<LoadOutcome, SyncError> {
        if let Some(patch) = &self.inner.patch {
            if event.carries_full_row() && self.inner.slot.patch_with(|current| patch(current, event)) {
                debug!(
                    identity = %self.inner.slot.identity(),
                    seq = event.seq,
                    kind = event.kind.as_str(),
                    "event patched in place"
                );
                self.record(|s| s.patches += 1);
                return Ok(LoadOutcome::Accepted);
            }
        }
        debug!(
            identity = %self.inner.slot.identity(),
            seq = event.seq,
            kind = event.kind.as_str(),
            "event triggers reload"
        );
        self.reload()
    }

    fn record(&self, f: impl FnOnce(&mut ReconcileStats)) {
        if let Ok(mut stats) = self.inner.stats.lock() {
            f(&mut stats);
        }
    }

    fn rebuild(self, f: impl FnOnce(&mut Parts<T>)) -> Self {
        let mut parts = Parts {
            slot: self.inner.slot.clone(),
            fetch: Arc::clone(&self.inner.fetch),
            patch: self.inner.patch.clone(),
            retry: self.inner.retry,
        };
        f(&mut parts);
        Self::from_parts(parts.slot, parts.fetch, parts.patch, parts.retry)
    }
}

struct Parts<T> {
    slot: CacheSlot<T>,
    fetch: Fetcher<T>,
    patch: Option<Patcher<T>>,
    retry: RetryPolicy,
}
