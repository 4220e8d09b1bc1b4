//! Subscription Manager - one push channel per mounted resource.
//!
//! ```text
//! Unsubscribed ─► Subscribing ─► Subscribed ─► Closed
//!                                  │    ▲
//!                                  ▼    │
//!                               Error ─► Reconnecting
//! ```
//!
//! [`SubscriptionManager::subscribe`] opens the channel and starts a
//! listener thread; the returned [`SubscriptionGuard`] closes it exactly
//! once, on [`SubscriptionGuard::unsubscribe`] or on drop, whatever path
//! the owning view takes out of scope. Events are triggers to reconcile,
//! never the authoritative state: after a reconnect the handler is asked
//! to reload because events may have been missed.

mod handler;
mod listener;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;

use crate::error::SyncError;
use crate::resource::ResourceIdentity;
use crate::store::{Changefeed, ChannelSpec};

pub use handler::{handler_fn, ChannelHandler, FnHandler};

/// Lifecycle state of one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    Unsubscribed,
    Subscribing,
    Subscribed,
    Error,
    Reconnecting,
    /// Terminal.
    Closed,
}

/// Statistics from a listener thread.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SubscriptionStats {
    pub events: usize,
    pub errors: usize,
    pub reconnects: usize,
}

pub(crate) struct StateLog {
    identity: String,
    history: Vec<ChannelState>,
}

impl StateLog {
    fn new(identity: String) -> Self {
        StateLog {
            identity,
            history: vec![ChannelState::Unsubscribed],
        }
    }

    fn current(&self) -> ChannelState {
        self.history
            .last()
            .copied()
            .unwrap_or(ChannelState::Unsubscribed)
    }

    pub(crate) fn transition(&mut self, next: ChannelState) {
        let from = self.current();
        if from == next || from == ChannelState::Closed {
            return;
        }
        debug!(identity = %self.identity, ?from, to = ?next, "channel state");
        self.history.push(next);
    }
}

pub(crate) type SharedState = Arc<Mutex<StateLog>>;

pub(crate) fn transition(state: &SharedState, next: ChannelState) {
    state
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .transition(next);
}

#[derive(Default)]
pub(crate) struct Counters {
    pub(crate) active: AtomicUsize,
    pub(crate) opened: AtomicUsize,
    pub(crate) closed: AtomicUsize,
}

/// Timing knobs for listener threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerConfig {
    /// How long one channel poll may block; bounds shutdown latency.
    pub poll_timeout: Duration,
    /// Pause before reopening a failed channel.
    pub reconnect_delay: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        ListenerConfig {
            poll_timeout: Duration::from_millis(50),
            reconnect_delay: Duration::from_millis(100),
        }
    }
}

/// Opens push channels on a session-scoped changefeed.
///
/// Clone-friendly via `Arc`; clones share counters.
#[derive(Clone)]
pub struct SubscriptionManager {
    feed: Arc<dyn Changefeed>,
    config: ListenerConfig,
    counters: Arc<Counters>,
}

impl SubscriptionManager {
    pub fn new<F: Changefeed + 'static>(feed: F) -> Self {
        Self::from_arc(Arc::new(feed))
    }

    pub fn from_arc(feed: Arc<dyn Changefeed>) -> Self {
        SubscriptionManager {
            feed,
            config: ListenerConfig::default(),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.config.poll_timeout = timeout;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay = delay;
        self
    }

    pub fn config(&self) -> ListenerConfig {
        self.config
    }

    /// Open one channel for `identity` and deliver its events to `handler`
    /// on a listener thread.
    pub fn subscribe<H: ChannelHandler>(
        &self,
        identity: &ResourceIdentity,
        spec: ChannelSpec,
        handler: H,
    ) -> Result<SubscriptionGuard, SyncError> {
        let state: SharedState = Arc::new(Mutex::new(StateLog::new(identity.to_string())));
        transition(&state, ChannelState::Subscribing);

        let channel_handle = match self.feed.open_channel(&spec) {
            Ok(ch) => ch,
            Err(err) => {
                transition(&state, ChannelState::Error);
                transition(&state, ChannelState::Closed);
                return Err(err.into());
            }
        };
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        self.counters.active.fetch_add(1, Ordering::SeqCst);
        transition(&state, ChannelState::Subscribed);

        let (stop_tx, stop_rx) = channel();
        let listener = listener::Listener {
            identity: identity.to_string(),
            feed: Arc::clone(&self.feed),
            spec,
            config: self.config,
            state: Arc::clone(&state),
            counters: Arc::clone(&self.counters),
        };
        let handle = thread::spawn(move || listener.run(channel_handle, handler, stop_rx));

        Ok(SubscriptionGuard {
            identity: identity.to_string(),
            state,
            stop_tx,
            handle: Some(handle),
            counters: Arc::clone(&self.counters),
        })
    }

    /// Subscriptions currently alive.
    pub fn active(&self) -> usize {
        self.counters.active.load(Ordering::SeqCst)
    }

    /// Channels opened, reconnects included.
    pub fn opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    /// Channels closed, reconnects included.
    pub fn closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }
}

/// Scoped handle of one subscription. Closes the channel exactly once.
pub struct SubscriptionGuard {
    identity: String,
    state: SharedState,
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<SubscriptionStats>>,
    counters: Arc<Counters>,
}

impl SubscriptionGuard {
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn state(&self) -> ChannelState {
        self.state
            .lock()
            .map(|log| log.current())
            .unwrap_or(ChannelState::Closed)
    }

    /// Every state the subscription went through, oldest first.
    pub fn history(&self) -> Vec<ChannelState> {
        self.state
            .lock()
            .map(|log| log.history.clone())
            .unwrap_or_default()
    }

    /// Close the channel, wait for the listener and return its stats.
    pub fn unsubscribe(mut self) -> SubscriptionStats {
        self.shutdown()
    }

    fn shutdown(&mut self) -> SubscriptionStats {
        let Some(handle) = self.handle.take() else {
            return SubscriptionStats::default();
        };
        let _ = self.stop_tx.send(());
        let stats = handle.join().unwrap_or_default();
        self.counters.active.fetch_sub(1, Ordering::SeqCst);
        transition(&self.state, ChannelState::Closed);
        debug!(identity = %self.identity, events = stats.events, "unsubscribed");
        stats
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.shutdown();
    }
}
