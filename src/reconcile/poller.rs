//! Time-based reconciliation thread.

use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;

use super::Reconciler;

/// Statistics from a polling thread.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PollStats {
    pub polls: usize,
    pub failures: usize,
}

/// A background thread that reloads a slot on a fixed interval.
///
/// ## Example
///
/// ```ignore
/// use cuizly_sync::{CacheSlot, PollingThread, Reconciler};
/// use std::time::Duration;
///
/// let slot = CacheSlot::new("profile:user-1");
/// let reconciler = Reconciler::new(slot.clone(), fetch_profile);
///
/// let poller = PollingThread::spawn(reconciler, Duration::from_secs(60));
///
/// // ... view is mounted ...
///
/// let stats = poller.stop();
/// println!("{} polls", stats.polls);
/// ```
pub struct PollingThread {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<PollStats>>,
}

impl PollingThread {
    /// Spawn a poller. The first reload happens one `interval` after spawn;
    /// the mount-time load is the caller's.
    pub fn spawn<T>(reconciler: Reconciler<T>, interval: Duration) -> Self
    where
        T: Clone + Send + 'static,
    {
        let (stop_tx, stop_rx) = channel();

        let handle = thread::spawn(move || {
            let mut stats = PollStats::default();
            let identity = reconciler.slot().identity().to_string();

            loop {
                // Waiting on the stop channel doubles as the interval sleep.
                match stop_rx.recv_timeout(interval) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {}
                }
                if !reconciler.slot().lifetime().is_alive() {
                    break;
                }

                stats.polls += 1;
                if reconciler.reload().is_err() {
                    stats.failures += 1;
                }
            }

            debug!(identity = %identity, polls = stats.polls, "poller stopped");
            stats
        });

        Self {
            stop_tx,
            handle: Some(handle),
        }
    }

    /// Signal the poller to stop and wait for it to finish.
    /// Returns the poll statistics.
    pub fn stop(mut self) -> PollStats {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap_or_default()
        } else {
            PollStats::default()
        }
    }

    /// Signal the poller to stop without waiting.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(());
    }
}

impl Drop for PollingThread {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
    }
}
