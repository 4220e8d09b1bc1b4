//! Periodic activity flushing.

use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;

use super::ActivityTracker;
use crate::store::RowStore;

/// Statistics from a flusher thread.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlushStats {
    pub flushes: usize,
    pub failures: usize,
    pub written: usize,
}

/// A background thread flushing an [`ActivityTracker`] every `interval`,
/// and once more when stopped.
pub struct ActivityFlusher {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<FlushStats>>,
}

impl ActivityFlusher {
    pub fn spawn<S: RowStore + 'static>(tracker: ActivityTracker<S>, interval: Duration) -> Self {
        let (stop_tx, stop_rx) = channel();

        let handle = thread::spawn(move || {
            let mut stats = FlushStats::default();
            loop {
                let stopping = match stop_rx.recv_timeout(interval) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
                    Err(RecvTimeoutError::Timeout) => false,
                };

                if tracker.pending() > 0 {
                    stats.flushes += 1;
                    let result = if stopping {
                        tracker.flush_all()
                    } else {
                        tracker.flush()
                    };
                    match result {
                        Ok(n) => stats.written += n,
                        Err(_) => stats.failures += 1,
                    }
                }

                if stopping {
                    break;
                }
            }
            debug!(
                user_id = %tracker.session().user_id,
                flushes = stats.flushes,
                written = stats.written,
                "activity flusher stopped"
            );
            stats
        });

        Self {
            stop_tx,
            handle: Some(handle),
        }
    }

    /// Stop, flush what is left, and return the statistics.
    pub fn stop(mut self) -> FlushStats {
        let _ = self.stop_tx.send(());
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or_default(),
            None => FlushStats::default(),
        }
    }

    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(());
    }
}

impl Drop for ActivityFlusher {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
    }
}
