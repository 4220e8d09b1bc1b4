use std::sync::mpsc::{channel, Receiver, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread;

use tracing::{debug, warn};

use super::queue::{MutationQueue, MutationState, QueueTicket};
use crate::error::SyncError;
use crate::reconcile::Reconciler;
use crate::slot::{CacheSlot, RemoteWrite};

type Optimistic<T> = Box<dyn Fn(&T) -> T + Send>;
type Remote<T> = Box<dyn FnOnce(&T) -> Result<(), SyncError> + Send>;

/// A pure description of a user mutation.
///
/// `optimistic` computes the speculative value from the current one.
/// `remote` performs the write; it receives the value the mutation was
/// applied to, so decisions such as "insert or delete" follow the state
/// the user saw when the mutation ran.
pub struct Mutation<T> {
    label: String,
    optimistic: Optimistic<T>,
    remote: Remote<T>,
}

impl<T> Mutation<T> {
    pub fn new<O, R>(label: impl Into<String>, optimistic: O, remote: R) -> Self
    where
        O: Fn(&T) -> T + Send + 'static,
        R: FnOnce(&T) -> Result<(), SyncError> + Send + 'static,
    {
        Mutation {
            label: label.into(),
            optimistic: Box::new(optimistic),
            remote: Box::new(remote),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Counters collected by a mutator.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MutationStats {
    pub applied: usize,
    pub failed: usize,
    pub detached: usize,
}

/// Pending result of a submitted mutation.
pub struct MutationHandle {
    identity: String,
    result: Receiver<Result<(), SyncError>>,
}

impl MutationHandle {
    /// Block until the mutation resolved.
    pub fn wait(self) -> Result<(), SyncError> {
        self.result.recv().unwrap_or_else(|_| {
            Err(SyncError::WorkerLost {
                identity: self.identity.clone(),
            })
        })
    }

    /// The result if the mutation already resolved.
    pub fn try_result(&self) -> Option<Result<(), SyncError>> {
        match self.result.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(SyncError::WorkerLost {
                identity: self.identity.clone(),
            })),
        }
    }
}

/// Applies mutations optimistically and serializes them per identity.
///
/// Each mutation:
/// 1. takes a ticket from the identity's queue when submitted;
/// 2. once earlier mutations resolved, writes the optimistic value;
/// 3. runs the remote operation on a worker thread;
/// 4. on failure writes the pre-mutation value back, reloads through the
///    reconciler and records the error in the slot, unless the owning view
///    is gone by then.
///
/// Reloads that resolve while the remote write is in flight are discarded.
///
/// When the queue is idle at submit time the optimistic write happens
/// before `submit` returns.
pub struct OptimisticMutator<T> {
    reconciler: Reconciler<T>,
    queue: Arc<MutationQueue>,
    stats: Arc<Mutex<MutationStats>>,
}

impl<T> Clone for OptimisticMutator<T> {
    fn clone(&self) -> Self {
        Self {
            reconciler: self.reconciler.clone(),
            queue: Arc::clone(&self.queue),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<T> OptimisticMutator<T>
where
    T: Clone + Default + Send + 'static,
{
    pub fn new(reconciler: Reconciler<T>, queue: Arc<MutationQueue>) -> Self {
        Self {
            reconciler,
            queue,
            stats: Arc::new(Mutex::new(MutationStats::default())),
        }
    }

    pub fn slot(&self) -> &CacheSlot<T> {
        self.reconciler.slot()
    }

    pub fn state(&self) -> MutationState {
        self.queue.state()
    }

    pub fn stats(&self) -> MutationStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Queue a mutation and return immediately.
    pub fn submit(&self, mutation: Mutation<T>) -> MutationHandle {
        let ticket = self.queue.enqueue();
        let applied = if ticket.is_turn() && self.slot().lifetime().is_alive() {
            Some(self.apply_optimistic(&mutation))
        } else {
            None
        };

        let (tx, rx) = channel();
        let this = self.clone();
        thread::spawn(move || {
            let result = this.run(ticket, mutation, applied);
            let _ = tx.send(result);
        });

        MutationHandle {
            identity: self.slot().identity().to_string(),
            result: rx,
        }
    }

    /// Submit a mutation and wait for it to resolve.
    pub fn mutate(&self, mutation: Mutation<T>) -> Result<(), SyncError> {
        self.submit(mutation).wait()
    }

    fn run(
        &self,
        ticket: QueueTicket,
        mutation: Mutation<T>,
        applied: Option<Applied<T>>,
    ) -> Result<(), SyncError> {
        ticket.wait_turn();
        let slot = self.slot();

        let applied = match applied {
            Some(applied) => applied,
            None if slot.lifetime().is_alive() => self.apply_optimistic(&mutation),
            None => {
                self.record(|s| s.detached += 1);
                debug!(identity = %slot.identity(), label = %mutation.label, "mutation skipped after teardown");
                return Err(SyncError::Detached {
                    identity: slot.identity().to_string(),
                });
            }
        };

        let Mutation { label, remote, .. } = mutation;
        let Applied {
            previous,
            base,
            write,
        } = applied;
        let result = remote(&base);
        drop(write);

        match result {
            Ok(()) => {
                self.record(|s| s.applied += 1);
                debug!(identity = %slot.identity(), label = %label, ticket = ticket.number(), "mutation applied");
                ticket.finish();
                Ok(())
            }
            Err(err) if !slot.restore(previous) => {
                self.record(|s| s.detached += 1);
                debug!(identity = %slot.identity(), label = %label, error = %err, "mutation failed after teardown, rollback skipped");
                ticket.finish();
                Err(err)
            }
            Err(err) => {
                warn!(identity = %slot.identity(), label = %label, error = %err, "mutation failed, rolled back");
                if let Err(reload_err) = self.reconciler.reload() {
                    warn!(identity = %slot.identity(), error = %reload_err, "reload after rollback failed");
                }
                slot.set_error(err.clone());
                self.record(|s| s.failed += 1);
                ticket.finish();
                Err(err)
            }
        }
    }

    fn apply_optimistic(&self, mutation: &Mutation<T>) -> Applied<T> {
        let write = self.slot().begin_remote_write();
        let mut base = None;
        let previous = self.slot().replace_with(|current| {
            let current = current.cloned().unwrap_or_default();
            let next = (mutation.optimistic)(&current);
            base = Some(current);
            next
        });
        Applied {
            previous,
            base: base.unwrap_or_default(),
            write,
        }
    }

    fn record(&self, f: impl FnOnce(&mut MutationStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            f(&mut stats);
        }
    }
}

/// Result of an optimistic write.
struct Applied<T> {
    /// Slot value before the write, restored on failure.
    previous: Option<T>,
    /// Value the mutation was computed from.
    base: T,
    write: RemoteWrite<T>,
}
