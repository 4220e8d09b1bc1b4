use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use tracing::trace;

/// Mutation state of one resource identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    Idle,
    /// One mutation in flight.
    Mutating,
    /// One mutation in flight and `waiting` more queued behind it.
    MutatingQueued { waiting: usize },
}

#[derive(Default)]
struct QueueState {
    next_ticket: u64,
    serving: u64,
    /// Tickets given up before their turn; skipped when reached.
    abandoned: BTreeSet<u64>,
}

impl QueueState {
    fn in_flight(&self) -> usize {
        (self.next_ticket - self.serving) as usize - self.abandoned.len()
    }

    fn advance(&mut self) {
        self.serving += 1;
        while self.abandoned.remove(&self.serving) {
            self.serving += 1;
        }
    }
}

/// FIFO ticket queue serializing mutations of one resource identity.
///
/// A ticket is taken when the user issues the mutation, so mutations run
/// in the order they were issued, whichever thread ends up running them.
pub struct MutationQueue {
    identity: String,
    state: Mutex<QueueState>,
    turn: Condvar,
}

impl MutationQueue {
    pub fn new(identity: impl Into<String>) -> Self {
        MutationQueue {
            identity: identity.into(),
            state: Mutex::new(QueueState::default()),
            turn: Condvar::new(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Take the next ticket.
    pub fn enqueue(self: &Arc<Self>) -> QueueTicket {
        let mut state = self.lock();
        let number = state.next_ticket;
        state.next_ticket += 1;
        trace!(identity = %self.identity, ticket = number, "mutation enqueued");
        QueueTicket {
            queue: Arc::clone(self),
            number,
            finished: false,
        }
    }

    pub fn state(&self) -> MutationState {
        match self.lock().in_flight() {
            0 => MutationState::Idle,
            1 => MutationState::Mutating,
            n => MutationState::MutatingQueued { waiting: n - 1 },
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state() == MutationState::Idle
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn release(&self, number: u64) {
        let mut state = self.lock();
        if number == state.serving {
            state.advance();
        } else {
            state.abandoned.insert(number);
        }
        self.turn.notify_all();
    }
}

/// A place in a [`MutationQueue`]. Dropping it gives the place up.
pub struct QueueTicket {
    queue: Arc<MutationQueue>,
    number: u64,
    finished: bool,
}

impl QueueTicket {
    /// Block until every earlier ticket has finished.
    pub fn wait_turn(&self) {
        let mut state = self.queue.lock();
        while state.serving != self.number {
            state = self
                .queue
                .turn
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Whether every earlier ticket has finished.
    pub fn is_turn(&self) -> bool {
        self.queue.lock().serving == self.number
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    /// Finish this mutation and let the next one run.
    pub fn finish(mut self) {
        self.finished = true;
        self.queue.release(self.number);
    }
}

impl Drop for QueueTicket {
    fn drop(&mut self) {
        if !self.finished {
            self.queue.release(self.number);
        }
    }
}

/// Registry of mutation queues, one per resource identity.
#[derive(Default)]
pub struct MutationQueues {
    queues: Mutex<HashMap<String, Arc<MutationQueue>>>,
}

impl MutationQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get (or create) the queue for `identity`. Repeated calls return the
    /// same queue.
    pub fn queue(&self, identity: &str) -> Arc<MutationQueue> {
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        queues
            .entry(identity.to_string())
            .or_insert_with(|| Arc::new(MutationQueue::new(identity)))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.queues.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
