//! Optimistic mutations, serialized per resource identity.
//!
//! ```text
//!   submit(M1)      submit(M2)
//!      │ ticket 0      │ ticket 1
//!      ▼               ▼
//!   ┌────────────────────────────────────────────┐
//!   │ MutationQueue("favorites:user-1")          │
//!   │   Idle → Mutating → MutatingQueued{1} ...  │
//!   └────────────────────────────────────────────┘
//!      │ turn 0                    │ turn 1 (after M1 resolved)
//!      ▼                           ▼
//!   slot.write(optimistic)      slot.write(optimistic)
//!   remote write (loads stale)  remote write (loads stale)
//!   failure → rollback + reload + last_error
//! ```

mod mutator;
mod queue;

pub use mutator::{Mutation, MutationHandle, MutationStats, OptimisticMutator};
pub use queue::{MutationQueue, MutationQueues, MutationState, QueueTicket};
