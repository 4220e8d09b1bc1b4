//! Cache slot, optimistic mutation, reconciliation and subscription
//! lifecycle, exercised against the in-memory backend.

mod support;
mod lifecycle;
mod mutation;
mod reconcile;
