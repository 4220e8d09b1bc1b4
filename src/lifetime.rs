//! View lifetime tokens.
//!
//! A [`Lifetime`] is owned by a view; every background operation started on
//! the view's behalf carries a [`LifetimeToken`] and drops its result once
//! the token reports the view gone. A child lifetime ends with its own
//! owner or with its parent, whichever comes first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Owner side of a view lifetime. Ending it (or dropping it) kills every
/// token handed out.
#[derive(Debug)]
pub struct Lifetime {
    alive: Arc<AtomicBool>,
    parent: Option<Box<LifetimeToken>>,
}

impl Default for Lifetime {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifetime {
    pub fn new() -> Self {
        Self {
            alive: Arc::new(AtomicBool::new(true)),
            parent: None,
        }
    }

    /// A lifetime that also ends when `parent` does.
    pub fn child_of(parent: &LifetimeToken) -> Self {
        Self {
            alive: Arc::new(AtomicBool::new(true)),
            parent: Some(Box::new(parent.clone())),
        }
    }

    pub fn token(&self) -> LifetimeToken {
        LifetimeToken {
            alive: Arc::clone(&self.alive),
            parent: self.parent.clone(),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.token().is_alive()
    }

    /// End the lifetime. Idempotent.
    pub fn end(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

impl Drop for Lifetime {
    fn drop(&mut self) {
        self.end();
    }
}

/// Cloneable handle observing a [`Lifetime`].
#[derive(Debug, Clone)]
pub struct LifetimeToken {
    alive: Arc<AtomicBool>,
    parent: Option<Box<LifetimeToken>>,
}

impl LifetimeToken {
    /// A token that is never ended, for slots used outside any view.
    pub fn detached() -> Self {
        Self {
            alive: Arc::new(AtomicBool::new(true)),
            parent: None,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
            && self.parent.as_ref().map_or(true, |parent| parent.is_alive())
    }
}
