//! ViewScope - owner of every resource a view mounts.
//!
//! Dropping (or unmounting) the scope ends its lifetime, stops pollers and
//! closes every push channel, on every exit path.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::lifetime::{Lifetime, LifetimeToken};
use crate::mutation::MutationQueues;
use crate::reconcile::{PollStats, PollingThread};
use crate::resource::ResourceIdentity;
use crate::subscription::{ChannelState, SubscriptionGuard, SubscriptionStats};

pub(crate) struct Mounted {
    /// Child of the view lifetime, ended when this resource is released.
    pub(crate) lifetime: Lifetime,
    pub(crate) subscription: Option<SubscriptionGuard>,
    pub(crate) poller: Option<PollingThread>,
}

/// What a resource did while mounted.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReleaseStats {
    pub subscription: Option<SubscriptionStats>,
    pub polling: Option<PollStats>,
}

impl Mounted {
    fn release(self) -> ReleaseStats {
        self.lifetime.end();
        ReleaseStats {
            polling: self.poller.map(PollingThread::stop),
            subscription: self.subscription.map(SubscriptionGuard::unsubscribe),
        }
    }
}

/// Scope of one mounted view.
pub struct ViewScope {
    name: String,
    lifetime: Lifetime,
    queues: Arc<MutationQueues>,
    mounted: HashMap<ResourceIdentity, Mounted>,
}

impl ViewScope {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_queues(name, Arc::new(MutationQueues::new()))
    }

    /// A scope sharing mutation queues with other views, so mutations on
    /// the same identity are serialized across them.
    pub fn with_queues(name: impl Into<String>, queues: Arc<MutationQueues>) -> Self {
        ViewScope {
            name: name.into(),
            lifetime: Lifetime::new(),
            queues,
            mounted: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn token(&self) -> LifetimeToken {
        self.lifetime.token()
    }

    pub fn queues(&self) -> &Arc<MutationQueues> {
        &self.queues
    }

    pub fn is_mounted(&self, identity: &ResourceIdentity) -> bool {
        self.mounted.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.mounted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mounted.is_empty()
    }

    pub fn channel_state(&self, identity: &ResourceIdentity) -> Option<ChannelState> {
        self.mounted
            .get(identity)?
            .subscription
            .as_ref()
            .map(SubscriptionGuard::state)
    }

    pub(crate) fn insert(&mut self, identity: ResourceIdentity, mounted: Mounted) {
        self.mounted.insert(identity, mounted);
    }

    /// Stop one resource's poller and channel and end its lifetime. The
    /// identity can then be mounted again; the released resource keeps its
    /// last value but no longer accepts loads or rollbacks.
    pub fn release(&mut self, identity: &ResourceIdentity) -> Option<ReleaseStats> {
        let stats = self.mounted.remove(identity)?.release();
        debug!(view = %self.name, identity = %identity, "resource released");
        Some(stats)
    }

    /// Tear the view down.
    pub fn unmount(self) {
        // Drop does the work.
    }

    fn teardown(&mut self) {
        self.lifetime.end();
        let count = self.mounted.len();
        for (_, mounted) in self.mounted.drain() {
            mounted.release();
        }
        if count > 0 {
            debug!(view = %self.name, resources = count, "view unmounted");
        }
    }
}

impl Drop for ViewScope {
    fn drop(&mut self) {
        self.teardown();
    }
}
