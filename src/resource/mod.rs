//! Resources - a cache slot wired to its reconciler, mutator, push
//! channel and poller, mounted into a [`ViewScope`].
//!
//! ## Example
//!
//! ```
//! use cuizly_sync::{
//!     ChannelSpec, InMemoryBackend, Query, ResourceBuilder, ResourceIdentity, RowStore, Session,
//!     SubscriptionManager, ViewScope,
//! };
//!
//! let backend = InMemoryBackend::new();
//! let store = backend.connect(Session::new("user-1", "token-1"));
//! let manager = SubscriptionManager::new(store.clone());
//!
//! let mut view = ViewScope::new("dashboard");
//! let reader = store.clone();
//! let count = ResourceBuilder::new(ResourceIdentity::new("reservations", "user-1"), move || {
//!     let query = Query::new("reservations");
//!     Ok(reader.select(&query)?.len())
//! })
//! .subscribe(&manager, ChannelSpec::new("reservations"))
//! .mount(&mut view)
//! .unwrap();
//!
//! assert_eq!(count.value(), Some(0));
//! assert_eq!(backend.open_channels(), 1);
//!
//! view.unmount();
//! assert_eq!(backend.open_channels(), 0);
//! ```

mod identity;

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::SyncError;
use crate::lifetime::Lifetime;
use crate::mutation::{Mutation, MutationHandle, MutationState, MutationStats, OptimisticMutator};
use crate::reconcile::{Fetcher, Patcher, PollingThread, ReconcileStats, Reconciler, RetryPolicy};
use crate::slot::{CacheSlot, LoadOutcome, ObserverId, SlotSnapshot};
use crate::store::{ChangeEvent, ChannelSpec};
use crate::subscription::SubscriptionManager;
use crate::view::{Mounted, ViewScope};

pub use identity::ResourceIdentity;

/// Builder for a [`Resource`].
pub struct ResourceBuilder<T> {
    identity: ResourceIdentity,
    fetch: Fetcher<T>,
    patch: Option<Patcher<T>>,
    channel: Option<(SubscriptionManager, ChannelSpec)>,
    poll_every: Option<Duration>,
    retry: RetryPolicy,
    load_on_mount: bool,
}

impl<T> ResourceBuilder<T>
where
    T: Clone + Default + Send + 'static,
{
    /// A resource loaded by `fetch`.
    pub fn new<F>(identity: ResourceIdentity, fetch: F) -> Self
    where
        F: Fn() -> Result<T, SyncError> + Send + Sync + 'static,
    {
        Self {
            identity,
            fetch: Arc::new(fetch),
            patch: None,
            channel: None,
            poll_every: None,
            retry: RetryPolicy::default(),
            load_on_mount: true,
        }
    }

    /// Replace the fetch function.
    pub fn fetch<F>(mut self, fetch: F) -> Self
    where
        F: Fn() -> Result<T, SyncError> + Send + Sync + 'static,
    {
        self.fetch = Arc::new(fetch);
        self
    }

    /// Patch push events in place instead of reloading when `patch`
    /// returns a value.
    pub fn patch<F>(mut self, patch: F) -> Self
    where
        F: Fn(&T, &ChangeEvent) -> Option<T> + Send + Sync + 'static,
    {
        self.patch = Some(Arc::new(patch));
        self
    }

    /// Listen to a push channel while mounted.
    pub fn subscribe(mut self, manager: &SubscriptionManager, spec: ChannelSpec) -> Self {
        self.channel = Some((manager.clone(), spec));
        self
    }

    /// Reload on a fixed interval while mounted.
    pub fn poll_every(mut self, interval: Duration) -> Self {
        self.poll_every = Some(interval);
        self
    }

    /// Poll only when `interval` is set.
    pub fn poll_maybe(mut self, interval: Option<Duration>) -> Self {
        self.poll_every = interval;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Skip the mount-time load.
    pub fn lazy(mut self) -> Self {
        self.load_on_mount = false;
        self
    }

    /// Mount into `scope`: subscribe, load, then start polling.
    ///
    /// Fails with [`SyncError::AlreadyMounted`] if the scope already holds
    /// this identity, or with the channel error if subscribing failed. A
    /// failed initial load is not an error; it is recorded in the slot.
    pub fn mount(self, scope: &mut ViewScope) -> Result<Resource<T>, SyncError> {
        let identity = self.identity;
        if scope.is_mounted(&identity) {
            return Err(SyncError::AlreadyMounted {
                identity: identity.to_string(),
            });
        }

        let lifetime = Lifetime::child_of(&scope.token());
        let slot = CacheSlot::with_lifetime(identity.to_string(), lifetime.token());
        let reconciler = Reconciler::from_parts(slot, self.fetch, self.patch, self.retry);
        let mutator =
            OptimisticMutator::new(reconciler.clone(), scope.queues().queue(&identity.to_string()));

        // Subscribe before the first load so changes committed during the
        // load still trigger a reconcile.
        let subscription = match self.channel {
            Some((manager, spec)) => Some(manager.subscribe(&identity, spec, reconciler.clone())?),
            None => None,
        };

        if self.load_on_mount {
            // errors stay in the slot
            let _ = reconciler.reload();
        }

        let poller = self
            .poll_every
            .map(|interval| PollingThread::spawn(reconciler.clone(), interval));

        debug!(
            identity = %identity,
            subscribed = subscription.is_some(),
            polling = poller.is_some(),
            "resource mounted"
        );
        scope.insert(
            identity.clone(),
            Mounted {
                lifetime,
                subscription,
                poller,
            },
        );

        Ok(Resource {
            identity,
            reconciler,
            mutator,
        })
    }
}

/// A mounted resource. Clone-friendly; clones share the slot.
pub struct Resource<T> {
    identity: ResourceIdentity,
    reconciler: Reconciler<T>,
    mutator: OptimisticMutator<T>,
}

impl<T> Clone for Resource<T> {
    fn clone(&self) -> Self {
        Self {
            identity: self.identity.clone(),
            reconciler: self.reconciler.clone(),
            mutator: self.mutator.clone(),
        }
    }
}

impl<T> Resource<T>
where
    T: Clone + Default + Send + 'static,
{
    pub fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }

    pub fn slot(&self) -> &CacheSlot<T> {
        self.reconciler.slot()
    }

    pub fn snapshot(&self) -> SlotSnapshot<T> {
        self.slot().read()
    }

    pub fn value(&self) -> Option<T> {
        self.slot().value()
    }

    pub fn reload(&self) -> Result<LoadOutcome, SyncError> {
        self.reconciler.reload()
    }

    /// Apply a mutation and wait for it to resolve.
    pub fn mutate(&self, mutation: Mutation<T>) -> Result<(), SyncError> {
        self.mutator.mutate(mutation)
    }

    /// Queue a mutation; the optimistic value is visible as soon as the
    /// mutation reaches the head of the queue.
    pub fn submit(&self, mutation: Mutation<T>) -> MutationHandle {
        self.mutator.submit(mutation)
    }

    pub fn mutation_state(&self) -> MutationState {
        self.mutator.state()
    }

    pub fn mutation_stats(&self) -> MutationStats {
        self.mutator.stats()
    }

    pub fn reconcile_stats(&self) -> ReconcileStats {
        self.reconciler.stats()
    }

    pub fn on_change<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&SlotSnapshot<T>) + Send + Sync + 'static,
    {
        self.slot().on_change(observer)
    }

    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.slot().remove_observer(id)
    }

    /// Whether the resource is still mounted in its view.
    pub fn is_mounted(&self) -> bool {
        self.slot().lifetime().is_alive()
    }
}
