//! Shared fixtures: a `tags` resource over the in-memory backend.

#![allow(dead_code)]

use std::thread;
use std::time::{Duration, Instant};

use cuizly_sync::{
    ChannelSpec, Filter, InMemoryBackend, InMemoryRowStore, Mutation, Query, Resource,
    ResourceBuilder, ResourceIdentity, RetryPolicy, Row, RowStore, Session, StoreError,
    SubscriptionManager, SyncError, ViewScope,
};

pub const USER: &str = "user-1";

/// Route engine logs to the test output; `RUST_LOG=cuizly_sync=debug`
/// shows loads, retries and channel transitions.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Poll `cond` for up to two seconds.
pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(2, Duration::from_millis(10))
}

pub struct Fixture {
    pub backend: InMemoryBackend,
    pub store: InMemoryRowStore,
    pub manager: SubscriptionManager,
}

impl Fixture {
    pub fn new() -> Self {
        init_tracing();
        let backend = InMemoryBackend::new();
        let store = backend.connect(Session::new(USER, "token-1"));
        let manager = SubscriptionManager::new(store.clone())
            .with_poll_timeout(Duration::from_millis(10))
            .with_reconnect_delay(Duration::from_millis(10));
        Fixture {
            backend,
            store,
            manager,
        }
    }

    pub fn seed_tags(&self, names: &[&str]) {
        self.backend
            .seed("tags", names.iter().map(|n| Row::new().with("name", *n)))
            .unwrap();
    }

    /// Mount a resource holding the tag names in insertion order.
    pub fn mount_tags(&self, view: &mut ViewScope) -> Resource<Vec<String>> {
        ResourceBuilder::new(ResourceIdentity::new("tags", USER), tag_names(self.store.clone()))
            .subscribe(&self.manager, ChannelSpec::new("tags"))
            .retry(fast_retry())
            .mount(view)
            .unwrap()
    }
}

pub fn tag_names(store: InMemoryRowStore) -> impl Fn() -> Result<Vec<String>, SyncError> {
    move || -> Result<Vec<String>, SyncError> {
        Ok(store
            .select(&Query::new("tags").order_asc("created_at"))?
            .iter()
            .filter_map(|row| row.get_str("name").map(str::to_string))
            .collect())
    }
}

/// Toggle `name` in the tag list, writing through `store`.
pub fn toggle_tag(store: &InMemoryRowStore, name: &str) -> Mutation<Vec<String>> {
    let target = name.to_string();
    let name = name.to_string();
    let store = store.clone();
    Mutation::new(
        format!("toggle tag {}", name),
        move |tags: &Vec<String>| {
            if tags.contains(&target) {
                tags.iter().filter(|t| **t != target).cloned().collect()
            } else {
                let mut next = tags.clone();
                next.push(target.clone());
                next
            }
        },
        move |tags: &Vec<String>| {
            if tags.contains(&name) {
                let query = Query::new("tags").filter(Filter::eq("tags", "name", name.as_str())?)?;
                for row in store.select(&query)? {
                    let id = row.id().ok_or(StoreError::Serde("row without id".into()))?;
                    store.delete("tags", id)?;
                }
            } else {
                store.insert("tags", Row::new().with("name", name.as_str()))?;
            }
            Ok(())
        },
    )
}

pub fn remote_tags(backend: &InMemoryBackend) -> Vec<String> {
    backend
        .rows("tags")
        .iter()
        .filter_map(|row| row.get_str("name").map(str::to_string))
        .collect()
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
