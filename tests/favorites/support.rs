#![allow(dead_code)]

use std::thread;
use std::time::{Duration, Instant};

use cuizly_sync::{
    InMemoryBackend, InMemoryRowStore, RetryPolicy, Row, Session, SyncConfig, SyncContext,
};

pub const USER: &str = "user-1";

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

/// Backend with the favorites policies of the production schema.
pub fn backend() -> InMemoryBackend {
    InMemoryBackend::new()
        .restrict_to_owner("favorites", "user_id")
        .with_unique("favorites", &["user_id", "restaurant_id"])
}

pub fn test_config() -> SyncConfig {
    SyncConfig::new()
        .with_retry(RetryPolicy::new(2, Duration::from_millis(10)))
        .with_channel_poll(Duration::from_millis(10))
        .with_reconnect_delay(Duration::from_millis(10))
}

pub fn context(backend: &InMemoryBackend, user: &str) -> SyncContext<InMemoryRowStore> {
    let session = Session::new(user, format!("token-{}", user));
    SyncContext::with_config(backend.connect(session.clone()), session, test_config())
}

pub fn favorite(user: &str, restaurant: &str) -> Row {
    Row::new()
        .with("user_id", user)
        .with("restaurant_id", restaurant)
}

pub fn ids(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
