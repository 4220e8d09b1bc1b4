#![allow(dead_code)]

use std::thread;
use std::time::{Duration, Instant};

use cuizly_sync::{
    InMemoryBackend, InMemoryRowStore, RetryPolicy, Session, SyncConfig, SyncContext,
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

pub fn backend() -> InMemoryBackend {
    InMemoryBackend::new()
        .restrict_to_owner("profiles", "user_id")
        .with_unique("profiles", &["user_id"])
}

pub fn context(backend: &InMemoryBackend, poll: Option<Duration>) -> SyncContext<InMemoryRowStore> {
    let session = Session::new(USER, "token-1");
    let config = SyncConfig::new()
        .with_retry(RetryPolicy::new(1, Duration::from_millis(10)))
        .with_channel_poll(Duration::from_millis(10))
        .with_profile_poll(poll);
    SyncContext::with_config(backend.connect(session.clone()), session, config)
}
