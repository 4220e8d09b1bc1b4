#![allow(dead_code)]

use cuizly_sync::{
    ActivityTracker, InMemoryBackend, InMemoryRowStore, Row, Session, SyncConfig, ACTIVITY_TABLE,
};

pub const USER: &str = "user-1";

pub fn tracker(backend: &InMemoryBackend, config: &SyncConfig) -> ActivityTracker<InMemoryRowStore> {
    let session = Session::new(USER, "token-1");
    ActivityTracker::new(backend.connect(session.clone()), session).with_config(config)
}

pub fn event_types(backend: &InMemoryBackend) -> Vec<String> {
    backend
        .rows(ACTIVITY_TABLE)
        .iter()
        .filter_map(|row: &Row| row.get_str("event_type").map(str::to_string))
        .collect()
}
