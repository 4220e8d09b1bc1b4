use std::time::Duration;

use cuizly_sync::{ActivityEvent, ActivityFlusher, InMemoryBackend, SyncConfig, SyncError};
use serde_json::json;

use crate::support::{event_types, tracker, USER};

#[test]
fn batches_by_configured_size() {
    let backend = InMemoryBackend::new().restrict_to_owner("user_activity", "user_id");
    let config = SyncConfig::new().with_activity_batch_size(5);
    let tracker = tracker(&backend, &config);

    for i in 0..12 {
        tracker
            .track(ActivityEvent::new("restaurant_view").restaurant(format!("r{}", i)))
            .unwrap();
    }
    assert_eq!(event_types(&backend).len(), 10);
    assert_eq!(tracker.pending(), 2);

    assert_eq!(tracker.flush().unwrap(), 2);
    let stats = tracker.stats();
    assert_eq!(stats.tracked, 12);
    assert_eq!(stats.written, 12);
    let rows = backend.rows("user_activity");
    assert!(rows.iter().all(|row| row.get_str("user_id") == Some(USER)));
}

#[test]
fn payload_and_timestamps_are_written() {
    let backend = InMemoryBackend::new();
    let tracker = tracker(&backend, &SyncConfig::new());
    tracker
        .track(
            ActivityEvent::new("search")
                .payload(json!({ "query": "sushi", "radius_km": 5 }))
                .at(1_700_000_000_000),
        )
        .unwrap();
    tracker.flush().unwrap();

    let rows = backend.rows("user_activity");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("payload"), Some(&json!({ "query": "sushi", "radius_km": 5 })));
    assert_eq!(rows[0].get("occurred_at"), Some(&json!(1_700_000_000_000u64)));
}

#[test]
fn flush_failure_surfaces_through_track() {
    let backend = InMemoryBackend::new();
    let config = SyncConfig::new().with_activity_batch_size(2);
    let tracker = tracker(&backend, &config);
    backend.fail_writes(1);

    tracker.track(ActivityEvent::new("a")).unwrap();
    let err = tracker.track(ActivityEvent::new("b")).unwrap_err();
    assert!(matches!(err, SyncError::Store(_)));
    assert_eq!(tracker.pending(), 2);

    assert_eq!(tracker.flush().unwrap(), 2);
    assert_eq!(event_types(&backend), vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn events_are_dropped_after_max_attempts() {
    let backend = InMemoryBackend::new();
    let config = SyncConfig::new().with_activity_max_attempts(3);
    let tracker = tracker(&backend, &config);
    tracker.track(ActivityEvent::new("a")).unwrap();

    backend.fail_writes(3);
    for _ in 0..3 {
        assert!(tracker.flush().is_err());
    }
    assert_eq!(tracker.pending(), 0);
    assert_eq!(tracker.stats().dropped, 1);
    assert!(event_types(&backend).is_empty());
}

#[test]
fn flusher_writes_in_background_and_on_stop() {
    let backend = InMemoryBackend::new();
    let config = SyncConfig::new().with_activity_flush(Duration::from_millis(10));
    let tracker = tracker(&backend, &config);
    let flusher = ActivityFlusher::spawn(tracker.clone(), config.activity_flush());

    tracker.track(ActivityEvent::new("open_app")).unwrap();
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while event_types(&backend).is_empty() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    tracker.track(ActivityEvent::new("close_app")).unwrap();
    let stats = flusher.stop();

    assert_eq!(stats.written, 2);
    assert_eq!(
        event_types(&backend),
        vec!["open_app".to_string(), "close_app".to_string()]
    );
}
