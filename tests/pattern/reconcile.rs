use std::time::Duration;

use cuizly_sync::{
    InMemoryBackend, LoadOutcome, ResourceBuilder, ResourceIdentity, RetryPolicy, Row, RowStore,
    Session, StoreError, SyncError, VendorError, ViewScope,
};

use crate::support::{fast_retry, strings, tag_names, wait_until, Fixture, USER};

#[test]
fn repeated_reconciliation_is_idempotent() {
    let fx = Fixture::new();
    fx.seed_tags(&["vegan", "halal"]);
    let mut view = ViewScope::new("tags");
    let tags = fx.mount_tags(&mut view);

    let before = tags.snapshot();
    assert_eq!(tags.reload().unwrap(), LoadOutcome::Accepted);
    assert_eq!(tags.reload().unwrap(), LoadOutcome::Accepted);
    let after = tags.snapshot();

    assert_eq!(after.value, before.value);
    assert_eq!(after.value, Some(strings(&["vegan", "halal"])));
    assert!(!after.is_loading);
    assert!(after.last_error.is_none());
    assert!(after.version > before.version);
}

#[test]
fn failing_reconciliation_stops_after_bound() {
    let fx = Fixture::new();
    fx.seed_tags(&["vegan"]);
    let mut view = ViewScope::new("tags");
    let tags = fx.mount_tags(&mut view);
    let loaded = tags.reconcile_stats().attempts;

    fx.backend.fail_reads(100);
    let err = tags.reload().unwrap_err();
    assert!(matches!(err, SyncError::Store(StoreError::Network(_))));

    let stats = tags.reconcile_stats();
    assert_eq!(stats.attempts - loaded, 3);
    let snap = tags.snapshot();
    assert!(!snap.is_loading);
    assert!(snap.last_error.is_some());
    // last known value survives
    assert_eq!(snap.value, Some(strings(&["vegan"])));
}

#[test]
fn non_retryable_errors_fail_fast() {
    let backend = InMemoryBackend::new();
    let expired = backend.connect(Session::new(USER, "old-token").with_expiry(1));

    let mut view = ViewScope::new("tags");
    let tags = ResourceBuilder::new(ResourceIdentity::new("tags", USER), tag_names(expired))
        .retry(RetryPolicy::new(5, Duration::from_millis(200)))
        .mount(&mut view)
        .unwrap();

    let snap = tags.snapshot();
    assert!(matches!(
        snap.last_error,
        Some(SyncError::Store(StoreError::Unauthorized))
    ));
    assert_eq!(tags.reconcile_stats().attempts, 1);
}

#[test]
fn push_events_trigger_reload() {
    let fx = Fixture::new();
    let mut view = ViewScope::new("tags");
    let tags = fx.mount_tags(&mut view);
    assert_eq!(tags.value(), Some(vec![]));

    fx.store.insert("tags", Row::new().with("name", "bbq")).unwrap();
    assert!(wait_until(|| tags.value() == Some(strings(&["bbq"]))));
}

#[test]
fn reconnect_reloads_missed_changes() {
    let fx = Fixture::new();
    let mut view = ViewScope::new("tags");
    let tags = fx.mount_tags(&mut view);

    // seeded rows emit no events; only the reconnect reload can see them
    fx.seed_tags(&["brunch"]);
    fx.backend.drop_channels();
    assert!(wait_until(|| tags.value() == Some(strings(&["brunch"]))));
}

#[test]
fn retry_policy_is_configurable_per_resource() {
    let fx = Fixture::new();
    let mut view = ViewScope::new("tags");
    let tags = ResourceBuilder::new(ResourceIdentity::new("tags", USER), tag_names(fx.store.clone()))
        .retry(fast_retry().with_max_retries(0))
        .lazy()
        .mount(&mut view)
        .unwrap();
    assert_eq!(tags.value(), None);

    fx.backend.fail_reads(1);
    assert!(tags.reload().is_err());
    assert_eq!(tags.reconcile_stats().attempts, 1);
    assert!(tags.reload().is_ok());
}

#[test]
fn vendor_errors_retry_only_when_rate_limited() {
    let mut view = ViewScope::new("quota");
    let billing = ResourceBuilder::new(ResourceIdentity::new("billing", USER), || -> Result<u32, SyncError> {
        Err(VendorError::new(402, "credits exhausted").into())
    })
    .retry(RetryPolicy::new(3, Duration::from_millis(5)))
    .mount(&mut view)
    .unwrap();
    assert_eq!(billing.reconcile_stats().attempts, 1);
    assert_eq!(
        billing.snapshot().last_error,
        Some(SyncError::Vendor(VendorError::new(402, "credits exhausted")))
    );

    let speech = ResourceBuilder::new(ResourceIdentity::new("speech", USER), || -> Result<u32, SyncError> {
        Err(VendorError::new(429, "slow down").into())
    })
    .retry(RetryPolicy::new(3, Duration::from_millis(5)))
    .mount(&mut view)
    .unwrap();
    assert_eq!(speech.reconcile_stats().attempts, 4);
}
