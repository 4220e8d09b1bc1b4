use std::sync::{Arc, Mutex};
use std::time::Duration;

use cuizly_sync::{
    FaultPlan, LoadOutcome, MutationState, ResourceBuilder, ResourceIdentity, SlotSnapshot,
    StoreError, SyncError, ViewScope,
};

use crate::support::{remote_tags, strings, tag_names, toggle_tag, wait_until, Fixture, USER};

#[test]
fn failed_mutation_rolls_back_to_previous_value() {
    let fx = Fixture::new();
    fx.seed_tags(&["vegan"]);
    let mut view = ViewScope::new("tags");
    let tags = fx.mount_tags(&mut view);

    fx.backend
        .set_faults(FaultPlan::new().fail_writes(1).write_latency(Duration::from_millis(30)));
    let handle = tags.submit(toggle_tag(&fx.store, "halal"));
    assert_eq!(tags.value(), Some(strings(&["vegan", "halal"])));

    let err = handle.wait().unwrap_err();
    assert!(matches!(err, SyncError::Store(StoreError::Network(_))));

    let snap = tags.snapshot();
    assert_eq!(snap.value, Some(strings(&["vegan"])));
    assert_eq!(snap.last_error, Some(err));
    assert!(!snap.is_loading);
    assert_eq!(tags.mutation_stats().failed, 1);
    assert_eq!(tags.mutation_state(), MutationState::Idle);
}

#[test]
fn rapid_double_toggle_ends_in_last_intent() {
    let fx = Fixture::new();
    fx.seed_tags(&["vegan"]);
    let mut view = ViewScope::new("tags");
    let tags = fx.mount_tags(&mut view);

    fx.backend
        .set_faults(FaultPlan::new().write_latency(Duration::from_millis(30)));
    let on = tags.submit(toggle_tag(&fx.store, "halal"));
    let off = tags.submit(toggle_tag(&fx.store, "halal"));
    assert_eq!(
        tags.mutation_state(),
        MutationState::MutatingQueued { waiting: 1 }
    );

    on.wait().unwrap();
    off.wait().unwrap();

    assert_eq!(remote_tags(&fx.backend), strings(&["vegan"]));
    assert!(wait_until(|| tags.value() == Some(strings(&["vegan"]))));
    assert_eq!(tags.mutation_stats().applied, 2);
}

#[test]
fn queued_mutations_apply_in_issue_order() {
    let fx = Fixture::new();
    let mut view = ViewScope::new("tags");
    let tags = fx.mount_tags(&mut view);

    fx.backend
        .set_faults(FaultPlan::new().write_latency(Duration::from_millis(10)));
    let handles: Vec<_> = ["a", "b", "c", "a"]
        .iter()
        .map(|name| tags.submit(toggle_tag(&fx.store, name)))
        .collect();
    for handle in handles {
        handle.wait().unwrap();
    }

    assert_eq!(remote_tags(&fx.backend), strings(&["b", "c"]));
    assert!(wait_until(|| tags.value() == Some(strings(&["b", "c"]))));
}

#[test]
fn mutations_after_unmount_are_detached() {
    let fx = Fixture::new();
    let mut view = ViewScope::new("tags");
    let tags = fx.mount_tags(&mut view);

    fx.backend
        .set_faults(FaultPlan::new().write_latency(Duration::from_millis(30)));
    let first = tags.submit(toggle_tag(&fx.store, "a"));
    let second = tags.submit(toggle_tag(&fx.store, "b"));
    view.unmount();

    assert!(first.wait().is_ok());
    assert!(matches!(second.wait(), Err(SyncError::Detached { .. })));
    assert_eq!(remote_tags(&fx.backend), strings(&["a"]));
    assert_eq!(tags.mutation_stats().detached, 1);
}

#[test]
fn reload_during_remote_write_does_not_revert_optimistic_value() {
    let fx = Fixture::new();
    fx.seed_tags(&["vegan"]);
    let mut view = ViewScope::new("tags");
    // no push channel: nothing would repair a lost update
    let tags = ResourceBuilder::new(ResourceIdentity::new("tags", USER), tag_names(fx.store.clone()))
        .mount(&mut view)
        .unwrap();

    fx.backend
        .set_faults(FaultPlan::new().write_latency(Duration::from_millis(200)));
    let handle = tags.submit(toggle_tag(&fx.store, "halal"));

    assert_eq!(tags.reload(), Ok(LoadOutcome::Stale));
    assert_eq!(tags.value(), Some(strings(&["vegan", "halal"])));

    handle.wait().unwrap();
    assert_eq!(remote_tags(&fx.backend), strings(&["vegan", "halal"]));
    assert_eq!(tags.value(), Some(strings(&["vegan", "halal"])));
    assert_eq!(tags.reload(), Ok(LoadOutcome::Accepted));
    assert_eq!(tags.value(), Some(strings(&["vegan", "halal"])));
}

#[test]
fn failure_after_unmount_leaves_slot_alone() {
    let fx = Fixture::new();
    fx.seed_tags(&["vegan"]);
    let mut view = ViewScope::new("tags");
    let tags = fx.mount_tags(&mut view);

    fx.backend
        .set_faults(FaultPlan::new().fail_writes(1).write_latency(Duration::from_millis(50)));
    let handle = tags.submit(toggle_tag(&fx.store, "halal"));

    let notified = Arc::new(Mutex::new(0));
    let sink = Arc::clone(&notified);
    tags.on_change(move |_: &SlotSnapshot<Vec<String>>| *sink.lock().unwrap() += 1);
    view.unmount();

    let err = handle.wait().unwrap_err();
    assert!(matches!(err, SyncError::Store(StoreError::Network(_))));

    let snap = tags.snapshot();
    assert_eq!(snap.last_error, None);
    assert_eq!(snap.value, Some(strings(&["vegan", "halal"])));
    assert_eq!(*notified.lock().unwrap(), 0);
    assert_eq!(tags.mutation_stats().detached, 1);
    assert_eq!(tags.mutation_stats().failed, 0);
}
