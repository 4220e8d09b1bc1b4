use std::time::Duration;

use cuizly_sync::{
    ChannelSpec, ChannelState, ResourceBuilder, ResourceIdentity, SyncError, ViewScope,
};

use crate::support::{tag_names, wait_until, Fixture, USER};

#[test]
fn mount_unmount_cycles_leave_no_open_channels() {
    let fx = Fixture::new();
    let baseline = fx.backend.open_channels();

    for round in 0..25 {
        let mut view = ViewScope::new(format!("page-{}", round));
        fx.mount_tags(&mut view);
        ResourceBuilder::new(
            ResourceIdentity::new("tags", USER).with_sub_filter("recent"),
            tag_names(fx.store.clone()),
        )
        .subscribe(&fx.manager, ChannelSpec::new("tags"))
        .poll_every(Duration::from_millis(5))
        .mount(&mut view)
        .unwrap();
        assert_eq!(fx.backend.open_channels(), baseline + 2);
        // drop on scope exit
    }

    assert_eq!(fx.backend.open_channels(), baseline);
    assert_eq!(fx.manager.opened(), 50);
    assert_eq!(fx.manager.closed(), 50);
    assert_eq!(fx.manager.active(), 0);
}

#[test]
fn teardown_runs_on_error_paths() {
    let fx = Fixture::new();

    let result: Result<(), SyncError> = (|| {
        let mut view = ViewScope::new("page");
        fx.mount_tags(&mut view);
        ResourceBuilder::new(ResourceIdentity::new("tags", USER), tag_names(fx.store.clone()))
            .subscribe(&fx.manager, ChannelSpec::new("tags"))
            .mount(&mut view)?;
        Ok(())
    })();

    assert!(matches!(result, Err(SyncError::AlreadyMounted { .. })));
    assert_eq!(fx.backend.open_channels(), 0);
    assert_eq!(fx.manager.active(), 0);
}

#[test]
fn channel_recovers_after_transport_loss() {
    let fx = Fixture::new();
    let mut view = ViewScope::new("page");
    let tags = fx.mount_tags(&mut view);
    let identity = tags.identity().clone();
    assert_eq!(view.channel_state(&identity), Some(ChannelState::Subscribed));

    fx.backend.drop_channels();
    assert!(wait_until(|| fx.manager.opened() == 2
        && view.channel_state(&identity) == Some(ChannelState::Subscribed)));
    assert_eq!(fx.backend.open_channels(), 1);

    let stats = view.release(&identity).unwrap();
    let subscription = stats.subscription.unwrap();
    assert_eq!(subscription.reconnects, 1);
    assert!(subscription.errors >= 1);
    assert_eq!(fx.backend.open_channels(), 0);
}

#[test]
fn unmounted_resource_keeps_last_value_but_stops_updating() {
    let fx = Fixture::new();
    fx.seed_tags(&["vegan"]);
    let mut view = ViewScope::new("page");
    let tags = fx.mount_tags(&mut view);
    view.unmount();

    assert!(!tags.is_mounted());
    let version = tags.snapshot().version;
    fx.seed_tags(&["halal"]);
    assert!(tags.reload().is_ok());
    assert_eq!(tags.snapshot().version, version);
    assert_eq!(tags.value().map(|v| v.len()), Some(1));
}
