use std::time::Duration;

use cuizly_sync::resources::{FavoriteRow, Favorites};
use cuizly_sync::{FaultPlan, SyncError, TablesExt, ViewScope};

use crate::support::{backend, context, favorite, ids, wait_until, USER};

#[test]
fn failed_toggle_reverts_and_reports() {
    let backend = backend();
    backend.seed("favorites", [favorite(USER, "r1")]).unwrap();
    let ctx = context(&backend, USER);
    let mut view = ViewScope::new("favorites");
    let favorites = Favorites::mount(&ctx, &mut view).unwrap();
    assert_eq!(favorites.ids(), ids(&["r1"]));

    backend.set_faults(
        FaultPlan::new()
            .fail_writes(1)
            .write_latency(Duration::from_millis(30)),
    );
    let pending = favorites.submit_toggle("r2");
    assert_eq!(favorites.ids(), ids(&["r1", "r2"]));
    assert!(favorites.is_favorite("r2"));

    assert!(pending.wait().is_err());
    let snap = favorites.resource().snapshot();
    assert_eq!(snap.value, Some(ids(&["r1"])));
    assert!(snap.last_error.is_some());
}

#[test]
fn toggle_round_trip_reaches_the_store() {
    let backend = backend();
    let ctx = context(&backend, USER);
    let mut view = ViewScope::new("favorites");
    let favorites = Favorites::mount(&ctx, &mut view).unwrap();

    favorites.toggle("r1").unwrap();
    favorites.toggle("r2").unwrap();
    assert_eq!(ctx.store().table::<FavoriteRow>().all().unwrap().len(), 2);

    favorites.toggle("r1").unwrap();
    let remaining: Vec<String> = ctx
        .store()
        .table::<FavoriteRow>()
        .all()
        .unwrap()
        .into_iter()
        .map(|f| f.restaurant_id)
        .collect();
    assert_eq!(remaining, ids(&["r2"]));
    assert!(wait_until(|| favorites.ids() == ids(&["r2"])));
}

#[test]
fn duplicate_insert_is_treated_as_success() {
    let backend = backend();
    let ctx = context(&backend, USER);
    let mut view = ViewScope::new("favorites");
    let favorites = Favorites::mount(&ctx, &mut view).unwrap();

    // another device favorited r1 while our push channel was down
    backend.seed("favorites", [favorite(USER, "r1")]).unwrap();
    assert!(favorites.toggle("r1").is_ok());
    assert_eq!(backend.rows("favorites").len(), 1);
    assert!(favorites.is_favorite("r1"));
}

#[test]
fn push_from_another_device_reloads() {
    let backend = backend();
    let ctx = context(&backend, USER);
    let other_device = context(&backend, USER);
    let mut view = ViewScope::new("favorites");
    let favorites = Favorites::mount(&ctx, &mut view).unwrap();

    let mut other_view = ViewScope::new("favorites-tablet");
    let tablet = Favorites::mount(&other_device, &mut other_view).unwrap();
    tablet.toggle("r9").unwrap();

    assert!(wait_until(|| favorites.ids() == ids(&["r9"])));
}

#[test]
fn other_users_rows_stay_invisible() {
    let backend = backend();
    backend
        .seed(
            "favorites",
            [favorite("user-2", "r5"), favorite(USER, "r1")],
        )
        .unwrap();
    let ctx = context(&backend, USER);
    let mut view = ViewScope::new("favorites");
    let favorites = Favorites::mount(&ctx, &mut view).unwrap();
    assert_eq!(favorites.ids(), ids(&["r1"]));

    let stranger = context(&backend, "user-2");
    let mut stranger_view = ViewScope::new("favorites");
    let theirs = Favorites::mount(&stranger, &mut stranger_view).unwrap();
    theirs.toggle("r6").unwrap();

    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(favorites.ids(), ids(&["r1"]));
}

#[test]
fn expired_session_cannot_mount() {
    let backend = backend();
    let session = cuizly_sync::Session::new(USER, "t").with_expiry(1);
    let ctx = cuizly_sync::SyncContext::with_config(
        backend.connect(session.clone()),
        session,
        crate::support::test_config(),
    );
    let mut view = ViewScope::new("favorites");
    let result = Favorites::mount(&ctx, &mut view);
    // the push channel refuses an expired session
    assert!(matches!(
        result.err(),
        Some(SyncError::Store(cuizly_sync::StoreError::Unauthorized))
    ));
}
