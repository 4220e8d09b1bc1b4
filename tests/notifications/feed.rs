use cuizly_sync::resources::Notifications;
use cuizly_sync::{FaultPlan, Row, RowStore, ViewScope};

use crate::support::{backend, context, notification, server, wait_until};

#[test]
fn pushed_insert_lands_at_head_and_counts_once() {
    let backend = backend();
    backend
        .seed(
            "notifications",
            [notification("older", true), notification("old", false)],
        )
        .unwrap();
    let ctx = context(&backend);
    let mut view = ViewScope::new("notifications");
    let notifications = Notifications::mount(&ctx, &mut view).unwrap();

    let feed = notifications.feed();
    assert_eq!(feed.items[0].title, "old");
    assert_eq!(feed.unread_count, 1);
    let reloads = notifications.resource().reconcile_stats().reloads;

    let inserted = server(&backend)
        .insert("notifications", notification("table ready", false))
        .unwrap();

    assert!(wait_until(|| notifications.items().len() == 3));
    let feed = notifications.feed();
    assert_eq!(feed.unread_count, 2);
    assert_eq!(Some(feed.items[0].id.as_str()), inserted.id());
    assert_eq!(feed.items[0].title, "table ready");

    // patched in place, no reload
    let stats = notifications.resource().reconcile_stats();
    assert_eq!(stats.patches, 1);
    assert_eq!(stats.reloads, reloads);
}

#[test]
fn mark_read_and_mark_all_read() {
    let backend = backend();
    backend
        .seed(
            "notifications",
            [
                notification("a", false),
                notification("b", false),
                notification("c", false),
            ],
        )
        .unwrap();
    let ctx = context(&backend);
    let mut view = ViewScope::new("notifications");
    let notifications = Notifications::mount(&ctx, &mut view).unwrap();
    assert_eq!(notifications.unread_count(), 3);

    let first = notifications.items()[0].id.clone();
    notifications.mark_read(&first).unwrap();
    assert_eq!(notifications.unread_count(), 2);

    notifications.mark_all_read().unwrap();
    assert_eq!(notifications.unread_count(), 0);
    assert!(backend
        .rows("notifications")
        .iter()
        .all(|row| row.get("is_read") == Some(&serde_json::Value::Bool(true))));
}

#[test]
fn failed_mark_read_restores_unread_count() {
    let backend = backend();
    backend
        .seed("notifications", [notification("a", false)])
        .unwrap();
    let ctx = context(&backend);
    let mut view = ViewScope::new("notifications");
    let notifications = Notifications::mount(&ctx, &mut view).unwrap();

    backend.set_faults(FaultPlan::new().fail_writes(1));
    let id = notifications.items()[0].id.clone();
    assert!(notifications.mark_read(&id).is_err());
    assert_eq!(notifications.unread_count(), 1);
    assert!(notifications.resource().snapshot().last_error.is_some());
}

#[test]
fn remove_and_remote_delete() {
    let backend = backend();
    backend
        .seed(
            "notifications",
            [notification("a", false), notification("b", true)],
        )
        .unwrap();
    let ctx = context(&backend);
    let mut view = ViewScope::new("notifications");
    let notifications = Notifications::mount(&ctx, &mut view).unwrap();

    let newest = notifications.items()[0].id.clone();
    notifications.remove(&newest).unwrap();
    assert_eq!(notifications.items().len(), 1);
    assert_eq!(backend.rows("notifications").len(), 1);

    let last = notifications.items()[0].id.clone();
    server(&backend).delete("notifications", &last).unwrap();
    assert!(wait_until(|| notifications.items().is_empty()));
}

#[test]
fn update_from_server_is_patched() {
    let backend = backend();
    let ctx = context(&backend);
    let mut view = ViewScope::new("notifications");
    let notifications = Notifications::mount(&ctx, &mut view).unwrap();

    let row = server(&backend)
        .insert("notifications", notification("a", false))
        .unwrap();
    assert!(wait_until(|| notifications.unread_count() == 1));

    let id = row.id().unwrap_or_default().to_string();
    server(&backend)
        .update("notifications", &id, Row::new().with("is_read", true))
        .unwrap();
    assert!(wait_until(|| notifications.unread_count() == 0));
    assert_eq!(notifications.items().len(), 1);
}
