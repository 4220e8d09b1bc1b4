//! In-app notifications, newest first.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::SyncContext;
use crate::error::SyncError;
use crate::filter::{Filter, Query};
use crate::mutation::Mutation;
use crate::resource::{Resource, ResourceBuilder, ResourceIdentity};
use crate::store::{ChangeEvent, ChangeKind, RemoteStore, Row, TablesExt};
use crate::view::ViewScope;
use crate::TableRow;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TableRow)]
#[row(table = "notifications")]
pub struct Notification {
    #[serde(default)]
    pub id: String,
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub created_at: u64,
}

/// Cached feed: items ordered by `created_at` descending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationFeed {
    pub items: Vec<Notification>,
    pub unread_count: usize,
}

impl NotificationFeed {
    pub fn new(items: Vec<Notification>) -> Self {
        let unread_count = items.iter().filter(|n| !n.is_read).count();
        NotificationFeed {
            items,
            unread_count,
        }
    }

    pub fn get(&self, id: &str) -> Option<&Notification> {
        self.items.iter().find(|n| n.id == id)
    }

    fn map(&self, f: impl Fn(&Notification) -> Notification) -> Self {
        Self::new(self.items.iter().map(f).collect())
    }

    fn without(&self, id: &str) -> Self {
        Self::new(self.items.iter().filter(|n| n.id != id).cloned().collect())
    }
}

/// Apply a push event to the feed in place. `None` asks for a reload.
fn patch_feed(feed: &NotificationFeed, event: &ChangeEvent) -> Option<NotificationFeed> {
    match event.kind {
        ChangeKind::Insert => {
            let incoming: Notification = event.new.as_ref()?.decode().ok()?;
            let mut items = vec![incoming.clone()];
            items.extend(feed.items.iter().filter(|n| n.id != incoming.id).cloned());
            Some(NotificationFeed::new(items))
        }
        ChangeKind::Update => {
            let incoming: Notification = event.new.as_ref()?.decode().ok()?;
            feed.get(&incoming.id)?;
            Some(feed.map(|n| {
                if n.id == incoming.id {
                    incoming.clone()
                } else {
                    n.clone()
                }
            }))
        }
        ChangeKind::Delete => {
            let id = event.row_id()?;
            feed.get(id)?;
            Some(feed.without(id))
        }
    }
}

/// The user's notifications. Push events carrying the full row are
/// patched in; anything else triggers a reload.
pub struct Notifications<S> {
    resource: Resource<NotificationFeed>,
    store: Arc<S>,
    user_id: String,
}

impl<S: RemoteStore + 'static> Notifications<S> {
    pub fn mount(ctx: &SyncContext<S>, scope: &mut ViewScope) -> Result<Self, SyncError> {
        let identity = ResourceIdentity::new("notifications", ctx.user_id());
        let query = Query::new(Notification::TABLE)
            .filter(ctx.owned_by_user(Notification::TABLE)?)?
            .order_desc("created_at");

        let store = Arc::clone(ctx.store());
        let resource = ResourceBuilder::new(identity, move || {
            let items = store.table::<Notification>().find(&query)?;
            Ok(NotificationFeed::new(items))
        })
        .patch(patch_feed)
        .subscribe(ctx.subscriptions(), ctx.owned_channel(Notification::TABLE)?)
        .poll_maybe(ctx.config().notifications_poll())
        .retry(ctx.config().retry)
        .mount(scope)?;

        Ok(Notifications {
            resource,
            store: Arc::clone(ctx.store()),
            user_id: ctx.user_id().to_string(),
        })
    }

    pub fn resource(&self) -> &Resource<NotificationFeed> {
        &self.resource
    }

    pub fn feed(&self) -> NotificationFeed {
        self.resource.value().unwrap_or_default()
    }

    pub fn items(&self) -> Vec<Notification> {
        self.feed().items
    }

    pub fn unread_count(&self) -> usize {
        self.feed().unread_count
    }

    pub fn mark_read(&self, id: &str) -> Result<(), SyncError> {
        let target = id.to_string();
        let id = id.to_string();
        let store = Arc::clone(&self.store);
        self.resource.mutate(Mutation::new(
            format!("mark notification {} read", id),
            move |feed: &NotificationFeed| {
                feed.map(|n| {
                    let mut n = n.clone();
                    if n.id == target {
                        n.is_read = true;
                    }
                    n
                })
            },
            move |_| {
                store
                    .table::<Notification>()
                    .update(&id, Row::new().with("is_read", true))?;
                Ok(())
            },
        ))
    }

    pub fn mark_all_read(&self) -> Result<(), SyncError> {
        let store = Arc::clone(&self.store);
        let user_id = self.user_id.clone();
        self.resource.mutate(Mutation::new(
            "mark all notifications read",
            |feed: &NotificationFeed| {
                feed.map(|n| Notification {
                    is_read: true,
                    ..n.clone()
                })
            },
            move |_| {
                let table = store.table::<Notification>();
                let mine = table
                    .query()
                    .filter(Filter::eq(Notification::TABLE, "user_id", user_id.as_str())?)?;
                let rows: Vec<Notification> =
                    table.find(&mine)?.into_iter().filter(|n| !n.is_read).collect();
                trace!(user_id = %user_id, count = rows.len(), "marking notifications read");
                for row in rows {
                    table.update(&row.id, Row::new().with("is_read", true))?;
                }
                Ok(())
            },
        ))
    }

    pub fn remove(&self, id: &str) -> Result<(), SyncError> {
        let target = id.to_string();
        let id = id.to_string();
        let store = Arc::clone(&self.store);
        self.resource.mutate(Mutation::new(
            format!("remove notification {}", id),
            move |feed: &NotificationFeed| feed.without(&target),
            move |_| {
                store.table::<Notification>().delete(&id)?;
                Ok(())
            },
        ))
    }
}
