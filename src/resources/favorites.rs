//! Favorite restaurants of the signed-in user.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::SyncContext;
use crate::error::SyncError;
use crate::filter::{Filter, Query};
use crate::mutation::{Mutation, MutationHandle};
use crate::resource::{Resource, ResourceBuilder, ResourceIdentity};
use crate::store::{RemoteStore, Row, RowStore, StoreError, TablesExt};
use crate::view::ViewScope;
use crate::TableRow;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TableRow)]
#[row(table = "favorites")]
pub struct FavoriteRow {
    #[serde(default)]
    pub id: String,
    pub user_id: String,
    pub restaurant_id: String,
    #[serde(default)]
    pub created_at: u64,
}

/// The user's favorite restaurant ids, oldest first.
///
/// Loaded on mount and reloaded on every push event for the user's rows;
/// no polling unless configured.
pub struct Favorites<S> {
    resource: Resource<Vec<String>>,
    store: Arc<S>,
    user_id: String,
}

impl<S: RemoteStore + 'static> Favorites<S> {
    pub fn mount(ctx: &SyncContext<S>, scope: &mut ViewScope) -> Result<Self, SyncError> {
        let identity = ResourceIdentity::new("favorites", ctx.user_id());
        let query = Query::new(FavoriteRow::TABLE)
            .filter(ctx.owned_by_user(FavoriteRow::TABLE)?)?
            .order_asc("created_at");

        let store = Arc::clone(ctx.store());
        let resource = ResourceBuilder::new(identity, move || {
            let rows = store.table::<FavoriteRow>().find(&query)?;
            Ok(rows.into_iter().map(|r| r.restaurant_id).collect())
        })
        .subscribe(ctx.subscriptions(), ctx.owned_channel(FavoriteRow::TABLE)?)
        .poll_maybe(ctx.config().favorites_poll())
        .retry(ctx.config().retry)
        .mount(scope)?;

        Ok(Favorites {
            resource,
            store: Arc::clone(ctx.store()),
            user_id: ctx.user_id().to_string(),
        })
    }

    pub fn resource(&self) -> &Resource<Vec<String>> {
        &self.resource
    }

    pub fn ids(&self) -> Vec<String> {
        self.resource.value().unwrap_or_default()
    }

    pub fn is_favorite(&self, restaurant_id: &str) -> bool {
        self.ids().iter().any(|id| id == restaurant_id)
    }

    /// Add or remove `restaurant_id` and wait for the remote write.
    pub fn toggle(&self, restaurant_id: &str) -> Result<(), SyncError> {
        self.resource.mutate(self.toggle_mutation(restaurant_id))
    }

    /// Queue a toggle; the slot shows the new membership right away.
    pub fn submit_toggle(&self, restaurant_id: &str) -> MutationHandle {
        self.resource.submit(self.toggle_mutation(restaurant_id))
    }

    fn toggle_mutation(&self, restaurant_id: &str) -> Mutation<Vec<String>> {
        let target = restaurant_id.to_string();
        let restaurant_id = restaurant_id.to_string();
        let user_id = self.user_id.clone();
        let store = Arc::clone(&self.store);

        Mutation::new(
            format!("toggle favorite {}", restaurant_id),
            move |ids: &Vec<String>| toggled(ids, &target),
            move |ids: &Vec<String>| {
                if ids.contains(&restaurant_id) {
                    remove_favorite(store.as_ref(), &user_id, &restaurant_id)
                } else {
                    add_favorite(store.as_ref(), &user_id, &restaurant_id)
                }
            },
        )
    }
}

fn toggled(ids: &[String], restaurant_id: &str) -> Vec<String> {
    if ids.iter().any(|id| id == restaurant_id) {
        ids.iter().filter(|id| *id != restaurant_id).cloned().collect()
    } else {
        let mut next = ids.to_vec();
        next.push(restaurant_id.to_string());
        next
    }
}

fn add_favorite<S: RemoteStore + ?Sized>(
    store: &S,
    user_id: &str,
    restaurant_id: &str,
) -> Result<(), SyncError> {
    // id and created_at are assigned by the store
    let row = Row::new()
        .with("user_id", user_id)
        .with("restaurant_id", restaurant_id);
    match store.insert(FavoriteRow::TABLE, row) {
        Ok(_) => Ok(()),
        // already a favorite remotely: the intent holds
        Err(StoreError::Constraint { .. }) => {
            debug!(user_id, restaurant_id, "favorite already present");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

fn remove_favorite<S: RemoteStore + ?Sized>(
    store: &S,
    user_id: &str,
    restaurant_id: &str,
) -> Result<(), SyncError> {
    let table = store.table::<FavoriteRow>();
    let query = table
        .query()
        .filter(Filter::eq(FavoriteRow::TABLE, "user_id", user_id)?)?
        .filter(Filter::eq(FavoriteRow::TABLE, "restaurant_id", restaurant_id)?)?;
    for row in table.find(&query)? {
        table.delete(&row.id)?;
    }
    Ok(())
}
