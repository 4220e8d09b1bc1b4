//! The application's synchronized resources.
//!
//! | resource        | table           | mount load | push                  | poll  |
//! |-----------------|-----------------|------------|-----------------------|-------|
//! | [`Favorites`]   | `favorites`     | yes        | reload                | no    |
//! | [`Notifications`] | `notifications` | yes      | patch (full row)      | no    |
//! | [`ProfileResource`] | `profiles`  | yes        | patch (full row)      | 60 s  |
//!
//! Every resource reads and writes through a session-scoped
//! [`RemoteStore`]; row-level policies on the backend decide what the
//! session may see.

mod favorites;
mod notifications;
mod profile;

use std::sync::Arc;

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::filter::Filter;
use crate::session::Session;
use crate::store::{ChannelSpec, RemoteStore};
use crate::subscription::SubscriptionManager;

pub use favorites::{FavoriteRow, Favorites};
pub use notifications::{Notification, NotificationFeed, Notifications};
pub use profile::{Profile, ProfilePatch, ProfileResource};

/// Everything a resource needs to mount: the session-scoped store, the
/// session, a subscription manager and the configuration.
pub struct SyncContext<S> {
    store: Arc<S>,
    session: Session,
    subscriptions: SubscriptionManager,
    config: SyncConfig,
}

impl<S> Clone for SyncContext<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            session: self.session.clone(),
            subscriptions: self.subscriptions.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: RemoteStore + 'static> SyncContext<S> {
    pub fn new(store: S, session: Session) -> Self {
        Self::with_config(store, session, SyncConfig::default())
    }

    pub fn with_config(store: S, session: Session, config: SyncConfig) -> Self {
        let store = Arc::new(store);
        let subscriptions = config.subscription_manager(Arc::clone(&store));
        SyncContext {
            store,
            session,
            subscriptions,
            config,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn user_id(&self) -> &str {
        &self.session.user_id
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// `<column> = <current user>` on `table`.
    pub(crate) fn owned_by_user(&self, table: &str) -> Result<Filter, SyncError> {
        Ok(Filter::eq(table, "user_id", self.user_id())?)
    }

    /// A channel on `table` restricted to the current user's rows.
    pub(crate) fn owned_channel(&self, table: &str) -> Result<ChannelSpec, SyncError> {
        Ok(ChannelSpec::new(table).with_filter(self.owned_by_user(table)?)?)
    }
}
