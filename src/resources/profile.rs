//! The signed-in user's profile.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::SyncContext;
use crate::error::SyncError;
use crate::filter::{Filter, Query};
use crate::mutation::Mutation;
use crate::resource::{Resource, ResourceBuilder, ResourceIdentity};
use crate::storage::ObjectStorage;
use crate::store::{ChangeEvent, ChangeKind, RemoteStore, Row, TablesExt};
use crate::view::ViewScope;
use crate::TableRow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TableRow)]
#[row(table = "profiles")]
pub struct Profile {
    #[serde(default)]
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub preferences: Value,
}

impl Profile {
    fn blank(user_id: &str) -> Self {
        Profile {
            id: String::new(),
            user_id: user_id.to_string(),
            full_name: None,
            phone: None,
            avatar_url: None,
            preferences: Value::Null,
        }
    }

    /// This profile with every field set in `patch` replaced.
    pub fn apply(&self, patch: &ProfilePatch) -> Profile {
        let mut next = self.clone();
        if let Some(full_name) = &patch.full_name {
            next.full_name = Some(full_name.clone());
        }
        if let Some(phone) = &patch.phone {
            next.phone = Some(phone.clone());
        }
        if let Some(avatar_url) = &patch.avatar_url {
            next.avatar_url = Some(avatar_url.clone());
        }
        if let Some(preferences) = &patch.preferences {
            next.preferences = preferences.clone();
        }
        next
    }
}

/// Partial profile update. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferences: Option<Value>,
}

impl ProfilePatch {
    pub fn full_name(mut self, full_name: impl Into<String>) -> Self {
        self.full_name = Some(full_name.into());
        self
    }

    pub fn phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn avatar_url(mut self, url: impl Into<String>) -> Self {
        self.avatar_url = Some(url.into());
        self
    }

    pub fn preferences(mut self, preferences: Value) -> Self {
        self.preferences = Some(preferences);
        self
    }
}

fn patch_profile(current: &Option<Profile>, event: &ChangeEvent) -> Option<Option<Profile>> {
    match event.kind {
        ChangeKind::Insert | ChangeKind::Update => {
            let profile: Profile = event.new.as_ref()?.decode().ok()?;
            Some(Some(profile))
        }
        ChangeKind::Delete => {
            let id = event.row_id()?;
            match current {
                Some(profile) if profile.id == id => Some(None),
                _ => None,
            }
        }
    }
}

/// Extension used for the avatar object key.
fn avatar_extension(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        _ => "bin",
    }
}

/// Profile of the current user; `None` until the user has one. Polled
/// as well as pushed, since profile rows are also edited server-side.
pub struct ProfileResource<S> {
    resource: Resource<Option<Profile>>,
    store: Arc<S>,
    user_id: String,
}

impl<S: RemoteStore + 'static> ProfileResource<S> {
    pub fn mount(ctx: &SyncContext<S>, scope: &mut ViewScope) -> Result<Self, SyncError> {
        let identity = ResourceIdentity::new("profile", ctx.user_id());
        let query = Query::new(Profile::TABLE)
            .filter(ctx.owned_by_user(Profile::TABLE)?)?
            .limit(1);

        let store = Arc::clone(ctx.store());
        let resource = ResourceBuilder::new(identity, move || {
            let mut rows = store.table::<Profile>().find(&query)?;
            Ok(rows.pop())
        })
        .patch(patch_profile)
        .subscribe(ctx.subscriptions(), ctx.owned_channel(Profile::TABLE)?)
        .poll_maybe(ctx.config().profile_poll())
        .retry(ctx.config().retry)
        .mount(scope)?;

        Ok(ProfileResource {
            resource,
            store: Arc::clone(ctx.store()),
            user_id: ctx.user_id().to_string(),
        })
    }

    pub fn resource(&self) -> &Resource<Option<Profile>> {
        &self.resource
    }

    pub fn profile(&self) -> Option<Profile> {
        self.resource.value().flatten()
    }

    /// Apply `patch` locally, then update the profile row, creating it if
    /// the user has none yet.
    pub fn update(&self, patch: ProfilePatch) -> Result<(), SyncError> {
        let user_id = self.user_id.clone();
        let store = Arc::clone(&self.store);
        let optimistic = patch.clone();
        let owner = self.user_id.clone();

        self.resource.mutate(Mutation::new(
            "update profile",
            move |current: &Option<Profile>| {
                let base = current.clone().unwrap_or_else(|| Profile::blank(&owner));
                Some(base.apply(&optimistic))
            },
            move |_| write_profile(store.as_ref(), &user_id, &patch),
        ))
    }

    /// Upload a new avatar to the `avatars` bucket and point the profile at
    /// it. Returns the public URL.
    pub fn upload_avatar(
        &self,
        storage: &dyn ObjectStorage,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, SyncError> {
        let path = format!("{}/avatar.{}", self.user_id, avatar_extension(content_type));
        let url = storage.upload(&path, bytes, content_type)?;
        debug!(user_id = %self.user_id, path = %path, "avatar uploaded");
        self.update(ProfilePatch::default().avatar_url(url.clone()))?;
        Ok(url)
    }
}

fn write_profile<S: RemoteStore + ?Sized>(
    store: &S,
    user_id: &str,
    patch: &ProfilePatch,
) -> Result<(), SyncError> {
    let table = store.table::<Profile>();
    let mine = table
        .query()
        .filter(Filter::eq(Profile::TABLE, "user_id", user_id)?)?
        .limit(1);
    match table.find(&mine)?.pop() {
        Some(existing) => {
            table.update(&existing.id, Row::encode(patch)?)?;
        }
        None => {
            table.insert(&Profile::blank(user_id).apply(patch))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn apply_only_touches_set_fields() {
        let profile = Profile {
            full_name: Some("Ada".into()),
            phone: Some("514".into()),
            ..Profile::blank("u1")
        };
        let next = profile.apply(&ProfilePatch::default().phone("438"));
        assert_eq!(next.full_name.as_deref(), Some("Ada"));
        assert_eq!(next.phone.as_deref(), Some("438"));
    }

    #[test]
    fn patch_serializes_only_set_fields() {
        let row = Row::encode(&ProfilePatch::default().preferences(json!({"lang": "fr"}))).unwrap();
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["preferences"]);
    }

    #[test]
    fn avatar_extensions() {
        assert_eq!(avatar_extension("image/png"), "png");
        assert_eq!(avatar_extension("image/jpeg"), "jpg");
        assert_eq!(avatar_extension("image/webp"), "webp");
        assert_eq!(avatar_extension("application/octet-stream"), "bin");
    }

    #[test]
    fn delete_of_current_profile_clears_it() {
        let current = Some(Profile {
            id: "profiles-1".into(),
            ..Profile::blank("u1")
        });
        let event = ChangeEvent {
            seq: 3,
            table: "profiles".into(),
            kind: ChangeKind::Delete,
            new: None,
            old: Some(Row::new().with("id", "profiles-1")),
        };
        assert_eq!(patch_profile(&current, &event), Some(None));
        assert_eq!(patch_profile(&None, &event), None);
    }
}
