use std::time::Duration;

use cuizly_sync::resources::{ProfilePatch, ProfileResource};
use cuizly_sync::{InMemoryBucket, ObjectStorage, Row, ViewScope};
use serde_json::json;

use crate::support::{backend, context, wait_until, USER};

#[test]
fn first_update_creates_the_row() {
    let backend = backend();
    let ctx = context(&backend, None);
    let mut view = ViewScope::new("settings");
    let profile = ProfileResource::mount(&ctx, &mut view).unwrap();
    assert_eq!(profile.profile(), None);

    profile
        .update(ProfilePatch::default().full_name("Ada Tremblay"))
        .unwrap();
    assert_eq!(
        profile.profile().and_then(|p| p.full_name),
        Some("Ada Tremblay".to_string())
    );
    assert_eq!(backend.rows("profiles").len(), 1);

    profile
        .update(ProfilePatch::default().preferences(json!({ "language": "fr" })))
        .unwrap();
    let rows = backend.rows("profiles");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_str("full_name"), Some("Ada Tremblay"));
    assert_eq!(rows[0].get("preferences"), Some(&json!({ "language": "fr" })));
}

#[test]
fn avatar_upload_sets_public_url() {
    let backend = backend();
    let ctx = context(&backend, None);
    let mut view = ViewScope::new("settings");
    let profile = ProfileResource::mount(&ctx, &mut view).unwrap();
    let bucket = InMemoryBucket::new("avatars", "https://cdn.cuizly.test/");

    let url = profile
        .upload_avatar(&bucket, vec![0x89, 0x50, 0x4e, 0x47], "image/png")
        .unwrap();
    assert_eq!(
        url,
        format!("https://cdn.cuizly.test/storage/v1/object/public/avatars/{USER}/avatar.png")
    );
    assert_eq!(
        bucket.download(&format!("{USER}/avatar.png")).unwrap(),
        vec![0x89, 0x50, 0x4e, 0x47]
    );
    assert_eq!(profile.profile().and_then(|p| p.avatar_url), Some(url.clone()));
    assert_eq!(backend.rows("profiles")[0].get_str("avatar_url"), Some(url.as_str()));
}

#[test]
fn polling_picks_up_changes_without_events() {
    let backend = backend();
    let ctx = context(&backend, Some(Duration::from_millis(20)));
    let mut view = ViewScope::new("settings");
    let profile = ProfileResource::mount(&ctx, &mut view).unwrap();

    // seeding bypasses the changefeed
    backend
        .seed(
            "profiles",
            [Row::new().with("user_id", USER).with("phone", "514-555-0100")],
        )
        .unwrap();
    assert!(wait_until(|| profile
        .profile()
        .and_then(|p| p.phone)
        .as_deref()
        == Some("514-555-0100")));

    let stats = view.release(profile.resource().identity()).unwrap();
    assert!(stats.polling.unwrap().polls >= 1);
}
