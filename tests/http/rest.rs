use serde_json::{json, Value};

use crate::support::start_server;

#[tokio::test]
async fn health_check() {
    let server = start_server().await;
    let resp = reqwest::get(format!("{}/health", server.base)).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["ok"], true);
}

#[tokio::test]
async fn crud_with_bearer_session() {
    let server = start_server().await;
    let session = server.api.auth().sign_in("user-1");
    let client = reqwest::Client::new();
    let url = format!("{}/rest/v1/favorites", server.base);

    for restaurant in ["r1", "r2"] {
        let resp = client
            .post(&url)
            .bearer_auth(&session.access_token)
            .json(&json!({ "restaurant_id": restaurant }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
    }

    let rows: Value = client
        .get(format!("{url}?user_id=eq.user-1&order=created_at.desc&limit=1"))
        .bearer_auth(&session.access_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["restaurant_id"], "r2");
    assert_eq!(rows[0]["user_id"], "user-1");
    let id = rows[0]["id"].as_str().unwrap().to_string();

    let updated: Value = client
        .patch(format!("{url}?id=eq.{id}"))
        .bearer_auth(&session.access_token)
        .json(&json!({ "note": "date night" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(updated[0]["note"], "date night");

    let deleted: Value = client
        .delete(format!("{url}?id=eq.{id}"))
        .bearer_auth(&session.access_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(deleted.as_array().unwrap().len(), 1);
    assert_eq!(server.api.backend().rows("favorites").len(), 1);
}

#[tokio::test]
async fn error_statuses() {
    let server = start_server().await;
    let session = server.api.auth().sign_in("user-1");
    let client = reqwest::Client::new();
    let url = format!("{}/rest/v1/favorites", server.base);

    // anonymous clients see nothing and may not write
    let rows: Value = client.get(&url).send().await.unwrap().json().await.unwrap();
    assert_eq!(rows, json!([]));
    let resp = client
        .post(&url)
        .json(&json!({ "restaurant_id": "r1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    // unknown token
    let resp = client.get(&url).bearer_auth("nope").send().await.unwrap();
    assert_eq!(resp.status(), 401);

    // malformed filter
    let resp = client
        .get(format!("{url}?user_id=like.x"))
        .bearer_auth(&session.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // unique constraint
    for expected in [201, 409] {
        let resp = client
            .post(&url)
            .bearer_auth(&session.access_token)
            .json(&json!({ "restaurant_id": "r1" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), expected);
    }

    // unfiltered delete
    let resp = client
        .delete(&url)
        .bearer_auth(&session.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // transport failure
    server.api.backend().fail_reads(1);
    let resp = client
        .get(&url)
        .bearer_auth(&session.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 503);

    // expired session
    server.api.auth().expire();
    let resp = client
        .get(&url)
        .bearer_auth(&session.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}
