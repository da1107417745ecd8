//! Room API integration tests.
//!
//! Covers creation, password verification, TTL and destruction.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::http::{Method, StatusCode};
use room_service::clock::Clock;
use room_service::events::RoomEvent;
use room_test_utils::{
    body_json, empty_request, enter_room, json_request, location, set_cookie_value, TestRoomApp,
};
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn test_create_room_with_empty_body_uses_defaults() -> Result<(), anyhow::Error> {
    let app = TestRoomApp::new();

    let response = app
        .send(empty_request(Method::POST, "/api/room/create", None))
        .await?;

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    let room_id = body["roomId"].as_str().expect("roomId");
    assert!(!room_id.is_empty());
    assert!(body.get("encryptionKey").is_none());
    assert_eq!(app.state.rooms.ttl(room_id).await?, 600);
    Ok(())
}

#[tokio::test]
async fn test_create_encrypted_room_returns_key_once() -> Result<(), anyhow::Error> {
    let app = TestRoomApp::new();

    let created = app
        .create_room_response(json!({ "enableEncryption": true, "ttlSeconds": 3600 }))
        .await?;
    let room_id = created["roomId"].as_str().expect("roomId");
    let key = created["encryptionKey"].as_str().expect("encryption key");
    assert!(!key.is_empty());

    let response = app.send(enter_room(room_id, &[])).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let admission = body_json(response).await;
    assert_eq!(admission["encrypted"], true);
    assert_eq!(admission["ttl"], 3600);

    let key_hash = admission["encryptionKeyHash"].as_str().expect("key hash");
    assert!(!key_hash.is_empty());
    assert!(!admission.to_string().contains(key));
    Ok(())
}

#[tokio::test]
async fn test_create_room_rejects_out_of_range_ttl() -> Result<(), anyhow::Error> {
    let app = TestRoomApp::new();

    for ttl in [59, 86_401] {
        let response = app
            .send(json_request(
                Method::POST,
                "/api/room/create",
                None,
                json!({ "ttlSeconds": ttl }),
            ))
            .await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "ttl {ttl}");
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }
    Ok(())
}

#[tokio::test]
async fn test_create_room_rejects_short_password() -> Result<(), anyhow::Error> {
    let app = TestRoomApp::new();

    let response = app
        .send(json_request(
            Method::POST,
            "/api/room/create",
            None,
            json!({ "password": "abc" }),
        ))
        .await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_create_room_rejects_malformed_json() -> Result<(), anyhow::Error> {
    let app = TestRoomApp::new();

    let request = axum::http::Request::builder()
        .method(Method::POST)
        .uri("/api/room/create")
        .header("content-type", "application/json")
        .body(axum::body::Body::from("{not json"))?;
    let response = app.send(request).await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_create_room_is_rate_limited_per_client() -> Result<(), anyhow::Error> {
    let app = TestRoomApp::with_overrides(&[("ROOM_CREATE_RATE_LIMIT_PER_HOUR", "2")]);

    app.create_room(json!({})).await?;
    app.create_room(json!({})).await?;

    let response = app
        .send(json_request(Method::POST, "/api/room/create", None, json!({})))
        .await?;

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "RATE_LIMITED");
    let reset_at = body["error"]["resetAt"].as_i64().expect("resetAt");
    assert_eq!(reset_at, app.clock.now_secs() + 3600);
    Ok(())
}

#[tokio::test]
async fn test_verify_password_sets_acknowledgment_cookie() -> Result<(), anyhow::Error> {
    let app = TestRoomApp::new();
    let room_id = app.create_room(json!({ "password": "secret-pw" })).await?;

    let response = app
        .send(json_request(
            Method::POST,
            "/api/room/verify-password",
            None,
            json!({ "roomId": room_id, "password": "wrong-pw" }),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookie_value(&response, "x-room-password").is_none());
    assert_eq!(body_json(response).await["valid"], false);

    let response = app
        .send(json_request(
            Method::POST,
            "/api/room/verify-password",
            None,
            json!({ "roomId": room_id, "password": "secret-pw" }),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let ack = set_cookie_value(&response, "x-room-password").expect("ack cookie");
    assert_ne!(ack, "secret-pw");
    assert_eq!(body_json(response).await["valid"], true);
    Ok(())
}

#[tokio::test]
async fn test_verify_password_unknown_room_is_not_found() -> Result<(), anyhow::Error> {
    let app = TestRoomApp::new();

    let response = app
        .send(json_request(
            Method::POST,
            "/api/room/verify-password",
            None,
            json!({ "roomId": "missing", "password": "secret-pw" }),
        ))
        .await?;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn test_ttl_counts_down() -> Result<(), anyhow::Error> {
    let app = TestRoomApp::new();
    let room_id = app.create_room(json!({})).await?;
    let token = app.join(&room_id).await?;
    let uri = format!("/api/room/ttl?roomId={room_id}");

    let response = app
        .send(empty_request(Method::GET, &uri, Some(&token)))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["ttl"], 600);

    app.clock.advance(Duration::from_secs(100));
    let response = app
        .send(empty_request(Method::GET, &uri, Some(&token)))
        .await?;
    assert_eq!(body_json(response).await["ttl"], 500);
    Ok(())
}

#[tokio::test]
async fn test_member_routes_require_credentials() -> Result<(), anyhow::Error> {
    let app = TestRoomApp::new();
    let room_id = app.create_room(json!({})).await?;
    app.join(&room_id).await?;

    let uri = format!("/api/room/ttl?roomId={room_id}");
    let response = app.send(empty_request(Method::GET, &uri, None)).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .send(empty_request(Method::GET, &uri, Some("not-a-member")))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .send(empty_request(Method::GET, "/api/room/ttl", Some("any")))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .send(empty_request(
            Method::GET,
            "/api/room/ttl?roomId=missing",
            Some("any"),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn test_destroy_room_removes_everything() -> Result<(), anyhow::Error> {
    let app = TestRoomApp::new();
    let room_id = app.create_room(json!({})).await?;
    let token = app.join(&room_id).await?;
    let uri = format!("/api/room?roomId={room_id}");

    let response = app
        .send(empty_request(Method::DELETE, &uri, Some(&token)))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["success"], true);

    let events = app.publisher.events_for(&room_id).await;
    assert_eq!(
        events.last(),
        Some(&RoomEvent::Destroy { is_destroyed: true })
    );

    let response = app
        .send(enter_room(&room_id, &[("x-auth-token", token.as_str())]))
        .await?;
    assert_eq!(
        location(&response).as_deref(),
        Some("/?error=room-not-found")
    );

    // Destroying again is a no-op
    let response = app
        .send(empty_request(Method::DELETE, &uri, Some(&token)))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.publisher.events_for(&room_id).await.len(), events.len());
    Ok(())
}

#[tokio::test]
async fn test_destroy_room_rejects_non_member() -> Result<(), anyhow::Error> {
    let app = TestRoomApp::new();
    let room_id = app.create_room(json!({})).await?;
    app.join(&room_id).await?;
    let uri = format!("/api/room?roomId={room_id}");

    let response = app
        .send(empty_request(Method::DELETE, &uri, Some("intruder")))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.send(empty_request(Method::DELETE, &uri, None)).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    assert_eq!(app.state.rooms.ttl(&room_id).await?, 600);
    Ok(())
}
