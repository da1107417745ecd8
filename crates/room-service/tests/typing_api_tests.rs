//! Typing indicator integration tests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::http::StatusCode;
use common::crypto::member_tag;
use room_service::events::RoomEvent;
use room_test_utils::{body_json, list_typing, set_typing, TestRoomApp};
use serde_json::json;
use std::time::Duration;

/// Let spawned timer tasks run to completion.
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_typing_is_listed_until_stopped() -> Result<(), anyhow::Error> {
    let app = TestRoomApp::new();
    let room_id = app.create_room(json!({})).await?;
    let alice = app.join(&room_id).await?;
    let bob = app.join(&room_id).await?;

    let response = app.send(set_typing(&room_id, &alice, true)).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.send(list_typing(&room_id, &bob)).await?;
    assert_eq!(
        body_json(response).await["activeUsers"],
        json!([member_tag(&alice)])
    );

    app.send(set_typing(&room_id, &alice, false)).await?;
    let response = app.send(list_typing(&room_id, &bob)).await?;
    assert_eq!(body_json(response).await["activeUsers"], json!([]));
    assert_eq!(app.state.typing.pending_clears().await, 0);
    Ok(())
}

#[tokio::test]
async fn test_stale_typing_mark_is_not_listed() -> Result<(), anyhow::Error> {
    let app = TestRoomApp::new();
    let room_id = app.create_room(json!({})).await?;
    let alice = app.join(&room_id).await?;

    app.send(set_typing(&room_id, &alice, true)).await?;
    app.clock.advance(Duration::from_millis(6_000));

    let response = app.send(list_typing(&room_id, &alice)).await?;
    assert_eq!(body_json(response).await["activeUsers"], json!([]));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_typing_clears_itself_after_timeout() -> Result<(), anyhow::Error> {
    let app = TestRoomApp::new();
    let room_id = app.create_room(json!({})).await?;
    let alice = app.join(&room_id).await?;
    app.publisher.clear().await;

    app.send(set_typing(&room_id, &alice, true)).await?;
    assert_eq!(app.state.typing.pending_clears().await, 1);

    tokio::time::sleep(Duration::from_millis(3_100)).await;
    settle().await;

    let response = app.send(list_typing(&room_id, &alice)).await?;
    assert_eq!(body_json(response).await["activeUsers"], json!([]));
    assert_eq!(
        app.publisher.events_for(&room_id).await,
        vec![
            RoomEvent::Typing {
                user: member_tag(&alice),
                is_typing: true,
            },
            RoomEvent::Typing {
                user: member_tag(&alice),
                is_typing: false,
            },
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_typing_rejects_malformed_body() -> Result<(), anyhow::Error> {
    let app = TestRoomApp::new();
    let room_id = app.create_room(json!({})).await?;
    let alice = app.join(&room_id).await?;

    let response = app
        .send(room_test_utils::json_request(
            axum::http::Method::POST,
            &format!("/api/typing?roomId={room_id}"),
            Some(&alice),
            json!({ "typing": "yes" }),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}
