//! Request builders for room-service routes.
//!
//! Builders attach the membership token as the `x-auth-token` header, the
//! way a non-browser client would.

use axum::body::Body;
use axum::http::{header, Method, Request, Response};
use http_body_util::BodyExt;
use serde_json::Value;

/// Header carrying the membership token.
pub const AUTH_HEADER: &str = "x-auth-token";

/// Build a JSON request.
pub fn json_request(method: Method, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(AUTH_HEADER, token);
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("valid request")
}

/// Build a bodyless request.
pub fn empty_request(method: Method, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(AUTH_HEADER, token);
    }
    builder.body(Body::empty()).expect("valid request")
}

/// `GET /room/:room_id` carrying optional cookies.
pub fn enter_room(room_id: &str, cookies: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::GET)
        .uri(format!("/room/{room_id}"));
    if !cookies.is_empty() {
        let cookie = cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).expect("valid request")
}

/// `POST /api/messages?roomId=`
pub fn send_message(room_id: &str, token: &str, sender: &str, text: &str) -> Request<Body> {
    json_request(
        Method::POST,
        &format!("/api/messages?roomId={room_id}"),
        Some(token),
        serde_json::json!({ "sender": sender, "text": text }),
    )
}

/// `GET /api/messages?roomId=`
pub fn list_messages(room_id: &str, token: &str) -> Request<Body> {
    empty_request(
        Method::GET,
        &format!("/api/messages?roomId={room_id}"),
        Some(token),
    )
}

/// `PUT /api/messages/:message_id?roomId=`
pub fn edit_message(room_id: &str, token: &str, message_id: &str, text: &str) -> Request<Body> {
    json_request(
        Method::PUT,
        &format!("/api/messages/{message_id}?roomId={room_id}"),
        Some(token),
        serde_json::json!({ "text": text }),
    )
}

/// `DELETE /api/messages/:message_id?roomId=`
pub fn delete_message(room_id: &str, token: &str, message_id: &str) -> Request<Body> {
    empty_request(
        Method::DELETE,
        &format!("/api/messages/{message_id}?roomId={room_id}"),
        Some(token),
    )
}

/// `POST /api/messages/:message_id/reactions?roomId=`
pub fn toggle_reaction(room_id: &str, token: &str, message_id: &str, emoji: &str) -> Request<Body> {
    json_request(
        Method::POST,
        &format!("/api/messages/{message_id}/reactions?roomId={room_id}"),
        Some(token),
        serde_json::json!({ "emoji": emoji }),
    )
}

/// `POST /api/messages/:message_id/read?roomId=`
pub fn mark_read(room_id: &str, token: &str, message_id: &str) -> Request<Body> {
    empty_request(
        Method::POST,
        &format!("/api/messages/{message_id}/read?roomId={room_id}"),
        Some(token),
    )
}

/// `POST /api/typing?roomId=`
pub fn set_typing(room_id: &str, token: &str, is_typing: bool) -> Request<Body> {
    json_request(
        Method::POST,
        &format!("/api/typing?roomId={room_id}"),
        Some(token),
        serde_json::json!({ "isTyping": is_typing }),
    )
}

/// `GET /api/typing?roomId=`
pub fn list_typing(room_id: &str, token: &str) -> Request<Body> {
    empty_request(
        Method::GET,
        &format!("/api/typing?roomId={room_id}"),
        Some(token),
    )
}

/// Collect a response body as JSON.
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("readable body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("JSON body")
}

/// The redirect target of a gateway response.
pub fn location(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Value of the cookie `name` set by a response, if any.
pub fn set_cookie_value(response: &Response<Body>, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}
