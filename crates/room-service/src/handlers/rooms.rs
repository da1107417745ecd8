//! Room handlers.
//!
//! - `GET /room/:room_id` - Room entry (behind the gateway)
//! - `POST /api/room/create` - Create room (rate limited per client IP)
//! - `POST /api/room/verify-password` - Check a join password
//! - `GET /api/room/ttl?roomId=` - Seconds left (member)
//! - `DELETE /api/room?roomId=` - Destroy room (member, absent room is a no-op)

use crate::errors::RoomError;
use crate::handlers::parse_json;
use crate::middleware::credentials::{client_ip, set_cookie, PASSWORD_COOKIE};
use crate::middleware::{membership_token, room_id_from_query, AdmittedMember, Membership};
use crate::models::{
    CreateRoomRequest, CreateRoomResponse, RoomAdmission, SuccessResponse, TtlResponse,
    VerifyPasswordRequest, VerifyPasswordResponse,
};
use crate::routes::AppState;
use crate::services::{RateLimitPolicy, RateLimitScope};
use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{header::SET_COOKIE, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    Extension, Json,
};
use common::crypto::member_tag;
use common::secret::ExposeSecret;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::instrument;

/// Handler for GET /room/:room_id
///
/// Reached only after the gateway admitted the caller.
#[instrument(skip_all, name = "rs.room.enter")]
pub async fn enter_room(
    State(state): State<Arc<AppState>>,
    Extension(member): Extension<AdmittedMember>,
) -> Result<Json<RoomAdmission>, RoomError> {
    let ttl = state.rooms.ttl(&member.room_id).await?;

    Ok(Json(RoomAdmission {
        ttl,
        encrypted: member.meta.encryption_key_hash.is_some(),
        encryption_key_hash: member.meta.encryption_key_hash,
        member_tag: member_tag(member.token.as_str()),
        room_id: member.room_id,
    }))
}

/// Handler for POST /api/room/create
///
/// An empty body creates a room with defaults.
///
/// # Response
///
/// - 201 Created: `{roomId, encryptionKey?}`; the key is never shown again
/// - 400 Bad Request: TTL or password out of range
/// - 429 Too Many Requests: creation limit for this client reached
#[instrument(skip_all, name = "rs.room.create")]
pub async fn create_room(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<CreateRoomResponse>), RoomError> {
    let request: CreateRoomRequest = if body.is_empty() {
        CreateRoomRequest::default()
    } else {
        parse_json(&body)?
    };

    let ip = client_ip(
        &headers,
        connect_info.map(|ConnectInfo(addr)| addr),
        state.config.trust_proxy_headers,
    );
    state
        .rate_limiter
        .enforce(
            &format!("create:{ip}"),
            RateLimitScope::Ip,
            RateLimitPolicy::per_hour(state.config.room_create_rate_limit_per_hour),
        )
        .await?;

    let created = state.rooms.create(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateRoomResponse {
            room_id: created.room_id.as_str().to_string(),
            encryption_key: created
                .encryption_key
                .map(|key| key.expose_secret().to_string()),
        }),
    ))
}

/// Handler for POST /api/room/verify-password
///
/// A correct password for a protected room also sets the
/// `x-room-password` cookie the gateway checks.
///
/// # Response
///
/// - 200 OK: `{valid}`
/// - 404 Not Found: room does not exist
#[instrument(skip_all, name = "rs.room.verify_password")]
pub async fn verify_password(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, RoomError> {
    let request: VerifyPasswordRequest = parse_json(&body)?;

    let verification = state
        .rooms
        .verify_password(&request.room_id, request.password.expose_secret())
        .await?;

    let mut response = Json(VerifyPasswordResponse {
        valid: verification.valid,
    })
    .into_response();

    if let Some(ack) = verification.acknowledgment {
        let max_age = u64::try_from(state.rooms.ttl(&request.room_id).await?).unwrap_or(0);
        if let Some(cookie) = set_cookie(PASSWORD_COOKIE, &ack, max_age, state.config.secure_cookies)
        {
            response.headers_mut().append(SET_COOKIE, cookie);
        }
    }

    Ok(response)
}

/// Handler for GET /api/room/ttl?roomId=
#[instrument(skip_all, name = "rs.room.ttl")]
pub async fn get_ttl(
    State(state): State<Arc<AppState>>,
    Extension(member): Extension<Membership>,
) -> Result<Json<TtlResponse>, RoomError> {
    let ttl = state.rooms.ttl(&member.room_id).await?;
    Ok(Json(TtlResponse { ttl }))
}

/// Handler for DELETE /api/room?roomId=
///
/// Destroys the room and everything in it and tells live clients to leave.
///
/// # Response
///
/// - 200 OK: `{success: true}`, also when the room was already gone
/// - 401 Unauthorized: no membership token
/// - 403 Forbidden: token is not a member of the room
#[instrument(skip_all, name = "rs.room.destroy")]
pub async fn destroy_room(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Json<SuccessResponse>, RoomError> {
    let room_id = room_id_from_query(&uri)?;
    let token = membership_token(&headers)?;

    state.rooms.destroy(&room_id, token.as_str()).await?;
    Ok(Json(SuccessResponse { success: true }))
}
