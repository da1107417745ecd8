//! Room-entry gateway.
//!
//! Intercepts navigation to `/room/:room_id`. Every request either passes
//! through to the room handler with an `AdmittedMember` extension (and a
//! freshly issued membership cookie when needed), or is redirected to the
//! landing page with an error code. The gateway never answers with an
//! error body.
//!
//! Store failures redirect to `service-unavailable`: a request that cannot
//! be rate limited or checked is not admitted.

use crate::errors::RoomError;
use crate::middleware::credentials::{
    client_ip, credential, set_cookie, MEMBERSHIP_COOKIE, PASSWORD_COOKIE,
};
use crate::models::RoomMeta;
use crate::observability::metrics::record_gateway_decision;
use crate::routes::AppState;
use crate::services::{RateLimitPolicy, RateLimitScope};
use axum::{
    extract::{ConnectInfo, Path, Request, State},
    http::header::SET_COOKIE,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use common::types::MembershipToken;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// A caller the gateway let into a room, for the downstream handler.
#[derive(Debug, Clone)]
pub struct AdmittedMember {
    pub room_id: String,
    pub token: MembershipToken,
    pub meta: RoomMeta,
}

/// Where a refused room-entry request is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayRedirect {
    /// Path did not name exactly one room.
    NoRoomMatch,
    RoomNotFound,
    RoomFull,
    PasswordRequired { room_id: String },
    RateLimited,
    ServiceUnavailable,
}

impl GatewayRedirect {
    /// Redirect target.
    pub fn location(&self) -> String {
        match self {
            GatewayRedirect::NoRoomMatch => "/".to_string(),
            GatewayRedirect::RoomNotFound => "/?error=room-not-found".to_string(),
            GatewayRedirect::RoomFull => "/?error=room-full".to_string(),
            GatewayRedirect::PasswordRequired { room_id } => {
                format!("/?error=password-required&roomId={room_id}")
            }
            GatewayRedirect::RateLimited => "/?error=rate-limited".to_string(),
            GatewayRedirect::ServiceUnavailable => "/?error=service-unavailable".to_string(),
        }
    }

    /// Metrics label.
    pub fn outcome(&self) -> &'static str {
        match self {
            GatewayRedirect::NoRoomMatch => "no_match",
            GatewayRedirect::RoomNotFound => "not_found",
            GatewayRedirect::RoomFull => "full",
            GatewayRedirect::PasswordRequired { .. } => "password_required",
            GatewayRedirect::RateLimited => "rate_limited",
            GatewayRedirect::ServiceUnavailable => "unavailable",
        }
    }

    /// Map a refusal from the room service onto a redirect.
    pub fn from_error(room_id: &str, err: &RoomError) -> Self {
        match err {
            RoomError::NotFound(_) => GatewayRedirect::RoomNotFound,
            RoomError::RoomFull => GatewayRedirect::RoomFull,
            RoomError::InvalidCredential => GatewayRedirect::PasswordRequired {
                room_id: room_id.to_string(),
            },
            RoomError::RateLimited { .. } => GatewayRedirect::RateLimited,
            _ => GatewayRedirect::ServiceUnavailable,
        }
    }
}

impl IntoResponse for GatewayRedirect {
    fn into_response(self) -> Response {
        record_gateway_decision(self.outcome());
        Redirect::temporary(&self.location()).into_response()
    }
}

/// Fallback for `/room` paths that do not name exactly one room.
pub async fn no_room_match() -> GatewayRedirect {
    GatewayRedirect::NoRoomMatch
}

/// Gateway middleware for `GET /room/:room_id`.
///
/// Order of checks: client IP rate limit, room existence, password
/// acknowledgment, existing membership, capacity. New members are added
/// through the store's atomic capacity-checked insert.
#[instrument(skip_all, name = "rs.gateway", fields(room_id = %room_id))]
pub async fn room_gateway(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    mut req: Request,
    next: Next,
) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(req.headers(), peer, state.config.trust_proxy_headers);

    let policy = RateLimitPolicy::per_minute(state.config.ip_rate_limit_per_minute);
    if let Err(e) = state
        .rate_limiter
        .enforce(&ip, RateLimitScope::Ip, policy)
        .await
    {
        if !matches!(e, RoomError::RateLimited { .. }) {
            warn!(target: "rs.gateway", error = %e, "Rate limiter unavailable, refusing entry");
        }
        return GatewayRedirect::from_error(&room_id, &e).into_response();
    }

    let existing = credential(req.headers(), MEMBERSHIP_COOKIE);
    let password_ack = credential(req.headers(), PASSWORD_COOKIE);

    let admitted = match state
        .rooms
        .admit(&room_id, existing.as_deref(), password_ack.as_deref())
        .await
    {
        Ok(admitted) => admitted,
        Err(e) => {
            debug!(target: "rs.gateway", reason = e.kind(), "Room entry refused");
            return GatewayRedirect::from_error(&room_id, &e).into_response();
        }
    };

    record_gateway_decision(if admitted.issued { "issued" } else { "admitted" });

    let cookie = if admitted.issued {
        let max_age = match state.rooms.ttl(&room_id).await {
            Ok(ttl) => u64::try_from(ttl).unwrap_or(0),
            Err(e) => {
                warn!(target: "rs.gateway", error = %e, "Room TTL unavailable, using configured lifetime");
                admitted.meta.ttl_seconds
            }
        };
        set_cookie(
            MEMBERSHIP_COOKIE,
            admitted.token.as_str(),
            max_age,
            state.config.secure_cookies,
        )
    } else {
        None
    };

    req.extensions_mut().insert(AdmittedMember {
        room_id,
        token: admitted.token,
        meta: admitted.meta,
    });

    let mut response = next.run(req).await;
    if let Some(cookie) = cookie {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    response
}
