//! Membership middleware for the room-scoped API.
//!
//! Every call names its room with `?roomId=` and presents the membership
//! token as the `x-auth-token` cookie or header. Membership is re-checked
//! against the store on every request; handlers receive a `Membership`
//! extension.

use crate::errors::RoomError;
use crate::middleware::credentials::{credential, MEMBERSHIP_COOKIE};
use crate::models::{RoomMeta, RoomQuery};
use crate::routes::AppState;
use axum::{
    extract::{Query, Request, State},
    http::{HeaderMap, Uri},
    middleware::Next,
    response::Response,
};
use common::types::MembershipToken;
use std::sync::Arc;
use tracing::instrument;

/// A verified member of the room named in the request.
#[derive(Debug, Clone)]
pub struct Membership {
    pub room_id: String,
    pub token: MembershipToken,
    pub meta: RoomMeta,
}

/// Room id from the `roomId` query parameter.
pub fn room_id_from_query(uri: &Uri) -> Result<String, RoomError> {
    Query::<RoomQuery>::try_from_uri(uri)
        .map(|Query(query)| query.room_id)
        .ok()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| RoomError::Validation("roomId query parameter is required".to_string()))
}

/// Membership token from the request, or `Unauthorized`.
pub fn membership_token(headers: &HeaderMap) -> Result<MembershipToken, RoomError> {
    credential(headers, MEMBERSHIP_COOKIE)
        .map(MembershipToken::from)
        .ok_or_else(|| {
            tracing::debug!(target: "rs.middleware.membership", "Missing membership token");
            RoomError::Unauthorized("Missing membership token".to_string())
        })
}

/// Require a member of the `roomId` room.
///
/// # Response
///
/// - 400 if `roomId` is missing
/// - 401 if no membership token is presented
/// - 404 if the room does not exist (or has expired)
/// - 403 if the token is not a member of the room
#[instrument(skip_all, name = "rs.middleware.membership")]
pub async fn require_membership(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, RoomError> {
    let room_id = room_id_from_query(req.uri())?;
    let token = membership_token(req.headers())?;

    let meta = state.rooms.authorize(&room_id, token.as_str()).await?;

    req.extensions_mut().insert(Membership {
        room_id,
        token,
        meta,
    });

    Ok(next.run(req).await)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn uri(value: &str) -> Uri {
        value.parse().unwrap()
    }

    #[test]
    fn test_room_id_from_query() {
        assert_eq!(
            room_id_from_query(&uri("/api/messages?roomId=abc")).unwrap(),
            "abc"
        );
        assert!(matches!(
            room_id_from_query(&uri("/api/messages")),
            Err(RoomError::Validation(_))
        ));
        assert!(matches!(
            room_id_from_query(&uri("/api/messages?roomId=")),
            Err(RoomError::Validation(_))
        ));
    }

    #[test]
    fn test_membership_token() {
        let mut headers = HeaderMap::new();
        assert!(matches!(
            membership_token(&headers),
            Err(RoomError::Unauthorized(_))
        ));

        headers.insert("cookie", HeaderValue::from_static("x-auth-token=tok"));
        assert_eq!(membership_token(&headers).unwrap().as_str(), "tok");
    }
}
