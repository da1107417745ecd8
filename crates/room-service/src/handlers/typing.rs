//! Typing indicator handlers.
//!
//! - `POST /api/typing?roomId=` - Start or stop typing
//! - `GET /api/typing?roomId=` - Members typing in the last few seconds

use crate::errors::RoomError;
use crate::handlers::parse_json;
use crate::middleware::Membership;
use crate::models::{SuccessResponse, TypingRequest, TypingResponse};
use crate::routes::AppState;
use axum::{body::Bytes, extract::State, Extension, Json};
use std::sync::Arc;
use tracing::instrument;

/// Handler for POST /api/typing?roomId=
#[instrument(skip_all, name = "rs.typing.set")]
pub async fn set_typing(
    State(state): State<Arc<AppState>>,
    Extension(member): Extension<Membership>,
    body: Bytes,
) -> Result<Json<SuccessResponse>, RoomError> {
    let request: TypingRequest = parse_json(&body)?;

    state
        .typing
        .set_typing(&member.room_id, member.token.as_str(), request.is_typing)
        .await?;
    Ok(Json(SuccessResponse { success: true }))
}

/// Handler for GET /api/typing?roomId=
#[instrument(skip_all, name = "rs.typing.list")]
pub async fn list_typing(
    State(state): State<Arc<AppState>>,
    Extension(member): Extension<Membership>,
) -> Result<Json<TypingResponse>, RoomError> {
    let active_users = state.typing.list_active(&member.room_id).await?;
    Ok(Json(TypingResponse { active_users }))
}
