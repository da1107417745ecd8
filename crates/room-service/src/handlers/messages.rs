//! Message handlers.
//!
//! All routes sit behind `require_membership`, so each handler receives
//! the caller's verified `Membership`.
//!
//! - `POST /api/messages?roomId=` - Send
//! - `GET /api/messages?roomId=` - List, annotated with `isOwn`
//! - `PUT /api/messages/:message_id?roomId=` - Edit (author, 5 minutes)
//! - `DELETE /api/messages/:message_id?roomId=` - Soft-delete (author, 5 minutes)
//! - `POST /api/messages/:message_id/reactions?roomId=` - Toggle reaction
//! - `POST /api/messages/:message_id/read?roomId=` - Read receipt

use crate::errors::RoomError;
use crate::handlers::parse_json;
use crate::middleware::Membership;
use crate::models::{
    EditMessageRequest, MessagesResponse, ReactionRequest, ReactionResponse, SendMessageRequest,
    SendMessageResponse, SuccessResponse,
};
use crate::routes::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    Extension, Json,
};
use std::sync::Arc;
use tracing::instrument;

/// Handler for POST /api/messages?roomId=
#[instrument(skip_all, name = "rs.messages.send")]
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Extension(member): Extension<Membership>,
    body: Bytes,
) -> Result<Json<SendMessageResponse>, RoomError> {
    let request: SendMessageRequest = parse_json(&body)?;

    let message_id = state
        .messages
        .append(&member.room_id, member.token.as_str(), request)
        .await?;

    Ok(Json(SendMessageResponse {
        message_id: message_id.as_str().to_string(),
    }))
}

/// Handler for GET /api/messages?roomId=
#[instrument(skip_all, name = "rs.messages.list")]
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Extension(member): Extension<Membership>,
) -> Result<Json<MessagesResponse>, RoomError> {
    let messages = state
        .messages
        .list(&member.room_id, member.token.as_str())
        .await?;
    Ok(Json(MessagesResponse { messages }))
}

/// Handler for PUT /api/messages/:message_id?roomId=
#[instrument(skip_all, name = "rs.messages.edit")]
pub async fn edit_message(
    State(state): State<Arc<AppState>>,
    Extension(member): Extension<Membership>,
    Path(message_id): Path<String>,
    body: Bytes,
) -> Result<Json<SuccessResponse>, RoomError> {
    let request: EditMessageRequest = parse_json(&body)?;

    state
        .messages
        .edit(
            &member.room_id,
            member.token.as_str(),
            &message_id,
            request.text,
        )
        .await?;
    Ok(Json(SuccessResponse { success: true }))
}

/// Handler for DELETE /api/messages/:message_id?roomId=
#[instrument(skip_all, name = "rs.messages.delete")]
pub async fn delete_message(
    State(state): State<Arc<AppState>>,
    Extension(member): Extension<Membership>,
    Path(message_id): Path<String>,
) -> Result<Json<SuccessResponse>, RoomError> {
    state
        .messages
        .delete(&member.room_id, member.token.as_str(), &message_id)
        .await?;
    Ok(Json(SuccessResponse { success: true }))
}

/// Handler for POST /api/messages/:message_id/reactions?roomId=
#[instrument(skip_all, name = "rs.messages.react")]
pub async fn toggle_reaction(
    State(state): State<Arc<AppState>>,
    Extension(member): Extension<Membership>,
    Path(message_id): Path<String>,
    body: Bytes,
) -> Result<Json<ReactionResponse>, RoomError> {
    let request: ReactionRequest = parse_json(&body)?;

    let added = state
        .messages
        .toggle_reaction(
            &member.room_id,
            member.token.as_str(),
            &message_id,
            &request.emoji,
        )
        .await?;
    Ok(Json(ReactionResponse { added }))
}

/// Handler for POST /api/messages/:message_id/read?roomId=
#[instrument(skip_all, name = "rs.messages.read")]
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    Extension(member): Extension<Membership>,
    Path(message_id): Path<String>,
) -> Result<Json<SuccessResponse>, RoomError> {
    state
        .messages
        .mark_read(&member.room_id, member.token.as_str(), &message_id)
        .await?;
    Ok(Json(SuccessResponse { success: true }))
}
