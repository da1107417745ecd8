//! HTTP request handlers for the room service.

pub mod health;
pub mod messages;
pub mod metrics;
pub mod rooms;
pub mod typing;

pub use health::{health_check, readiness_check};
pub use messages::{
    delete_message, edit_message, list_messages, mark_read, send_message, toggle_reaction,
};
pub use metrics::metrics_handler;
pub use rooms::{create_room, destroy_room, enter_room, get_ttl, verify_password};
pub use typing::{list_typing, set_typing};

use crate::errors::RoomError;
use serde::de::DeserializeOwned;

/// Deserialize a JSON body, mapping failures to 400 rather than axum's 422.
pub(crate) fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, RoomError> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(target: "rs.handlers", error = %e, "Invalid request body");
        RoomError::Validation("Invalid request body".to_string())
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::TypingRequest;

    #[test]
    fn test_parse_json_maps_to_validation() {
        let ok: TypingRequest = parse_json(br#"{"isTyping": true}"#).unwrap();
        assert!(ok.is_typing);

        assert!(matches!(
            parse_json::<TypingRequest>(b"{not json"),
            Err(RoomError::Validation(_))
        ));
        assert!(matches!(
            parse_json::<TypingRequest>(br#"{"typing": true}"#),
            Err(RoomError::Validation(_))
        ));
    }
}
