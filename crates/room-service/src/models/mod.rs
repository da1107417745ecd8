//! Room service models.
//!
//! Contains the persisted room and message shapes plus the request and
//! response bodies of the HTTP API. Persisted messages carry the author's
//! membership token; every outward shape replaces tokens with member tags.

use crate::errors::RoomError;
use common::crypto::member_tag;
use common::secret::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Maximum number of members a room admits.
pub const ROOM_CAPACITY: usize = 2;

/// Window after sending during which the author may edit or delete.
pub const EDIT_WINDOW_MS: i64 = 5 * 60 * 1000;

/// Text that replaces the body of a soft-deleted message.
pub const DELETED_PLACEHOLDER: &str = "[Message deleted]";

/// Longest accepted display name.
pub const MAX_SENDER_CHARS: usize = 100;

/// Longest accepted message body (plaintext or ciphertext).
pub const MAX_TEXT_CHARS: usize = 1000;

/// Longest accepted reaction emoji sequence.
pub const MAX_EMOJI_CHARS: usize = 32;

/// Accepted password length in characters.
pub const PASSWORD_CHARS: std::ops::RangeInclusive<usize> = 4..=50;

const FIELD_CONNECTED: &str = "connected";
const FIELD_CREATED_AT: &str = "createdAt";
const FIELD_TTL_SECONDS: &str = "ttlSeconds";
const FIELD_PASSWORD_HASH: &str = "passwordHash";
const FIELD_ENCRYPTION_KEY_HASH: &str = "encryptionKeyHash";

/// Room metadata, stored as a hash at `meta:{roomId}`.
#[derive(Clone, PartialEq, Eq)]
pub struct RoomMeta {
    /// Membership tokens admitted to the room (at most `ROOM_CAPACITY`).
    pub connected: Vec<String>,
    /// Creation time in epoch milliseconds.
    pub created_at: i64,
    /// Lifetime the room was created with.
    pub ttl_seconds: u64,
    /// SHA-256 commitment of the join password.
    pub password_hash: Option<String>,
    /// 16-hex-char commitment of the client encryption key.
    pub encryption_key_hash: Option<String>,
}

impl fmt::Debug for RoomMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoomMeta")
            .field("connected", &self.connected.len())
            .field("created_at", &self.created_at)
            .field("ttl_seconds", &self.ttl_seconds)
            .field("password_protected", &self.password_hash.is_some())
            .field("encryption_key_hash", &self.encryption_key_hash)
            .finish()
    }
}

impl RoomMeta {
    /// Metadata for a room nobody has joined yet.
    pub fn new(
        created_at: i64,
        ttl_seconds: u64,
        password_hash: Option<String>,
        encryption_key_hash: Option<String>,
    ) -> Self {
        Self {
            connected: Vec::new(),
            created_at,
            ttl_seconds,
            password_hash,
            encryption_key_hash,
        }
    }

    /// Whether `token` has been admitted to the room.
    pub fn is_member(&self, token: &str) -> bool {
        self.connected.iter().any(|t| t == token)
    }

    /// Whether the room already holds `ROOM_CAPACITY` members.
    pub fn is_full(&self) -> bool {
        self.connected.len() >= ROOM_CAPACITY
    }

    /// Flatten into hash field/value pairs. Absent commitments are omitted.
    pub fn to_fields(&self) -> Result<Vec<(&'static str, String)>, RoomError> {
        let connected = serde_json::to_string(&self.connected).map_err(|e| {
            tracing::error!(target: "rs.models", error = %e, "Failed to encode members");
            RoomError::Internal
        })?;

        let mut fields = vec![
            (FIELD_CONNECTED, connected),
            (FIELD_CREATED_AT, self.created_at.to_string()),
            (FIELD_TTL_SECONDS, self.ttl_seconds.to_string()),
        ];
        if let Some(hash) = &self.password_hash {
            fields.push((FIELD_PASSWORD_HASH, hash.clone()));
        }
        if let Some(hash) = &self.encryption_key_hash {
            fields.push((FIELD_ENCRYPTION_KEY_HASH, hash.clone()));
        }
        Ok(fields)
    }

    /// Rebuild from a hash read. Returns `None` for an empty hash (no room).
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Option<Self>, RoomError> {
        if fields.is_empty() {
            return Ok(None);
        }

        let corrupt = |field: &str| {
            tracing::error!(target: "rs.models", field = %field, "Corrupt room metadata");
            RoomError::Internal
        };

        let connected = match fields.get(FIELD_CONNECTED) {
            Some(raw) if !raw.is_empty() => {
                serde_json::from_str(raw).map_err(|_| corrupt(FIELD_CONNECTED))?
            }
            _ => Vec::new(),
        };
        let created_at = fields
            .get(FIELD_CREATED_AT)
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| corrupt(FIELD_CREATED_AT))?;
        let ttl_seconds = fields
            .get(FIELD_TTL_SECONDS)
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| corrupt(FIELD_TTL_SECONDS))?;
        let non_empty = |field: &str| fields.get(field).filter(|v| !v.is_empty()).cloned();

        Ok(Some(Self {
            connected,
            created_at,
            ttl_seconds,
            password_hash: non_empty(FIELD_PASSWORD_HASH),
            encryption_key_hash: non_empty(FIELD_ENCRYPTION_KEY_HASH),
        }))
    }
}

/// A message as persisted in the room's message list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: String,
    pub sender: String,
    pub text: String,
    pub timestamp: i64,
    pub room_id: String,
    #[serde(default)]
    pub encrypted: bool,
    /// Emoji to the membership tokens that reacted with it. Never empty.
    #[serde(default)]
    pub reactions: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub read_by: Vec<String>,
    #[serde(default)]
    pub edited: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<i64>,
    #[serde(default)]
    pub deleted: bool,
    /// Membership token of the author. Server-only.
    pub token: String,
}

impl StoredMessage {
    /// A fresh message, already read by its author.
    pub fn new(
        id: String,
        room_id: String,
        sender: String,
        text: String,
        encrypted: bool,
        timestamp: i64,
        token: String,
    ) -> Self {
        Self {
            id,
            sender,
            text,
            timestamp,
            room_id,
            encrypted,
            reactions: BTreeMap::new(),
            read_by: vec![token.clone()],
            edited: false,
            edited_at: None,
            deleted: false,
            token,
        }
    }

    pub fn is_authored_by(&self, token: &str) -> bool {
        self.token == token
    }

    /// Whether `now_ms` is strictly less than five minutes after sending.
    pub fn within_edit_window(&self, now_ms: i64) -> bool {
        now_ms.saturating_sub(self.timestamp) < EDIT_WINDOW_MS
    }

    /// Add or remove `token` under `emoji`. Returns `true` when added.
    pub fn toggle_reaction(&mut self, emoji: &str, token: &str) -> bool {
        let users = self.reactions.entry(emoji.to_string()).or_default();
        if let Some(pos) = users.iter().position(|t| t == token) {
            users.remove(pos);
            if users.is_empty() {
                self.reactions.remove(emoji);
            }
            false
        } else {
            users.push(token.to_string());
            true
        }
    }

    /// Record that `token` read the message. Returns `true` on first read.
    pub fn mark_read(&mut self, token: &str) -> bool {
        if self.read_by.iter().any(|t| t == token) {
            return false;
        }
        self.read_by.push(token.to_string());
        true
    }

    pub fn soft_delete(&mut self) {
        self.deleted = true;
        self.text = DELETED_PLACEHOLDER.to_string();
    }

    /// Outward shape: author token dropped, member tokens replaced by tags.
    pub fn to_public(&self) -> Message {
        Message {
            id: self.id.clone(),
            sender: self.sender.clone(),
            text: self.text.clone(),
            timestamp: self.timestamp,
            room_id: self.room_id.clone(),
            encrypted: self.encrypted,
            reactions: self
                .reactions
                .iter()
                .map(|(emoji, users)| (emoji.clone(), users.iter().map(|t| member_tag(t)).collect()))
                .collect(),
            read_by: self.read_by.iter().map(|t| member_tag(t)).collect(),
            edited: self.edited,
            edited_at: self.edited_at,
            deleted: self.deleted,
        }
    }

    /// Outward shape annotated for one caller.
    pub fn view_for(&self, caller_token: &str) -> MessageView {
        MessageView {
            message: self.to_public(),
            is_own: self.is_authored_by(caller_token),
        }
    }
}

/// A message as clients see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender: String,
    pub text: String,
    pub timestamp: i64,
    pub room_id: String,
    pub encrypted: bool,
    /// Emoji to member tags.
    pub reactions: BTreeMap<String, Vec<String>>,
    /// Member tags.
    pub read_by: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub edited: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<i64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
}

/// A message annotated with whether the caller wrote it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    #[serde(flatten)]
    pub message: Message,
    pub is_own: bool,
}

// ============================================================================
// Request and response bodies
// ============================================================================

/// Query string carrying the target room.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomQuery {
    pub room_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    pub ttl_seconds: Option<u64>,
    pub password: Option<SecretString>,
    #[serde(default)]
    pub enable_encryption: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomResponse {
    pub room_id: String,
    /// Hex key, returned exactly once.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPasswordRequest {
    pub room_id: String,
    pub password: SecretString,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyPasswordResponse {
    pub valid: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TtlResponse {
    pub ttl: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Body of an admitted gateway request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomAdmission {
    pub room_id: String,
    pub ttl: i64,
    pub encrypted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption_key_hash: Option<String>,
    /// Tag under which this member appears in reactions and receipts.
    pub member_tag: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub sender: String,
    pub text: String,
    #[serde(default)]
    pub encrypted: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    pub message_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<MessageView>,
}

#[derive(Debug, Deserialize)]
pub struct EditMessageRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct ReactionRequest {
    pub emoji: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReactionResponse {
    pub added: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingRequest {
    pub is_typing: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingResponse {
    /// Member tags typing within the active window.
    pub active_users: Vec<String>,
}

/// Readiness check response.
///
/// Returned by the `/ready` endpoint (readiness probe).
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    /// "ready" or "not_ready".
    pub status: &'static str,

    /// Shared store reachability.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<&'static str>,

    /// Generic error, no infrastructure details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn message() -> StoredMessage {
        StoredMessage::new(
            "m1".to_string(),
            "room-1".to_string(),
            "A".to_string(),
            "hello".to_string(),
            false,
            1_000,
            "author-token".to_string(),
        )
    }

    #[test]
    fn test_room_meta_field_round_trip() {
        let mut meta = RoomMeta::new(42, 600, Some("ab".repeat(32)), None);
        meta.connected.push("t1".to_string());

        let fields: HashMap<String, String> = meta
            .to_fields()
            .unwrap()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();

        assert_eq!(fields.get("connected").unwrap(), "[\"t1\"]");
        assert!(!fields.contains_key("encryptionKeyHash"));
        assert_eq!(RoomMeta::from_fields(&fields).unwrap(), Some(meta));
    }

    #[test]
    fn test_room_meta_from_empty_hash_is_absent() {
        assert_eq!(RoomMeta::from_fields(&HashMap::new()).unwrap(), None);
    }

    #[test]
    fn test_room_meta_corrupt_field() {
        let fields = HashMap::from([("createdAt".to_string(), "yesterday".to_string())]);
        assert!(matches!(
            RoomMeta::from_fields(&fields),
            Err(RoomError::Internal)
        ));
    }

    #[test]
    fn test_room_meta_debug_hides_tokens() {
        let mut meta = RoomMeta::new(0, 60, Some("pw-commitment".to_string()), None);
        meta.connected.push("secret-token".to_string());

        let debug = format!("{meta:?}");
        assert!(!debug.contains("secret-token"));
        assert!(!debug.contains("pw-commitment"));
    }

    #[test]
    fn test_new_message_is_read_by_author() {
        let msg = message();
        assert_eq!(msg.read_by, vec!["author-token".to_string()]);
        assert!(msg.reactions.is_empty());
    }

    #[test]
    fn test_edit_window_boundary() {
        let msg = message();
        assert!(msg.within_edit_window(1_000 + EDIT_WINDOW_MS - 1));
        assert!(!msg.within_edit_window(1_000 + EDIT_WINDOW_MS));
        assert!(!msg.within_edit_window(1_000 + EDIT_WINDOW_MS + 1));
    }

    #[test]
    fn test_toggle_reaction_twice_restores_state() {
        let mut msg = message();
        let before = msg.reactions.clone();

        assert!(msg.toggle_reaction("👍", "peer"));
        assert_eq!(msg.reactions.get("👍").unwrap(), &vec!["peer".to_string()]);

        assert!(!msg.toggle_reaction("👍", "peer"));
        assert_eq!(msg.reactions, before);
        assert!(!msg.reactions.contains_key("👍"));
    }

    #[test]
    fn test_mark_read_is_idempotent() {
        let mut msg = message();
        assert!(msg.mark_read("peer"));
        assert!(!msg.mark_read("peer"));
        assert_eq!(msg.read_by.len(), 2);
    }

    #[test]
    fn test_soft_delete_keeps_identity() {
        let mut msg = message();
        msg.toggle_reaction("🎉", "peer");
        msg.soft_delete();

        assert!(msg.deleted);
        assert_eq!(msg.text, DELETED_PLACEHOLDER);
        assert_eq!(msg.id, "m1");
        assert_eq!(msg.timestamp, 1_000);
        assert!(msg.reactions.contains_key("🎉"));
    }

    #[test]
    fn test_view_strips_tokens() {
        let mut msg = message();
        msg.toggle_reaction("👍", "peer");

        let own = msg.view_for("author-token");
        let other = msg.view_for("peer");
        assert!(own.is_own);
        assert!(!other.is_own);

        let json = serde_json::to_string(&other).unwrap();
        assert!(!json.contains("author-token"));
        assert!(!json.contains("\"peer\""));
        assert!(json.contains("\"isOwn\":false"));
        assert!(json.contains("\"readBy\""));
        assert_eq!(
            other.message.reactions.get("👍").unwrap(),
            &vec![member_tag("peer")]
        );
    }

    #[test]
    fn test_stored_message_json_round_trip_keeps_token() {
        let msg = message();
        let raw = serde_json::to_string(&msg).unwrap();
        assert!(raw.contains("\"token\":\"author-token\""));
        assert!(raw.contains("\"roomId\":\"room-1\""));

        let back: StoredMessage = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, msg);
    }
}
