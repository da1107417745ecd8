//! Shared store abstraction.
//!
//! All room state lives in a TTL-bearing key-value store. Every
//! read-modify-write the service performs is a single `RoomStore` call,
//! which the Redis implementation backs with a Lua script and the in-memory
//! implementation backs with one critical section.
//!
//! # Key Patterns
//!
//! - `meta:{roomId}` - Room metadata (HASH, room TTL)
//! - `messages:{roomId}` - Message list (LIST, TTL mirrors meta)
//! - `typing:{roomId}` - Typing marks (HASH, TTL mirrors meta)
//! - `reactions:{roomId}` - Legacy reaction key, deleted on destroy
//! - `ratelimit:{scope}:{identifier}` - Sliding window (ZSET, window TTL)

pub mod lua_scripts;
pub mod memory;
pub mod redis;

pub use self::memory::InMemoryStore;
pub use self::redis::RedisStore;

use crate::errors::RoomError;
use crate::models::RoomMeta;
use async_trait::async_trait;
use std::collections::HashMap;

pub fn meta_key(room_id: &str) -> String {
    format!("meta:{room_id}")
}

pub fn messages_key(room_id: &str) -> String {
    format!("messages:{room_id}")
}

pub fn typing_key(room_id: &str) -> String {
    format!("typing:{room_id}")
}

pub fn reactions_key(room_id: &str) -> String {
    format!("reactions:{room_id}")
}

/// Every key owned by a room, in deletion order.
pub fn room_keys(room_id: &str) -> [String; 4] {
    [
        meta_key(room_id),
        messages_key(room_id),
        typing_key(room_id),
        reactions_key(room_id),
    ]
}

/// Result of one sliding-window hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindowHit {
    /// Whether the request was counted.
    pub allowed: bool,
    /// Requests in the window before this one.
    pub count: u64,
    /// Score (epoch seconds) of the oldest request still in the window.
    pub oldest: i64,
}

/// Outcome of an atomic membership insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Token appended to `connected`.
    Joined,
    /// Token was already a member.
    AlreadyMember,
    /// Room holds `capacity` members already.
    Full,
    /// Room metadata is absent.
    RoomMissing,
}

/// Outcome of a compare-and-set on one list element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    Replaced,
    /// Element changed since it was read.
    Conflict,
    /// Index is past the end of the list (or the list is gone).
    Missing,
}

/// Room-level store operations.
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Connectivity check for readiness probes.
    async fn ping(&self) -> Result<(), RoomError>;

    /// Evict scores `<= now - window`, then count and conditionally insert
    /// `marker` at `now`. Key TTL is refreshed to `window` on insert.
    async fn rate_window_hit(
        &self,
        key: &str,
        now_secs: i64,
        window_secs: u64,
        max_requests: u32,
        marker: &str,
    ) -> Result<RateWindowHit, RoomError>;

    /// Create room metadata with a TTL. Returns `false` if the id is taken.
    async fn create_room(
        &self,
        room_id: &str,
        meta: &RoomMeta,
        ttl_secs: u64,
    ) -> Result<bool, RoomError>;

    async fn get_room(&self, room_id: &str) -> Result<Option<RoomMeta>, RoomError>;

    /// Remaining lifetime in seconds, `None` if the room is absent.
    async fn room_ttl(&self, room_id: &str) -> Result<Option<i64>, RoomError>;

    /// Atomically add `token` to `connected` unless the room is full.
    async fn join_room(
        &self,
        room_id: &str,
        token: &str,
        capacity: usize,
    ) -> Result<JoinOutcome, RoomError>;

    /// Delete every key the room owns. Returns `true` if meta existed.
    async fn delete_room(&self, room_id: &str) -> Result<bool, RoomError>;

    /// Append a serialized message if the room exists, mirroring its TTL.
    async fn append_message(&self, room_id: &str, raw: &str) -> Result<bool, RoomError>;

    async fn list_messages(&self, room_id: &str) -> Result<Vec<String>, RoomError>;

    /// Replace the element at `index` only if it still equals `expected`.
    async fn replace_message(
        &self,
        room_id: &str,
        index: usize,
        expected: &str,
        replacement: &str,
    ) -> Result<ReplaceOutcome, RoomError>;

    /// Write a typing mark if the room exists, mirroring its TTL.
    async fn set_typing(&self, room_id: &str, token: &str, value_ms: i64)
        -> Result<bool, RoomError>;

    /// Reset a typing mark to 0 only if it still equals `expected_ms`.
    async fn clear_typing_if(
        &self,
        room_id: &str,
        token: &str,
        expected_ms: i64,
    ) -> Result<bool, RoomError>;

    async fn typing_entries(&self, room_id: &str) -> Result<HashMap<String, i64>, RoomError>;
}
