//! Redis-backed `RoomStore`.
//!
//! # Connection Pattern
//!
//! The redis-rs `MultiplexedConnection` is cheap to clone and safe to use
//! concurrently, so each operation clones it instead of locking.
//!
//! # Usage
//!
//! ```rust,ignore
//! let store = RedisStore::connect("redis://localhost:6379").await?;
//! let created = store.create_room("room-1", &meta, 600).await?;
//! ```

use crate::errors::RoomError;
use crate::models::RoomMeta;
use crate::store::{
    lua_scripts, messages_key, meta_key, room_keys, typing_key, JoinOutcome, RateWindowHit,
    ReplaceOutcome, RoomStore,
};
use ::redis::aio::MultiplexedConnection;
use ::redis::{AsyncCommands, Client, Script};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{error, instrument, warn};

/// Redis-backed room store.
#[derive(Clone)]
pub struct RedisStore {
    connection: MultiplexedConnection,
    rate_window_script: Script,
    create_room_script: Script,
    join_room_script: Script,
    append_message_script: Script,
    replace_message_script: Script,
    set_typing_script: Script,
    clear_typing_script: Script,
}

impl RedisStore {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns `RoomError::Store` if the URL is invalid or the connection
    /// fails.
    pub async fn connect(redis_url: &str) -> Result<Self, RoomError> {
        let client = Client::open(redis_url).map_err(|e| {
            // Do NOT log redis_url, it may carry credentials
            error!(target: "rs.store.redis", error = %e, "Failed to open Redis client");
            RoomError::Store(format!("Failed to open Redis client: {e}"))
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                error!(target: "rs.store.redis", error = %e, "Failed to connect to Redis");
                RoomError::Store(format!("Failed to connect to Redis: {e}"))
            })?;

        Ok(Self::from_connection(connection))
    }

    /// Wrap an existing connection.
    pub fn from_connection(connection: MultiplexedConnection) -> Self {
        Self {
            connection,
            rate_window_script: Script::new(lua_scripts::RATE_WINDOW),
            create_room_script: Script::new(lua_scripts::CREATE_ROOM),
            join_room_script: Script::new(lua_scripts::JOIN_ROOM),
            append_message_script: Script::new(lua_scripts::APPEND_MESSAGE),
            replace_message_script: Script::new(lua_scripts::REPLACE_MESSAGE),
            set_typing_script: Script::new(lua_scripts::SET_TYPING),
            clear_typing_script: Script::new(lua_scripts::CLEAR_TYPING_IF),
        }
    }

    /// Connection handle, shared with the event publisher.
    pub fn connection(&self) -> MultiplexedConnection {
        self.connection.clone()
    }
}

fn store_error(operation: &'static str) -> impl Fn(::redis::RedisError) -> RoomError {
    move |e| {
        warn!(target: "rs.store.redis", error = %e, operation, "Redis operation failed");
        RoomError::Store(format!("{operation} failed: {e}"))
    }
}

#[async_trait]
impl RoomStore for RedisStore {
    async fn ping(&self) -> Result<(), RoomError> {
        let mut conn = self.connection.clone();
        let _: String = ::redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(store_error("ping"))?;
        Ok(())
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn rate_window_hit(
        &self,
        key: &str,
        now_secs: i64,
        window_secs: u64,
        max_requests: u32,
        marker: &str,
    ) -> Result<RateWindowHit, RoomError> {
        let mut conn = self.connection.clone();
        let (allowed, count, oldest): (i64, i64, i64) = self
            .rate_window_script
            .key(key)
            .arg(now_secs)
            .arg(window_secs)
            .arg(max_requests)
            .arg(marker)
            .invoke_async(&mut conn)
            .await
            .map_err(store_error("rate_window_hit"))?;

        Ok(RateWindowHit {
            allowed: allowed == 1,
            count: u64::try_from(count).unwrap_or(0),
            oldest,
        })
    }

    #[instrument(skip_all, fields(room_id = %room_id))]
    async fn create_room(
        &self,
        room_id: &str,
        meta: &RoomMeta,
        ttl_secs: u64,
    ) -> Result<bool, RoomError> {
        let mut conn = self.connection.clone();
        let mut invocation = self.create_room_script.key(meta_key(room_id));
        invocation.arg(ttl_secs);
        for (field, value) in meta.to_fields()? {
            invocation.arg(field).arg(value);
        }

        let created: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(store_error("create_room"))?;
        Ok(created == 1)
    }

    #[instrument(skip_all, fields(room_id = %room_id))]
    async fn get_room(&self, room_id: &str) -> Result<Option<RoomMeta>, RoomError> {
        let mut conn = self.connection.clone();
        let fields: HashMap<String, String> = conn
            .hgetall(meta_key(room_id))
            .await
            .map_err(store_error("get_room"))?;
        RoomMeta::from_fields(&fields)
    }

    async fn room_ttl(&self, room_id: &str) -> Result<Option<i64>, RoomError> {
        let mut conn = self.connection.clone();
        let ttl: i64 = conn
            .ttl(meta_key(room_id))
            .await
            .map_err(store_error("room_ttl"))?;

        // -2: no key. -1: key without expiry, which rooms never have.
        Ok(match ttl {
            -2 => None,
            t => Some(t.max(0)),
        })
    }

    #[instrument(skip_all, fields(room_id = %room_id))]
    async fn join_room(
        &self,
        room_id: &str,
        token: &str,
        capacity: usize,
    ) -> Result<JoinOutcome, RoomError> {
        let mut conn = self.connection.clone();
        let outcome: i64 = self
            .join_room_script
            .key(meta_key(room_id))
            .arg(token)
            .arg(capacity)
            .invoke_async(&mut conn)
            .await
            .map_err(store_error("join_room"))?;

        Ok(match outcome {
            1 => JoinOutcome::Joined,
            2 => JoinOutcome::AlreadyMember,
            0 => JoinOutcome::Full,
            _ => JoinOutcome::RoomMissing,
        })
    }

    #[instrument(skip_all, fields(room_id = %room_id))]
    async fn delete_room(&self, room_id: &str) -> Result<bool, RoomError> {
        let mut conn = self.connection.clone();
        let existed: i64 = conn
            .exists(meta_key(room_id))
            .await
            .map_err(store_error("delete_room"))?;
        let _: i64 = conn
            .del(room_keys(room_id).to_vec())
            .await
            .map_err(store_error("delete_room"))?;
        Ok(existed > 0)
    }

    #[instrument(skip_all, fields(room_id = %room_id))]
    async fn append_message(&self, room_id: &str, raw: &str) -> Result<bool, RoomError> {
        let mut conn = self.connection.clone();
        let appended: i64 = self
            .append_message_script
            .key(meta_key(room_id))
            .key(messages_key(room_id))
            .arg(raw)
            .invoke_async(&mut conn)
            .await
            .map_err(store_error("append_message"))?;
        Ok(appended == 1)
    }

    async fn list_messages(&self, room_id: &str) -> Result<Vec<String>, RoomError> {
        let mut conn = self.connection.clone();
        conn.lrange(messages_key(room_id), 0, -1)
            .await
            .map_err(store_error("list_messages"))
    }

    #[instrument(skip_all, fields(room_id = %room_id, index = index))]
    async fn replace_message(
        &self,
        room_id: &str,
        index: usize,
        expected: &str,
        replacement: &str,
    ) -> Result<ReplaceOutcome, RoomError> {
        let mut conn = self.connection.clone();
        let outcome: i64 = self
            .replace_message_script
            .key(messages_key(room_id))
            .arg(index)
            .arg(expected)
            .arg(replacement)
            .invoke_async(&mut conn)
            .await
            .map_err(store_error("replace_message"))?;

        Ok(match outcome {
            1 => ReplaceOutcome::Replaced,
            0 => ReplaceOutcome::Conflict,
            _ => ReplaceOutcome::Missing,
        })
    }

    async fn set_typing(
        &self,
        room_id: &str,
        token: &str,
        value_ms: i64,
    ) -> Result<bool, RoomError> {
        let mut conn = self.connection.clone();
        let written: i64 = self
            .set_typing_script
            .key(meta_key(room_id))
            .key(typing_key(room_id))
            .arg(token)
            .arg(value_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(store_error("set_typing"))?;
        Ok(written == 1)
    }

    async fn clear_typing_if(
        &self,
        room_id: &str,
        token: &str,
        expected_ms: i64,
    ) -> Result<bool, RoomError> {
        let mut conn = self.connection.clone();
        let cleared: i64 = self
            .clear_typing_script
            .key(typing_key(room_id))
            .arg(token)
            .arg(expected_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(store_error("clear_typing_if"))?;
        Ok(cleared == 1)
    }

    async fn typing_entries(&self, room_id: &str) -> Result<HashMap<String, i64>, RoomError> {
        let mut conn = self.connection.clone();
        let raw: HashMap<String, String> = conn
            .hgetall(typing_key(room_id))
            .await
            .map_err(store_error("typing_entries"))?;

        Ok(raw
            .into_iter()
            .filter_map(|(token, mark)| mark.parse().ok().map(|ms| (token, ms)))
            .collect())
    }
}

// Run with: docker run -d -p 6379:6379 redis:7
#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const REDIS_URL: &str = "redis://localhost:6379";

    fn unique(prefix: &str) -> String {
        format!("{prefix}-{}", uuid::Uuid::new_v4())
    }

    async fn store_with_room(ttl_secs: u64) -> (RedisStore, String) {
        let store = RedisStore::connect(REDIS_URL).await.unwrap();
        let room_id = unique("room");
        let meta = RoomMeta::new(1_700_000_000_000, ttl_secs, None, None);
        assert!(store.create_room(&room_id, &meta, ttl_secs).await.unwrap());
        (store, room_id)
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_join_room_enforces_capacity() {
        let (store, room_id) = store_with_room(60).await;

        assert_eq!(store.join_room(&room_id, "a", 2).await.unwrap(), JoinOutcome::Joined);
        assert_eq!(
            store.join_room(&room_id, "a", 2).await.unwrap(),
            JoinOutcome::AlreadyMember
        );
        assert_eq!(store.join_room(&room_id, "b", 2).await.unwrap(), JoinOutcome::Joined);
        assert_eq!(store.join_room(&room_id, "c", 2).await.unwrap(), JoinOutcome::Full);
        assert_eq!(
            store.join_room(&unique("missing"), "a", 2).await.unwrap(),
            JoinOutcome::RoomMissing
        );

        let meta = store.get_room(&room_id).await.unwrap().unwrap();
        assert_eq!(meta.connected, vec!["a".to_string(), "b".to_string()]);
        store.delete_room(&room_id).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_concurrent_joins_admit_capacity() {
        let (store, room_id) = store_with_room(60).await;

        let joins: Vec<_> = (0..6)
            .map(|i| {
                let store = store.clone();
                let room_id = room_id.clone();
                tokio::spawn(async move { store.join_room(&room_id, &format!("t{i}"), 2).await })
            })
            .collect();
        let mut joined = 0;
        for join in joins {
            if join.await.unwrap().unwrap() == JoinOutcome::Joined {
                joined += 1;
            }
        }

        assert_eq!(joined, 2);
        store.delete_room(&room_id).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_replace_message_compares_before_writing() {
        let (store, room_id) = store_with_room(60).await;
        assert!(store.append_message(&room_id, "v1").await.unwrap());

        assert_eq!(
            store.replace_message(&room_id, 0, "stale", "v2").await.unwrap(),
            ReplaceOutcome::Conflict
        );
        assert_eq!(
            store.replace_message(&room_id, 0, "v1", "v2").await.unwrap(),
            ReplaceOutcome::Replaced
        );
        assert_eq!(
            store.replace_message(&room_id, 5, "v2", "v3").await.unwrap(),
            ReplaceOutcome::Missing
        );
        assert_eq!(store.list_messages(&room_id).await.unwrap(), vec!["v2"]);

        store.delete_room(&room_id).await.unwrap();
        assert!(!store.append_message(&room_id, "late").await.unwrap());
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_rate_window_slides() {
        let store = RedisStore::connect(REDIS_URL).await.unwrap();
        let key = unique("ratelimit:ip");
        let now = 1_700_000_000;

        assert!(store.rate_window_hit(&key, now, 60, 2, "m1").await.unwrap().allowed);
        assert!(store.rate_window_hit(&key, now + 1, 60, 2, "m2").await.unwrap().allowed);

        let denied = store.rate_window_hit(&key, now + 2, 60, 2, "m3").await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.count, 2);
        assert_eq!(denied.oldest, now);

        // m1 falls out of the window.
        let hit = store.rate_window_hit(&key, now + 60, 60, 2, "m4").await.unwrap();
        assert!(hit.allowed);
        assert_eq!(hit.count, 1);
    }
}
