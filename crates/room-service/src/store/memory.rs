//! In-memory `RoomStore`.
//!
//! Mirrors the Redis scripts operation for operation: one mutex critical
//! section per call gives the same atomicity, and expiry is evaluated
//! lazily against the injected `Clock`, so a key past its deadline behaves
//! exactly like a key Redis already evicted.
//!
//! # Example
//!
//! ```rust,ignore
//! let clock = ManualClock::new(0);
//! let store = InMemoryStore::new(Arc::new(clock.clone()));
//!
//! store.create_room("r1", &meta, 60).await?;
//! clock.advance(Duration::from_secs(61));
//! assert!(store.get_room("r1").await?.is_none());
//! ```

use crate::clock::Clock;
use crate::errors::RoomError;
use crate::models::RoomMeta;
use crate::store::{
    messages_key, meta_key, room_keys, typing_key, JoinOutcome, RateWindowHit, ReplaceOutcome,
    RoomStore,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug)]
struct Entry<T> {
    value: T,
    /// Absolute deadline in epoch millis.
    expires_at: Option<i64>,
}

impl<T> Entry<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn remaining_ms(&self, now: i64) -> Option<i64> {
        self.expires_at.map(|at| at - now)
    }
}

#[derive(Debug, Default)]
struct State {
    hashes: HashMap<String, Entry<HashMap<String, String>>>,
    lists: HashMap<String, Entry<Vec<String>>>,
    zsets: HashMap<String, Entry<Vec<(i64, String)>>>,
}

/// Drop `key` if its deadline has passed.
fn purge<T>(map: &mut HashMap<String, Entry<T>>, key: &str, now: i64) {
    if map
        .get(key)
        .and_then(|e| e.expires_at)
        .is_some_and(|at| at <= now)
    {
        map.remove(key);
    }
}

/// The entry at `key` if it has not expired.
fn live<'a, T>(
    map: &'a mut HashMap<String, Entry<T>>,
    key: &str,
    now: i64,
) -> Option<&'a mut Entry<T>> {
    purge(map, key, now);
    map.get_mut(key)
}

/// The live entry at `key`, created empty (without expiry) if absent.
fn live_or_default<'a, T: Default>(
    map: &'a mut HashMap<String, Entry<T>>,
    key: &str,
    now: i64,
) -> &'a mut Entry<T> {
    purge(map, key, now);
    map.entry(key.to_string())
        .or_insert_with(|| Entry::new(T::default()))
}

/// In-memory room store for tests and local development.
#[derive(Clone)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
    clock: Arc<dyn Clock>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryStore {
    /// Create an empty store reading time from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            clock,
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make every subsequent call fail as if the store were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Overwrite a list element without any check (simulates a concurrent
    /// writer).
    #[cfg(test)]
    pub(crate) async fn overwrite_message(&self, room_id: &str, index: usize, raw: &str) -> bool {
        let now = self.clock.now_ms();
        let mut state = self.state.lock().await;
        live(&mut state.lists, &messages_key(room_id), now)
            .and_then(|entry| entry.value.get_mut(index))
            .map(|slot| *slot = raw.to_string())
            .is_some()
    }

    fn check_available(&self) -> Result<(), RoomError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RoomError::Store("in-memory store marked unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RoomStore for InMemoryStore {
    async fn ping(&self) -> Result<(), RoomError> {
        self.check_available()
    }

    async fn rate_window_hit(
        &self,
        key: &str,
        now_secs: i64,
        window_secs: u64,
        max_requests: u32,
        marker: &str,
    ) -> Result<RateWindowHit, RoomError> {
        self.check_available()?;
        let now = self.clock.now_ms();
        let window = i64::try_from(window_secs).unwrap_or(i64::MAX);
        let mut state = self.state.lock().await;

        let entry = live_or_default(&mut state.zsets, key, now);

        let cutoff = now_secs.saturating_sub(window);
        entry.value.retain(|(score, _)| *score > cutoff);

        let count = entry.value.len() as u64;
        let oldest = entry
            .value
            .iter()
            .map(|(score, _)| *score)
            .min()
            .unwrap_or(now_secs);

        if count >= u64::from(max_requests) {
            return Ok(RateWindowHit {
                allowed: false,
                count,
                oldest,
            });
        }

        entry.value.push((now_secs, marker.to_string()));
        entry.expires_at = Some(now.saturating_add(window.saturating_mul(1000)));

        Ok(RateWindowHit {
            allowed: true,
            count,
            oldest,
        })
    }

    async fn create_room(
        &self,
        room_id: &str,
        meta: &RoomMeta,
        ttl_secs: u64,
    ) -> Result<bool, RoomError> {
        self.check_available()?;
        let now = self.clock.now_ms();
        let key = meta_key(room_id);
        let fields = meta.to_fields()?;
        let mut state = self.state.lock().await;

        if live(&mut state.hashes, &key, now).is_some() {
            return Ok(false);
        }

        let ttl_ms = i64::try_from(ttl_secs).unwrap_or(i64::MAX).saturating_mul(1000);
        state.hashes.insert(
            key,
            Entry {
                value: fields
                    .into_iter()
                    .map(|(field, value)| (field.to_string(), value))
                    .collect(),
                expires_at: Some(now.saturating_add(ttl_ms)),
            },
        );
        Ok(true)
    }

    async fn get_room(&self, room_id: &str) -> Result<Option<RoomMeta>, RoomError> {
        self.check_available()?;
        let now = self.clock.now_ms();
        let mut state = self.state.lock().await;

        match live(&mut state.hashes, &meta_key(room_id), now) {
            Some(entry) => RoomMeta::from_fields(&entry.value),
            None => Ok(None),
        }
    }

    async fn room_ttl(&self, room_id: &str) -> Result<Option<i64>, RoomError> {
        self.check_available()?;
        let now = self.clock.now_ms();
        let mut state = self.state.lock().await;

        Ok(live(&mut state.hashes, &meta_key(room_id), now).map(|entry| {
            entry
                .remaining_ms(now)
                .map_or(0, |ms| ms.div_euclid(1000).max(0))
        }))
    }

    async fn join_room(
        &self,
        room_id: &str,
        token: &str,
        capacity: usize,
    ) -> Result<JoinOutcome, RoomError> {
        self.check_available()?;
        let now = self.clock.now_ms();
        let mut state = self.state.lock().await;

        let Some(entry) = live(&mut state.hashes, &meta_key(room_id), now) else {
            return Ok(JoinOutcome::RoomMissing);
        };

        let mut connected: Vec<String> = match entry.value.get("connected") {
            Some(raw) if !raw.is_empty() => serde_json::from_str(raw).map_err(|e| {
                tracing::error!(target: "rs.store.memory", error = %e, "Corrupt member list");
                RoomError::Internal
            })?,
            _ => Vec::new(),
        };

        if connected.iter().any(|t| t == token) {
            return Ok(JoinOutcome::AlreadyMember);
        }
        if connected.len() >= capacity {
            return Ok(JoinOutcome::Full);
        }

        connected.push(token.to_string());
        let encoded = serde_json::to_string(&connected).map_err(|_| RoomError::Internal)?;
        entry.value.insert("connected".to_string(), encoded);
        Ok(JoinOutcome::Joined)
    }

    async fn delete_room(&self, room_id: &str) -> Result<bool, RoomError> {
        self.check_available()?;
        let now = self.clock.now_ms();
        let mut state = self.state.lock().await;

        let existed = live(&mut state.hashes, &meta_key(room_id), now).is_some();
        for key in room_keys(room_id) {
            state.hashes.remove(&key);
            state.lists.remove(&key);
            state.zsets.remove(&key);
        }
        Ok(existed)
    }

    async fn append_message(&self, room_id: &str, raw: &str) -> Result<bool, RoomError> {
        self.check_available()?;
        let now = self.clock.now_ms();
        let mut state = self.state.lock().await;

        let Some(deadline) = live(&mut state.hashes, &meta_key(room_id), now).map(|e| e.expires_at)
        else {
            return Ok(false);
        };

        let list = live_or_default(&mut state.lists, &messages_key(room_id), now);
        list.value.push(raw.to_string());
        if deadline.is_some() {
            list.expires_at = deadline;
        }
        Ok(true)
    }

    async fn list_messages(&self, room_id: &str) -> Result<Vec<String>, RoomError> {
        self.check_available()?;
        let now = self.clock.now_ms();
        let mut state = self.state.lock().await;

        Ok(live(&mut state.lists, &messages_key(room_id), now)
            .map(|entry| entry.value.clone())
            .unwrap_or_default())
    }

    async fn replace_message(
        &self,
        room_id: &str,
        index: usize,
        expected: &str,
        replacement: &str,
    ) -> Result<ReplaceOutcome, RoomError> {
        self.check_available()?;
        let now = self.clock.now_ms();
        let mut state = self.state.lock().await;

        let Some(slot) = live(&mut state.lists, &messages_key(room_id), now)
            .and_then(|entry| entry.value.get_mut(index))
        else {
            return Ok(ReplaceOutcome::Missing);
        };

        if slot != expected {
            return Ok(ReplaceOutcome::Conflict);
        }
        *slot = replacement.to_string();
        Ok(ReplaceOutcome::Replaced)
    }

    async fn set_typing(
        &self,
        room_id: &str,
        token: &str,
        value_ms: i64,
    ) -> Result<bool, RoomError> {
        self.check_available()?;
        let now = self.clock.now_ms();
        let mut state = self.state.lock().await;

        let Some(deadline) = live(&mut state.hashes, &meta_key(room_id), now).map(|e| e.expires_at)
        else {
            return Ok(false);
        };

        let hash = live_or_default(&mut state.hashes, &typing_key(room_id), now);
        hash.value.insert(token.to_string(), value_ms.to_string());
        if deadline.is_some() {
            hash.expires_at = deadline;
        }
        Ok(true)
    }

    async fn clear_typing_if(
        &self,
        room_id: &str,
        token: &str,
        expected_ms: i64,
    ) -> Result<bool, RoomError> {
        self.check_available()?;
        let now = self.clock.now_ms();
        let mut state = self.state.lock().await;

        let Some(entry) = live(&mut state.hashes, &typing_key(room_id), now) else {
            return Ok(false);
        };
        match entry.value.get_mut(token) {
            Some(mark) if *mark == expected_ms.to_string() => {
                *mark = "0".to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn typing_entries(&self, room_id: &str) -> Result<HashMap<String, i64>, RoomError> {
        self.check_available()?;
        let now = self.clock.now_ms();
        let mut state = self.state.lock().await;

        Ok(live(&mut state.hashes, &typing_key(room_id), now)
            .map(|entry| {
                entry
                    .value
                    .iter()
                    .filter_map(|(token, mark)| mark.parse().ok().map(|ms| (token.clone(), ms)))
                    .collect()
            })
            .unwrap_or_default())
    }
}
