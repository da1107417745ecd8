//! Typing indicators.
//!
//! Each member's mark in `typing:{roomId}` is the epoch millis of their
//! last "typing" update, or 0 once they stop. Marks are filtered on read;
//! nothing evicts them.
//!
//! A "typing" update also schedules one auto-clear per (room, member). A
//! newer update aborts the pending clear, and a clear that fires anyway
//! only wins if the stored mark is still the one it was scheduled for.

use crate::clock::Clock;
use crate::errors::RoomError;
use crate::events::{publish_best_effort, EventPublisher, RoomEvent};
use crate::store::RoomStore;
use common::crypto::member_tag;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

/// Members whose mark is younger than this are reported as typing.
pub const ACTIVE_WINDOW_MS: i64 = 6_000;

type TimerKey = (String, String);

struct PendingClear {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Sets, clears and lists typing marks.
#[derive(Clone)]
pub struct TypingService {
    store: Arc<dyn RoomStore>,
    clock: Arc<dyn Clock>,
    publisher: Arc<dyn EventPublisher>,
    timeout: Duration,
    timers: Arc<Mutex<HashMap<TimerKey, PendingClear>>>,
    generations: Arc<AtomicU64>,
}

impl TypingService {
    pub fn new(
        store: Arc<dyn RoomStore>,
        clock: Arc<dyn Clock>,
        publisher: Arc<dyn EventPublisher>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            publisher,
            timeout,
            timers: Arc::new(Mutex::new(HashMap::new())),
            generations: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Record whether `token` is typing and announce it.
    #[instrument(skip_all, fields(room_id = %room_id, is_typing))]
    pub async fn set_typing(
        &self,
        room_id: &str,
        token: &str,
        is_typing: bool,
    ) -> Result<(), RoomError> {
        let mark = if is_typing { self.clock.now_ms() } else { 0 };
        if !self.store.set_typing(room_id, token, mark).await? {
            return Err(RoomError::NotFound("Room not found".to_string()));
        }

        publish_best_effort(
            self.publisher.as_ref(),
            room_id,
            RoomEvent::Typing {
                user: member_tag(token),
                is_typing,
            },
        )
        .await;

        self.reschedule(room_id, token, is_typing.then_some(mark))
            .await;
        Ok(())
    }

    /// Member tags that typed within the last `ACTIVE_WINDOW_MS`.
    pub async fn list_active(&self, room_id: &str) -> Result<Vec<String>, RoomError> {
        let now = self.clock.now_ms();
        let mut active: Vec<String> = self
            .store
            .typing_entries(room_id)
            .await?
            .into_iter()
            .filter(|(_, mark)| *mark > 0 && now.saturating_sub(*mark) < ACTIVE_WINDOW_MS)
            .map(|(token, _)| member_tag(&token))
            .collect();
        active.sort();
        Ok(active)
    }

    /// Number of auto-clears waiting to fire.
    pub async fn pending_clears(&self) -> usize {
        self.timers.lock().await.len()
    }

    /// Cancel any pending clear and, for a fresh `mark`, schedule a new one.
    async fn reschedule(&self, room_id: &str, token: &str, mark: Option<i64>) {
        let key: TimerKey = (room_id.to_string(), token.to_string());
        let mut timers = self.timers.lock().await;

        if let Some(previous) = timers.remove(&key) {
            previous.handle.abort();
        }
        let Some(mark) = mark else {
            return;
        };

        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        let service = self.clone();
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(service.timeout).await;
            service.expire(task_key, mark, generation).await;
        });

        timers.insert(key, PendingClear { generation, handle });
    }

    async fn expire(&self, key: TimerKey, mark: i64, generation: u64) {
        {
            let mut timers = self.timers.lock().await;
            match timers.get(&key) {
                Some(pending) if pending.generation == generation => {
                    timers.remove(&key);
                }
                _ => return,
            }
        }

        let (room_id, token) = key;
        match self.store.clear_typing_if(&room_id, &token, mark).await {
            Ok(true) => {
                debug!(target: "rs.services.typing", room_id = %room_id, "Typing indicator expired");
                publish_best_effort(
                    self.publisher.as_ref(),
                    &room_id,
                    RoomEvent::Typing {
                        user: member_tag(&token),
                        is_typing: false,
                    },
                )
                .await;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(
                    target: "rs.services.typing",
                    room_id = %room_id,
                    error = %e,
                    "Failed to clear typing indicator"
                );
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::events::mock::RecordingPublisher;
    use crate::models::RoomMeta;
    use crate::store::InMemoryStore;

    const START_MS: i64 = 1_700_000_000_000;
    const ROOM: &str = "room-1";
    const ALICE: &str = "alice-token";
    const BOB: &str = "bob-token";
    const TIMEOUT: Duration = Duration::from_millis(3_000);

    struct Fixture {
        service: TypingService,
        store: InMemoryStore,
        clock: ManualClock,
        publisher: Arc<RecordingPublisher>,
    }

    async fn fixture() -> Fixture {
        let clock = ManualClock::new(START_MS);
        let store = InMemoryStore::new(Arc::new(clock.clone()));
        let publisher = Arc::new(RecordingPublisher::new());
        store
            .create_room(ROOM, &RoomMeta::new(START_MS, 600, None, None), 600)
            .await
            .unwrap();

        let service = TypingService::new(
            Arc::new(store.clone()),
            Arc::new(clock.clone()),
            publisher.clone(),
            TIMEOUT,
        );
        Fixture {
            service,
            store,
            clock,
            publisher,
        }
    }

    fn typing(token: &str, is_typing: bool) -> RoomEvent {
        RoomEvent::Typing {
            user: member_tag(token),
            is_typing,
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_typing_publishes_and_lists() {
        let f = fixture().await;
        f.service.set_typing(ROOM, ALICE, true).await.unwrap();

        assert_eq!(f.publisher.events_for(ROOM).await, vec![typing(ALICE, true)]);
        assert_eq!(
            f.service.list_active(ROOM).await.unwrap(),
            vec![member_tag(ALICE)]
        );
        assert_eq!(
            f.store.typing_entries(ROOM).await.unwrap().get(ALICE),
            Some(&START_MS)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_clear_after_timeout() {
        let f = fixture().await;
        f.service.set_typing(ROOM, ALICE, true).await.unwrap();

        tokio::time::sleep(TIMEOUT + Duration::from_millis(1)).await;
        settle().await;

        assert_eq!(
            f.publisher.events_for(ROOM).await,
            vec![typing(ALICE, true), typing(ALICE, false)]
        );
        assert_eq!(
            f.store.typing_entries(ROOM).await.unwrap().get(ALICE),
            Some(&0)
        );
        assert_eq!(f.service.pending_clears().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_update_supersedes_pending_clear() {
        let f = fixture().await;
        f.service.set_typing(ROOM, ALICE, true).await.unwrap();

        tokio::time::sleep(Duration::from_millis(2_000)).await;
        f.clock.advance(Duration::from_millis(2_000));
        f.service.set_typing(ROOM, ALICE, true).await.unwrap();

        // The first clear would have fired at 3s.
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        settle().await;
        assert_eq!(f.publisher.events_for(ROOM).await.len(), 2);
        assert_eq!(f.service.pending_clears().await, 1);

        tokio::time::sleep(Duration::from_millis(1_600)).await;
        settle().await;
        assert_eq!(
            f.publisher.events_for(ROOM).await.last(),
            Some(&typing(ALICE, false))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_stop_cancels_clear() {
        let f = fixture().await;
        f.service.set_typing(ROOM, ALICE, true).await.unwrap();
        f.service.set_typing(ROOM, ALICE, false).await.unwrap();
        assert_eq!(f.service.pending_clears().await, 0);

        tokio::time::sleep(TIMEOUT * 2).await;
        settle().await;

        assert_eq!(
            f.publisher.events_for(ROOM).await,
            vec![typing(ALICE, true), typing(ALICE, false)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_active_filters_stale_marks() {
        let f = fixture().await;
        f.service.set_typing(ROOM, ALICE, true).await.unwrap();
        f.clock.advance(Duration::from_millis(4_000));
        f.service.set_typing(ROOM, BOB, true).await.unwrap();

        let mut both = vec![member_tag(ALICE), member_tag(BOB)];
        both.sort();
        assert_eq!(f.service.list_active(ROOM).await.unwrap(), both);

        // Alice's mark is now exactly 6s old.
        f.clock.advance(Duration::from_millis(2_000));
        assert_eq!(
            f.service.list_active(ROOM).await.unwrap(),
            vec![member_tag(BOB)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_room_is_not_found() {
        let f = fixture().await;
        assert!(matches!(
            f.service.set_typing("gone", ALICE, true).await,
            Err(RoomError::NotFound(_))
        ));
        assert!(f.publisher.events().await.is_empty());
        assert_eq!(f.service.pending_clears().await, 0);
    }
}
