//! Room event fan-out.
//!
//! Every committed mutation publishes one event on the room's channel
//! `room:{roomId}` as `{"event": "chat.<kind>", "data": {...}}`. Delivery is
//! best-effort: a publish failure is logged and counted but never fails the
//! request that caused it, because the write is already committed and
//! clients reconcile by polling.

use crate::errors::RoomError;
use crate::models::Message;
use crate::observability::metrics::record_event_published;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Channel name for a room.
pub fn room_channel(room_id: &str) -> String {
    format!("room:{room_id}")
}

/// An event published to a room's live subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum RoomEvent {
    /// New message, token-stripped.
    #[serde(rename = "chat.message")]
    Message(Message),

    #[serde(rename = "chat.destroy", rename_all = "camelCase")]
    Destroy { is_destroyed: bool },

    #[serde(rename = "chat.messageEdited", rename_all = "camelCase")]
    MessageEdited {
        message_id: String,
        text: String,
        edited_at: i64,
    },

    #[serde(rename = "chat.messageDeleted", rename_all = "camelCase")]
    MessageDeleted { message_id: String },

    #[serde(rename = "chat.reaction", rename_all = "camelCase")]
    Reaction {
        message_id: String,
        emoji: String,
        /// Member tag of the reacting member.
        user: String,
        added: bool,
    },

    #[serde(rename = "chat.readReceipt", rename_all = "camelCase")]
    ReadReceipt { message_id: String, user: String },

    #[serde(rename = "chat.typing", rename_all = "camelCase")]
    Typing { user: String, is_typing: bool },
}

impl RoomEvent {
    /// Event name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            RoomEvent::Message(_) => "chat.message",
            RoomEvent::Destroy { .. } => "chat.destroy",
            RoomEvent::MessageEdited { .. } => "chat.messageEdited",
            RoomEvent::MessageDeleted { .. } => "chat.messageDeleted",
            RoomEvent::Reaction { .. } => "chat.reaction",
            RoomEvent::ReadReceipt { .. } => "chat.readReceipt",
            RoomEvent::Typing { .. } => "chat.typing",
        }
    }
}

/// Transport that delivers room events to live subscribers.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, room_id: &str, event: &RoomEvent) -> Result<(), RoomError>;
}

/// Publish after commit. Failures are logged and counted, never returned.
pub async fn publish_best_effort(publisher: &dyn EventPublisher, room_id: &str, event: RoomEvent) {
    match publisher.publish(room_id, &event).await {
        Ok(()) => record_event_published(event.name(), "success"),
        Err(e) => {
            warn!(
                target: "rs.events",
                room_id = %room_id,
                event = event.name(),
                error = %e,
                "Failed to publish room event"
            );
            record_event_published(event.name(), "error");
        }
    }
}

/// Publishes events with Redis `PUBLISH`.
#[derive(Clone)]
pub struct RedisPublisher {
    connection: MultiplexedConnection,
}

impl RedisPublisher {
    pub fn new(connection: MultiplexedConnection) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl EventPublisher for RedisPublisher {
    async fn publish(&self, room_id: &str, event: &RoomEvent) -> Result<(), RoomError> {
        let payload = serde_json::to_string(event).map_err(|e| {
            tracing::error!(target: "rs.events", error = %e, "Failed to serialize event");
            RoomError::Internal
        })?;

        let mut conn = self.connection.clone();
        let _receivers: i64 = conn.publish(room_channel(room_id), payload).await?;
        Ok(())
    }
}

/// In-process publishers for tests.
pub mod mock {
    use super::*;
    use tokio::sync::Mutex;

    /// Records every published event in order.
    #[derive(Default)]
    pub struct RecordingPublisher {
        events: Mutex<Vec<(String, RoomEvent)>>,
        fail: bool,
    }

    impl RecordingPublisher {
        pub fn new() -> Self {
            Self::default()
        }

        /// A publisher whose transport is down; publishes return errors.
        pub fn failing() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        /// All `(room_id, event)` pairs published so far.
        pub async fn events(&self) -> Vec<(String, RoomEvent)> {
            self.events.lock().await.clone()
        }

        /// Events published to one room.
        pub async fn events_for(&self, room_id: &str) -> Vec<RoomEvent> {
            self.events
                .lock()
                .await
                .iter()
                .filter(|(room, _)| room == room_id)
                .map(|(_, event)| event.clone())
                .collect()
        }

        pub async fn clear(&self) {
            self.events.lock().await.clear();
        }
    }

    #[async_trait]
    impl EventPublisher for RecordingPublisher {
        async fn publish(&self, room_id: &str, event: &RoomEvent) -> Result<(), RoomError> {
            if self.fail {
                return Err(RoomError::Store("publisher unavailable".to_string()));
            }
            self.events
                .lock()
                .await
                .push((room_id.to_string(), event.clone()));
            Ok(())
        }
    }
}
