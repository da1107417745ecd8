//! Message store and mutation engine.
//!
//! Messages live in the room's append-only list, so element positions are
//! stable and lookups by id are a linear scan. Every mutation is a
//! compare-and-set of one element against the exact bytes that were read;
//! a lost race re-reads and retries.

use crate::clock::Clock;
use crate::errors::RoomError;
use crate::events::{publish_best_effort, EventPublisher, RoomEvent};
use crate::models::{
    MessageView, SendMessageRequest, StoredMessage, MAX_EMOJI_CHARS, MAX_SENDER_CHARS,
    MAX_TEXT_CHARS,
};
use crate::observability::metrics::record_message_operation;
use crate::services::rate_limiter::{RateLimitPolicy, RateLimitScope, RateLimiter};
use crate::store::{ReplaceOutcome, RoomStore};
use common::crypto::member_tag;
use common::types::MessageId;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Compare-and-set attempts before a mutation gives up.
pub const MAX_MUTATION_ATTEMPTS: usize = 5;

/// Limits applied by the message engine.
#[derive(Debug, Clone, Copy)]
pub struct MessageLimits {
    /// Sends per membership token.
    pub send: RateLimitPolicy,
    /// Edits, deletes and reactions per room.
    pub room_action: RateLimitPolicy,
}

/// What a mutation closure decided.
enum Mutation<T> {
    /// Persist the mutated message.
    Write(T),
    /// Nothing changed; skip the write.
    Unchanged(T),
}

/// Result of a committed (or skipped) mutation.
struct Applied<T> {
    value: T,
    message: StoredMessage,
    written: bool,
}

/// Message operations for one room at a time.
#[derive(Clone)]
pub struct MessageService {
    store: Arc<dyn RoomStore>,
    clock: Arc<dyn Clock>,
    publisher: Arc<dyn EventPublisher>,
    limiter: RateLimiter,
    limits: MessageLimits,
}

/// Record the outcome of `operation` and pass the result through.
async fn observed<T>(
    operation: &'static str,
    work: impl Future<Output = Result<T, RoomError>>,
) -> Result<T, RoomError> {
    let result = work.await;
    let status = match &result {
        Ok(_) => "success",
        Err(e) => e.kind(),
    };
    record_message_operation(operation, status);
    result
}

fn validate_text(text: &str) -> Result<(), RoomError> {
    let chars = text.chars().count();
    if text.trim().is_empty() || chars > MAX_TEXT_CHARS {
        return Err(RoomError::Validation(format!(
            "text must be between 1 and {MAX_TEXT_CHARS} characters"
        )));
    }
    Ok(())
}

fn validate_sender(sender: &str) -> Result<(), RoomError> {
    if sender.trim().is_empty() || sender.chars().count() > MAX_SENDER_CHARS {
        return Err(RoomError::Validation(format!(
            "sender must be between 1 and {MAX_SENDER_CHARS} characters"
        )));
    }
    Ok(())
}

fn validate_emoji(emoji: &str) -> Result<(), RoomError> {
    if emoji.trim().is_empty() || emoji.chars().count() > MAX_EMOJI_CHARS {
        return Err(RoomError::Validation(format!(
            "emoji must be between 1 and {MAX_EMOJI_CHARS} characters"
        )));
    }
    Ok(())
}

fn encode(message: &StoredMessage) -> Result<String, RoomError> {
    serde_json::to_string(message).map_err(|e| {
        tracing::error!(target: "rs.services.messages", error = %e, "Failed to encode message");
        RoomError::Internal
    })
}

fn message_not_found() -> RoomError {
    RoomError::NotFound("Message not found".to_string())
}

/// Position, raw bytes and decoded form of the message with `message_id`.
fn find_message<'a>(
    raw: &'a [String],
    message_id: &str,
) -> Option<(usize, &'a str, StoredMessage)> {
    raw.iter().enumerate().find_map(|(index, element)| {
        serde_json::from_str::<StoredMessage>(element)
            .ok()
            .filter(|message| message.id == message_id)
            .map(|message| (index, element.as_str(), message))
    })
}

/// Author-only, inside the edit window.
fn check_author_window(message: &StoredMessage, token: &str, now_ms: i64) -> Result<(), RoomError> {
    if !message.is_authored_by(token) {
        return Err(RoomError::Forbidden(
            "Only the author can change this message".to_string(),
        ));
    }
    if !message.within_edit_window(now_ms) {
        return Err(RoomError::Forbidden(
            "Messages can only be changed within 5 minutes of sending".to_string(),
        ));
    }
    Ok(())
}

impl MessageService {
    pub fn new(
        store: Arc<dyn RoomStore>,
        clock: Arc<dyn Clock>,
        publisher: Arc<dyn EventPublisher>,
        limits: MessageLimits,
    ) -> Self {
        let limiter = RateLimiter::new(store.clone(), clock.clone());
        Self {
            store,
            clock,
            publisher,
            limiter,
            limits,
        }
    }

    /// Append a message from `token` and announce it.
    #[instrument(skip_all, fields(room_id = %room_id))]
    pub async fn append(
        &self,
        room_id: &str,
        token: &str,
        request: SendMessageRequest,
    ) -> Result<MessageId, RoomError> {
        observed("send", async {
            validate_sender(&request.sender)?;
            validate_text(&request.text)?;
            self.limiter
                .enforce(token, RateLimitScope::User, self.limits.send)
                .await?;

            let id = MessageId::generate()?;
            let message = StoredMessage::new(
                id.as_str().to_string(),
                room_id.to_string(),
                request.sender.trim().to_string(),
                request.text,
                request.encrypted,
                self.clock.now_ms(),
                token.to_string(),
            );

            if !self.store.append_message(room_id, &encode(&message)?).await? {
                return Err(RoomError::NotFound("Room not found".to_string()));
            }
            debug!(target: "rs.services.messages", message_id = %id, "Message appended");

            publish_best_effort(
                self.publisher.as_ref(),
                room_id,
                RoomEvent::Message(message.to_public()),
            )
            .await;

            Ok(id)
        })
        .await
    }

    /// Every message in the room, annotated for `caller_token`.
    ///
    /// Elements that fail to decode are skipped.
    pub async fn list(
        &self,
        room_id: &str,
        caller_token: &str,
    ) -> Result<Vec<MessageView>, RoomError> {
        let raw = self.store.list_messages(room_id).await?;

        Ok(raw
            .iter()
            .filter_map(|element| match serde_json::from_str::<StoredMessage>(element) {
                Ok(message) => Some(message.view_for(caller_token)),
                Err(e) => {
                    warn!(
                        target: "rs.services.messages",
                        room_id = %room_id,
                        error = %e,
                        "Skipping undecodable message"
                    );
                    None
                }
            })
            .collect())
    }

    /// Replace the text of the caller's own message.
    #[instrument(skip_all, fields(room_id = %room_id, message_id = %message_id))]
    pub async fn edit(
        &self,
        room_id: &str,
        token: &str,
        message_id: &str,
        text: String,
    ) -> Result<(), RoomError> {
        observed("edit", async {
            validate_text(&text)?;
            self.limiter
                .enforce(room_id, RateLimitScope::Room, self.limits.room_action)
                .await?;

            let now = self.clock.now_ms();
            let applied = self
                .mutate(room_id, message_id, |message| {
                    check_author_window(message, token, now)?;
                    if message.deleted {
                        return Err(RoomError::Forbidden(
                            "Deleted messages cannot be edited".to_string(),
                        ));
                    }
                    message.text = text.clone();
                    message.edited = true;
                    message.edited_at = Some(now);
                    Ok(Mutation::Write(()))
                })
                .await?;

            publish_best_effort(
                self.publisher.as_ref(),
                room_id,
                RoomEvent::MessageEdited {
                    message_id: applied.message.id,
                    text: applied.message.text,
                    edited_at: now,
                },
            )
            .await;
            Ok(())
        })
        .await
    }

    /// Soft-delete the caller's own message.
    ///
    /// Deleting a message twice succeeds without a second event.
    #[instrument(skip_all, fields(room_id = %room_id, message_id = %message_id))]
    pub async fn delete(&self, room_id: &str, token: &str, message_id: &str) -> Result<(), RoomError> {
        observed("delete", async {
            self.limiter
                .enforce(room_id, RateLimitScope::Room, self.limits.room_action)
                .await?;

            let now = self.clock.now_ms();
            let applied = self
                .mutate(room_id, message_id, |message| {
                    check_author_window(message, token, now)?;
                    if message.deleted {
                        return Ok(Mutation::Unchanged(()));
                    }
                    message.soft_delete();
                    Ok(Mutation::Write(()))
                })
                .await?;

            if applied.written {
                publish_best_effort(
                    self.publisher.as_ref(),
                    room_id,
                    RoomEvent::MessageDeleted {
                        message_id: applied.message.id,
                    },
                )
                .await;
            }
            Ok(())
        })
        .await
    }

    /// Add or remove the caller's `emoji` reaction. Returns `true` if added.
    #[instrument(skip_all, fields(room_id = %room_id, message_id = %message_id))]
    pub async fn toggle_reaction(
        &self,
        room_id: &str,
        token: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<bool, RoomError> {
        observed("react", async {
            validate_emoji(emoji)?;
            self.limiter
                .enforce(room_id, RateLimitScope::Room, self.limits.room_action)
                .await?;

            let applied = self
                .mutate(room_id, message_id, |message| {
                    Ok(Mutation::Write(message.toggle_reaction(emoji, token)))
                })
                .await?;

            publish_best_effort(
                self.publisher.as_ref(),
                room_id,
                RoomEvent::Reaction {
                    message_id: applied.message.id,
                    emoji: emoji.to_string(),
                    user: member_tag(token),
                    added: applied.value,
                },
            )
            .await;
            Ok(applied.value)
        })
        .await
    }

    /// Record that the caller read a message. Returns `true` on first read.
    #[instrument(skip_all, fields(room_id = %room_id, message_id = %message_id))]
    pub async fn mark_read(
        &self,
        room_id: &str,
        token: &str,
        message_id: &str,
    ) -> Result<bool, RoomError> {
        observed("read", async {
            let applied = self
                .mutate(room_id, message_id, |message| {
                    Ok(if message.mark_read(token) {
                        Mutation::Write(true)
                    } else {
                        Mutation::Unchanged(false)
                    })
                })
                .await?;

            if applied.written {
                publish_best_effort(
                    self.publisher.as_ref(),
                    room_id,
                    RoomEvent::ReadReceipt {
                        message_id: applied.message.id,
                        user: member_tag(token),
                    },
                )
                .await;
            }
            Ok(applied.value)
        })
        .await
    }

    /// Find `message_id`, apply `change`, and compare-and-set the result.
    ///
    /// `change` runs against a fresh decode on every attempt, so it must
    /// not carry state between calls.
    async fn mutate<T, F>(
        &self,
        room_id: &str,
        message_id: &str,
        mut change: F,
    ) -> Result<Applied<T>, RoomError>
    where
        F: FnMut(&mut StoredMessage) -> Result<Mutation<T>, RoomError>,
    {
        for attempt in 1..=MAX_MUTATION_ATTEMPTS {
            let raw = self.store.list_messages(room_id).await?;
            let (index, expected, mut message) =
                find_message(&raw, message_id).ok_or_else(message_not_found)?;

            let value = match change(&mut message)? {
                Mutation::Unchanged(value) => {
                    return Ok(Applied {
                        value,
                        message,
                        written: false,
                    })
                }
                Mutation::Write(value) => value,
            };

            let replacement = encode(&message)?;
            match self
                .store
                .replace_message(room_id, index, expected, &replacement)
                .await?
            {
                ReplaceOutcome::Replaced => {
                    return Ok(Applied {
                        value,
                        message,
                        written: true,
                    })
                }
                ReplaceOutcome::Missing => return Err(message_not_found()),
                ReplaceOutcome::Conflict => {
                    debug!(
                        target: "rs.services.messages",
                        attempt,
                        "Message changed concurrently, retrying"
                    );
                }
            }
        }

        warn!(target: "rs.services.messages", "Message mutation abandoned after contention");
        Err(RoomError::Store("contention".to_string()))
    }
}
