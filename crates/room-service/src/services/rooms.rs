//! Room lifecycle and admission.
//!
//! A room is `active` from `create` until its meta key disappears, either by
//! store expiry or by `destroy`. Nothing signals expiry: callers observe the
//! absent key as "room does not exist".

use crate::clock::Clock;
use crate::config::{MAX_ROOM_TTL_SECONDS, MIN_ROOM_TTL_SECONDS};
use crate::errors::RoomError;
use crate::events::{publish_best_effort, EventPublisher, RoomEvent};
use crate::models::{CreateRoomRequest, RoomMeta, PASSWORD_CHARS, ROOM_CAPACITY};
use crate::observability::metrics::{record_room_created, record_room_destroyed};
use crate::store::{JoinOutcome, RoomStore};
use common::crypto::{commitments_match, generate_room_key, hash_password};
use common::secret::{ExposeSecret, SecretString};
use common::types::{MembershipToken, RoomId};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Attempts at minting an unused room id before giving up.
const CREATE_ATTEMPTS: usize = 3;

/// A newly created room.
#[derive(Debug)]
pub struct CreatedRoom {
    pub room_id: RoomId,
    /// Plaintext key, returned once and never stored.
    pub encryption_key: Option<SecretString>,
}

/// Outcome of a password check against an existing room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordVerification {
    pub valid: bool,
    /// Commitment to present back to the gateway. Set only when the room
    /// has a password and it matched.
    pub acknowledgment: Option<String>,
}

/// A caller the gateway let into a room.
#[derive(Debug)]
pub struct Admitted {
    pub token: MembershipToken,
    /// True when the token was minted by this request.
    pub issued: bool,
    pub meta: RoomMeta,
}

/// Creates, inspects and destroys rooms, and admits members.
#[derive(Clone)]
pub struct RoomService {
    store: Arc<dyn RoomStore>,
    clock: Arc<dyn Clock>,
    publisher: Arc<dyn EventPublisher>,
    default_ttl_seconds: u64,
}

impl RoomService {
    pub fn new(
        store: Arc<dyn RoomStore>,
        clock: Arc<dyn Clock>,
        publisher: Arc<dyn EventPublisher>,
        default_ttl_seconds: u64,
    ) -> Self {
        Self {
            store,
            clock,
            publisher,
            default_ttl_seconds,
        }
    }

    /// Create a room.
    ///
    /// Only the password's SHA-256 and a 16-hex-char commitment of the
    /// generated key are persisted.
    #[instrument(skip_all, fields(ttl_seconds = request.ttl_seconds))]
    pub async fn create(&self, request: CreateRoomRequest) -> Result<CreatedRoom, RoomError> {
        let ttl_seconds = request.ttl_seconds.unwrap_or(self.default_ttl_seconds);
        if !(MIN_ROOM_TTL_SECONDS..=MAX_ROOM_TTL_SECONDS).contains(&ttl_seconds) {
            return Err(RoomError::Validation(format!(
                "ttlSeconds must be between {MIN_ROOM_TTL_SECONDS} and {MAX_ROOM_TTL_SECONDS}"
            )));
        }

        let password = request
            .password
            .as_ref()
            .map(|p| p.expose_secret())
            .filter(|p| !p.is_empty());
        if let Some(password) = password {
            if !PASSWORD_CHARS.contains(&password.chars().count()) {
                return Err(RoomError::Validation(format!(
                    "password must be between {} and {} characters",
                    PASSWORD_CHARS.start(),
                    PASSWORD_CHARS.end()
                )));
            }
        }
        let password_hash = password.map(hash_password);

        let room_key = if request.enable_encryption {
            Some(generate_room_key()?)
        } else {
            None
        };

        let meta = RoomMeta::new(
            self.clock.now_ms(),
            ttl_seconds,
            password_hash,
            room_key.as_ref().map(|k| k.commitment.clone()),
        );

        for _ in 0..CREATE_ATTEMPTS {
            let room_id = RoomId::generate()?;
            if self
                .store
                .create_room(room_id.as_str(), &meta, ttl_seconds)
                .await?
            {
                record_room_created(meta.password_hash.is_some(), room_key.is_some());
                info!(
                    target: "rs.services.rooms",
                    room_id = %room_id,
                    ttl_seconds,
                    password = meta.password_hash.is_some(),
                    encrypted = room_key.is_some(),
                    "Room created"
                );
                return Ok(CreatedRoom {
                    room_id,
                    encryption_key: room_key.map(|k| k.key),
                });
            }
            warn!(target: "rs.services.rooms", "Room id collision, retrying");
        }

        Err(RoomError::Internal)
    }

    /// Check a join password. A room without a password always verifies.
    #[instrument(skip_all, fields(room_id = %room_id))]
    pub async fn verify_password(
        &self,
        room_id: &str,
        password: &str,
    ) -> Result<PasswordVerification, RoomError> {
        let meta = self
            .store
            .get_room(room_id)
            .await?
            .ok_or_else(|| RoomError::NotFound("Room not found".to_string()))?;

        let Some(expected) = meta.password_hash else {
            return Ok(PasswordVerification {
                valid: true,
                acknowledgment: None,
            });
        };

        let candidate = hash_password(password);
        let valid = commitments_match(&candidate, &expected);
        debug!(target: "rs.services.rooms", valid, "Password verified");

        Ok(PasswordVerification {
            valid,
            acknowledgment: valid.then_some(candidate),
        })
    }

    /// Seconds left before the room expires, 0 if it is already gone.
    pub async fn ttl(&self, room_id: &str) -> Result<i64, RoomError> {
        Ok(self.store.room_ttl(room_id).await?.unwrap_or(0).max(0))
    }

    /// Resolve a member's view of the room.
    ///
    /// Fails `NotFound` if the room is absent and `Forbidden` if `token` is
    /// not one of its members.
    pub async fn authorize(&self, room_id: &str, token: &str) -> Result<RoomMeta, RoomError> {
        let meta = self
            .store
            .get_room(room_id)
            .await?
            .ok_or_else(|| RoomError::NotFound("Room not found".to_string()))?;

        if !meta.is_member(token) {
            return Err(RoomError::Forbidden("Not a member of this room".to_string()));
        }
        Ok(meta)
    }

    /// Destroy a room and everything it owns.
    ///
    /// Destroying an absent room is a no-op. Returns `true` if this call
    /// removed the room.
    #[instrument(skip_all, fields(room_id = %room_id))]
    pub async fn destroy(&self, room_id: &str, token: &str) -> Result<bool, RoomError> {
        let Some(meta) = self.store.get_room(room_id).await? else {
            debug!(target: "rs.services.rooms", "Destroy of absent room ignored");
            return Ok(false);
        };
        if !meta.is_member(token) {
            return Err(RoomError::Forbidden("Not a member of this room".to_string()));
        }

        let removed = self.store.delete_room(room_id).await?;
        if removed {
            record_room_destroyed();
            info!(target: "rs.services.rooms", "Room destroyed");
        }

        publish_best_effort(
            self.publisher.as_ref(),
            room_id,
            RoomEvent::Destroy { is_destroyed: true },
        )
        .await;

        Ok(removed)
    }

    /// Decide whether a room-entry request gets in.
    ///
    /// `existing_token` is the caller's current credential, if any, and
    /// `password_ack` the password commitment they present. New members are
    /// added through the store's atomic capacity-checked insert.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the room does not exist
    /// - `InvalidCredential` if the room has a password that was not acknowledged
    /// - `RoomFull` if the room already holds two other members
    #[instrument(skip_all, fields(room_id = %room_id))]
    pub async fn admit(
        &self,
        room_id: &str,
        existing_token: Option<&str>,
        password_ack: Option<&str>,
    ) -> Result<Admitted, RoomError> {
        let mut meta = self
            .store
            .get_room(room_id)
            .await?
            .ok_or_else(|| RoomError::NotFound("Room not found".to_string()))?;

        if let Some(expected) = &meta.password_hash {
            let acknowledged = password_ack.is_some_and(|ack| commitments_match(ack, expected));
            if !acknowledged {
                return Err(RoomError::InvalidCredential);
            }
        }

        if let Some(token) = existing_token.filter(|t| meta.is_member(t)) {
            return Ok(Admitted {
                token: MembershipToken::from(token),
                issued: false,
                meta,
            });
        }

        if meta.is_full() {
            return Err(RoomError::RoomFull);
        }

        let token = MembershipToken::generate()?;
        match self
            .store
            .join_room(room_id, token.as_str(), ROOM_CAPACITY)
            .await?
        {
            JoinOutcome::Joined | JoinOutcome::AlreadyMember => {
                if !meta.is_member(token.as_str()) {
                    meta.connected.push(token.as_str().to_string());
                }
                info!(
                    target: "rs.services.rooms",
                    members = meta.connected.len(),
                    "Member joined room"
                );
                Ok(Admitted {
                    token,
                    issued: true,
                    meta,
                })
            }
            JoinOutcome::Full => Err(RoomError::RoomFull),
            JoinOutcome::RoomMissing => Err(RoomError::NotFound("Room not found".to_string())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::events::mock::RecordingPublisher;
    use crate::store::InMemoryStore;
    use common::crypto::{key_commitment, KEY_COMMITMENT_HEX_LEN};
    use std::time::Duration;

    const START_MS: i64 = 1_700_000_000_000;

    struct Fixture {
        service: RoomService,
        store: InMemoryStore,
        clock: ManualClock,
        publisher: Arc<RecordingPublisher>,
    }

    fn fixture() -> Fixture {
        let clock = ManualClock::new(START_MS);
        let store = InMemoryStore::new(Arc::new(clock.clone()));
        let publisher = Arc::new(RecordingPublisher::new());
        let service = RoomService::new(
            Arc::new(store.clone()),
            Arc::new(clock.clone()),
            publisher.clone(),
            600,
        );
        Fixture {
            service,
            store,
            clock,
            publisher,
        }
    }

    fn request(ttl: Option<u64>, password: Option<&str>, encrypted: bool) -> CreateRoomRequest {
        CreateRoomRequest {
            ttl_seconds: ttl,
            password: password.map(SecretString::from),
            enable_encryption: encrypted,
        }
    }

    async fn admitted_token(service: &RoomService, room_id: &str, ack: Option<&str>) -> String {
        let admitted = service.admit(room_id, None, ack).await.unwrap();
        assert!(admitted.issued);
        admitted.token.as_str().to_string()
    }

    #[tokio::test]
    async fn test_create_defaults_and_stores_meta() {
        let f = fixture();
        let created = f.service.create(request(None, None, false)).await.unwrap();

        assert!(created.encryption_key.is_none());
        let meta = f.store.get_room(created.room_id.as_str()).await.unwrap().unwrap();
        assert_eq!(meta.ttl_seconds, 600);
        assert_eq!(meta.created_at, START_MS);
        assert!(meta.connected.is_empty());
        assert!(meta.password_hash.is_none());
        assert_eq!(f.service.ttl(created.room_id.as_str()).await.unwrap(), 600);
    }

    #[tokio::test]
    async fn test_create_rejects_ttl_out_of_range() {
        let f = fixture();
        for ttl in [59, 86_401] {
            let result = f.service.create(request(Some(ttl), None, false)).await;
            assert!(matches!(result, Err(RoomError::Validation(_))));
        }
        assert!(f.service.create(request(Some(60), None, false)).await.is_ok());
        assert!(f.service.create(request(Some(86_400), None, false)).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_rejects_bad_password_length() {
        let f = fixture();
        assert!(matches!(
            f.service.create(request(None, Some("abc"), false)).await,
            Err(RoomError::Validation(_))
        ));
        assert!(matches!(
            f.service
                .create(request(None, Some(&"x".repeat(51)), false))
                .await,
            Err(RoomError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_create_encrypted_returns_key_once() {
        let f = fixture();
        let created = f.service.create(request(None, None, true)).await.unwrap();

        let key = created.encryption_key.unwrap();
        let meta = f.store.get_room(created.room_id.as_str()).await.unwrap().unwrap();
        let stored = meta.encryption_key_hash.unwrap();

        assert_eq!(stored.len(), KEY_COMMITMENT_HEX_LEN);
        assert_eq!(stored, key_commitment(key.expose_secret()));
        assert_ne!(stored, key.expose_secret());
    }

    #[tokio::test]
    async fn test_verify_password_semantics() {
        let f = fixture();
        let locked = f.service.create(request(None, Some("open sesame"), false)).await.unwrap();
        let open = f.service.create(request(None, None, false)).await.unwrap();

        let ok = f
            .service
            .verify_password(locked.room_id.as_str(), "open sesame")
            .await
            .unwrap();
        assert!(ok.valid);
        assert_eq!(ok.acknowledgment, Some(hash_password("open sesame")));

        let bad = f
            .service
            .verify_password(locked.room_id.as_str(), "open sesame!")
            .await
            .unwrap();
        assert!(!bad.valid);
        assert!(bad.acknowledgment.is_none());

        let any = f.service.verify_password(open.room_id.as_str(), "whatever").await.unwrap();
        assert!(any.valid);

        assert!(matches!(
            f.service.verify_password("missing", "x").await,
            Err(RoomError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_ttl_clamps_to_zero_after_expiry() {
        let f = fixture();
        let created = f.service.create(request(Some(60), None, false)).await.unwrap();

        f.clock.advance(Duration::from_secs(45));
        assert_eq!(f.service.ttl(created.room_id.as_str()).await.unwrap(), 15);

        f.clock.advance(Duration::from_secs(20));
        assert_eq!(f.service.ttl(created.room_id.as_str()).await.unwrap(), 0);
        assert_eq!(f.service.ttl("never-existed").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_admit_issues_two_tokens_then_full() {
        let f = fixture();
        let room = f.service.create(request(None, None, false)).await.unwrap();
        let room_id = room.room_id.as_str();

        let first = admitted_token(&f.service, room_id, None).await;
        let second = admitted_token(&f.service, room_id, None).await;
        assert_ne!(first, second);

        assert!(matches!(
            f.service.admit(room_id, None, None).await,
            Err(RoomError::RoomFull)
        ));
        assert!(matches!(
            f.service.admit(room_id, Some("stale-token"), None).await,
            Err(RoomError::RoomFull)
        ));

        // Existing members re-enter without a new token.
        let again = f.service.admit(room_id, Some(&first), None).await.unwrap();
        assert_eq!(again.token.as_str(), first);
        assert!(!again.issued);
        assert_eq!(again.meta.connected.len(), 2);
    }

    #[tokio::test]
    async fn test_admit_requires_password_ack() {
        let f = fixture();
        let room = f.service.create(request(None, Some("letmein"), false)).await.unwrap();
        let room_id = room.room_id.as_str();

        assert!(matches!(
            f.service.admit(room_id, None, None).await,
            Err(RoomError::InvalidCredential)
        ));
        assert!(matches!(
            f.service
                .admit(room_id, None, Some(&hash_password("wrong")))
                .await,
            Err(RoomError::InvalidCredential)
        ));

        let ack = hash_password("letmein");
        admitted_token(&f.service, room_id, Some(&ack)).await;
    }

    #[tokio::test]
    async fn test_admit_missing_room() {
        let f = fixture();
        assert!(matches!(
            f.service.admit("missing", None, None).await,
            Err(RoomError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_authorize() {
        let f = fixture();
        let room = f.service.create(request(None, None, false)).await.unwrap();
        let room_id = room.room_id.as_str();
        let token = admitted_token(&f.service, room_id, None).await;

        assert!(f.service.authorize(room_id, &token).await.is_ok());
        assert!(matches!(
            f.service.authorize(room_id, "stranger").await,
            Err(RoomError::Forbidden(_))
        ));
        assert!(matches!(
            f.service.authorize("missing", &token).await,
            Err(RoomError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent_and_publishes() {
        let f = fixture();
        let room = f.service.create(request(None, None, false)).await.unwrap();
        let room_id = room.room_id.as_str();
        let token = admitted_token(&f.service, room_id, None).await;

        assert!(matches!(
            f.service.destroy(room_id, "stranger").await,
            Err(RoomError::Forbidden(_))
        ));

        assert!(f.service.destroy(room_id, &token).await.unwrap());
        assert!(!f.service.destroy(room_id, &token).await.unwrap());
        assert!(f.store.get_room(room_id).await.unwrap().is_none());

        assert_eq!(
            f.publisher.events_for(room_id).await,
            vec![RoomEvent::Destroy { is_destroyed: true }]
        );
    }
}
