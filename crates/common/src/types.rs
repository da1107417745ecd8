//! Identifier types shared by the room service and its test utilities.

use crate::crypto::{random_url_token, CryptoError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Random bytes behind a room identifier (22 URL-safe characters).
const ROOM_ID_BYTES: usize = 16;

/// Random bytes behind a membership token (32 URL-safe characters).
const MEMBERSHIP_TOKEN_BYTES: usize = 24;

/// Random bytes behind a message identifier.
const MESSAGE_ID_BYTES: usize = 12;

/// Unguessable identifier of a room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Mint a new room identifier from the system CSPRNG.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError` if the CSPRNG fails.
    pub fn generate() -> Result<Self, CryptoError> {
        Ok(Self(random_url_token::<ROOM_ID_BYTES>()?))
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RoomId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for RoomId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bearer credential proving membership of one room.
///
/// `Debug` is redacted: the token is both identity and authorization.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MembershipToken(String);

impl MembershipToken {
    /// Mint a new membership token from the system CSPRNG.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError` if the CSPRNG fails.
    pub fn generate() -> Result<Self, CryptoError> {
        Ok(Self(random_url_token::<MEMBERSHIP_TOKEN_BYTES>()?))
    }

    /// Borrow the raw token value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MembershipToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for MembershipToken {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Debug for MembershipToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MembershipToken([REDACTED])")
    }
}

/// Opaque identifier of a message within a room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Mint a new message identifier.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError` if the CSPRNG fails.
    pub fn generate() -> Result<Self, CryptoError> {
        Ok(Self(random_url_token::<MESSAGE_ID_BYTES>()?))
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MessageId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        let a = RoomId::generate().unwrap();
        let b = RoomId::generate().unwrap();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 22);
    }

    #[test]
    fn test_membership_token_debug_is_redacted() {
        let token = MembershipToken::from("secret-token-value");
        let debug = format!("{token:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("secret-token-value"));
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let id = MessageId::from("m-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"m-1\"");

        let token: MembershipToken = serde_json::from_str("\"tok\"").unwrap();
        assert_eq!(token.as_str(), "tok");
    }
}
