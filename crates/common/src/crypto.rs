//! Commitment hashing and CSPRNG helpers.
//!
//! The service never persists plaintext passwords or encryption keys. It
//! stores one-way SHA-256 commitments instead:
//!
//! - Password commitment: full lowercase hex SHA-256 of the password.
//! - Encryption key commitment: first 16 hex characters of the SHA-256 of
//!   the hex-encoded key.
//!
//! Identifiers and membership tokens are drawn from `ring`'s system CSPRNG
//! and encoded as unpadded URL-safe base64 so they can travel in paths,
//! query strings and cookies without escaping.

use crate::secret::SecretString;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ring::digest::{digest, SHA256};
use ring::rand::{SecureRandom, SystemRandom};
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Size of a generated room encryption key in bytes (hex encoded to 64 chars).
pub const ENCRYPTION_KEY_BYTES: usize = 32;

/// Number of hex characters kept for the encryption key commitment.
pub const KEY_COMMITMENT_HEX_LEN: usize = 16;

/// Errors from cryptographic helpers.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The system random number generator failed.
    #[error("Random number generator unavailable")]
    RandomUnavailable,
}

/// A freshly generated room encryption key and its commitment.
#[derive(Debug)]
pub struct RoomKey {
    /// Hex-encoded key, handed to the room creator exactly once.
    pub key: SecretString,
    /// Short commitment persisted with the room.
    pub commitment: String,
}

/// Lowercase hex SHA-256 of `input`.
#[must_use]
pub fn sha256_hex(input: &[u8]) -> String {
    hex::encode(digest(&SHA256, input))
}

/// One-way commitment to a room join password.
#[must_use]
pub fn hash_password(password: &str) -> String {
    sha256_hex(password.as_bytes())
}

/// Short commitment to a hex-encoded room encryption key.
#[must_use]
pub fn key_commitment(key_hex: &str) -> String {
    short_digest(key_hex)
}

/// Public alias of a membership token.
///
/// Reactions, read receipts and typing state are shown to the other room
/// member under this tag. The token itself is a bearer credential and never
/// leaves the server in a response body or event.
#[must_use]
pub fn member_tag(token: &str) -> String {
    short_digest(token)
}

fn short_digest(input: &str) -> String {
    sha256_hex(input.as_bytes())
        .chars()
        .take(KEY_COMMITMENT_HEX_LEN)
        .collect()
}

/// Fill a buffer of `N` bytes from the system CSPRNG.
///
/// # Errors
///
/// Returns `CryptoError::RandomUnavailable` if the CSPRNG fails.
pub fn random_bytes<const N: usize>() -> Result<[u8; N], CryptoError> {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; N];
    rng.fill(&mut bytes)
        .map_err(|_| CryptoError::RandomUnavailable)?;
    Ok(bytes)
}

/// Unguessable URL-safe token built from `N` random bytes.
///
/// # Errors
///
/// Returns `CryptoError::RandomUnavailable` if the CSPRNG fails.
pub fn random_url_token<const N: usize>() -> Result<String, CryptoError> {
    Ok(URL_SAFE_NO_PAD.encode(random_bytes::<N>()?))
}

/// Generate a room encryption key together with its commitment.
///
/// # Errors
///
/// Returns `CryptoError::RandomUnavailable` if the CSPRNG fails.
pub fn generate_room_key() -> Result<RoomKey, CryptoError> {
    let key_hex = hex::encode(random_bytes::<ENCRYPTION_KEY_BYTES>()?);
    let commitment = key_commitment(&key_hex);
    Ok(RoomKey {
        key: SecretString::from(key_hex),
        commitment,
    })
}

/// Compare two commitments without short-circuiting on the first mismatch.
#[must_use]
pub fn commitments_match(a: &str, b: &str) -> bool {
    bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}
