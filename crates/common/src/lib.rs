//! Common utilities and types shared across the ephemeral rooms crates.

#![warn(clippy::pedantic)]

/// Module for commitment hashing and CSPRNG-backed identifier material
pub mod crypto;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for room, membership and message identifiers
pub mod types;
