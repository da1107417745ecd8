//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] types. `SecretString` implements `Debug` with
//! redaction, so a struct deriving `Debug` over a secret field is safe to
//! pass to `tracing` or `{:?}`.
//!
//! Use `SecretString` for:
//! - Room join passwords as received from clients
//! - Generated room encryption keys before they are handed back once
//! - Store connection URLs (they may carry credentials)
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct CreateRoom {
//!     ttl_seconds: u64,
//!     password: Option<SecretString>,
//! }
//!
//! let req = CreateRoom {
//!     ttl_seconds: 600,
//!     password: Some(SecretString::from("hunter2")),
//! };
//!
//! assert!(!format!("{req:?}").contains("hunter2"));
//! let password: Option<&str> = req.password.as_ref().map(|p| p.expose_secret());
//! assert_eq!(password, Some("hunter2"));
//! ```

pub use secrecy::{ExposeSecret, SecretBox, SecretString};
