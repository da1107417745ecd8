//! # Room Test Utilities
//!
//! Shared test utilities for the room service.
//!
//! This crate provides:
//! - In-process app fixture (`TestRoomApp`) over the in-memory store, a
//!   manual clock and a recording publisher
//! - Server test harness (`TestRoomServer`) on a real TCP listener
//! - Request builders and response helpers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use room_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let app = TestRoomApp::new();
//!     let room_id = app.create_room(serde_json::json!({})).await?;
//!     let token = app.join(&room_id).await?;
//!
//!     let response = app.send(send_message(&room_id, &token, "alice", "hi")).await?;
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod app;
pub mod requests;
pub mod server_harness;

// Re-export commonly used items
pub use app::*;
pub use requests::*;
pub use server_harness::*;
