//! Room Service Library
//!
//! Ephemeral two-party chat rooms held entirely in a TTL key-value store.
//! Rooms expire on their own; nothing outlives the room's TTL.
//!
//! # Modules
//!
//! - `config` - Service configuration from environment variables
//! - `clock` - Time source seam (system clock, manual clock for tests)
//! - `errors` - Error types and their HTTP mapping
//! - `events` - Room event fan-out over pub/sub
//! - `handlers` - HTTP request handlers
//! - `middleware` - Gateway, membership and metrics middleware
//! - `models` - Stored records and wire types
//! - `observability` - Prometheus metrics
//! - `routes` - Router and application state
//! - `services` - Rate limiting, room lifecycle, messages, typing
//! - `store` - TTL store abstraction (Redis, in-memory)

pub mod clock;
pub mod config;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod routes;
pub mod services;
pub mod store;
