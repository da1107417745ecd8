//! Middleware for the room service.
//!
//! # Components
//!
//! - `credentials` - Cookie, header and client address helpers
//! - `gateway` - Room-entry admission for `/room/:room_id`
//! - `membership` - Membership check for the room-scoped API
//! - `http_metrics` - HTTP request metrics middleware

pub mod credentials;
pub mod gateway;
pub mod http_metrics;
pub mod membership;

pub use gateway::{no_room_match, room_gateway, AdmittedMember, GatewayRedirect};
pub use http_metrics::http_metrics_middleware;
pub use membership::{membership_token, require_membership, room_id_from_query, Membership};
