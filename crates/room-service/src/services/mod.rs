//! Room service business logic.

pub mod messages;
pub mod rate_limiter;
pub mod rooms;
pub mod typing;

pub use messages::{MessageLimits, MessageService};
pub use rate_limiter::{RateLimitDecision, RateLimitPolicy, RateLimitScope, RateLimiter};
pub use rooms::{Admitted, CreatedRoom, PasswordVerification, RoomService};
pub use typing::TypingService;
