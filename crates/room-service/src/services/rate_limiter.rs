//! Sliding-window rate limiter.
//!
//! Each call evicts requests older than the window, counts what remains,
//! and records the new request only if it fits. Denied attempts are never
//! recorded, so hammering a closed window does not extend it. The window
//! slides continuously rather than resetting on aligned buckets.
//!
//! Store failures propagate as `RoomError::Store`: the limiter fails closed.

use crate::clock::Clock;
use crate::errors::RoomError;
use crate::observability::metrics::record_rate_limit_decision;
use crate::store::RoomStore;
use std::sync::Arc;
use tracing::debug;

/// Who a limit is counted against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitScope {
    /// Client IP address.
    Ip,
    /// Membership token.
    User,
    /// Room id.
    Room,
}

impl RateLimitScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitScope::Ip => "ip",
            RateLimitScope::User => "user",
            RateLimitScope::Room => "room",
        }
    }
}

/// Requests allowed per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window_seconds: u64,
}

impl RateLimitPolicy {
    pub fn per_minute(max_requests: u32) -> Self {
        Self {
            max_requests,
            window_seconds: 60,
        }
    }

    pub fn per_hour(max_requests: u32) -> Self {
        Self {
            max_requests,
            window_seconds: 3600,
        }
    }
}

/// Result of a limiter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Requests left in the current window after this one.
    pub remaining: u32,
    /// Epoch seconds at which the oldest counted request leaves the window.
    pub reset_at: i64,
}

/// Sliding-window limiter over the shared store.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RoomStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RoomStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Store key for an identifier within a scope.
    pub fn key(scope: RateLimitScope, identifier: &str) -> String {
        format!("ratelimit:{}:{identifier}", scope.as_str())
    }

    /// Count one request and report whether it fits the window.
    pub async fn check(
        &self,
        identifier: &str,
        scope: RateLimitScope,
        policy: RateLimitPolicy,
    ) -> Result<RateLimitDecision, RoomError> {
        let now = self.clock.now_secs();
        let marker = format!("{now}:{}", uuid::Uuid::new_v4());

        let hit = self
            .store
            .rate_window_hit(
                &Self::key(scope, identifier),
                now,
                policy.window_seconds,
                policy.max_requests,
                &marker,
            )
            .await?;

        let window = i64::try_from(policy.window_seconds).unwrap_or(i64::MAX);
        let used = u32::try_from(hit.count).unwrap_or(u32::MAX);
        let decision = RateLimitDecision {
            allowed: hit.allowed,
            remaining: if hit.allowed {
                policy.max_requests.saturating_sub(used).saturating_sub(1)
            } else {
                0
            },
            reset_at: hit.oldest.saturating_add(window),
        };

        record_rate_limit_decision(scope.as_str(), decision.allowed);
        if !decision.allowed {
            debug!(
                target: "rs.services.rate_limiter",
                scope = scope.as_str(),
                reset_at = decision.reset_at,
                "Rate limit exceeded"
            );
        }

        Ok(decision)
    }

    /// Like `check`, but a denial becomes `RoomError::RateLimited`.
    pub async fn enforce(
        &self,
        identifier: &str,
        scope: RateLimitScope,
        policy: RateLimitPolicy,
    ) -> Result<RateLimitDecision, RoomError> {
        let decision = self.check(identifier, scope, policy).await?;
        if decision.allowed {
            return Ok(decision);
        }

        let wait = decision.reset_at.saturating_sub(self.clock.now_secs()).max(1);
        Err(RoomError::RateLimited {
            reset_at: decision.reset_at,
            retry_after_secs: u64::try_from(wait).unwrap_or(1),
        })
    }
}
