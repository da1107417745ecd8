//! Metrics definitions for the room service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `rs_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `endpoint`: parameterized paths, room and message ids collapsed
//! - `outcome`, `decision`, `status`: fixed sets chosen in code
//! - `scope`: ip, user, room
//! - `operation`: send, edit, delete, react, read
//! - `event`: the seven `chat.*` event names

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus recorder and return the handle served at
/// `/metrics`.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("rs_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion.
///
/// Metric: `rs_http_requests_total`, `rs_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("rs_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint.clone(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("rs_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code. Gateway redirects count as success.
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=399 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Normalize endpoint path to prevent label cardinality explosion.
fn normalize_endpoint(path: &str) -> String {
    match path {
        "/" | "/health" | "/ready" | "/metrics" | "/room" | "/api/room" | "/api/room/create"
        | "/api/room/verify-password" | "/api/room/ttl" | "/api/messages" | "/api/typing" => {
            path.to_string()
        }
        _ => normalize_dynamic_endpoint(path),
    }
}

/// Replace room and message ids with placeholders.
fn normalize_dynamic_endpoint(path: &str) -> String {
    let parts: Vec<&str> = path.trim_end_matches('/').split('/').collect();

    match parts.as_slice() {
        ["", "room", _] => "/room/{id}".to_string(),
        ["", "api", "messages", _] => "/api/messages/{id}".to_string(),
        ["", "api", "messages", _, "reactions"] => "/api/messages/{id}/reactions".to_string(),
        ["", "api", "messages", _, "read"] => "/api/messages/{id}/read".to_string(),
        // Unknown paths normalized to "/other" to bound cardinality
        _ => "/other".to_string(),
    }
}

// ============================================================================
// Domain Metrics
// ============================================================================

/// Record a gateway admission decision.
///
/// Metric: `rs_gateway_decisions_total`
/// Labels: `outcome` (admitted, issued, not_found, full, password_required,
/// rate_limited, no_match, unavailable)
pub fn record_gateway_decision(outcome: &'static str) {
    counter!("rs_gateway_decisions_total", "outcome" => outcome).increment(1);
}

/// Record a rate limiter decision.
///
/// Metric: `rs_rate_limit_decisions_total`
/// Labels: `scope`, `decision` (allowed, denied)
pub fn record_rate_limit_decision(scope: &'static str, allowed: bool) {
    let decision = if allowed { "allowed" } else { "denied" };
    counter!("rs_rate_limit_decisions_total",
        "scope" => scope,
        "decision" => decision
    )
    .increment(1);
}

/// Record a room creation.
///
/// Metric: `rs_rooms_created_total`
/// Labels: `password`, `encrypted`
pub fn record_room_created(password: bool, encrypted: bool) {
    counter!("rs_rooms_created_total",
        "password" => password.to_string(),
        "encrypted" => encrypted.to_string()
    )
    .increment(1);
}

/// Record an explicit room destruction.
///
/// Metric: `rs_rooms_destroyed_total`
pub fn record_room_destroyed() {
    counter!("rs_rooms_destroyed_total").increment(1);
}

/// Record a message operation outcome.
///
/// Metric: `rs_message_operations_total`
/// Labels: `operation`, `status` (success or an error kind)
pub fn record_message_operation(operation: &'static str, status: &'static str) {
    counter!("rs_message_operations_total",
        "operation" => operation,
        "status" => status
    )
    .increment(1);
}

/// Record an event publish attempt.
///
/// Metric: `rs_events_published_total`
/// Labels: `event`, `status` (success, error)
pub fn record_event_published(event: &'static str, status: &'static str) {
    counter!("rs_events_published_total",
        "event" => event,
        "status" => status
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    // The metrics crate records to a no-op recorder when none is installed,
    // so these exercise the recording paths without asserting values.

    #[test]
    fn test_record_http_request() {
        record_http_request("GET", "/health", 200, Duration::from_millis(5));
        record_http_request("GET", "/room/abc123", 307, Duration::from_millis(20));
        record_http_request("PUT", "/api/messages/m1", 403, Duration::from_millis(8));
    }

    #[test]
    fn test_normalize_static_endpoints() {
        assert_eq!(normalize_endpoint("/health"), "/health");
        assert_eq!(normalize_endpoint("/api/room/create"), "/api/room/create");
        assert_eq!(normalize_endpoint("/api/messages"), "/api/messages");
    }

    #[test]
    fn test_normalize_dynamic_endpoints() {
        assert_eq!(normalize_endpoint("/room/x7Yq"), "/room/{id}");
        assert_eq!(normalize_endpoint("/api/messages/m-1"), "/api/messages/{id}");
        assert_eq!(
            normalize_endpoint("/api/messages/m-1/reactions"),
            "/api/messages/{id}/reactions"
        );
        assert_eq!(
            normalize_endpoint("/api/messages/m-1/read"),
            "/api/messages/{id}/read"
        );
        assert_eq!(normalize_endpoint("/room/a/b"), "/other");
        assert_eq!(normalize_endpoint("/wp-admin"), "/other");
    }

    #[test]
    fn test_categorize_status_code() {
        assert_eq!(categorize_status_code(200), "success");
        assert_eq!(categorize_status_code(307), "success");
        assert_eq!(categorize_status_code(504), "timeout");
        assert_eq!(categorize_status_code(429), "error");
    }

    #[test]
    fn test_domain_counters() {
        record_gateway_decision("issued");
        record_rate_limit_decision("ip", false);
        record_room_created(true, false);
        record_room_destroyed();
        record_message_operation("append", "success");
        record_event_published("chat.message", "success");
    }
}
