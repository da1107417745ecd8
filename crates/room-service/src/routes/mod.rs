//! HTTP routes for the room service.
//!
//! Defines the Axum router and application state.

use crate::clock::Clock;
use crate::config::Config;
use crate::errors::RoomError;
use crate::events::EventPublisher;
use crate::handlers;
use crate::middleware::{
    http_metrics_middleware, no_room_match, require_membership, room_gateway,
};
use crate::services::{
    MessageLimits, MessageService, RateLimitPolicy, RateLimiter, RoomService, TypingService,
};
use crate::store::RoomStore;
use axum::{
    http::Uri,
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Shared TTL store holding all room state.
    pub store: Arc<dyn RoomStore>,

    /// Limiter for gateway and room-creation traffic.
    pub rate_limiter: RateLimiter,

    pub rooms: RoomService,
    pub messages: MessageService,
    pub typing: TypingService,
}

impl AppState {
    /// Wire the services over one store, clock and publisher.
    pub fn new(
        config: Config,
        store: Arc<dyn RoomStore>,
        clock: Arc<dyn Clock>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        let rate_limiter = RateLimiter::new(store.clone(), clock.clone());
        let rooms = RoomService::new(
            store.clone(),
            clock.clone(),
            publisher.clone(),
            config.default_room_ttl_seconds,
        );
        let messages = MessageService::new(
            store.clone(),
            clock.clone(),
            publisher.clone(),
            MessageLimits {
                send: RateLimitPolicy::per_minute(config.message_rate_limit_per_minute),
                room_action: RateLimitPolicy::per_minute(config.room_action_rate_limit_per_minute),
            },
        );
        let typing = TypingService::new(
            store.clone(),
            clock,
            publisher,
            Duration::from_millis(config.typing_timeout_ms),
        );

        Self {
            config,
            store,
            rate_limiter,
            rooms,
            messages,
            typing,
        }
    }
}

/// Unmatched paths: stray `/room` navigation goes home, the rest is 404.
async fn fallback(uri: Uri) -> Response {
    let path = uri.path();
    if path == "/room" || path.starts_with("/room/") {
        return no_room_match().await.into_response();
    }
    RoomError::NotFound("Route not found".to_string()).into_response()
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health`, `/ready`, `/metrics` - Operational endpoints
/// - `/room/:room_id` - Room entry behind the gateway
/// - `/api/room/create`, `/api/room/verify-password`, `DELETE /api/room` - Public room API
/// - `/api/room/ttl`, `/api/messages*`, `/api/typing` - Member API
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    // Public routes (no membership required)
    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/api/room/create", post(handlers::create_room))
        .route("/api/room/verify-password", post(handlers::verify_password))
        // Destroy checks membership itself: an absent room is a no-op
        .route("/api/room", delete(handlers::destroy_room))
        .with_state(state.clone());

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Room entry navigation
    let gateway_routes = Router::new()
        .route("/room/:room_id", get(handlers::enter_room))
        .route_layer(middleware::from_fn_with_state(state.clone(), room_gateway))
        .with_state(state.clone());

    // Member routes (membership token + roomId query)
    let member_routes = Router::new()
        .route("/api/room/ttl", get(handlers::get_ttl))
        .route(
            "/api/messages",
            post(handlers::send_message).get(handlers::list_messages),
        )
        .route(
            "/api/messages/:message_id",
            put(handlers::edit_message).delete(handlers::delete_message),
        )
        .route(
            "/api/messages/:message_id/reactions",
            post(handlers::toggle_reaction),
        )
        .route("/api/messages/:message_id/read", post(handlers::mark_read))
        .route(
            "/api/typing",
            post(handlers::set_typing).get(handlers::list_typing),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_membership,
        ))
        .with_state(state);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    // 3. http_metrics_middleware - Record ALL responses (outermost)
    public_routes
        .merge(metrics_routes)
        .merge(gateway_routes)
        .merge(member_routes)
        .fallback(fallback)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(middleware::from_fn(http_metrics_middleware))
}
