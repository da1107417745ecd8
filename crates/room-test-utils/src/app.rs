//! In-process app fixture.
//!
//! Builds the real router over the in-memory store, a manual clock and a
//! recording publisher, and drives it with `tower::ServiceExt::oneshot`.
//! Requests carry no `ConnectInfo`, so every caller shares one rate-limit
//! identity.

use crate::requests::{body_json, enter_room, json_request, location, set_cookie_value};
use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use axum::Router;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use room_service::clock::ManualClock;
use room_service::config::Config;
use room_service::events::mock::RecordingPublisher;
use room_service::observability::metrics::init_metrics_recorder;
use room_service::routes::{build_routes, AppState};
use room_service::store::InMemoryStore;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tower::ServiceExt;

/// Fixed starting instant for the manual clock.
pub const TEST_START_MS: i64 = 1_700_000_000_000;

/// Global metrics handle for test apps
static TEST_METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics handle shared by every test app in the process.
///
/// Installs the global recorder once; if another recorder already holds
/// the slot, falls back to a standalone recorder.
pub fn test_metrics_handle() -> PrometheusHandle {
    TEST_METRICS_HANDLE
        .get_or_init(|| {
            init_metrics_recorder()
                .unwrap_or_else(|_| PrometheusBuilder::new().build_recorder().handle())
        })
        .clone()
}

/// Configuration for tests: plain-HTTP cookies, defaults elsewhere.
pub fn test_config(overrides: &[(&str, &str)]) -> Config {
    let mut vars = HashMap::from([
        ("REDIS_URL".to_string(), "redis://127.0.0.1:6379".to_string()),
        ("SECURE_COOKIES".to_string(), "false".to_string()),
    ]);
    for (key, value) in overrides {
        vars.insert((*key).to_string(), (*value).to_string());
    }
    Config::from_vars(&vars).expect("valid test configuration")
}

/// The room service wired over in-process fakes.
pub struct TestRoomApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<ManualClock>,
    pub publisher: Arc<RecordingPublisher>,
}

impl Default for TestRoomApp {
    fn default() -> Self {
        Self::new()
    }
}

impl TestRoomApp {
    /// App with default test configuration.
    pub fn new() -> Self {
        Self::with_config(test_config(&[]))
    }

    /// App with configuration overrides, e.g. `("IP_RATE_LIMIT_PER_MINUTE", "2")`.
    pub fn with_overrides(overrides: &[(&str, &str)]) -> Self {
        Self::with_config(test_config(overrides))
    }

    pub fn with_config(config: Config) -> Self {
        let clock = Arc::new(ManualClock::new(TEST_START_MS));
        let store = Arc::new(InMemoryStore::new(clock.clone()));
        let publisher = Arc::new(RecordingPublisher::new());

        let state = Arc::new(AppState::new(
            config,
            store.clone(),
            clock.clone(),
            publisher.clone(),
        ));
        let router = build_routes(state.clone(), test_metrics_handle());

        Self {
            router,
            state,
            store,
            clock,
            publisher,
        }
    }

    /// Run one request through the router.
    pub async fn send(&self, request: Request<Body>) -> anyhow::Result<Response<Body>> {
        Ok(self.router.clone().oneshot(request).await?)
    }

    /// Create a room; returns the full creation response body.
    pub async fn create_room_response(&self, body: Value) -> anyhow::Result<Value> {
        let response = self
            .send(json_request(Method::POST, "/api/room/create", None, body))
            .await?;
        anyhow::ensure!(
            response.status() == StatusCode::CREATED,
            "room creation failed with {}",
            response.status()
        );
        Ok(body_json(response).await)
    }

    /// Create a room; returns its id.
    pub async fn create_room(&self, body: Value) -> anyhow::Result<String> {
        let created = self.create_room_response(body).await?;
        created["roomId"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("creation response has no roomId"))
    }

    /// Enter a room through the gateway as a new client; returns the issued
    /// membership token.
    pub async fn join(&self, room_id: &str) -> anyhow::Result<String> {
        self.join_with_cookies(room_id, &[]).await
    }

    /// Verify the password, then enter with the acknowledgment cookie.
    pub async fn join_with_password(
        &self,
        room_id: &str,
        password: &str,
    ) -> anyhow::Result<String> {
        let ack = self.password_ack(room_id, password).await?;
        self.join_with_cookies(room_id, &[("x-room-password", ack.as_str())])
            .await
    }

    /// `POST /api/room/verify-password`; returns the acknowledgment cookie.
    pub async fn password_ack(&self, room_id: &str, password: &str) -> anyhow::Result<String> {
        let response = self
            .send(json_request(
                Method::POST,
                "/api/room/verify-password",
                None,
                serde_json::json!({ "roomId": room_id, "password": password }),
            ))
            .await?;
        set_cookie_value(&response, "x-room-password")
            .ok_or_else(|| anyhow::anyhow!("password was not accepted"))
    }

    async fn join_with_cookies(
        &self,
        room_id: &str,
        cookies: &[(&str, &str)],
    ) -> anyhow::Result<String> {
        let response = self.send(enter_room(room_id, cookies)).await?;
        anyhow::ensure!(
            response.status() == StatusCode::OK,
            "gateway refused entry: {} {:?}",
            response.status(),
            location(&response)
        );
        set_cookie_value(&response, "x-auth-token")
            .ok_or_else(|| anyhow::anyhow!("gateway issued no membership cookie"))
    }
}
