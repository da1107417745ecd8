//! Test server harness for E2E testing
//!
//! Provides TestRoomServer for spawning a real room-service instance on a
//! TCP listener, so client addresses and cookies behave as in production.

use crate::app::{test_config, test_metrics_handle, TEST_START_MS};
use room_service::clock::ManualClock;
use room_service::config::Config;
use room_service::events::mock::RecordingPublisher;
use room_service::routes::{build_routes, AppState};
use room_service::store::InMemoryStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Test harness for spawning the room service in E2E tests
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_gateway_e2e() -> anyhow::Result<()> {
///     let server = TestRoomServer::spawn().await?;
///     let client = server.client()?;
///
///     let response = client
///         .get(format!("{}/room/missing", server.url()))
///         .send()
///         .await?;
///
///     assert_eq!(response.status(), 307);
///     Ok(())
/// }
/// ```
pub struct TestRoomServer {
    addr: SocketAddr,
    store: Arc<InMemoryStore>,
    clock: Arc<ManualClock>,
    publisher: Arc<RecordingPublisher>,
    handle: JoinHandle<()>,
}

impl TestRoomServer {
    /// Spawn a server with default test configuration.
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        Self::spawn_with_config(test_config(&[])).await
    }

    /// Spawn a server on 127.0.0.1 with a random port.
    pub async fn spawn_with_config(config: Config) -> Result<Self, anyhow::Error> {
        let clock = Arc::new(ManualClock::new(TEST_START_MS));
        let store = Arc::new(InMemoryStore::new(clock.clone()));
        let publisher = Arc::new(RecordingPublisher::new());

        let state = Arc::new(AppState::new(
            config,
            store.clone(),
            clock.clone(),
            publisher.clone(),
        ));
        let app = build_routes(state, test_metrics_handle());

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        // Spawn server in background
        let handle = tokio::spawn(async move {
            // ConnectInfo feeds the per-IP gateway limit
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            store,
            clock,
            publisher,
            handle,
        })
    }

    /// Get the base URL of the test server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn store(&self) -> &InMemoryStore {
        &self.store
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    pub fn publisher(&self) -> &RecordingPublisher {
        &self.publisher
    }

    /// HTTP client that does not follow redirects, so gateway responses
    /// can be inspected.
    pub fn client(&self) -> Result<reqwest::Client, anyhow::Error> {
        reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))
    }
}

impl Drop for TestRoomServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
