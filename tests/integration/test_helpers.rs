//! Shared helpers for integration tests.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use session_board::api::client::ApiClient;
use session_board::api::{server, AppState};
use session_board::store::SessionStore;
use session_board::GlobalConfig;

/// A control API served on an ephemeral port.
pub struct TestServer {
    pub client: ApiClient,
    pub store: Arc<SessionStore>,
    pub base_url: String,
    pub ct: CancellationToken,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.ct.cancel();
    }
}

/// Bind `127.0.0.1:0` and serve the router over a fresh store.
pub async fn spawn_server() -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral");
    let addr = listener.local_addr().expect("local addr");

    let store = Arc::new(SessionStore::new());
    let state = Arc::new(AppState::new(
        Arc::new(GlobalConfig::default()),
        Arc::clone(&store),
    ));
    let ct = CancellationToken::new();
    let server_ct = ct.clone();
    tokio::spawn(async move {
        let _ = server::serve_on(listener, state, server_ct).await;
    });

    let base_url = format!("http://{addr}");
    let client = ApiClient::new(&base_url, Duration::from_secs(5)).expect("client");
    TestServer {
        client,
        store,
        base_url,
        ct,
    }
}

/// Poll `check` every 20ms until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
