//! Fixtures: a gated item operation and a server bound to an ephemeral port

use bulk_ops::api::{AppState, InMemoryCredentialStore, create_router};
use bulk_ops::gateway::StaticTokenVerifier;
use bulk_ops::worker::{ItemOperation, ItemOutcome};
use bulk_ops::{Config, ItemId, OperationType, OwnerCredentials, TaskEvent, WorkerCredentials};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;

/// Provider code reported for items whose id ends in `7`
pub const NOT_FOUND_CODE: u32 = 144;

/// Item operation that holds every worker until the gate opens
///
/// Ids ending in `7` fail with [`NOT_FOUND_CODE`]; `"revoked"` aborts the worker.
pub struct GatedOperation {
    gate: watch::Receiver<bool>,
    pub calls: AtomicUsize,
}

impl GatedOperation {
    /// Operation plus the sender that opens its gate
    pub fn new() -> (Arc<Self>, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        (
            Arc::new(Self {
                gate: rx,
                calls: AtomicUsize::new(0),
            }),
            tx,
        )
    }

    /// Operation whose gate is already open
    pub fn open() -> Arc<Self> {
        let (operation, gate) = Self::new();
        gate.send_replace(true);
        operation
    }
}

#[async_trait::async_trait]
impl ItemOperation for GatedOperation {
    async fn apply(
        &self,
        _operation: OperationType,
        item: &ItemId,
        _credentials: &WorkerCredentials,
    ) -> ItemOutcome {
        let mut gate = self.gate.clone();
        if gate.wait_for(|open| *open).await.is_err() {
            return ItemOutcome::Abort("gate dropped".to_string());
        }
        self.calls.fetch_add(1, Ordering::SeqCst);

        if item == "revoked" {
            ItemOutcome::Abort("Invalid or expired token".to_string())
        } else if item.ends_with('7') {
            ItemOutcome::Failed {
                provider_code: Some(NOT_FOUND_CODE),
            }
        } else {
            ItemOutcome::Done
        }
    }
}

/// Item ids "1" through "n"
pub fn items(n: usize) -> Vec<String> {
    (1..=n).map(|i| i.to_string()).collect()
}

/// Config tuned for tests: frequent progress, no swagger
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.worker.progress_every = 5;
    config.worker.progress_interval = Duration::from_millis(10);
    config.api.swagger_ui = false;
    config.api.bind_address = "127.0.0.1:0".parse().unwrap();
    config
}

/// App state with users u1 (`tok-u1`) and u2 (`tok-u2`), both with API credentials
pub fn test_state(config: Config, operation: Arc<dyn ItemOperation>) -> AppState {
    let verifier = StaticTokenVerifier::new()
        .with_token("tok-u1", "u1")
        .with_token("tok-u2", "u2");
    let store = InMemoryCredentialStore::new();
    store.insert(credentials("u1"));
    store.insert(credentials("u2"));
    AppState::build(config, operation, Arc::new(verifier), Arc::new(store))
}

pub fn credentials(owner: &str) -> OwnerCredentials {
    OwnerCredentials::new(owner, format!("{owner}-token"), format!("{owner}-secret"))
}

/// Serve the router on an ephemeral port, returning its address
pub async fn spawn_server(state: AppState) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Parse one event frame
pub fn parse_event(text: &str) -> TaskEvent {
    serde_json::from_str(text).unwrap_or_else(|e| panic!("bad event frame {text}: {e}"))
}
