//! Application state for the API server

use std::sync::Arc;

use crate::api::credentials::CredentialStore;
use crate::config::Config;
use crate::engine::TaskEngine;
use crate::gateway::{SubscriptionGateway, TokenVerifier};
use crate::worker::{ItemOperation, TokioWorkerExecutor};

/// Shared application state accessible to all route handlers
///
/// This struct is cloned for each request (cheap Arc clone) and provides
/// access to the engine, the subscription gateway and configuration.
#[derive(Clone)]
pub struct AppState {
    /// Task orchestration
    pub engine: TaskEngine,

    /// Observer subscriptions for the WebSocket endpoint
    pub gateway: SubscriptionGateway,

    /// Resolves bearer tokens to users
    pub verifier: Arc<dyn TokenVerifier>,

    /// Third-party credentials handed to workers
    pub credentials: Arc<dyn CredentialStore>,

    /// Configuration (read-only)
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState from already wired components
    pub fn new(
        engine: TaskEngine,
        gateway: SubscriptionGateway,
        verifier: Arc<dyn TokenVerifier>,
        credentials: Arc<dyn CredentialStore>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            engine,
            gateway,
            verifier,
            credentials,
            config,
        }
    }

    /// Wire an engine running `operation` on tokio workers, plus a gateway sharing its registry
    pub fn build(
        config: Config,
        operation: Arc<dyn ItemOperation>,
        verifier: Arc<dyn TokenVerifier>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        let executor = TokioWorkerExecutor::new(operation, config.worker.clone());
        let engine = TaskEngine::new(config.engine.clone(), Arc::new(executor));
        let gateway = SubscriptionGateway::new(
            engine.registry().clone(),
            Arc::clone(&verifier),
            config.gateway.clone(),
        );
        Self::new(engine, gateway, verifier, credentials, Arc::new(config))
    }
}
