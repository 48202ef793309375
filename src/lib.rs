//! # bulk-ops
//!
//! Engine for long-running bulk operations performed on behalf of a user against a
//! third-party API (delete tweets, unmute, unblock, remove favorites, delete DMs).
//!
//! ## Overview
//!
//! - A [`TaskEngine`] splits the item list of each task into slices and hands every slice
//!   to a worker started through a [`worker::WorkerExecutor`].
//! - Workers report progress deltas, the end of their slice, or a fatal error; the task
//!   folds them into one [`ProgressSnapshot`] and broadcasts it to its subscribers.
//! - The [`TaskRegistry`] indexes running tasks by id and owner.
//! - The [`SubscriptionGateway`] attaches observer connections to tasks after verifying
//!   their credential token and ownership of the task.
//! - The [`api`] module exposes tasks over REST and observers over WebSocket.
//!
//! ## Quick Start
//!
//! ```no_run
//! use bulk_ops::worker::{ItemOperation, ItemOutcome, TokioWorkerExecutor};
//! use bulk_ops::{Config, OperationType, OwnerCredentials, TaskEngine, WorkerCredentials};
//! use std::sync::Arc;
//!
//! struct Unblock;
//!
//! #[async_trait::async_trait]
//! impl ItemOperation for Unblock {
//!     async fn apply(&self, _: OperationType, _: &String, _: &WorkerCredentials) -> ItemOutcome {
//!         ItemOutcome::Done
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let executor = TokioWorkerExecutor::new(Arc::new(Unblock), config.worker.clone());
//!     let engine = TaskEngine::new(config.engine.clone(), Arc::new(executor));
//!
//!     let credentials = OwnerCredentials::new("42", "token", "secret");
//!     let items = vec!["1001".to_string(), "1002".to_string()];
//!     let task = engine.create_task(items, &credentials, OperationType::Block, None)?;
//!     println!("started task {}", task.id());
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API and WebSocket endpoint
pub mod api;
/// Configuration types
pub mod config;
/// Task engine: lifecycle, partitioning, registry
pub mod engine;
/// Error types
pub mod error;
/// Observer subscriptions
pub mod gateway;
/// Core types
pub mod types;
/// Worker message contract and tokio executor
pub mod worker;

// Re-export commonly used types
pub use config::{CompletionPolicy, Config, EngineConfig, GatewayConfig, WorkerConfig};
pub use engine::{Task, TaskEngine, TaskRegistry};
pub use error::{Error, GatewayError, Result};
pub use gateway::{SubscriptionGateway, TokenVerifier};
pub use types::{
    ConnectionId, EngineStats, ItemId, OperationType, OwnerCredentials, OwnerId,
    ProgressSnapshot, TaskEvent, TaskId, TaskStatus, TaskSummary, WorkerCredentials,
};

/// Run until a termination signal arrives, then shut the engine down
///
/// Waits for SIGTERM or SIGINT (Ctrl+C) on unix, Ctrl+C elsewhere, then calls
/// [`TaskEngine::shutdown`], which cancels every running task.
///
/// # Example
///
/// ```no_run
/// use bulk_ops::{TaskEngine, run_with_shutdown};
///
/// # async fn example(engine: TaskEngine) -> Result<(), Box<dyn std::error::Error>> {
/// run_with_shutdown(engine).await?;
/// # Ok(())
/// # }
/// ```
pub async fn run_with_shutdown(engine: TaskEngine) -> Result<()> {
    wait_for_signal().await;
    engine.shutdown().await
}

/// Serve the API until it fails or a termination signal arrives, then shut the engine down
pub async fn serve_with_shutdown(state: api::AppState) -> Result<()> {
    let engine = state.engine.clone();
    let served = tokio::select! {
        result = api::start_api_server(state) => result,
        _ = wait_for_signal() => Ok(()),
    };
    engine.shutdown().await?;
    served
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
