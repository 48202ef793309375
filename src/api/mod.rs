//! REST API server module
//!
//! Provides an OpenAPI 3.1 compliant REST API for starting and managing bulk tasks, plus
//! the `/ws` WebSocket endpoint observers use to follow task progress.

use crate::Result;
use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::get,
};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod auth;
pub mod credentials;
pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;
pub mod ws;

pub use credentials::{CredentialStore, InMemoryCredentialStore};
pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Tasks (bearer token required)
/// - `GET /tasks` - List the caller's running tasks
/// - `POST /tasks` - Start a task
/// - `GET /tasks/:id` - Get one task
/// - `DELETE /tasks/:id` - Cancel a task
///
/// ## Observers
/// - `GET /ws` - WebSocket subscription gateway (token sent per request)
///
/// ## System
/// - `GET /health` - Health check
/// - `GET /stats` - Engine statistics
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive Swagger UI documentation (if enabled)
pub fn create_router(state: AppState) -> Router {
    let config = state.config.clone();

    let task_routes = Router::new()
        .route(
            "/tasks",
            get(routes::list_tasks).post(routes::create_task),
        )
        .route(
            "/tasks/:id",
            get(routes::get_task).delete(routes::cancel_task),
        )
        .route_layer(middleware::from_fn_with_state(
            auth::BearerAuth::new(state.verifier.clone(), config.gateway.verify_timeout),
            auth::require_bearer_token,
        ));

    let router = Router::new()
        .merge(task_routes)
        .route("/ws", get(ws::handle_websocket))
        .route("/health", get(routes::health_check))
        .route("/stats", get(routes::engine_stats))
        .route("/openapi.json", get(routes::openapi_spec));

    // Merge Swagger UI routes if enabled in config (before applying state).
    // SwaggerUi registers its own document route, which must not collide with /openapi.json
    let router = if config.api.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    let router = router.with_state(state).layer(TraceLayer::new_for_http());

    // Apply CORS middleware if enabled in config
    if config.api.cors_enabled {
        router.layer(build_cors_layer(&config.api.cors_origins))
    } else {
        router
    }
}

/// Build a CORS layer based on configured origins
///
/// `"*"` (or an empty list) allows any origin.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address.
///
/// Runs until the listener fails; combine with [`crate::run_with_shutdown`] (or
/// `tokio::select!`) to stop on a signal.
///
/// # Example
///
/// ```no_run
/// use bulk_ops::api::{AppState, InMemoryCredentialStore};
/// use bulk_ops::gateway::StaticTokenVerifier;
/// use bulk_ops::worker::{ItemOperation, ItemOutcome};
/// use bulk_ops::{Config, OperationType, WorkerCredentials};
/// use std::sync::Arc;
///
/// struct Noop;
///
/// #[async_trait::async_trait]
/// impl ItemOperation for Noop {
///     async fn apply(&self, _: OperationType, _: &String, _: &WorkerCredentials) -> ItemOutcome {
///         ItemOutcome::Done
///     }
/// }
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let state = AppState::build(
///     Config::default(),
///     Arc::new(Noop),
///     Arc::new(StaticTokenVerifier::new()),
///     Arc::new(InMemoryCredentialStore::new()),
/// );
/// bulk_ops::api::start_api_server(state).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(state: AppState) -> Result<()> {
    let bind_address = state.config.api.bind_address;

    tracing::info!(
        address = %bind_address,
        "Starting API server"
    );

    let app = create_router(state);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(
        address = %bind_address,
        "API server listening"
    );

    axum::serve(listener, app)
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
