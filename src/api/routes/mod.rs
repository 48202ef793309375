//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`tasks`] for creating, inspecting and cancelling bulk tasks
//! - [`system`] for health, engine statistics and the OpenAPI document

use serde::{Deserialize, Serialize};

mod system;
mod tasks;

// Re-export all handlers so `routes::function_name` continues to work
pub use system::*;
pub use tasks::*;

// ============================================================================
// Query/Request Types (shared across handlers)
// ============================================================================

/// Request body for POST /tasks
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct CreateTaskRequest {
    /// Operation wire name: "tweet", "mute", "block", "fav" or "dm"
    pub operation: String,
    /// Item identifiers to process, in order
    pub items: Vec<String>,
    /// Requested number of workers (defaults to the engine setting)
    #[serde(default)]
    pub workers: Option<usize>,
}

/// Query parameters for GET /tasks
#[derive(Debug, Default, Deserialize, Serialize, utoipa::ToSchema, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TaskListQuery {
    /// Only list tasks performing this operation
    pub operation: Option<String>,
}
