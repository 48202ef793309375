//! Error types for bulk-ops
//!
//! This module provides:
//! - The crate-wide [`Error`] used by the engine, workers and API layer
//! - [`GatewayError`] for rejected subscription requests
//! - HTTP status code mapping and structured JSON error bodies for the API

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::types::TaskId;

/// Result type alias for bulk-ops operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for bulk-ops
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "min_batch_size")
        key: Option<String>,
    },

    /// Unknown operation type name
    #[error("invalid operation type: {0}")]
    InvalidOperation(String),

    /// A task was requested with no items
    #[error("a task needs at least one item")]
    EmptyItems,

    /// Task not registered (never existed or already ended)
    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    /// Task exists but belongs to someone else
    #[error("task {id} does not belong to the caller")]
    NotOwner {
        /// The task that was addressed
        id: TaskId,
    },

    /// Request conflicts with tasks already running
    #[error("conflict: {0}")]
    Conflict(String),

    /// Shutdown in progress - not accepting new tasks
    #[error("shutdown in progress: not accepting new tasks")]
    ShuttingDown,

    /// A worker could not be started or addressed
    #[error("worker error: {0}")]
    Worker(String),

    /// Caller could not be authenticated
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),
}

/// Rejection of a subscribe/unsubscribe request at the subscription gateway
///
/// The `Display` text is what the observer receives in its `task error` event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Token verification failed, timed out, or yielded no user
    #[error("Can't verify token or user is invalid")]
    InvalidToken,

    /// The task identifier could not be parsed
    #[error("Task ID is invalid")]
    InvalidTaskId,

    /// No live task with that identifier
    #[error("Task does not exist")]
    TaskNotFound,

    /// The task belongs to another user
    #[error("Task does not belong to you")]
    NotOwner,

    /// The connection was never opened or has already been closed
    #[error("Connection is closed")]
    ConnectionClosed,
}

/// API error response format
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "task_not_found",
///     "message": "task 12 not found",
///     "details": { "task_id": 12 }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "task_not_found", "not_owner")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create an API error with additional details
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    /// Create an "unauthorized" error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("unauthorized", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - invalid input
            Error::Config { .. } => 400,
            Error::InvalidOperation(_) => 400,
            Error::EmptyItems => 422,

            // 401 / 403 - caller identity
            Error::Unauthorized(_) => 401,
            Error::NotOwner { .. } => 403,

            // 404 Not Found
            Error::TaskNotFound(_) => 404,

            // 409 Conflict
            Error::Conflict(_) => 409,

            // 503 Service Unavailable
            Error::ShuttingDown => 503,

            // 500 Internal Server Error
            Error::Worker(_) => 500,
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::InvalidOperation(_) => "invalid_operation",
            Error::EmptyItems => "empty_items",
            Error::TaskNotFound(_) => "task_not_found",
            Error::NotOwner { .. } => "not_owner",
            Error::Conflict(_) => "conflict",
            Error::ShuttingDown => "shutting_down",
            Error::Worker(_) => "worker_error",
            Error::Unauthorized(_) => "unauthorized",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
        }
    }
}

impl ToHttpStatus for GatewayError {
    fn status_code(&self) -> u16 {
        match self {
            GatewayError::InvalidToken => 401,
            GatewayError::InvalidTaskId => 400,
            GatewayError::TaskNotFound => 404,
            GatewayError::NotOwner => 403,
            GatewayError::ConnectionClosed => 410,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            GatewayError::InvalidToken => "invalid_token",
            GatewayError::InvalidTaskId => "invalid_task_id",
            GatewayError::TaskNotFound => "task_not_found",
            GatewayError::NotOwner => "not_owner",
            GatewayError::ConnectionClosed => "connection_closed",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::TaskNotFound(id) => Some(serde_json::json!({ "task_id": id.0 })),
            Error::NotOwner { id } => Some(serde_json::json!({ "task_id": id.0 })),
            Error::InvalidOperation(name) => Some(serde_json::json!({
                "operation": name,
                "allowed": crate::types::OperationType::ALL
                    .iter()
                    .map(|op| op.as_str())
                    .collect::<Vec<_>>(),
            })),
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({ "key": key })),
            _ => None,
        };

        match details {
            Some(details) => ApiError::with_details(code, message, details),
            None => ApiError::new(code, message),
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn all_error_variants() -> Vec<(Error, u16, &'static str)> {
        vec![
            (
                Error::Config {
                    message: "bad".into(),
                    key: None,
                },
                400,
                "config_error",
            ),
            (
                Error::InvalidOperation("x".into()),
                400,
                "invalid_operation",
            ),
            (Error::EmptyItems, 422, "empty_items"),
            (Error::TaskNotFound(TaskId(1)), 404, "task_not_found"),
            (Error::NotOwner { id: TaskId(1) }, 403, "not_owner"),
            (Error::Conflict("busy".into()), 409, "conflict"),
            (Error::ShuttingDown, 503, "shutting_down"),
            (Error::Worker("spawn".into()), 500, "worker_error"),
            (Error::Unauthorized("nope".into()), 401, "unauthorized"),
            (
                Error::Io(std::io::Error::other("disk")),
                500,
                "io_error",
            ),
            (
                Error::ApiServerError("bind".into()),
                500,
                "api_server_error",
            ),
        ]
    }

    #[test]
    fn test_every_variant_maps_to_expected_status_code() {
        for (error, status, _) in all_error_variants() {
            assert_eq!(error.status_code(), status, "{error:?}");
        }
    }

    #[test]
    fn test_every_variant_maps_to_expected_error_code() {
        for (error, _, code) in all_error_variants() {
            assert_eq!(error.error_code(), code, "{error:?}");
        }
    }

    #[test]
    fn test_api_error_from_task_not_found_has_task_id() {
        let api: ApiError = Error::TaskNotFound(TaskId(12)).into();
        assert_eq!(api.error.code, "task_not_found");
        assert!(api.error.message.contains("12"));
        assert_eq!(api.error.details.unwrap()["task_id"], 12);
    }

    #[test]
    fn test_api_error_from_invalid_operation_lists_allowed_names() {
        let api: ApiError = Error::InvalidOperation("retweet".into()).into();
        let details = api.error.details.unwrap();
        assert_eq!(details["operation"], "retweet");
        assert_eq!(
            details["allowed"],
            serde_json::json!(["tweet", "mute", "block", "fav", "dm"])
        );
    }

    #[test]
    fn test_api_error_from_shutting_down_has_no_details() {
        let api: ApiError = Error::ShuttingDown.into();
        assert!(api.error.details.is_none());
        let json = serde_json::to_value(&api).unwrap();
        assert!(
            json["error"].get("details").is_none(),
            "details are omitted when absent"
        );
    }

    #[test]
    fn test_gateway_errors_carry_observer_facing_messages() {
        assert_eq!(
            GatewayError::InvalidToken.to_string(),
            "Can't verify token or user is invalid"
        );
        assert_eq!(GatewayError::InvalidTaskId.to_string(), "Task ID is invalid");
        assert_eq!(GatewayError::TaskNotFound.to_string(), "Task does not exist");
        assert_eq!(
            GatewayError::NotOwner.to_string(),
            "Task does not belong to you"
        );
        assert_eq!(GatewayError::NotOwner.status_code(), 403);
    }
}
