//! OpenAPI documentation and schema generation
//!
//! This module defines the OpenAPI specification for the bulk-ops REST API
//! using utoipa for compile-time spec generation.

use utoipa::OpenApi;

/// OpenAPI documentation for the bulk-ops REST API
///
/// The spec can be accessed via:
/// - `/openapi.json` - JSON format OpenAPI specification
/// - `/swagger-ui` - Interactive Swagger UI documentation
///
/// The `/ws` observer endpoint speaks WebSocket and is not described here.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "bulk-ops REST API",
        version = "0.1.0",
        description = "Start, inspect and cancel bulk tasks processed by pools of workers",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:6790", description = "Local development server")
    ),
    paths(
        // Tasks
        crate::api::routes::create_task,
        crate::api::routes::list_tasks,
        crate::api::routes::get_task,
        crate::api::routes::cancel_task,

        // System
        crate::api::routes::health_check,
        crate::api::routes::engine_stats,
        crate::api::routes::openapi_spec,
    ),
    components(schemas(
        // Core types from types.rs
        crate::types::TaskId,
        crate::types::OwnerId,
        crate::types::OperationType,
        crate::types::ProgressSnapshot,
        crate::types::TaskStatus,
        crate::types::TaskSummary,
        crate::types::EngineStats,

        // API request types from routes
        crate::api::routes::CreateTaskRequest,
        crate::api::routes::TaskListQuery,

        // Error types from error.rs
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "tasks", description = "Bulk tasks - Start, list, inspect and cancel your tasks"),
        (name = "system", description = "System endpoints - Health checks, statistics, OpenAPI spec"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Security addon to add bearer token authentication scheme to OpenAPI spec
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = &mut openapi.components {
            components.add_security_scheme(
                "bearer",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::Http::new(
                        utoipa::openapi::security::HttpAuthScheme::Bearer,
                    ),
                ),
            );
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_has_paths() {
        let spec = ApiDoc::openapi();

        for path in ["/tasks", "/tasks/{id}", "/health", "/stats", "/openapi.json"] {
            assert!(
                spec.paths.paths.contains_key(path),
                "{path} should be documented"
            );
        }
    }

    #[test]
    fn test_openapi_spec_has_components() {
        let spec = ApiDoc::openapi();

        let components = spec.components.unwrap();
        assert!(components.schemas.contains_key("TaskSummary"));
        assert!(components.schemas.contains_key("CreateTaskRequest"));
        assert!(components.schemas.contains_key("ApiError"));
    }

    #[test]
    fn test_openapi_spec_has_tags() {
        let spec = ApiDoc::openapi();

        let tags = spec.tags.unwrap();
        let tag_names: Vec<&str> = tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(tag_names, vec!["tasks", "system"]);
    }

    #[test]
    fn test_openapi_spec_info() {
        let spec = ApiDoc::openapi();

        assert_eq!(spec.info.title, "bulk-ops REST API");
        assert_eq!(spec.info.version, "0.1.0");
        assert!(spec.info.description.is_some());
    }

    #[test]
    fn test_openapi_spec_has_security_scheme() {
        let spec = ApiDoc::openapi();

        let components = spec.components.unwrap();
        assert!(
            components.security_schemes.contains_key("bearer"),
            "Should have 'bearer' security scheme defined"
        );
    }
}
