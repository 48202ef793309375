//! Authentication middleware for the REST API
//!
//! Task routes require an `Authorization: Bearer <token>` header. The token is resolved
//! through the same [`TokenVerifier`] observers use on the WebSocket gateway, and the
//! resulting user is attached to the request as an [`AuthenticatedOwner`] extension.

use axum::{
    Json,
    extract::{Request, State},
    http::{StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Duration;

use crate::error::ApiError;
use crate::gateway::TokenVerifier;
use crate::types::OwnerId;

/// The user a request was authenticated as
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticatedOwner(pub OwnerId);

/// State of [`require_bearer_token`]: the verifier and how long it may take
#[derive(Clone)]
pub struct BearerAuth {
    verifier: Arc<dyn TokenVerifier>,
    timeout: Duration,
}

impl BearerAuth {
    /// Resolve tokens through `verifier`, giving up after `timeout`
    pub fn new(verifier: Arc<dyn TokenVerifier>, timeout: Duration) -> Self {
        Self { verifier, timeout }
    }
}

/// Authentication middleware that resolves the bearer token to a user
///
/// Returns 401 Unauthorized if the header is missing, malformed, or the token is
/// rejected (a verifier that does not answer in time rejects it); otherwise runs the
/// next handler with an [`AuthenticatedOwner`] extension.
///
/// # Examples
///
/// ```no_run
/// use axum::{Router, middleware};
/// use bulk_ops::api::auth::{BearerAuth, require_bearer_token};
/// use bulk_ops::gateway::StaticTokenVerifier;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let auth = BearerAuth::new(Arc::new(StaticTokenVerifier::new()), Duration::from_secs(5));
/// let router: Router = Router::new()
///     .layer(middleware::from_fn_with_state(auth, require_bearer_token));
/// ```
pub async fn require_bearer_token(
    State(auth): State<BearerAuth>,
    mut request: Request,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let token = match header {
        Some(value) => match value.strip_prefix("Bearer ") {
            Some(token) if !token.trim().is_empty() => token.trim().to_string(),
            _ => return unauthorized_response("Malformed Authorization header"),
        },
        None => return unauthorized_response("Missing Authorization header"),
    };

    match tokio::time::timeout(auth.timeout, auth.verifier.verify(&token)).await {
        Ok(Some(owner)) => {
            request.extensions_mut().insert(AuthenticatedOwner(owner));
            next.run(request).await
        }
        Ok(None) => unauthorized_response("Invalid token"),
        Err(_) => {
            tracing::warn!(
                timeout_secs = auth.timeout.as_secs(),
                "Token verification timed out"
            );
            unauthorized_response("Invalid token")
        }
    }
}

/// 401 Unauthorized with an `unauthorized` error body
fn unauthorized_response(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(ApiError::unauthorized(message))).into_response()
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::StaticTokenVerifier;
    use axum::{
        Extension, Router,
        body::Body,
        http::{Request, StatusCode},
        middleware,
        routing::get,
    };
    use tower::ServiceExt; // for oneshot

    // Echoes the authenticated user
    async fn whoami(Extension(owner): Extension<AuthenticatedOwner>) -> impl IntoResponse {
        (StatusCode::OK, owner.0.to_string())
    }

    // Never answers within the test timeout
    struct SlowVerifier;

    #[async_trait::async_trait]
    impl TokenVerifier for SlowVerifier {
        async fn verify(&self, _token: &str) -> Option<OwnerId> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Some(OwnerId::from("u1"))
        }
    }

    fn app_with(verifier: Arc<dyn TokenVerifier>, timeout: Duration) -> Router {
        Router::new()
            .route("/test", get(whoami))
            .layer(middleware::from_fn_with_state(
                BearerAuth::new(verifier, timeout),
                require_bearer_token,
            ))
    }

    fn app() -> Router {
        app_with(
            Arc::new(StaticTokenVerifier::new().with_token("secret-token", "u1")),
            Duration::from_secs(5),
        )
    }

    async fn error_message(response: Response) -> String {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], "unauthorized");
        json["error"]["message"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_valid_token_attaches_owner() {
        let request = Request::builder()
            .uri("/test")
            .header("Authorization", "Bearer secret-token")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"u1");
    }

    #[tokio::test]
    async fn test_missing_header() {
        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            error_message(response).await,
            "Missing Authorization header"
        );
    }

    #[tokio::test]
    async fn test_wrong_scheme() {
        let request = Request::builder()
            .uri("/test")
            .header("Authorization", "Basic dTE6cGFzcw==")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            error_message(response).await,
            "Malformed Authorization header"
        );
    }

    #[tokio::test]
    async fn test_unknown_token() {
        let request = Request::builder()
            .uri("/test")
            .header("Authorization", "Bearer forged")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(error_message(response).await, "Invalid token");
    }

    #[tokio::test]
    async fn test_slow_verifier_is_rejected_after_timeout() {
        let request = Request::builder()
            .uri("/test")
            .header("Authorization", "Bearer secret-token")
            .body(Body::empty())
            .unwrap();

        let app = app_with(Arc::new(SlowVerifier), Duration::from_millis(20));
        let response = tokio::time::timeout(Duration::from_secs(5), app.oneshot(request))
            .await
            .expect("middleware waited on the verifier")
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(error_message(response).await, "Invalid token");
    }

    #[tokio::test]
    async fn test_rejection_body_is_an_api_error() {
        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();

        let response = app().oneshot(request).await.unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "error": {"code": "unauthorized", "message": "Missing Authorization header"}
            })
        );
    }
}
