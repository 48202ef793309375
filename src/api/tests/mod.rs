use super::*;
use crate::Config;
use crate::engine::test_helpers::{ManualExecutor, credentials, manual_engine};
use crate::engine::TaskEngine;
use crate::gateway::{StaticTokenVerifier, SubscriptionGateway, TokenVerifier};
use axum::body::Body;
use axum::http::Request;
use axum::http::StatusCode;
use axum::response::Response;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;


/// Router plus the pieces tests poke at directly
struct TestApp {
    router: Router,
    engine: TaskEngine,
    executor: Arc<ManualExecutor>,
}

/// App with users u1, u2 and u3 (token `tok-<user>`); u3 has no API credentials on file
fn test_app_with(config: Config) -> TestApp {
    let (engine, executor) = manual_engine();
    let verifier: Arc<dyn TokenVerifier> = Arc::new(
        StaticTokenVerifier::new()
            .with_token("tok-u1", "u1")
            .with_token("tok-u2", "u2")
            .with_token("tok-u3", "u3"),
    );
    let store = InMemoryCredentialStore::new();
    store.insert(credentials("u1"));
    store.insert(credentials("u2"));
    let gateway = SubscriptionGateway::new(
        engine.registry().clone(),
        verifier.clone(),
        config.gateway.clone(),
    );
    let state = AppState::new(
        engine.clone(),
        gateway,
        verifier,
        Arc::new(store),
        Arc::new(config),
    );

    TestApp {
        router: create_router(state),
        engine,
        executor,
    }
}

fn test_app() -> TestApp {
    test_app_with(Config::default())
}

async fn json_body(response: Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_api_server_spawns() {
    let mut config = Config::default();
    config.api.bind_address = "127.0.0.1:0".parse().unwrap(); // Port 0 = OS assigns a free port

    let state = AppState::build(
        config,
        Arc::new(NoopOperation),
        Arc::new(StaticTokenVerifier::new()),
        Arc::new(InMemoryCredentialStore::new()),
    );
    let api_handle = tokio::spawn(start_api_server(state));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!api_handle.is_finished(), "server should still be serving");
    api_handle.abort();
}

struct NoopOperation;

#[async_trait::async_trait]
impl crate::worker::ItemOperation for NoopOperation {
    async fn apply(
        &self,
        _operation: crate::types::OperationType,
        _item: &crate::types::ItemId,
        _credentials: &crate::types::WorkerCredentials,
    ) -> crate::worker::ItemOutcome {
        crate::worker::ItemOutcome::Done
    }
}

#[tokio::test]
async fn test_cors_enabled() {
    let mut config = Config::default();
    config.api.cors_enabled = true;
    config.api.cors_origins = vec!["*".to_string()];
    let app = test_app_with(config);

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();

    let response = app.router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin"),
        "CORS headers should be present"
    );
}

#[tokio::test]
async fn test_cors_specific_origins() {
    let mut config = Config::default();
    config.api.cors_enabled = true;
    config.api.cors_origins = vec!["http://allowed.example".to_string()];
    let app = test_app_with(config);

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://allowed.example")
        .body(Body::empty())
        .unwrap();

    let response = app.router.oneshot(request).await.unwrap();

    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "http://allowed.example"
    );
}

#[tokio::test]
async fn test_cors_disabled() {
    let mut config = Config::default();
    config.api.cors_enabled = false;
    let app = test_app_with(config);

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();

    let response = app.router.oneshot(request).await.unwrap();

    assert!(
        !response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn test_swagger_ui_toggle() {
    let mut config = Config::default();
    config.api.swagger_ui = true;
    let enabled = test_app_with(config.clone());
    config.api.swagger_ui = false;
    let disabled = test_app_with(config);

    let request = || {
        Request::builder()
            .uri("/swagger-ui/")
            .body(Body::empty())
            .unwrap()
    };

    let response = enabled.router.oneshot(request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = disabled.router.oneshot(request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
