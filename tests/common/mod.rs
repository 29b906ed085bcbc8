#![allow(dead_code)]

use std::sync::Arc;

use account_auth::{
    app::build_app,
    config::AppConfig,
    state::AppState,
    users::InMemoryUserStore,
};
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, Response},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

/// Development-posture config with a fixed secret and no database.
pub fn test_config() -> AppConfig {
    AppConfig::from_lookup(|key| match key {
        "APP_ENV" => Some("development".into()),
        "JWT_SECRET" => Some("integration-test-secret".into()),
        "STORE_TIMEOUT_SECS" => Some("5".into()),
        _ => None,
    })
    .expect("test config")
}

/// Full router over an in-memory store; also returns the state for direct access.
pub fn build_test_app() -> (Router, AppState) {
    let state = AppState::from_parts(
        Arc::new(test_config()),
        Arc::new(InMemoryUserStore::new()),
    );
    (build_app(state.clone()), state)
}

pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    app.clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Send `body` verbatim, for payloads that are not well-formed JSON values.
pub async fn send_raw(
    app: &Router,
    method: Method,
    uri: &str,
    content_type: Option<&str>,
    body: &str,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(content_type) = content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    app.clone()
        .oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap()
}
