// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use user_accounts::config::Config;
use user_accounts::db::{FirestoreDb, InMemoryUserStore};
use user_accounts::routes::create_router;
use user_accounts::AppState;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Create a test app over an empty in-memory store.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(
        Config::test_default(),
        Arc::new(InMemoryUserStore::new()),
    ));
    (create_router(state.clone()), state)
}

/// Send one request and decode the JSON response body (Null if empty).
#[allow(dead_code)]
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<String>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = builder
        .body(body.map(Body::from).unwrap_or_else(Body::empty))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[allow(dead_code)]
pub async fn send_json(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Value,
) -> (StatusCode, Value) {
    send(app, method, uri, token, Some(body.to_string())).await
}

#[allow(dead_code)]
pub fn john() -> Value {
    serde_json::json!({
        "firstName": "John",
        "lastName": "Doe",
        "email": "john@doe.com",
        "password": "abc1234rfd"
    })
}

/// Register `user` and log in, returning the bearer token.
#[allow(dead_code)]
pub async fn register_and_login(app: &Router, user: &Value) -> String {
    let (status, _) = send_json(app, "POST", "/user/register", None, user.clone()).await;
    assert_eq!(status, StatusCode::CREATED);

    login(app, &user["email"], &user["password"])
        .await
        .expect("login should succeed")
}

/// Log in, returning the token on 200 or the status otherwise.
#[allow(dead_code)]
pub async fn login(app: &Router, email: &Value, password: &Value) -> Result<String, StatusCode> {
    let (status, body) = send_json(
        app,
        "POST",
        "/user",
        None,
        serde_json::json!({ "email": email, "password": password }),
    )
    .await;
    if status != StatusCode::OK {
        return Err(status);
    }
    Ok(body["data"]["token"].as_str().unwrap().to_string())
}
