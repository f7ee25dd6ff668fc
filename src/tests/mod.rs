//! Tests that drive the composed application through `tower::ServiceExt::oneshot`
//! against an in-memory SQLite database.
//!
//! - **pipeline_tests**: stage order, authentication, gates, recovery, rate limiting, CORS
//! - **api_tests**: users, tokens, songs, playlists and operational endpoints

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tower::ServiceExt;

use crate::config::AppConfig;
use crate::data::users::NewUser;
use crate::data::{Password, Scope, User};
use crate::mailer::{Mailer, Template};
use crate::state::AppState;

mod pipeline_tests;

pub(crate) const TEST_PASSWORD: &str = "pa55word-1234";

pub(crate) async fn test_pool() -> SqlitePool {
    // One connection that never recycles, or the in-memory database vanishes.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    crate::db::init_db(&pool).await.unwrap();
    pool
}

pub(crate) fn test_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.auth.bcrypt_cost = 4;
    cfg.limiter.enabled = false;
    cfg.cors.trusted_origins = vec!["https://apollo.example".into()];
    cfg
}

pub(crate) async fn test_state_with(cfg: AppConfig) -> AppState {
    AppState::new(test_pool().await, cfg)
}

pub(crate) async fn test_state() -> AppState {
    test_state_with(test_config()).await
}

#[derive(Default)]
pub(crate) struct CapturingMailer {
    pub sent: Mutex<Vec<(String, Template, Value)>>,
}

#[async_trait]
impl Mailer for CapturingMailer {
    async fn send(&self, recipient: &str, template: Template, data: Value) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push((recipient.to_string(), template, data));
        Ok(())
    }
}

/// Inserts a user directly and returns it with a fresh authentication token.
pub(crate) async fn seed_user(state: &AppState, email: &str, activated: bool, permissions: &[&str]) -> (User, String) {
    let password = Password::set(TEST_PASSWORD, 4).await.unwrap();
    let user = state
        .models
        .users
        .insert(NewUser { name: "Test User".into(), email: email.into(), password, activated })
        .await
        .unwrap();
    state.models.permissions.add_for_user(user.id, permissions).await.unwrap();
    let token = state.tokens.issue(user.id, Duration::from_secs(3600), Scope::Authentication).await.unwrap();
    (user, token.plaintext)
}

pub(crate) fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub(crate) fn authed(method: &str, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token));
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub(crate) fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub(crate) async fn send(app: &Router, req: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let headers = res.headers().clone();
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, headers, body)
}

pub(crate) fn varies_on_authorization(headers: &HeaderMap) -> bool {
    headers.get_all(header::VARY).iter().any(|v| v == "Authorization")
}

/// Shared buffer behind a thread-local `tracing` subscriber.
#[derive(Clone, Default)]
pub(crate) struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Routes this thread's log events into a buffer until the guard drops.
/// Tests using it run on the current-thread runtime, so spawned tasks log there too.
pub(crate) fn capture_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(move || writer.clone())
        .finish();
    (buffer, tracing::subscriber::set_default(subscriber))
}

pub(crate) fn capture_mail(state: &mut AppState) -> Arc<CapturingMailer> {
    let mailer = Arc::new(CapturingMailer::default());
    state.mailer = mailer.clone();
    mailer
}
