use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    middleware::from_fn,
    routing::get as route_get,
    Router,
};
use serde_json::json;

use super::*;
use crate::data::tokens::{StoredToken, Token};
use crate::data::{DataError, DataResult, TokenModel, TokenStore, Tokens, QUERY_TIMEOUT};
use crate::middleware::{compose, gate::require_authenticated, Principal};
use crate::routes;

const NEVER_ISSUED: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";

struct CountingTokens {
    inner: TokenModel,
    lookups: AtomicUsize,
}

#[async_trait]
impl TokenStore for CountingTokens {
    async fn insert(&self, token: &Token) -> DataResult<()> {
        self.inner.insert(token).await
    }

    async fn find_unexpired(&self, hash: &[u8; 32], scope: Scope) -> DataResult<StoredToken> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.find_unexpired(hash, scope).await
    }

    async fn delete_all_for_user(&self, scope: Scope, user_id: i64) -> DataResult<()> {
        self.inner.delete_all_for_user(scope, user_id).await
    }
}

struct UnreachableTokens;

#[async_trait]
impl TokenStore for UnreachableTokens {
    async fn insert(&self, _token: &Token) -> DataResult<()> {
        Err(DataError::Timeout(QUERY_TIMEOUT))
    }

    async fn find_unexpired(&self, _hash: &[u8; 32], _scope: Scope) -> DataResult<StoredToken> {
        Err(DataError::Timeout(QUERY_TIMEOUT))
    }

    async fn delete_all_for_user(&self, _scope: Scope, _user_id: i64) -> DataResult<()> {
        Err(DataError::Timeout(QUERY_TIMEOUT))
    }
}

async fn counted_state() -> (AppState, Arc<CountingTokens>) {
    let mut state = test_state().await;
    let store = Arc::new(CountingTokens { inner: TokenModel::new(state.db.clone()), lookups: AtomicUsize::new(0) });
    state.tokens = Tokens::new(store.clone(), state.models.users.clone());
    (state, store)
}

fn bearer(uri: &str, value: &str) -> Request<Body> {
    Request::builder().uri(uri).header(header::AUTHORIZATION, value).body(Body::empty()).unwrap()
}

async fn whoami(principal: Principal) -> String {
    match principal.user() {
        Some(user) => format!("user:{}", user.id),
        None => "anonymous".to_string(),
    }
}

async fn boom() -> &'static str {
    panic!("handler exploded")
}

/// A small router behind the real pipeline, for stage behaviour that the
/// production routes do not expose directly.
fn stage_app(state: &AppState) -> Router {
    let router = Router::new()
        .route("/whoami", route_get(whoami))
        .route("/authenticated", route_get(whoami).route_layer(from_fn(require_authenticated)))
        .route("/boom", route_get(boom))
        .route("/ok", route_get(|| async { "ok" }));
    compose(router, state)
}

#[tokio::test]
async fn missing_header_is_anonymous_on_open_routes_and_rejected_on_gated_ones() {
    let state = test_state().await;
    let app = routes::app(state.clone());

    let (status, headers, body) = send(&app, get("/v1/songs")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(varies_on_authorization(&headers));
    assert_eq!(body["songs"], json!([]));

    let (status, headers, body) = send(&app, get("/v1/playlists/list/playlist")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(headers[header::WWW_AUTHENTICATE], "Bearer");
    assert!(varies_on_authorization(&headers));
    assert_eq!(body["error"], "you are not authorized to access this resource, please authenticate");

    let stages = stage_app(&state);
    let (status, _, body) = send(&stages, get("/whoami")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("anonymous"));
}

#[tokio::test]
async fn empty_authorization_header_is_anonymous() {
    let state = test_state().await;
    let (status, _, body) = send(&stage_app(&state), bearer("/whoami", "")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("anonymous"));
}

#[tokio::test]
async fn unknown_well_formed_token_is_rejected_after_a_lookup() {
    let (state, store) = counted_state().await;
    let app = routes::app(state);

    let (status, headers, body) = send(&app, bearer("/v1/songs", &format!("Bearer {}", NEVER_ISSUED))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(headers[header::WWW_AUTHENTICATE], "Bearer");
    assert!(varies_on_authorization(&headers));
    assert_eq!(body["error"], "invalid or missing authentication token");
    assert_eq!(store.lookups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn malformed_headers_are_rejected_without_a_lookup() {
    let (state, store) = counted_state().await;
    let app = routes::app(state);

    let malformed = [
        "Token abc".to_string(),
        "Bearer".to_string(),
        "Bearer  ".to_string(),
        format!("bearer {}", NEVER_ISSUED),
        format!("Bearer {} extra", NEVER_ISSUED),
        "Bearer short".to_string(),
    ];
    for value in &malformed {
        let (status, headers, body) = send(&app, bearer("/v1/songs", value)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{value:?}");
        assert_eq!(headers[header::WWW_AUTHENTICATE], "Bearer");
        assert_eq!(body["error"], "invalid or missing authentication token");
    }
    assert_eq!(store.lookups.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn valid_token_binds_the_user() {
    let state = test_state().await;
    let (user, token) = seed_user(&state, "ada@example.com", false, &[]).await;
    let stages = stage_app(&state);

    let (status, _, body) = send(&stages, bearer("/whoami", &format!("Bearer {}", token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(format!("user:{}", user.id)));

    // Authentication alone does not need an activated account.
    let (status, _, _) = send(&stages, bearer("/authenticated", &format!("Bearer {}", token))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, headers, _) = send(&stages, get("/authenticated")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(headers[header::WWW_AUTHENTICATE], "Bearer");
}

#[tokio::test]
async fn activation_token_is_not_an_authentication_token() {
    let state = test_state().await;
    let (user, _) = seed_user(&state, "grace@example.com", false, &[]).await;
    let activation = state
        .tokens
        .issue(user.id, std::time::Duration::from_secs(60), Scope::Activation)
        .await
        .unwrap();

    let (status, _, _) =
        send(&stage_app(&state), bearer("/whoami", &format!("Bearer {}", activation.plaintext))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn storage_failure_during_lookup_is_a_server_error() {
    let mut state = test_state().await;
    state.tokens = Tokens::new(Arc::new(UnreachableTokens), state.models.users.clone());
    let app = routes::app(state);

    let (status, headers, body) = send(&app, bearer("/v1/songs", &format!("Bearer {}", NEVER_ISSUED))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(headers.get(header::WWW_AUTHENTICATE).is_none());
    assert!(varies_on_authorization(&headers));
    assert_eq!(body["error"], "the server encountered a problem and could not process your request");
}

#[tokio::test]
async fn gates_escalate_from_inactive_to_missing_permission() {
    let state = test_state().await;
    let app = routes::app(state.clone());
    let song = json!({"name": "Blue", "artist": "Joni Mitchell"});

    let (_, inactive) = seed_user(&state, "inactive@example.com", false, &["songs:create"]).await;
    let (status, _, body) = send(&app, authed("POST", "/v1/songs", &inactive, Some(song.clone()))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "your user account must be activated to access this resource");

    let (status, _, _) = send(&app, authed("GET", "/v1/playlists/list/playlist", &inactive, None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, reader) = seed_user(&state, "reader@example.com", true, &["songs:read"]).await;
    let (status, _, body) = send(&app, authed("POST", "/v1/songs", &reader, Some(song.clone()))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        body["error"],
        "your user account doesn't have the necessary permissions to access this resource"
    );

    let (_, writer) = seed_user(&state, "writer@example.com", true, &["songs:read", "songs:create"]).await;
    let (status, headers, body) = send(&app, authed("POST", "/v1/songs", &writer, Some(song))).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["song"]["id"].as_i64().unwrap();
    assert_eq!(headers[header::LOCATION], format!("/v1/songs/{}", id).as_str());

    let (status, _, body) = send(&app, json_request("POST", "/v1/songs", json!({"name": "x", "artist": "y"}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "you are not authorized to access this resource, please authenticate");
}

#[tokio::test]
async fn panic_becomes_500_and_the_server_keeps_serving() {
    let state = test_state().await;
    let stages = stage_app(&state);

    let (status, headers, body) = send(&stages, get("/boom")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(headers[header::CONNECTION], "close");
    assert_eq!(body["error"], "the server encountered a problem and could not process your request");

    let (status, _, _) = send(&stages, get("/ok")).await;
    assert_eq!(status, StatusCode::OK);

    let snapshot = state.metrics.get_snapshot();
    assert_eq!(snapshot.total_requests_received, 2);
    assert_eq!(snapshot.total_responses_sent, 2);
    assert_eq!(snapshot.total_responses_sent_by_status["500"], 1);
    assert_eq!(snapshot.total_responses_sent_by_status["200"], 1);
}

fn from_ip(uri: &str, ip: &str) -> Request<Body> {
    Request::builder().uri(uri).header("x-forwarded-for", ip).body(Body::empty()).unwrap()
}

fn limited_config(burst: u32) -> crate::config::AppConfig {
    let mut cfg = test_config();
    cfg.limiter.enabled = true;
    cfg.limiter.rps = 0.001;
    cfg.limiter.burst = burst;
    cfg
}

#[tokio::test]
async fn limiter_rejects_after_burst_per_client() {
    let state = test_state_with(limited_config(2)).await;
    let app = routes::app(state.clone());

    for _ in 0..2 {
        let (status, _, _) = send(&app, from_ip("/v1/healthcheck", "198.51.100.1")).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _, body) = send(&app, from_ip("/v1/healthcheck", "198.51.100.1")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "rate limit exceeded");

    let (status, _, _) = send(&app, from_ip("/v1/healthcheck", "198.51.100.2")).await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(state.metrics.get_snapshot().total_responses_sent_by_status["429"], 1);
}

#[tokio::test]
async fn limiter_runs_before_authentication() {
    let (mut state, store) = counted_state().await;
    state.limiter = crate::middleware::RateLimiter::new(0.001, 1);
    let app = routes::app(state);

    let req = |ip: &str| {
        Request::builder()
            .uri("/v1/songs")
            .header("x-forwarded-for", ip)
            .header(header::AUTHORIZATION, format!("Bearer {}", NEVER_ISSUED))
            .body(Body::empty())
            .unwrap()
    };
    let (status, _, _) = send(&app, req("203.0.113.9")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _, _) = send(&app, req("203.0.113.9")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(store.lookups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cors_preflight_spends_no_rate_budget_and_needs_no_credentials() {
    let state = test_state_with(limited_config(1)).await;
    let app = routes::app(state);

    let preflight = || {
        Request::builder()
            .method("OPTIONS")
            .uri("/v1/songs/1")
            .header("x-forwarded-for", "192.0.2.10")
            .header(header::ORIGIN, "https://apollo.example")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "DELETE")
            .header(header::AUTHORIZATION, "garbage")
            .body(Body::empty())
            .unwrap()
    };
    for _ in 0..3 {
        let (status, headers, _) = send(&app, preflight()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "https://apollo.example");
    }

    let (status, _, _) = send(&app, from_ip("/v1/healthcheck", "192.0.2.10")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = send(&app, from_ip("/v1/healthcheck", "192.0.2.10")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn untrusted_origin_gets_no_cors_grant() {
    let state = test_state().await;
    let app = routes::app(state);
    let req = Request::builder()
        .uri("/v1/healthcheck")
        .header(header::ORIGIN, "https://evil.example")
        .body(Body::empty())
        .unwrap();
    let (status, headers, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
}
