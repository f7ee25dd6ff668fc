//! HTTP route handlers.
//!
//! - `health`: healthcheck and metrics endpoints
//! - `songs`: song catalogue, read open, writes gated by permission
//! - `users`: registration and activation
//! - `tokens`: authentication token issue
//! - `playlists`: per-user playlists, activated accounts only

use axum::{
    http::Method,
    routing::{delete, get, patch, post, put},
    Router,
};

use crate::error::{AppError, AppResult};
use crate::middleware::{self, gate::PermissionGate};
use crate::state::AppState;

pub mod health;
pub mod playlists;
pub mod songs;
pub mod tokens;
pub mod users;

/// Routes only, without the cross-cutting stages.
pub fn router(state: AppState) -> Router {
    let permission = |code: &'static str| PermissionGate::new(state.models.permissions.clone(), code);

    Router::new()
        .route("/v1/healthcheck", get(health::healthcheck))
        .route("/v1/songs", get(songs::list_songs))
        .route("/v1/songs", permission("songs:create").guard(post(songs::create_song)))
        .route("/v1/songs/{id}", get(songs::show_song))
        .route("/v1/songs/{id}", permission("songs:update").guard(patch(songs::update_song)))
        .route("/v1/songs/{id}", permission("songs:delete").guard(delete(songs::delete_song)))
        .route("/v1/users", post(users::register_user))
        .route("/v1/users/activated", put(users::activate_user))
        .route("/v1/tokens/authentication", post(tokens::create_authentication_token))
        .merge(playlists::routes())
        .route("/debug/vars", get(health::debug_vars))
        .route("/debug/metrics", get(health::debug_metrics))
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .with_state(state)
}

/// The full application: routes wrapped in the request pipeline.
pub fn app(state: AppState) -> Router {
    let routes = router(state.clone());
    middleware::compose(routes, &state)
}

async fn not_found() -> AppError {
    AppError::NotFound
}

async fn method_not_allowed(method: Method) -> AppError {
    AppError::MethodNotAllowed(method.to_string())
}

/// Record ids in paths are positive integers; anything else cannot exist.
pub(crate) fn parse_id(raw: &str) -> AppResult<i64> {
    match raw.parse::<i64>() {
        Ok(id) if id >= 1 => Ok(id),
        _ => Err(AppError::NotFound),
    }
}
