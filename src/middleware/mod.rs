//! The request pipeline.
//!
//! Stages run in a fixed order, outermost first:
//! tracing, metrics, panic recovery, CORS, rate limiting, authentication.
//! Gates from [`gate`] are attached per route, inside authentication.

use axum::{
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::config::CorsConfig;
use crate::state::AppState;

pub mod auth;
pub mod gate;
pub mod ip;
pub mod metrics;
pub mod rate_limit;
pub mod recover;

pub use auth::Principal;
pub use rate_limit::RateLimiter;

/// Wraps a fully routed application in the cross-cutting stages.
/// Later `.layer` calls wrap earlier ones, so this reads inside-out.
pub fn compose(router: Router, state: &AppState) -> Router {
    router
        .layer(from_fn_with_state(state.tokens.clone(), auth::authenticate))
        .layer(from_fn_with_state(state.limiter.clone(), rate_limit::rate_limit))
        .layer(cors_layer(&state.config.cors))
        .layer(from_fn(recover::recover_panic))
        .layer(from_fn_with_state(state.metrics.clone(), metrics::track_metrics))
        .layer(TraceLayer::new_for_http())
}

pub fn cors_layer(cfg: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = cfg
        .trusted_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(%origin, error = %e, "ignoring unusable trusted origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::OPTIONS, Method::PATCH, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}
