//! # Apollo API Library
//!
//! The backend for Apollo, a music catalogue with per-user playlists, exposed
//! as a JSON REST API.
//!
//! ## Architecture
//!
//! The application is built using:
//! - **Axum**: HTTP server, routing and middleware
//! - **SQLx**: Asynchronous SQLite storage
//! - **Tokio**: Async runtime, background work and timers
//! - **Serde**: JSON request and response bodies
//!
//! ## Core Components
//!
//! - [`config`]: Layered configuration (embedded defaults, file, environment)
//! - [`data`]: Storage models and the token/permission collaborators
//! - [`middleware`]: The request pipeline (metrics, recovery, CORS, rate limiting, authentication) and route gates
//! - [`routes`]: HTTP endpoint handlers
//! - [`json`]: Strict JSON body extractor
//! - [`background`]: Tracked detached tasks, drained on shutdown
//! - [`state`]: Shared application state

pub mod background;
pub mod config;
pub mod data;
pub mod db;
pub mod error;
pub mod json;
pub mod mailer;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod validator;

#[cfg(test)]
mod tests;
