use std::sync::Arc;

use sqlx::SqlitePool;

use crate::background::Background;
use crate::config::AppConfig;
use crate::data::{Models, TokenModel, Tokens};
use crate::mailer::{LogMailer, Mailer};
use crate::metrics::Metrics;
use crate::middleware::RateLimiter;

/// The shared application state.
///
/// Cheap to clone; every field is a handle. Fields are public so callers
/// (and tests) can swap a collaborator before the router is built.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<AppConfig>,
    pub models: Models,
    /// Token issue/resolve on top of the token and user stores.
    pub tokens: Tokens,
    pub metrics: Metrics,
    pub limiter: RateLimiter,
    /// Detached work such as mail delivery; drained on shutdown.
    pub background: Background,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub fn new(db: SqlitePool, config: AppConfig) -> Self {
        let models = Models::new(db.clone());
        let tokens = Tokens::new(Arc::new(TokenModel::new(db.clone())), models.users.clone());

        Self {
            limiter: RateLimiter::from_config(&config.limiter),
            mailer: Arc::new(LogMailer::new(config.mailer.sender.clone())),
            config: Arc::new(config),
            db,
            models,
            tokens,
            metrics: Metrics::new(),
            background: Background::new(),
        }
    }
}
