//! Route gates. Each gate implies the one before it:
//! authorized implies activated implies authenticated.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::{from_fn_with_state, Next},
    response::{IntoResponse, Response},
    routing::MethodRouter,
};

use super::auth::{principal, Principal};
use crate::data::{PermissionStore, User};
use crate::error::{AppError, AppResult};

fn authenticated(p: &Principal) -> AppResult<&User> {
    p.require_user()
}

fn activated(p: &Principal) -> AppResult<&User> {
    let user = authenticated(p)?;
    if !user.activated {
        return Err(AppError::InactiveAccount);
    }
    Ok(user)
}

pub async fn require_authenticated(req: Request, next: Next) -> Response {
    match authenticated(principal(req.extensions())) {
        Ok(_) => next.run(req).await,
        Err(e) => e.into_response(),
    }
}

pub async fn require_activated(req: Request, next: Next) -> Response {
    match activated(principal(req.extensions())) {
        Ok(_) => next.run(req).await,
        Err(e) => e.into_response(),
    }
}

/// A permission code together with the store that answers for it.
#[derive(Clone)]
pub struct PermissionGate {
    permissions: Arc<dyn PermissionStore>,
    code: &'static str,
}

impl PermissionGate {
    pub fn new(permissions: Arc<dyn PermissionStore>, code: &'static str) -> Self {
        Self { permissions, code }
    }

    /// Wraps every method currently registered on `route`.
    pub fn guard<S>(self, route: MethodRouter<S>) -> MethodRouter<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        route.route_layer(from_fn_with_state(self, require_authorized))
    }
}

pub async fn require_authorized(State(gate): State<PermissionGate>, req: Request, next: Next) -> Response {
    let user_id = match activated(principal(req.extensions())) {
        Ok(user) => user.id,
        Err(e) => return e.into_response(),
    };

    match gate.permissions.get_all_for_user(user_id).await {
        Ok(permissions) if permissions.includes(gate.code) => next.run(req).await,
        Ok(_) => AppError::NotPermitted.into_response(),
        Err(e) => AppError::Internal(e.into()).into_response(),
    }
}
