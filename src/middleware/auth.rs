//! Bearer-token authentication.
//!
//! Every request leaves this stage with a [`Principal`] in its extensions:
//! the anonymous principal when no credentials were offered, or the user that
//! owns the presented authentication token. Bad credentials never fall back to
//! anonymous.

use std::convert::Infallible;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, Extensions, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::data::tokens::TokenError;
use crate::data::{Scope, Tokens, User};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone)]
pub enum Principal {
    Anonymous,
    User(User),
}

impl Principal {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Principal::Anonymous)
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            Principal::Anonymous => None,
            Principal::User(user) => Some(user),
        }
    }

    /// The bound user, or 401 for the anonymous principal.
    pub fn require_user(&self) -> AppResult<&User> {
        self.user().ok_or(AppError::AuthenticationRequired)
    }
}

/// Reads the principal bound by [`authenticate`].
///
/// # Panics
///
/// If the request never passed through [`authenticate`]. That is a routing
/// bug, not a client error.
pub fn principal(extensions: &Extensions) -> &Principal {
    extensions
        .get::<Principal>()
        .unwrap_or_else(|| panic!("missing principal: request did not pass through the authenticate stage"))
}

impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(principal(&parts.extensions).clone())
    }
}

pub async fn authenticate(State(tokens): State<Tokens>, mut req: Request, next: Next) -> Response {
    let res = match identify(&tokens, req.headers()).await {
        Ok(principal) => {
            req.extensions_mut().insert(principal);
            next.run(req).await
        }
        Err(e) => e.into_response(),
    };
    vary_on_authorization(res)
}

async fn identify(tokens: &Tokens, headers: &HeaderMap) -> AppResult<Principal> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(Principal::Anonymous);
    };
    let value = value.to_str().map_err(|_| AppError::InvalidAuthenticationToken)?;
    if value.is_empty() {
        return Ok(Principal::Anonymous);
    }

    let parts: Vec<&str> = value.split(' ').collect();
    let plaintext = match parts.as_slice() {
        ["Bearer", token] => *token,
        _ => return Err(AppError::InvalidAuthenticationToken),
    };

    match tokens.resolve(Scope::Authentication, plaintext).await {
        Ok(user) => Ok(Principal::User(user)),
        Err(TokenError::Malformed(_)) | Err(TokenError::NotFound) => Err(AppError::InvalidAuthenticationToken),
        Err(TokenError::Data(e)) => Err(AppError::Internal(e.into())),
        Err(TokenError::Generate(e)) => Err(AppError::Internal(e)),
    }
}

fn vary_on_authorization(mut res: Response) -> Response {
    res.headers_mut().append(header::VARY, HeaderValue::from_static("Authorization"));
    res
}
