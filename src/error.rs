use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::data::DataError;

/// The primary error type for the HTTP layer.
///
/// Every variant renders as a JSON body of the shape `{"error": ...}`. Only
/// [`AppError::Internal`] carries detail that must stay server-side; it is
/// handed to the recovery stage through [`ServerErrorDetail`] and logged there
/// together with the request method and URI.
#[derive(Debug)]
pub enum AppError {
    /// Unexpected failures. The body never contains the underlying error text.
    Internal(anyhow::Error),
    /// Client errors such as malformed JSON bodies.
    BadRequest(String),
    /// Field-keyed validation failures (422).
    FailedValidation(BTreeMap<String, String>),
    NotFound,
    MethodNotAllowed(String),
    EditConflict,
    RateLimited,
    /// Missing-but-required, malformed, unknown or expired bearer token.
    InvalidAuthenticationToken,
    InvalidCredentials,
    /// Anonymous principal on a gated route.
    AuthenticationRequired,
    InactiveAccount,
    NotPermitted,
}

/// Server-side detail of an internal error, attached to the response
/// extensions so the recovery stage can log it with request context.
#[derive(Clone, Debug)]
pub struct ServerErrorDetail(pub String);

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(e) => write!(f, "Internal error: {:#}", e),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::FailedValidation(errors) => write!(f, "Validation failed for {} field(s)", errors.len()),
            AppError::NotFound => write!(f, "Not found"),
            AppError::MethodNotAllowed(method) => write!(f, "Method not allowed: {}", method),
            AppError::EditConflict => write!(f, "Edit conflict"),
            AppError::RateLimited => write!(f, "Rate limit exceeded"),
            AppError::InvalidAuthenticationToken => write!(f, "Invalid or missing authentication token"),
            AppError::InvalidCredentials => write!(f, "Invalid authentication credentials"),
            AppError::AuthenticationRequired => write!(f, "Authentication required"),
            AppError::InactiveAccount => write!(f, "Inactive account"),
            AppError::NotPermitted => write!(f, "Missing permission"),
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AppError::Internal(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::FailedValidation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            AppError::EditConflict => StatusCode::CONFLICT,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::InvalidAuthenticationToken
            | AppError::InvalidCredentials
            | AppError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            AppError::InactiveAccount | AppError::NotPermitted => StatusCode::FORBIDDEN,
        }
    }

    /// Shorthand for a single-field validation failure.
    pub fn field(field: &str, message: &str) -> Self {
        AppError::FailedValidation(BTreeMap::from([(field.to_string(), message.to_string())]))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut detail = None;
        let message = match self {
            AppError::Internal(e) => {
                detail = Some(ServerErrorDetail(format!("{:#}", e)));
                json!("the server encountered a problem and could not process your request")
            }
            AppError::BadRequest(msg) => json!(msg),
            AppError::FailedValidation(errors) => json!(errors),
            AppError::NotFound => json!("the requested resource could not be found"),
            AppError::MethodNotAllowed(method) => {
                json!(format!("the {} method is not supported for this resource", method))
            }
            AppError::EditConflict => {
                json!("unable to update the record due to an edit conflict, please try again")
            }
            AppError::RateLimited => json!("rate limit exceeded"),
            AppError::InvalidAuthenticationToken => json!("invalid or missing authentication token"),
            AppError::InvalidCredentials => json!("invalid authentication credentials"),
            AppError::AuthenticationRequired => {
                json!("you are not authorized to access this resource, please authenticate")
            }
            AppError::InactiveAccount => {
                json!("your user account must be activated to access this resource")
            }
            AppError::NotPermitted => {
                json!("your user account doesn't have the necessary permissions to access this resource")
            }
        };

        let mut res = (status, Json(json!({ "error": message }))).into_response();
        if status == StatusCode::UNAUTHORIZED {
            res.headers_mut().insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        if let Some(detail) = detail {
            res.extensions_mut().insert(detail);
        }
        res
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl From<DataError> for AppError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::RecordNotFound => AppError::NotFound,
            DataError::EditConflict => AppError::EditConflict,
            DataError::DuplicateEmail => {
                AppError::field("email", "a user with this email address already exists")
            }
            other => AppError::Internal(other.into()),
        }
    }
}

/// A type alias for `Result<T, AppError>`, used throughout the HTTP layer.
pub type AppResult<T> = Result<T, AppError>;
