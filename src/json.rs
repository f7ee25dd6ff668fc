//! Strict JSON request bodies.
//!
//! [`JsonBody`] reads a bounded body, refuses unknown fields (inputs opt in via
//! `deny_unknown_fields`) and accepts exactly one JSON value. Every way this
//! can go wrong is a [`DecodeError`] variant.

use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
};
use http_body_util::LengthLimitError;
use serde::de::DeserializeOwned;
use serde_json::error::Category;
use thiserror::Error;

use crate::error::AppError;

pub const MAX_BODY_BYTES: usize = 1_048_576;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("body must not be empty")]
    Empty,
    #[error("body contains badly-formed JSON (at line {line}, column {column})")]
    Syntax { line: usize, column: usize },
    #[error("body contains badly-formed JSON")]
    Truncated,
    #[error("body contains incorrect JSON type (at line {line}, column {column})")]
    TypeMismatch { line: usize, column: usize },
    #[error("body contains unknown field \"{0}\"")]
    UnknownField(String),
    #[error("body must not be larger than {limit} bytes")]
    TooLarge { limit: usize },
    #[error("body must only contain a single JSON value")]
    MultipleValues,
    /// The decoder broke its own contract; this is a server fault.
    #[error("json decoder failed unexpectedly: {0}")]
    Defect(String),
}

impl From<DecodeError> for AppError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::Defect(detail) => AppError::Internal(anyhow::anyhow!(detail)),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, DecodeError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(DecodeError::Empty);
    }

    let mut de = serde_json::Deserializer::from_slice(bytes);
    let value = T::deserialize(&mut de).map_err(classify)?;
    de.end().map_err(|_| DecodeError::MultipleValues)?;
    Ok(value)
}

fn classify(err: serde_json::Error) -> DecodeError {
    let (line, column) = (err.line(), err.column());
    match err.classify() {
        Category::Syntax => DecodeError::Syntax { line, column },
        Category::Eof => DecodeError::Truncated,
        Category::Data => match unknown_field(&err.to_string()) {
            Some(name) => DecodeError::UnknownField(name),
            None => DecodeError::TypeMismatch { line, column },
        },
        // Reading from a slice cannot produce I/O errors.
        Category::Io => DecodeError::Defect(err.to_string()),
    }
}

fn unknown_field(message: &str) -> Option<String> {
    let rest = message.strip_prefix("unknown field `")?;
    let end = rest.find('`')?;
    Some(rest[..end].to_string())
}

fn exceeded_limit(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.is::<LengthLimitError>() {
            return true;
        }
        current = e.source();
    }
    false
}

async fn read_body(req: Request) -> Result<Bytes, AppError> {
    match axum::body::to_bytes(req.into_body(), MAX_BODY_BYTES).await {
        Ok(bytes) => Ok(bytes),
        Err(err) => {
            let inner = err.into_inner();
            if exceeded_limit(inner.as_ref()) {
                Err(DecodeError::TooLarge { limit: MAX_BODY_BYTES }.into())
            } else {
                Err(AppError::BadRequest(format!("failed to read request body: {}", inner)))
            }
        }
    }
}

/// JSON extractor that reports failures as `{"error": "..."}` with a 400.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, _state: &S) -> Result<Self, Self::Rejection> {
        let bytes = read_body(req).await?;
        Ok(JsonBody(decode(&bytes)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(deny_unknown_fields)]
    struct Input {
        name: String,
        #[serde(default)]
        count: i64,
    }

    #[test]
    fn decodes_a_single_value() {
        let input: Input = decode(br#"{"name": "a", "count": 2}"#).unwrap();
        assert_eq!(input, Input { name: "a".into(), count: 2 });
    }

    #[test]
    fn classifies_failures() {
        assert_eq!(decode::<Input>(b"").unwrap_err(), DecodeError::Empty);
        assert_eq!(decode::<Input>(b"  \n").unwrap_err(), DecodeError::Empty);
        assert!(matches!(decode::<Input>(br#"{"name" "a"}"#).unwrap_err(), DecodeError::Syntax { line: 1, .. }));
        assert_eq!(decode::<Input>(br#"{"name": "a""#).unwrap_err(), DecodeError::Truncated);
        assert!(matches!(
            decode::<Input>(br#"{"name": 5}"#).unwrap_err(),
            DecodeError::TypeMismatch { line: 1, .. }
        ));
        assert_eq!(
            decode::<Input>(br#"{"name": "a", "rating": 5}"#).unwrap_err(),
            DecodeError::UnknownField("rating".into())
        );
        assert_eq!(
            decode::<Input>(br#"{"name": "a"}{"name": "b"}"#).unwrap_err(),
            DecodeError::MultipleValues
        );
    }

    #[test]
    fn defect_is_a_server_error() {
        let err: AppError = DecodeError::Defect("bad state".into()).into();
        assert_eq!(err.status(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        let err: AppError = DecodeError::Empty.into();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn oversized_body_is_too_large() {
        let body = format!(r#"{{"name": "{}"}}"#, "x".repeat(MAX_BODY_BYTES));
        let req = Request::new(Body::from(body));
        match JsonBody::<Input>::from_request(req, &()).await {
            Err(AppError::BadRequest(msg)) => assert_eq!(msg, "body must not be larger than 1048576 bytes"),
            other => panic!("unexpected: {:?}", other.map(|b| b.0)),
        }
    }
}
