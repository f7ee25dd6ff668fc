use std::panic::AssertUnwindSafe;

use axum::{
    extract::Request,
    http::{header, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures::FutureExt;

use crate::background::panic_message;
use crate::error::{AppError, ServerErrorDetail};

/// Turns a panic below this stage into a 500 and closes the connection.
/// Also the single place where internal error detail is logged.
pub async fn recover_panic(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();

    match AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(mut res) => {
            if let Some(ServerErrorDetail(detail)) = res.extensions_mut().remove::<ServerErrorDetail>() {
                tracing::error!(%method, %uri, error = %detail, "request failed");
            }
            res
        }
        Err(payload) => {
            tracing::error!(%method, %uri, panic = %panic_message(payload.as_ref()), "handler panicked");
            let mut res = AppError::Internal(anyhow::anyhow!("handler panicked")).into_response();
            res.extensions_mut().remove::<ServerErrorDetail>();
            res.headers_mut().insert(header::CONNECTION, HeaderValue::from_static("close"));
            res
        }
    }
}
