use std::time::Instant;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::metrics::Metrics;

pub async fn track_metrics(State(metrics): State<Metrics>, req: Request, next: Next) -> Response {
    let start = Instant::now();
    metrics.request_received();
    let res = next.run(req).await;
    metrics.response_sent(res.status().as_u16(), start.elapsed());
    res
}
