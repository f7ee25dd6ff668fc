use std::fmt::Write as _;

use axum::{extract::State, http::header, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::metrics::MetricsSnapshot;
use crate::state::AppState;

pub async fn healthcheck(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "available",
        "system_info": {
            "environment": state.config.server.env,
            "version": env!("CARGO_PKG_VERSION"),
        }
    }))
}

// JSON snapshot of the request counters
pub async fn debug_vars(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.get_snapshot())
}

// Prometheus-compatible text exposition format
pub async fn debug_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let m = state.metrics.get_snapshot();
    let mut body = format!(
        "# HELP apollo_requests_received_total Requests received\n# TYPE apollo_requests_received_total counter\napollo_requests_received_total {}\n\
# HELP apollo_responses_sent_total Responses sent\n# TYPE apollo_responses_sent_total counter\napollo_responses_sent_total {}\n\
# HELP apollo_processing_time_microseconds_total Time spent producing responses\n# TYPE apollo_processing_time_microseconds_total counter\napollo_processing_time_microseconds_total {}\n\
# HELP apollo_uptime_seconds Uptime seconds\n# TYPE apollo_uptime_seconds gauge\napollo_uptime_seconds {}\n\
# HELP apollo_responses_by_status_total Responses sent, by status code\n# TYPE apollo_responses_by_status_total counter\n",
        m.total_requests_received, m.total_responses_sent, m.total_processing_time_us, m.uptime_seconds,
    );
    for (status, count) in &m.total_responses_sent_by_status {
        let _ = writeln!(body, "apollo_responses_by_status_total{{status=\"{}\"}} {}", status, count);
    }
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}
