//! Request logging.

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{info, warn};

const HEALTH_PATH: &str = "/api/health";

/// Log method, path, status and latency of every request except health checks.
pub async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let resp = next.run(req).await;
    if path == HEALTH_PATH {
        return resp;
    }

    let status = resp.status().as_u16();
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    if resp.status().is_server_error() {
        warn!(%method, path = %path, status, latency_ms, "Request failed");
    } else {
        info!(%method, path = %path, status, latency_ms, "Request served");
    }
    resp
}
