//! HTTP API and the embedded dashboard.
//!
//! Serves the JSON API under `/api` and a self-contained single-page
//! dashboard at `/`. CORS is limited to the configured origins.

pub mod error;
pub mod middleware;
pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    response::Html,
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer};
use tracing::{info, warn};

use crate::config::ServerConfig;

pub use routes::{ApiState, AppState};

/// The embedded dashboard HTML (compiled into the binary).
const DASHBOARD_HTML: &str = include_str!("templates/index.html");

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = server
        .cors_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server);
    let timeout = TimeoutLayer::new(Duration::from_secs(state.config.server.request_timeout_secs.max(1)));

    Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/events", get(routes::list_events))
        .route("/api/teams", get(routes::list_teams))
        .route("/api/maps", get(routes::list_maps))
        .route("/api/markets", get(routes::list_markets))
        .route("/api/filters", get(routes::filters))
        .route("/api/matches", get(routes::list_matches))
        .route("/api/matches/:id", get(routes::match_detail))
        .route("/api/matches/:id/analysis", get(routes::match_analysis))
        .route("/api/matches/:id/veto", post(routes::save_veto))
        .route("/api/matches/:id/odds", get(routes::get_odds).post(routes::save_odds))
        .route("/api/matches/:id/odds/auto", post(routes::auto_odds))
        .route("/api/matches/:id/live/map-result", post(routes::save_live_map_result))
        .route("/api/matches/:id/live/series-prob", get(routes::live_series_prob))
        .route("/api/matches/:id/outcome", post(routes::register_outcome))
        .route("/api/stats/team/:id", get(routes::team_stats))
        .route("/api/stats/query", get(routes::stats_query))
        .route("/api/stats/h2h", get(routes::stats_h2h))
        .route("/api/analysis/cross-match-parlays", get(routes::cross_match_parlays))
        .route("/api/import", post(routes::import_dataset))
        .route("/api/config", get(routes::get_config).put(routes::put_config))
        .route("/api/hedge", get(routes::hedge))
        .route("/api/dutch", post(routes::dutch))
        // Dashboard HTML
        .route("/", get(serve_dashboard))
        .layer(axum::middleware::from_fn(middleware::log_requests))
        .layer(timeout)
        .layer(cors)
        .with_state(state)
}

/// Serve the embedded HTML dashboard.
async fn serve_dashboard() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

/// Bind and serve until `shutdown` resolves.
pub async fn serve(state: AppState, shutdown: impl std::future::Future<Output = ()> + Send + 'static) -> Result<()> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(addr = %addr, "VCT Edge Terminal listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")?;
    info!("Server stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
