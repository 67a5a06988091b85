//! HTTP surface: telemetry endpoint, landing page, and probes.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use prometheus::{Encoder, Registry, TextEncoder};
use tracing::error;

use rethink_exporter_core::RethinkdbCollector;

/// Shared state for the exporter's handlers.
#[derive(Clone)]
pub struct AppState {
    pub collector: RethinkdbCollector,
    pub registry: Registry,
    /// Serializes scrape cycles so collection stays one-at-a-time even
    /// under concurrent scrapers.
    pub scrape_lock: Arc<tokio::sync::Mutex<()>>,
    pub telemetry_path: String,
}

impl AppState {
    pub fn new(collector: RethinkdbCollector, registry: Registry, telemetry_path: String) -> Self {
        Self {
            collector,
            registry,
            scrape_lock: Arc::new(tokio::sync::Mutex::new(())),
            telemetry_path,
        }
    }
}

/// Build the exporter router.
pub fn build_router(state: AppState) -> Router {
    let telemetry_path = state.telemetry_path.clone();
    Router::new()
        .route(&telemetry_path, get(serve_metrics))
        .route("/", get(index))
        .route("/-/healthy", get(ok_probe))
        .route("/-/ready", get(ok_probe))
        .with_state(state)
}

/// Run one scrape cycle and expose the registry.
async fn serve_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let _cycle = state.scrape_lock.lock().await;
    state.collector.collect_cycle().await;

    let families = state.registry.gather();
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&families, &mut buffer) {
        error!(error = %e, "failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics").into_response();
    }

    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        buffer,
    )
        .into_response()
}

async fn index(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        "<html>\n<head><title>RethinkDB Exporter</title></head>\n<body>\n\
         <h1>RethinkDB Exporter</h1>\n\
         <p><a href='{}'>Metrics</a></p>\n\
         <pre>rethink-exporter {}</pre>\n\
         </body>\n</html>",
        state.telemetry_path,
        env!("CARGO_PKG_VERSION"),
    ))
}

async fn ok_probe() -> &'static str {
    "OK"
}
