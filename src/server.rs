use crate::config::Config;
use crate::error::IngestError;
use crate::pipeline::indicator::IndicatorLayout;
use crate::pipeline::run_ingestion;
use crate::storage::Store;
use crate::types::{parse_series, Indicator};
use crate::workbook::WorkbookSource;
use axum::{
    extract::Query,
    http::{Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Extension, Router,
};
use hyper::Server;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

pub struct AppState {
    pub db_path: PathBuf,
    pub source: Arc<dyn WorkbookSource>,
    pub layouts: Vec<(Indicator, IndicatorLayout)>,
    pub metrics: Option<PrometheusHandle>,
}

/// Body of a read request.
#[derive(Debug, Deserialize)]
pub struct SeriesRequest {
    #[serde(rename = "type")]
    pub indicator: String,
    #[serde(rename = "subtype")]
    pub variant: String,
    #[serde(rename = "startyear")]
    pub start_year: i32,
}

#[derive(Debug, Deserialize)]
pub struct RunsQuery {
    pub limit: Option<usize>,
}

fn error_response(err: IngestError) -> Response {
    let status = if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (
        status,
        Json(serde_json::json!({ "status": "error", "error": err.to_string() })),
    )
        .into_response()
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "inflation-ingest",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Trigger one full ingestion run.
async fn ingest(Extension(state): Extension<Arc<AppState>>) -> Response {
    match run_ingestion(state.source.as_ref(), state.db_path.clone(), &state.layouts).await {
        Ok(report) => Json(serde_json::json!({ "status": "ok", "report": report })).into_response(),
        Err(e) => error_response(e),
    }
}

async fn series(
    Extension(state): Extension<Arc<AppState>>,
    Json(req): Json<SeriesRequest>,
) -> Response {
    let (indicator, variant) = match parse_series(&req.indicator, &req.variant) {
        Ok(pair) => pair,
        Err(e) => return error_response(e),
    };
    let db_path = state.db_path.clone();
    let result = tokio::task::spawn_blocking(move || {
        Store::open(&db_path)?.select_series(indicator, variant, req.start_year)
    })
    .await
    .map_err(IngestError::from)
    .and_then(|r| r);
    match result {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => error_response(e),
    }
}

async fn runs(
    Extension(state): Extension<Arc<AppState>>,
    Query(q): Query<RunsQuery>,
) -> Response {
    let db_path = state.db_path.clone();
    let limit = q.limit.unwrap_or(20);
    let result = tokio::task::spawn_blocking(move || Store::open(&db_path)?.recent_runs(limit))
        .await
        .map_err(IngestError::from)
        .and_then(|r| r);
    match result {
        Ok(runs) => Json(runs).into_response(),
        Err(e) => error_response(e),
    }
}

async fn render_metrics(Extension(state): Extension<Arc<AppState>>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Create the HTTP router with the trigger and read surfaces.
pub fn create_server(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/ingest", post(ingest))
        .route("/data", post(series))
        .route("/runs", get(runs))
        .route("/metrics", get(render_metrics))
        .layer(Extension(state))
        .layer(ServiceBuilder::new().layer(cors))
}

/// Start the HTTP server on the configured port.
pub async fn start_server(
    config: &Config,
    state: Arc<AppState>,
) -> anyhow::Result<()> {
    let app = create_server(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));

    info!(%addr, "HTTP server listening");
    Server::bind(&addr).serve(app.into_make_service()).await?;

    Ok(())
}
