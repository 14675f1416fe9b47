//! ==============================================================================
//! server.rs - collector http surface
//! ==============================================================================
//!
//! routes:
//!     POST /api/datos  ingest one reading (json)
//!     GET  /           html dashboard, re-rendered on every request
//!     GET  /api        current reading window as json
//!
//! ==============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::config::DashboardConfig;
use crate::dashboard::{self, Dashboard};
use crate::domain::{ClimateSample, Reading};
use crate::error::IngestError;
use crate::store::SharedStore;

// ==============================================================================
// shared state
// ==============================================================================
// the store handle is the only mutable thing here; cloning AppState clones
// the Arc inside SharedStore, never the readings.

#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub dashboard: Arc<DashboardConfig>,
    pub show_sensor_data: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(dashboard_handler))
        .route("/api", get(api_handler))
        .route("/api/datos", post(ingest_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run_server(state: AppState, address: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .with_context(|| format!("failed to bind {}", address))?;
    info!("Dashboard live at http://{}", address);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

// ==============================================================================
// ingest
// ==============================================================================

async fn ingest_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, IngestError> {
    if !is_json_request(&headers) {
        warn!("Rejected ingest without a JSON content type");
        return Err(IngestError::NotJson("expected Content-Type: application/json".to_string()));
    }

    let value: serde_json::Value = serde_json::from_slice(&body).map_err(|e| {
        warn!("Rejected malformed JSON body: {}", e);
        IngestError::NotJson(e.to_string())
    })?;

    let sample = ClimateSample::from_json(&value).map_err(|e| {
        warn!("Rejected reading: {}", e);
        e
    })?;

    let reading = Reading::now(sample);
    let stored = state.store.ingest(reading.clone()).await.map_err(|e| {
        error!("Failed to persist readings: {}", e);
        IngestError::from(e)
    })?;

    if state.show_sensor_data {
        info!(
            "Reading received - temperature: {}, humidity: {}, timestamp: {} ({} in window)",
            reading.temperature,
            reading.humidity,
            crate::timestamp::format(&reading.timestamp),
            stored
        );
    }

    Ok(Json(serde_json::json!({ "message": "Reading received and stored" })))
}

/// `application/json` or any `application/*+json`, parameters ignored
fn is_json_request(headers: &HeaderMap) -> bool {
    let Some(value) = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let essence = value.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    essence == "application/json" || (essence.starts_with("application/") && essence.ends_with("+json"))
}

// ==============================================================================
// dashboard
// ==============================================================================

async fn dashboard_handler(State(state): State<AppState>) -> Response {
    let readings = state.store.snapshot().await;
    let config = Arc::clone(&state.dashboard);

    // chart rasterisation is cpu bound, keep it off the executor
    let rendered = tokio::task::spawn_blocking(move || dashboard::render(&readings, &config))
        .await
        .map_err(|e| anyhow::anyhow!("render task failed: {}", e))
        .and_then(|r| r);

    match rendered {
        Ok(Dashboard::NoData) => (StatusCode::OK, dashboard::NO_DATA).into_response(),
        Ok(Dashboard::Page(page)) => Html(page.html).into_response(),
        Err(e) => {
            error!("Dashboard render failed: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(format!(
                    r#"<!doctype html>
<html>
<head><title>error</title></head>
<body style="font-family: system-ui; padding: 2rem;">
    <h1 style="color: #d9534f;">dashboard error</h1>
    <pre>{}</pre>
</body>
</html>"#,
                    html_escape(&format!("{:#}", e))
                )),
            )
                .into_response()
        }
    }
}

/// escape text for the error page
fn html_escape(text: &str) -> String {
    text.chars().fold(String::with_capacity(text.len()), |mut out, c| {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
        out
    })
}

// ==============================================================================
// json api
// ==============================================================================

#[derive(Serialize)]
struct WindowResponse {
    count: usize,
    readings: Vec<Reading>,
}

/// the current window, nothing older
async fn api_handler(State(state): State<AppState>) -> Json<WindowResponse> {
    let readings = state.store.snapshot().await;
    Json(WindowResponse { count: readings.len(), readings })
}
