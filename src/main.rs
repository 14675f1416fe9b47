//! ==============================================================================
//! main.rs - collector entry point
//! ==============================================================================
//!
//! responsibilities:
//!     - load collector.toml (or defaults)
//!     - load the persisted reading window once
//!     - serve the ingest endpoint and the dashboard until ctrl-c
//!
//! usage:
//!     collector [path/to/collector.toml]
//!
//! ==============================================================================

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use greenhouse_telemetry::config::{self, CollectorConfig};
use greenhouse_telemetry::server::{self, AppState};
use greenhouse_telemetry::store::{SharedStore, Store};

#[tokio::main]
async fn main() -> Result<()> {
    println!("===========================================================");
    println!("  Greenhouse Collector");
    println!("  POST /api/datos  ->  datos.csv  ->  GET /");
    println!("===========================================================");

    // step 1: load configuration
    let config: CollectorConfig = config::load_or_default("collector.toml", std::env::args_os().nth(1).map(PathBuf::from));
    config::init_logging(&config.logging);
    config.print_summary();

    // step 2: load the persisted window
    let store = Store::load(&config.storage.data_file)
        .with_context(|| format!("failed to load {}", config.storage.data_file.display()))?;
    tracing::info!("[STARTUP] Loaded {} readings from {}", store.len(), config.storage.data_file.display());

    // step 3: serve
    let state = AppState {
        store: SharedStore::new(store),
        dashboard: Arc::new(config.dashboard.clone()),
        show_sensor_data: config.logging.show_sensor_data,
    };
    server::run_server(state, &config.server.address()).await
}
