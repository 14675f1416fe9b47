//! ==============================================================================
//! sensor_node.rs - sensor node entry point
//! ==============================================================================
//!
//! responsibilities:
//!     - load node.toml (or defaults)
//!     - pick the hal (mock, or rppal with --features hardware)
//!     - hand both to the never-ending sampling loop in node.rs
//!
//! usage:
//!     sensor-node [path/to/node.toml]
//!
//! ==============================================================================

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use greenhouse_telemetry::config::{self, NodeConfig};
use greenhouse_telemetry::hal::Hal;
use greenhouse_telemetry::node::{CollectorClient, SensorNode};

#[tokio::main]
async fn main() -> Result<()> {
    println!("===========================================================");
    println!("  Greenhouse Sensor Node");
    println!("  DHT11 -> relay -> POST /api/datos");
    println!("===========================================================");

    let config: NodeConfig = config::load_or_default("node.toml", std::env::args_os().nth(1).map(PathBuf::from));
    config::init_logging(&config.logging);
    config.print_summary();

    let hal = Arc::new(Hal::new());
    let client = CollectorClient::new(config.collector.url.clone())?;

    tracing::info!("[RUNTIME] Starting sensor loop ({}ms interval)", config.timing.sample_interval_ms);
    SensorNode::new(hal, client, config).run().await;
    Ok(())
}
