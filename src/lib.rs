//! ==============================================================================
//! greenhouse telemetry
//! ==============================================================================
//!
//! two processes share this crate:
//!
//!     ┌────────────────┐  POST /api/datos  ┌─────────────────────────────┐
//!     │ sensor node    │ ────────────────▶ │ collector                   │
//!     │ (node.rs)      │  {"temperature",  │  store.rs → datos.csv       │
//!     │ dht11 + relay  │   "humidity"}     │  dashboard.rs → GET /       │
//!     └────────────────┘                   └─────────────────────────────┘
//!
//! the node samples, drives its relay and pushes; the collector appends,
//! trims, persists and redraws everything on every page view.
//!
//! ==============================================================================

pub mod chart;
pub mod config;
pub mod dashboard;
pub mod domain;
pub mod error;
pub mod gpio;
pub mod hal;
pub mod node;
pub mod server;
pub mod store;
pub mod timestamp;
