//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `collector.toml` and `node.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - CollectorConfig: listen address, data file, dashboard thresholds.
//!     - NodeConfig: network credentials, collector url, pins, loop timing.
//!     - LoggingConfig: shared by both binaries.
//!
//! ==============================================================================

use serde::{de::DeserializeOwned, Deserialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ==============================================================================
// collector
// ==============================================================================

/// Root configuration of the collector service
#[derive(Debug, Deserialize, Clone, Default)]
pub struct CollectorConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0".to_string(), port: 5000 }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub data_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { data_file: PathBuf::from("datos.csv") }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub refresh_seconds: u32,
    pub temperature_alarm_celsius: f64,
    pub humidity_alarm_percent: f64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            refresh_seconds: 10,
            temperature_alarm_celsius: 28.0,
            humidity_alarm_percent: 80.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub show_sensor_data: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), show_sensor_data: true }
    }
}

// ==============================================================================
// sensor node
// ==============================================================================

/// Root configuration of the sensor node
#[derive(Debug, Deserialize, Clone, Default)]
pub struct NodeConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub collector: CollectorEndpoint,
    #[serde(default)]
    pub sensor: SensorConfig,
    #[serde(default)]
    pub actuator: ActuatorConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NetworkConfig {
    pub ssid: String,
    pub password: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { ssid: "greenhouse".to_string(), password: String::new() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CollectorEndpoint {
    pub url: String, // full ingest url, e.g. http://host:5000/api/datos
}

impl Default for CollectorEndpoint {
    fn default() -> Self {
        Self { url: "http://192.168.1.181:5000/api/datos".to_string() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SensorConfig {
    pub gpio_pin: u8,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self { gpio_pin: 15 }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ActuatorConfig {
    pub gpio_pin: u8,
    /// relay is driven on while the temperature is below this
    pub on_below_celsius: f64,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self { gpio_pin: 13, on_below_celsius: 30.0 }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TimingConfig {
    pub sample_interval_ms: u64,
    pub fault_backoff_ms: u64,
    pub connect_retry_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self { sample_interval_ms: 1000, fault_backoff_ms: 2000, connect_retry_ms: 1000 }
    }
}

impl TimingConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn fault_backoff(&self) -> Duration {
        Duration::from_millis(self.fault_backoff_ms)
    }

    pub fn connect_retry(&self) -> Duration {
        Duration::from_millis(self.connect_retry_ms)
    }
}

// ==============================================================================
// loading
// ==============================================================================

/// Load configuration from file
pub fn load<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path.as_ref())
        .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

    toml::from_str(&content).map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))
}

/// Load with default fallback
///
/// an explicit path wins, otherwise `config/<name>` and `../config/<name>`
/// are tried in order.
pub fn load_or_default<T: DeserializeOwned + Default>(name: &str, explicit: Option<PathBuf>) -> T {
    let paths = match explicit {
        Some(path) => vec![path],
        None => vec![
            PathBuf::from("config").join(name),
            PathBuf::from("..").join("config").join(name),
        ],
    };

    for path in &paths {
        if path.exists() {
            match load(path) {
                Ok(config) => {
                    println!("[CONFIG] Loaded from {}", path.display());
                    return config;
                }
                Err(e) => {
                    println!("[CONFIG] Warning: Failed to load {}: {}", path.display(), e);
                }
            }
        }
    }

    println!("[CONFIG] Warning: No usable {} found - using defaults", name);
    T::default()
}

impl CollectorConfig {
    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("┌─────────────────────────────────────────┐");
        println!("│         COLLECTOR CONFIGURATION         │");
        println!("├─────────────────────────────────────────┤");
        println!("│ Listen: {}", self.server.address());
        println!("│ Data file: {}", self.storage.data_file.display());
        println!("│ Alarms: >= {}°C / >= {}%", self.dashboard.temperature_alarm_celsius, self.dashboard.humidity_alarm_percent);
        println!("│ Refresh: {}s", self.dashboard.refresh_seconds);
        println!("│ Log Level: {}", self.logging.level);
        println!("└─────────────────────────────────────────┘");
    }
}

impl NodeConfig {
    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("┌─────────────────────────────────────────┐");
        println!("│           NODE CONFIGURATION            │");
        println!("├─────────────────────────────────────────┤");
        println!("│ SSID: {}", self.network.ssid);
        println!("│ Collector: {}", self.collector.url);
        println!("│ Sensor GPIO: {} | Relay GPIO: {}", self.sensor.gpio_pin, self.actuator.gpio_pin);
        println!("│ Relay on below: {}°C", self.actuator.on_below_celsius);
        println!("│ Sample: {}ms | Backoff: {}ms", self.timing.sample_interval_ms, self.timing.fault_backoff_ms);
        println!("│ Log Level: {}", self.logging.level);
        println!("└─────────────────────────────────────────┘");
    }
}

/// install the global tracing subscriber, RUST_LOG overrides the file
pub fn init_logging(logging: &LoggingConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_defaults_match_deployment() {
        let config = CollectorConfig::default();
        assert_eq!(config.server.address(), "0.0.0.0:5000");
        assert_eq!(config.storage.data_file, PathBuf::from("datos.csv"));
        assert_eq!(config.dashboard.temperature_alarm_celsius, 28.0);
        assert_eq!(config.dashboard.humidity_alarm_percent, 80.0);
        assert_eq!(config.dashboard.refresh_seconds, 10);
    }

    #[test]
    fn test_partial_collector_file_keeps_other_defaults() {
        let config: CollectorConfig = toml::from_str(
            r#"
[server]
bind = "127.0.0.1"
port = 8080
"#,
        )
        .unwrap();
        assert_eq!(config.server.address(), "127.0.0.1:8080");
        assert_eq!(config.dashboard.humidity_alarm_percent, 80.0);
    }

    #[test]
    fn test_node_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        std::fs::write(
            &path,
            r#"
[collector]
url = "http://10.0.0.2:5000/api/datos"

[timing]
sample_interval_ms = 500
fault_backoff_ms = 4000
connect_retry_ms = 250
"#,
        )
        .unwrap();

        let config: NodeConfig = load_or_default("node.toml", Some(path));
        assert_eq!(config.collector.url, "http://10.0.0.2:5000/api/datos");
        assert_eq!(config.timing.fault_backoff(), Duration::from_secs(4));
        assert_eq!(config.actuator.on_below_celsius, 30.0);
    }

    #[test]
    fn test_unparsable_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collector.toml");
        std::fs::write(&path, "this is not toml = = =").unwrap();

        let config: CollectorConfig = load_or_default("collector.toml", Some(path));
        assert_eq!(config.server.port, 5000);
    }
}
