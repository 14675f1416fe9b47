//! ==============================================================================
//! node.rs - sensor node sampling loop
//! ==============================================================================
//!
//! purpose:
//!     the node's whole life as an explicit state machine. it never terminates:
//!     every state has a successor, failures only change which one and how
//!     long to wait before it.
//!
//! states:
//!
//!     Connecting ──ok──▶ Sampling ──ok──▶ Reporting ──(sample interval)──▶ Sampling
//!         ▲   │             │
//!         └───┘ retry       └─fault─▶ FaultBackoff ──(backoff)──▶ Sampling
//!
//!     a failed report is logged and the reading dropped, nothing is buffered.
//!
//! relationships:
//!     - uses: hal.rs (network, sensor, relay)
//!     - pushes to: server.rs (POST /api/datos)
//!
//! ==============================================================================

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tracing::{debug, info, warn};

use crate::config::NodeConfig;
use crate::domain::ClimateSample;
use crate::hal::NodeHardware;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NodeState {
    Connecting,
    Sampling,
    Reporting(ClimateSample),
    FaultBackoff,
}

/// the state to enter next and how long to wait before entering it
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transition {
    pub next: NodeState,
    pub delay: Duration,
}

impl Transition {
    fn now(next: NodeState) -> Self {
        Self { next, delay: Duration::ZERO }
    }

    fn after(next: NodeState, delay: Duration) -> Self {
        Self { next, delay }
    }
}

/// where readings go
#[allow(async_fn_in_trait)]
pub trait ReadingSink {
    async fn push(&self, sample: &ClimateSample) -> Result<()>;
}

/// reqwest client for the collector's ingest endpoint
pub struct CollectorClient {
    client: reqwest::Client,
    url: String,
}

impl CollectorClient {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build http client")?;
        Ok(Self { client, url: url.into() })
    }
}

impl ReadingSink for CollectorClient {
    async fn push(&self, sample: &ClimateSample) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(sample)
            .send()
            .await
            .with_context(|| format!("failed to reach collector at {}", self.url))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status != reqwest::StatusCode::OK {
            bail!("collector returned {}: {}", status, body.trim());
        }

        debug!("Collector replied: {}", body.trim());
        Ok(())
    }
}

pub struct SensorNode<H, S> {
    hal: Arc<H>,
    sink: S,
    config: NodeConfig,
}

impl<H: NodeHardware, S: ReadingSink> SensorNode<H, S> {
    pub fn new(hal: Arc<H>, sink: S, config: NodeConfig) -> Self {
        Self { hal, sink, config }
    }

    /// run forever
    pub async fn run(&self) {
        let mut state = NodeState::Connecting;
        loop {
            let transition = self.step(state).await;
            if !transition.delay.is_zero() {
                tokio::time::sleep(transition.delay).await;
            }
            state = transition.next;
        }
    }

    /// perform the action of `state` and decide what follows
    pub async fn step(&self, state: NodeState) -> Transition {
        let timing = &self.config.timing;

        match state {
            NodeState::Connecting => {
                let ssid = self.config.network.ssid.clone();
                let password = self.config.network.password.clone();
                match self.blocking(move |hal| hal.connect_network(&ssid, &password)).await {
                    Ok(true) => {
                        info!("Connected to network {}", self.config.network.ssid);
                        Transition::now(NodeState::Sampling)
                    }
                    Ok(false) => {
                        debug!("Network not up yet, retrying");
                        Transition::after(NodeState::Connecting, timing.connect_retry())
                    }
                    Err(e) => {
                        warn!("Network association failed: {:#}", e);
                        Transition::after(NodeState::Connecting, timing.connect_retry())
                    }
                }
            }

            NodeState::Sampling => match self.sample().await {
                Ok(sample) => Transition::now(NodeState::Reporting(sample)),
                Err(e) => {
                    warn!("Sensor cycle failed: {:#}", e);
                    Transition::now(NodeState::FaultBackoff)
                }
            },

            NodeState::Reporting(sample) => {
                match self.sink.push(&sample).await {
                    Ok(()) => info!("Reading sent"),
                    Err(e) => warn!("Reading dropped: {:#}", e),
                }
                Transition::after(NodeState::Sampling, timing.sample_interval())
            }

            NodeState::FaultBackoff => Transition::after(NodeState::Sampling, timing.fault_backoff()),
        }
    }

    /// read the sensor and drive the relay from the fresh temperature
    async fn sample(&self) -> Result<ClimateSample> {
        let sensor_pin = self.config.sensor.gpio_pin;
        let (temperature, humidity) = self
            .blocking(move |hal| hal.read_climate(sensor_pin))
            .await
            .context("sensor read failed")?;

        if self.config.logging.show_sensor_data {
            info!("Temperature: {} C | Humidity: {} %", temperature, humidity);
        }

        let relay_pin = self.config.actuator.gpio_pin;
        let on = actuator_on(temperature, self.config.actuator.on_below_celsius);
        self.blocking(move |hal| hal.set_actuator(relay_pin, on))
            .await
            .context("actuator write failed")?;

        Ok(ClimateSample { temperature, humidity })
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&H) -> Result<T> + Send + 'static,
    {
        let hal = Arc::clone(&self.hal);
        tokio::task::spawn_blocking(move || f(&hal))
            .await
            .map_err(|e| anyhow!("task join error: {}", e))?
    }
}

/// relay on while the greenhouse is below the threshold, off at or above it
pub fn actuator_on(temperature: f64, on_below: f64) -> bool {
    temperature < on_below
}
