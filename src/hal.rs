//! ==============================================================================
//! hal.rs - Hardware Abstraction Layer for the sensor node
//! ==============================================================================
//!
//! purpose:
//!     provides a unified interface for what the node touches: the network,
//!     the climate sensor and the actuator relay. abstracts away the
//!     difference between running on a real Raspberry Pi (using `rppal`)
//!     and a development machine (using mocks).
//!
//! design philosophy:
//!     - "Compile Anywhere": the node should compile on Windows/Mac/Linux.
//!     - "Blocking is fine": every call is run on tokio's blocking pool.
//!
//! relationships:
//!     - used by: node.rs (the sampling state machine)
//!     - uses: rppal (on feature="hardware")
//!     - uses: gpio.rs (dht11 and nmcli subprocesses)
//!
//! ==============================================================================

use anyhow::Result;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

pub trait NodeHardware: Send + Sync + 'static {
    /// try to associate once, Ok(true) when the link is up
    fn connect_network(&self, ssid: &str, password: &str) -> Result<bool>;
    /// (temperature °C, relative humidity %)
    fn read_climate(&self, pin: u8) -> Result<(f64, f64)>;
    fn set_actuator(&self, pin: u8, on: bool) -> Result<()>;
}

// ==============================================================================================
// MOCK IMPLEMENTATION (For Non-Hardware Build)
// ==============================================================================================
#[cfg(not(feature = "hardware"))]
pub struct Hal {
    cycle: AtomicU32,
    relay: AtomicBool,
}

#[cfg(not(feature = "hardware"))]
impl Hal {
    pub fn new() -> Self {
        tracing::info!("Using MOCK HAL (No hardware access)");
        Self { cycle: AtomicU32::new(0), relay: AtomicBool::new(false) }
    }

    pub fn actuator_state(&self) -> bool {
        self.relay.load(Ordering::SeqCst)
    }
}

#[cfg(not(feature = "hardware"))]
impl Default for Hal {
    fn default() -> Self {
        Self::new()
    }
}

/// slow, repeatable drift around greenhouse-ish values, rounded like a dht11
#[cfg(not(feature = "hardware"))]
fn simulated_climate(cycle: u32) -> (f64, f64) {
    let phase = f64::from(cycle);
    let temperature = 26.0 + 5.0 * (phase / 20.0).sin();
    let humidity = 70.0 + 15.0 * (phase / 35.0).cos();
    ((temperature * 10.0).round() / 10.0, (humidity * 10.0).round() / 10.0)
}

#[cfg(not(feature = "hardware"))]
impl NodeHardware for Hal {
    fn connect_network(&self, ssid: &str, _password: &str) -> Result<bool> {
        tracing::debug!("[MOCK NET] Associated with {}", ssid);
        Ok(true)
    }

    fn read_climate(&self, pin: u8) -> Result<(f64, f64)> {
        let cycle = self.cycle.fetch_add(1, Ordering::SeqCst);
        let (t, h) = simulated_climate(cycle);
        tracing::debug!("[MOCK DHT11] Pin {} -> {}°C {}%", pin, t, h);
        Ok((t, h))
    }

    fn set_actuator(&self, pin: u8, on: bool) -> Result<()> {
        tracing::debug!("[MOCK RELAY] Pin {} set to {}", pin, if on { "ON" } else { "OFF" });
        self.relay.store(on, Ordering::SeqCst);
        Ok(())
    }
}

// ==============================================================================================
// REAL IMPLEMENTATION (For Raspberry Pi)
// ==============================================================================================
#[cfg(feature = "hardware")]
pub struct Hal {
    relay: AtomicBool,
    reads: AtomicU32,
}

#[cfg(feature = "hardware")]
impl Hal {
    pub fn new() -> Self {
        tracing::info!("Using REAL HARDWARE HAL (rppal)");
        Self { relay: AtomicBool::new(false), reads: AtomicU32::new(0) }
    }

    pub fn actuator_state(&self) -> bool {
        self.relay.load(Ordering::SeqCst)
    }
}

#[cfg(feature = "hardware")]
impl Default for Hal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "hardware")]
impl NodeHardware for Hal {
    fn connect_network(&self, ssid: &str, password: &str) -> Result<bool> {
        if crate::gpio::network_is_up()? {
            return Ok(true);
        }
        crate::gpio::connect_wifi(ssid, password)
    }

    fn read_climate(&self, pin: u8) -> Result<(f64, f64)> {
        let n = self.reads.fetch_add(1, Ordering::SeqCst);
        tracing::trace!("DHT11 read #{} on pin {}", n, pin);
        crate::gpio::read_dht11(pin)
    }

    fn set_actuator(&self, pin: u8, on: bool) -> Result<()> {
        use rppal::gpio::Gpio;
        let gpio = Gpio::new()?;
        let mut p = gpio.get(pin)?.into_output();
        // keep the relay latched after the handle is dropped
        p.set_reset_on_drop(false);
        if on { p.set_high(); } else { p.set_low(); }
        self.relay.store(on, Ordering::SeqCst);
        Ok(())
    }
}
