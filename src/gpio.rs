//! ==============================================================================
//! gpio.rs - raspberry pi helpers for the sensor node
//! ==============================================================================
//!
//! purpose:
//!     the pieces of real hardware access that go through a subprocess:
//!     the dht11 read (adafruit_dht) and wi-fi association (nmcli).
//!
//! why subprocess to python?:
//!     dht sensors require precise bit-banging timing (~microseconds).
//!     pure rust in userspace is unreliable due to lack of real-time guarantees.
//!     adafruit_dht handles this correctly with retries and timing compensation.
//!
//! relationships:
//!     - used by: hal.rs (real Hal, feature = "hardware")
//!
//! ==============================================================================

use anyhow::{anyhow, Result};
use std::process::Command;

/// read dht11 temperature and humidity sensor
///
/// blocking, run it on the blocking pool.
pub fn read_dht11(pin: u8) -> Result<(f64, f64)> {
    let script = format!(
        r#"
import sys
try:
    import adafruit_dht
    import board
    import json

    dht = adafruit_dht.DHT11(board.D{})

    try:
        t, h = dht.temperature, dht.humidity
        if t is not None and h is not None:
            print(json.dumps({{"t": t, "h": h}}))
        else:
            print("null")
    finally:
        dht.exit()
except Exception as e:
    print(str(e), file=sys.stderr)
    sys.exit(1)
"#,
        pin
    );

    let output = Command::new("python3")
        .arg("-c")
        .arg(&script)
        .output()
        .map_err(|e| anyhow!("Failed to run python3: {}", e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("Python error: {}", stderr.trim()));
    }

    parse_dht_output(&String::from_utf8_lossy(&output.stdout))
}

/// decode the `{"t": .., "h": ..}` line printed by the dht script
pub fn parse_dht_output(stdout: &str) -> Result<(f64, f64)> {
    let stdout = stdout.trim();
    if stdout == "null" || stdout.is_empty() {
        return Err(anyhow!("Sensor returned null"));
    }

    let parsed: serde_json::Value = serde_json::from_str(stdout)
        .map_err(|e| anyhow!("JSON parse error: {} (got: {})", e, stdout))?;

    let temp = parsed["t"].as_f64().ok_or_else(|| anyhow!("Missing temp"))?;
    let humidity = parsed["h"].as_f64().ok_or_else(|| anyhow!("Missing humidity"))?;

    Ok((temp, humidity))
}

/// associate to a wi-fi network through networkmanager
///
/// returns whether the device reports itself connected afterwards.
pub fn connect_wifi(ssid: &str, password: &str) -> Result<bool> {
    let mut cmd = Command::new("nmcli");
    cmd.args(["device", "wifi", "connect", ssid]);
    if !password.is_empty() {
        cmd.args(["password", password]);
    }

    let output = cmd.output().map_err(|e| anyhow!("Failed to run nmcli: {}", e))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("nmcli connect failed: {}", stderr.trim()));
    }

    network_is_up()
}

/// ask networkmanager for the global connectivity state
pub fn network_is_up() -> Result<bool> {
    let output = Command::new("nmcli")
        .args(["-t", "-f", "STATE", "general"])
        .output()
        .map_err(|e| anyhow!("Failed to run nmcli: {}", e))?;

    Ok(parse_nmcli_state(&String::from_utf8_lossy(&output.stdout)))
}

/// `connected`, `connected (site only)` and `connected (local only)` all
/// count, `connecting` and `disconnected` do not
pub fn parse_nmcli_state(stdout: &str) -> bool {
    let state = stdout.trim();
    state == "connected" || state.starts_with("connected ")
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dht_output() {
        assert_eq!(parse_dht_output("{\"t\": 24, \"h\": 61}\n").unwrap(), (24.0, 61.0));
        assert!(parse_dht_output("null\n").is_err());
        assert!(parse_dht_output("").is_err());
        assert!(parse_dht_output("{\"t\": 24}").is_err());
        assert!(parse_dht_output("garbage").is_err());
    }

    #[test]
    fn test_parse_nmcli_state() {
        assert!(parse_nmcli_state("connected\n"));
        assert!(parse_nmcli_state("connected (site only)"));
        assert!(!parse_nmcli_state("connecting"));
        assert!(!parse_nmcli_state("disconnected\n"));
        assert!(!parse_nmcli_state(""));
    }

    // note: hardware tests require actual pi and are not run in ci
    // #[test]
    // fn test_dht11() {
    //     let result = read_dht11(15);
    //     println!("dht11 result: {:?}", result);
    // }
}
