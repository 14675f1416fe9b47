//! ==============================================================================
//! dashboard.rs - html status page
//! ==============================================================================
//!
//! purpose:
//!     builds the single self-refreshing page the greenhouse is watched from:
//!     current status, alarm banners and the two inline charts.
//!
//! relationships:
//!     - used by: server.rs (GET /, on the blocking pool)
//!     - uses: chart.rs (png renders), domain.rs (alarm evaluation)
//!
//! ==============================================================================

use anyhow::Result;
use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::chart::{self, Chart, ChartSpec};
use crate::config::DashboardConfig;
use crate::domain::{Alarms, Reading};

pub const NO_DATA: &str = "No data available to display charts.";

/// outcome of a dashboard render
pub enum Dashboard {
    /// the store is empty
    NoData,
    Page(Page),
}

/// a fully rendered page plus the facts it was built from
pub struct Page {
    pub html: String,
    pub last: Reading,
    pub alarms: Alarms,
    pub temperature: Chart,
    pub humidity: Chart,
}

/// recompute everything from the given window
pub fn render(readings: &[Reading], config: &DashboardConfig) -> Result<Dashboard> {
    let Some(last) = readings.last().cloned() else {
        return Ok(Dashboard::NoData);
    };

    let alarms = Alarms::evaluate(&last, config.temperature_alarm_celsius, config.humidity_alarm_percent);
    let temperature = chart::render(readings, &chart::TEMPERATURE)?;
    let humidity = chart::render(readings, &chart::HUMIDITY)?;

    let html = page_html(&last, alarms, &temperature, &humidity, readings, config.refresh_seconds);

    Ok(Dashboard::Page(Page { html, last, alarms, temperature, humidity }))
}

/// format a measurement like a float repr
///
/// shortest round-trip digits, integral values keep `.0`, and magnitudes
/// below 1e-4 or from 1e16 up switch to `1e+16` / `1.5e-07` notation.
pub fn format_measure(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let scientific = format!("{:e}", value);
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((scientific.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if value != 0.0 && !(-4..16).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exponent.abs())
    } else {
        let plain = format!("{}", value);
        if plain.contains('.') {
            plain
        } else {
            format!("{}.0", plain)
        }
    }
}

fn page_html(
    last: &Reading,
    alarms: Alarms,
    temperature: &Chart,
    humidity: &Chart,
    readings: &[Reading],
    refresh_seconds: u32,
) -> String {
    let mut banners = String::new();
    if alarms.humidity_high {
        banners.push_str(&alarm_banner("High Humidity"));
    }
    if alarms.temperature_high {
        banners.push_str(&alarm_banner("High Temperature"));
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Greenhouse Monitor</title>
    <style>
        body {{ background-color: #f0f8ff; font-family: Arial, sans-serif; text-align: center; padding: 20px; }}
        h1 {{ font-size: 48px; color: #ff6347; letter-spacing: 4px; text-shadow: 3px 3px 10px rgba(0, 0, 0, 0.3); }}
        h2 {{ font-size: 30px; color: #4682b4; }}
        img {{ margin: 20px 0; border-radius: 10px; max-width: 100%; }}
        .chart-container {{ background: #ffffff; border-radius: 15px; box-shadow: 0 4px 8px rgba(0, 0, 0, 0.1); padding: 20px; margin: 20px 0; }}
        .chart-caption {{ color: #555; font-size: 16px; }}
        .alarms {{ display: flex; justify-content: space-between; margin-bottom: 20px; align-items: center; }}
        .alarm {{ font-size: 24px; font-weight: bold; color: #d9534f; background-color: #f2dede; border: 1px solid #d9534f; border-radius: 5px; padding: 10px; width: 45%; }}
        .current-status {{ background: #ffffff; border-radius: 10px; padding: 20px; box-shadow: 0 4px 8px rgba(0, 0, 0, 0.1); margin: 20px 0; font-size: 24px; font-weight: bold; text-align: left; }}
    </style>
</head>
<body>
    <h1>Greenhouse Web Interface</h1>

    <div class="current-status">
        <p><strong>Current Status:</strong></p>
        <p>Temperature: {temp}°C</p>
        <p>Humidity: {hum}%</p>
        <p class="chart-caption">Last reading at {at}</p>
    </div>

    <div class="alarms">
{banners}    </div>

{temp_chart}
{hum_chart}
    <script>
        setInterval(function() {{
            window.location.reload();
        }}, {refresh_ms});
    </script>
</body>
</html>
"#,
        temp = format_measure(last.temperature),
        hum = format_measure(last.humidity),
        at = crate::timestamp::format(&last.timestamp),
        banners = banners,
        temp_chart = chart_block(&chart::TEMPERATURE, temperature, readings),
        hum_chart = chart_block(&chart::HUMIDITY, humidity, readings),
        refresh_ms = u64::from(refresh_seconds) * 1000,
    )
}

fn alarm_banner(label: &str) -> String {
    format!(
        "        <div class=\"alarm\"><span class=\"alarm-text\">ALERT! {}</span></div>\n",
        label
    )
}

fn chart_block(spec: &ChartSpec, chart: &Chart, readings: &[Reading]) -> String {
    let span = match (readings.first(), readings.last()) {
        (Some(first), Some(last)) => format!(
            "{} to {}",
            first.timestamp.format("%H:%M:%S"),
            last.timestamp.format("%H:%M:%S")
        ),
        _ => String::new(),
    };
    let range = chart
        .series
        .value_range()
        .map(|(lo, hi)| format!("min {}{unit}, max {}{unit}", format_measure(lo), format_measure(hi), unit = spec.unit))
        .unwrap_or_default();

    format!(
        r#"    <div class="chart-container">
        <h2>{title} Chart</h2>
        <img src="data:image/png;base64,{data}" alt="{title} Chart">
        <p class="chart-caption">Time {span} ({count} readings) | {title} ({unit}): {range}</p>
    </div>
"#,
        title = spec.title,
        data = STANDARD.encode(&chart.png),
        span = span,
        count = readings.len(),
        unit = spec.unit,
        range = range,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn window(values: &[(f64, f64)]) -> Vec<Reading> {
        let start = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap().and_hms_opt(8, 0, 0).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, &(t, h))| Reading::new(t, h, start + Duration::seconds(i as i64)))
            .collect()
    }

    fn page(readings: &[Reading]) -> Page {
        match render(readings, &DashboardConfig::default()).unwrap() {
            Dashboard::Page(page) => page,
            Dashboard::NoData => panic!("expected a page"),
        }
    }

    #[test]
    fn test_empty_store_is_no_data() {
        let result = render(&[], &DashboardConfig::default()).unwrap();
        assert!(matches!(result, Dashboard::NoData));
    }

    #[test]
    fn test_page_shows_status_alarms_and_charts() {
        let page = page(&window(&[(22.0, 60.0), (29.5, 81.2)]));

        assert!(page.alarms.temperature_high);
        assert!(page.alarms.humidity_high);
        assert!(page.html.contains("Temperature: 29.5°C"));
        assert!(page.html.contains("Humidity: 81.2%"));
        assert!(page.html.contains("ALERT! High Temperature"));
        assert!(page.html.contains("ALERT! High Humidity"));
        assert_eq!(page.html.matches("data:image/png;base64,").count(), 2);
        assert!(page.html.contains("}, 10000);"));
    }

    #[test]
    fn test_only_last_reading_drives_alarms() {
        let page = page(&window(&[(35.0, 95.0), (27.99, 79.99)]));
        assert_eq!(page.alarms, Alarms::default());
        assert!(!page.html.contains("ALERT!"));
    }

    #[test]
    fn test_charts_cover_whole_window() {
        let readings = window(&[(20.0, 50.0), (21.0, 51.0), (22.0, 52.0), (23.0, 53.0)]);
        let page = page(&readings);
        assert_eq!(page.temperature.series.points.len(), 4);
        assert_eq!(page.humidity.series.points[3], (3.0, 53.0));
    }

    #[test]
    fn test_rendering_twice_is_data_identical() {
        let readings = window(&[(20.0, 50.0), (24.0, 70.0), (26.5, 65.0)]);
        let first = page(&readings);
        let second = page(&readings);
        assert_eq!(first.temperature.series, second.temperature.series);
        assert_eq!(first.humidity.series, second.humidity.series);
        assert_eq!(first.last, second.last);
    }

    #[test]
    fn test_refresh_interval_is_configurable() {
        let config = DashboardConfig { refresh_seconds: 30, ..DashboardConfig::default() };
        let Dashboard::Page(page) = render(&window(&[(20.0, 50.0)]), &config).unwrap() else {
            panic!("expected a page");
        };
        assert!(page.html.contains("}, 30000);"));
    }

    #[test]
    fn test_format_measure() {
        assert_eq!(format_measure(30.0), "30.0");
        assert_eq!(format_measure(29.5), "29.5");
        assert_eq!(format_measure(81.2), "81.2");
        assert_eq!(format_measure(-4.0), "-4.0");
        assert_eq!(format_measure(0.0001), "0.0001");
        assert_eq!(format_measure(-0.0), "-0.0");
        assert_eq!(format_measure(1e15), "1000000000000000.0");
        assert_eq!(format_measure(1e16), "1e+16");
        assert_eq!(format_measure(1e-7), "1e-07");
        assert_eq!(format_measure(1.5e-5), "1.5e-05");
        assert_eq!(format_measure(-1.7e308), "-1.7e+308");
        assert_eq!(format_measure(f64::NAN), "nan");
        assert_eq!(format_measure(f64::NEG_INFINITY), "-inf");
    }
}
