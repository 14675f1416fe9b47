//! ==============================================================================
//! chart.rs - time-series rasterisation for the dashboard
//! ==============================================================================
//!
//! purpose:
//!     turns the reading window into png line charts held entirely in memory.
//!     nothing is cached and nothing touches the disk: every dashboard request
//!     pays for two fresh renders.
//!
//! notes:
//!     text is drawn with a font compiled into the binary (ab_glyph), so the
//!     collector needs no system font libraries. the x axis is labelled with
//!     wall-clock times derived from the first reading of the window.
//!
//! ==============================================================================

use std::io::Cursor;
use std::sync::OnceLock;

use anyhow::{ensure, Context, Result};
use chrono::NaiveDateTime;
use image::{codecs::png::PngEncoder, ExtendedColorType, ImageEncoder};
use plotters::prelude::*;
use plotters::style::{register_font, FontStyle};

use crate::domain::Reading;

/// 12x6 inches at 100 dpi
pub const WIDTH: u32 = 1200;
pub const HEIGHT: u32 = 600;

/// values beyond this magnitude are pinned to the edge of the plot
pub const AXIS_LIMIT: f64 = 1e300;

const FONT_FAMILY: &str = "sans-serif";
static FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

/// which measurement a chart plots and how it looks
#[derive(Clone, Copy)]
pub struct ChartSpec {
    pub title: &'static str,
    pub unit: &'static str,
    pub color: RGBColor,
    pub value: fn(&Reading) -> f64,
}

pub const TEMPERATURE: ChartSpec = ChartSpec {
    title: "Temperature",
    unit: "°C",
    color: RGBColor(0xFF, 0x63, 0x47),
    value: temperature_of,
};

pub const HUMIDITY: ChartSpec = ChartSpec {
    title: "Humidity",
    unit: "%",
    color: RGBColor(0x1E, 0x90, 0xFF),
    value: humidity_of,
};

fn temperature_of(r: &Reading) -> f64 {
    r.temperature
}

fn humidity_of(r: &Reading) -> f64 {
    r.humidity
}

/// the data a chart is drawn from
///
/// x is seconds since `origin`, the timestamp of the first reading.
#[derive(Clone, Debug, PartialEq)]
pub struct Series {
    pub origin: Option<NaiveDateTime>,
    pub points: Vec<(f64, f64)>,
}

impl Series {
    pub fn from_readings(readings: &[Reading], spec: &ChartSpec) -> Self {
        let origin = readings.first().map(|r| r.timestamp);
        let points = readings
            .iter()
            .map(|r| {
                let x = origin
                    .map(|o| (r.timestamp - o).num_milliseconds() as f64 / 1000.0)
                    .unwrap_or(0.0);
                (x, (spec.value)(r))
            })
            .collect();
        Self { origin, points }
    }

    /// (min, max) of the finite values, None when there are none
    pub fn value_range(&self) -> Option<(f64, f64)> {
        finite_range(self.points.iter().map(|p| p.1))
    }

    /// the points actually drawn: finite only, y pinned to ±AXIS_LIMIT
    fn plotted(&self) -> Vec<(f64, f64)> {
        self.points
            .iter()
            .filter(|(x, y)| x.is_finite() && y.is_finite())
            .map(|&(x, y)| (x, y.clamp(-AXIS_LIMIT, AXIS_LIMIT)))
            .collect()
    }

    fn x_range(&self) -> (f64, f64) {
        pad(finite_range(self.points.iter().map(|p| p.0)).unwrap_or((0.0, 0.0)), 0.0)
    }

    fn y_range(&self) -> (f64, f64) {
        pad(finite_range(self.plotted().into_iter().map(|p| p.1)).unwrap_or((0.0, 0.0)), 0.05)
    }

    /// wall-clock label for an x position
    fn time_label(&self, x: f64) -> String {
        self.origin
            .zip(chrono::Duration::try_milliseconds((x * 1000.0).round() as i64))
            .and_then(|(o, offset)| o.checked_add_signed(offset))
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| format!("{:.0}s", x))
    }
}

fn finite_range(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values.filter(|v| v.is_finite()).fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

/// widen a range by `ratio` of its span, or by 1 on each side when flat
///
/// the span is taken in halves so it cannot overflow, and the result is
/// clamped to the finite f64 range.
fn pad((lo, hi): (f64, f64), ratio: f64) -> (f64, f64) {
    let half_span = hi / 2.0 - lo / 2.0;
    let magnitude = lo.abs().max(hi.abs()).max(1.0);
    let margin = if half_span <= f64::EPSILON * magnitude {
        // ±1 vanishes next to very large magnitudes
        1.0_f64.max(lo.abs() * 1e-9)
    } else {
        half_span * (2.0 * ratio)
    };
    ((lo - margin).max(f64::MIN), (hi + margin).min(f64::MAX))
}

fn axis_value(v: f64) -> String {
    if v != 0.0 && (v.abs() >= 1e6 || v.abs() < 1e-2) {
        format!("{:.2e}", v)
    } else {
        format!("{:.1}", v)
    }
}

/// make the bundled font available to plotters, once per process
fn ensure_font() -> Result<()> {
    static REGISTERED: OnceLock<bool> = OnceLock::new();
    let ok = *REGISTERED.get_or_init(|| register_font(FONT_FAMILY, FontStyle::Normal, FONT).is_ok());
    ensure!(ok, "bundled chart font could not be loaded");
    Ok(())
}

/// a rendered chart: the series it was drawn from plus the png bytes
pub struct Chart {
    pub series: Series,
    pub png: Vec<u8>,
}

/// draw one line chart for the whole window
pub fn render(readings: &[Reading], spec: &ChartSpec) -> Result<Chart> {
    let series = Series::from_readings(readings, spec);
    let png = rasterise(&series, spec).with_context(|| format!("rendering {} chart", spec.title))?;
    Ok(Chart { series, png })
}

fn rasterise(series: &Series, spec: &ChartSpec) -> Result<Vec<u8>> {
    ensure_font()?;

    let (x0, x1) = series.x_range();
    let (y0, y1) = series.y_range();
    ensure!(
        [x0, x1, y0, y1].iter().all(|v| v.is_finite()) && x0 < x1 && y0 < y1,
        "degenerate axis range x {}..{} y {}..{}",
        x0,
        x1,
        y0,
        y1
    );

    let color = spec.color;
    let points = series.plotted();
    let time_label = |x: &f64| series.time_label(*x);
    let value_label = |y: &f64| axis_value(*y);

    let mut pixels = vec![0u8; (WIDTH * HEIGHT * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut pixels, (WIDTH, HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(|e| anyhow::anyhow!("fill failed: {}", e))?;

        let mut chart = ChartBuilder::on(&root)
            .caption(format!("{} Over Time", spec.title), (FONT_FAMILY, 28))
            .margin(20)
            .x_label_area_size(50)
            .y_label_area_size(90)
            .build_cartesian_2d(x0..x1, y0..y1)
            .map_err(|e| anyhow::anyhow!("chart layout failed: {}", e))?;

        chart
            .configure_mesh()
            .light_line_style(RGBColor(0xEA, 0xEA, 0xF2))
            .bold_line_style(RGBColor(0xD0, 0xD0, 0xDC))
            .x_labels(8)
            .y_labels(8)
            .x_label_formatter(&time_label)
            .y_label_formatter(&value_label)
            .x_desc("Time")
            .y_desc(format!("{} ({})", spec.title, spec.unit))
            .label_style((FONT_FAMILY, 14))
            .axis_desc_style((FONT_FAMILY, 16))
            .draw()
            .map_err(|e| anyhow::anyhow!("mesh failed: {}", e))?;

        chart
            .draw_series(LineSeries::new(points.iter().copied(), color.stroke_width(2)))
            .map_err(|e| anyhow::anyhow!("line failed: {}", e))?
            .label(format!("{} ({})", spec.title, spec.unit))
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
        chart
            .draw_series(points.iter().map(|&p| Circle::new(p, 4, color.filled())))
            .map_err(|e| anyhow::anyhow!("markers failed: {}", e))?;

        chart
            .configure_series_labels()
            .label_font((FONT_FAMILY, 14))
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()
            .map_err(|e| anyhow::anyhow!("legend failed: {}", e))?;

        root.present().map_err(|e| anyhow::anyhow!("present failed: {}", e))?;
    }

    let mut png = Vec::new();
    PngEncoder::new(Cursor::new(&mut png))
        .write_image(&pixels, WIDTH, HEIGHT, ExtendedColorType::Rgb8)
        .context("png encoding failed")?;
    Ok(png)
}
