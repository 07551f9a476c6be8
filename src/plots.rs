//! Per-series history charts for the dashboard.
//!
//! Each (stop, route) series gets one PNG: hourly boardings with 7-day and
//! 28-day rolling means, occupancy with its 7-day mean on a 0-100 secondary
//! axis, and the peak windows shaded on every day. Charts carry no text, so
//! plotters is built without a font backend.

use chrono::{Duration, NaiveDateTime, NaiveTime};
use plotters::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::dashboard::plot_file_name;
use crate::error::DispatchError;
use crate::forecast::{group_series, resolve_dataset, trailing_window};
use crate::output::read_dataset;
use crate::records::{DemandRecord, PEAK_WINDOWS};

pub const PLOT_SIZE: (u32, u32) = (960, 360);
/// Days of history drawn, counted back from the newest row.
const HISTORY_DAYS: i64 = 365;
/// Every Nth hourly sample is drawn for the raw lines.
const DOWNSAMPLE_EVERY: usize = 2;
const SHORT_WINDOW_DAYS: i64 = 7;
const LONG_WINDOW_DAYS: i64 = 28;
const SHORT_MIN_SAMPLES: usize = 24;
const LONG_MIN_SAMPLES: usize = 24 * 4;

const PASSENGERS: RGBColor = RGBColor(0x1f, 0x77, 0xb4);
const AVERAGE: RGBColor = RGBColor(0x2c, 0xa0, 0x2c);
const OCCUPANCY: RGBColor = RGBColor(0xff, 0x7f, 0x0e);
const PEAK_SHADE: RGBColor = RGBColor(0xf0, 0xf4, 0xff);

type Point = (NaiveDateTime, f64);

fn plot_error<E: std::fmt::Display>(err: E) -> DispatchError {
    DispatchError::Plot(err.to_string())
}

/// Mean over the trailing time window `(t - window, t]` at every point.
///
/// Points with fewer than `min_samples` values in their window are dropped.
/// Input must be sorted by time.
pub fn rolling_mean(points: &[Point], window: Duration, min_samples: usize) -> Vec<Point> {
    let mut out = Vec::with_capacity(points.len());
    let mut start = 0;
    let mut sum = 0.0;

    for (end, &(ts, value)) in points.iter().enumerate() {
        sum += value;
        while points[start].0 <= ts - window {
            sum -= points[start].1;
            start += 1;
        }
        let count = end + 1 - start;
        if count >= min_samples.max(1) {
            out.push((ts, sum / count as f64));
        }
    }

    out
}

/// Keeps every `every`-th point, starting with the first.
pub fn downsample(points: &[Point], every: usize) -> Vec<Point> {
    points.iter().step_by(every.max(1)).copied().collect()
}

fn hours_since(origin: NaiveDateTime, ts: NaiveDateTime) -> f64 {
    (ts - origin).num_minutes() as f64 / 60.0
}

/// Draws the history chart for one series into `path`.
pub fn render_history(path: &Path, series: &[DemandRecord]) -> Result<(), DispatchError> {
    let mut ordered: Vec<&DemandRecord> = series.iter().collect();
    ordered.sort_by_key(|r| r.timestamp());
    let (Some(first), Some(last)) = (ordered.first(), ordered.last()) else {
        return Err(DispatchError::EmptySeries {
            stop_id: String::new(),
            route_id: String::new(),
        });
    };

    let origin = first.date.and_time(NaiveTime::MIN);
    let days = (last.date - first.date).num_days() + 1;
    let x_max = (days * 24) as f64;

    let boarded: Vec<Point> = ordered
        .iter()
        .map(|r| (r.timestamp(), f64::from(r.passengers_boarded)))
        .collect();
    let occupancy: Vec<Point> = ordered
        .iter()
        .map(|r| (r.timestamp(), f64::from(r.occupancy_percent)))
        .collect();
    let y_max = (boarded.iter().map(|p| p.1).fold(0.0, f64::max) * 1.1).max(1.0);

    let short = Duration::days(SHORT_WINDOW_DAYS);
    let boarded_7d = rolling_mean(&boarded, short, SHORT_MIN_SAMPLES);
    let boarded_28d = rolling_mean(&boarded, Duration::days(LONG_WINDOW_DAYS), LONG_MIN_SAMPLES);
    let occupancy_7d = rolling_mean(&occupancy, short, SHORT_MIN_SAMPLES);
    let to_xy = |points: &[Point]| -> Vec<(f64, f64)> {
        points
            .iter()
            .map(|&(ts, v)| (hours_since(origin, ts), v))
            .collect()
    };

    let root = BitMapBackend::new(path, PLOT_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(plot_error)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(12)
        .build_cartesian_2d(0f64..x_max, 0f64..y_max)
        .map_err(plot_error)?
        .set_secondary_coord(0f64..x_max, 0f64..100f64);

    chart
        .draw_series((0..days).flat_map(|day| {
            PEAK_WINDOWS.iter().map(move |&(start, end)| {
                let base = (day * 24) as f64;
                Rectangle::new(
                    [(base + f64::from(start), 0.0), (base + f64::from(end), y_max)],
                    PEAK_SHADE.mix(0.6).filled(),
                )
            })
        }))
        .map_err(plot_error)?;

    chart
        .draw_series(LineSeries::new(
            to_xy(&downsample(&boarded, DOWNSAMPLE_EVERY)),
            PASSENGERS.mix(0.8).stroke_width(1),
        ))
        .map_err(plot_error)?;
    chart
        .draw_series(LineSeries::new(
            to_xy(&boarded_7d),
            AVERAGE.mix(0.9).stroke_width(2),
        ))
        .map_err(plot_error)?;
    chart
        .draw_series(LineSeries::new(
            to_xy(&boarded_28d),
            AVERAGE.mix(0.5).stroke_width(1),
        ))
        .map_err(plot_error)?;

    chart
        .draw_secondary_series(LineSeries::new(
            to_xy(&downsample(&occupancy, DOWNSAMPLE_EVERY)),
            OCCUPANCY.mix(0.4).stroke_width(1),
        ))
        .map_err(plot_error)?;
    chart
        .draw_secondary_series(LineSeries::new(
            to_xy(&occupancy_7d),
            OCCUPANCY.mix(0.9).stroke_width(2),
        ))
        .map_err(plot_error)?;

    root.present().map_err(plot_error)?;
    debug!(path = %path.display(), samples = ordered.len(), "Drew history plot");
    Ok(())
}

/// Writes one history chart per (stop, route) series into `plots_dir`.
pub fn write_history_plots(
    records: Vec<DemandRecord>,
    plots_dir: &Path,
) -> Result<Vec<PathBuf>, DispatchError> {
    fs::create_dir_all(plots_dir)?;

    let mut written = Vec::new();
    for ((stop_id, route_id), series) in group_series(trailing_window(records, HISTORY_DAYS)) {
        let path = plots_dir.join(plot_file_name(&stop_id, &route_id));
        render_history(&path, &series)?;
        written.push(path);
    }

    Ok(written)
}

/// Resolves the dataset and redraws every history chart.
#[tracing::instrument(skip(candidates), fields(plots_dir = %plots_dir.display()))]
pub fn run_plots(candidates: &[PathBuf], plots_dir: &Path) -> Result<Vec<PathBuf>, DispatchError> {
    let dataset = resolve_dataset(candidates)?.to_path_buf();
    info!(dataset = %dataset.display(), "Using dataset");

    let load = read_dataset(&dataset)?;
    let written = write_history_plots(load.records, plots_dir)?;

    info!(plots = written.len(), "Wrote history plots");
    Ok(written)
}
