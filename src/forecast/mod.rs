//! Short-horizon dispatch planning.
//!
//! Reads the newest available dataset, keeps the trailing window of each
//! (stop, route) series, runs the [`baseline`] forecaster on it, and writes
//! one recommendation per series for the next three hours.

pub mod baseline;
pub mod utility;

use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::PlanningConfig;
use crate::error::DispatchError;
use crate::output::{read_dataset, write_dispatch};
use crate::records::{DemandRecord, DispatchRecommendation, HorizonPlan, is_peak_hour};
use baseline::{HORIZONS, predict};

pub const PEAK_OVERRIDE_NOTE: &str = " Peak-hour override ensures dispatch.";

/// Outcome of a planner run, for logging and tests.
#[derive(Debug)]
pub struct DispatchSummary {
    pub dataset: PathBuf,
    pub rows_read: usize,
    pub rows_skipped: usize,
    pub recommendations: Vec<DispatchRecommendation>,
}

/// Returns the first candidate that exists on disk.
pub fn resolve_dataset(candidates: &[PathBuf]) -> Result<&Path, DispatchError> {
    candidates
        .iter()
        .find(|p| p.is_file())
        .map(PathBuf::as_path)
        .ok_or_else(|| DispatchError::NoDataset {
            candidates: candidates.to_vec(),
        })
}

/// `now` truncated to the start of its hour.
pub fn hour_floor(now: NaiveDateTime) -> NaiveDateTime {
    let time = NaiveTime::from_hms_opt(now.hour(), 0, 0).unwrap_or(NaiveTime::MIN);
    now.date().and_time(time)
}

/// Keeps rows no older than `days` before the newest row.
pub fn trailing_window(records: Vec<DemandRecord>, days: i64) -> Vec<DemandRecord> {
    let Some(newest) = records.iter().map(DemandRecord::timestamp).max() else {
        return records;
    };
    let Some(cutoff) = Duration::try_days(days).and_then(|d| newest.checked_sub_signed(d)) else {
        return records;
    };
    records
        .into_iter()
        .filter(|r| r.timestamp() >= cutoff)
        .collect()
}

/// Groups rows by (stop id, route id), in order of first appearance.
pub fn group_series(records: Vec<DemandRecord>) -> Vec<((String, String), Vec<DemandRecord>)> {
    let mut index: HashMap<(String, String), usize> = HashMap::new();
    let mut groups: Vec<((String, String), Vec<DemandRecord>)> = Vec::new();

    for record in records {
        let key = (record.stop_id.clone(), record.route_id.clone());
        match index.get(&key) {
            Some(&i) => groups[i].1.push(record),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![record]));
            }
        }
    }

    groups
}

/// Builds one recommendation per series from already-loaded rows.
///
/// `now` is the wall clock; forecasts start at the following hour boundary.
pub fn plan_dispatch(
    records: Vec<DemandRecord>,
    now: NaiveDateTime,
    settings: &PlanningConfig,
) -> Vec<DispatchRecommendation> {
    let base = hour_floor(now);
    let peak = is_peak_hour(base.hour());
    let windowed = trailing_window(records, settings.window_days);

    let mut out = Vec::new();
    for ((stop_id, route_id), series) in group_series(windowed) {
        if series.is_empty() {
            let err = DispatchError::EmptySeries { stop_id, route_id };
            warn!(error = %err, "Skipping series");
            continue;
        }
        let baseline = match predict(&series, settings.recent_samples, settings.load_factor) {
            Ok(b) => b,
            Err(e) => {
                warn!(stop_id = %stop_id, route_id = %route_id, error = %e, "Skipping series");
                continue;
            }
        };

        let mut buses = baseline.buses;
        let mut reason = baseline.reason;
        if peak {
            // The ceiling in `buses_for` already guarantees one bus; only the
            // note is observable today.
            buses = buses.map(|b| b.max(1));
            reason.push_str(PEAK_OVERRIDE_NOTE);
        }

        let horizons = [0, 1, 2].map(|i| HorizonPlan {
            timestamp: base + Duration::hours(i64::from(HORIZONS[i])),
            predicted_demand: baseline.predictions[i],
            buses: buses[i],
        });

        debug!(
            stop_id = %stop_id,
            route_id = %route_id,
            level = baseline.level,
            trend = baseline.trend,
            "Planned series"
        );
        out.push(DispatchRecommendation {
            route_id,
            stop_id,
            horizons,
            reason,
            bus_capacity: baseline.capacity,
            load_factor: settings.load_factor,
        });
    }

    out.sort_by(|a, b| {
        (&a.route_id, &a.stop_id, a.horizons[0].timestamp)
            .cmp(&(&b.route_id, &b.stop_id, b.horizons[0].timestamp))
    });
    out
}

/// Resolves the dataset, plans every series, and overwrites `output`.
///
/// Fails before touching `output` when no candidate dataset exists.
#[tracing::instrument(skip(candidates, settings), fields(output = %output.display()))]
pub fn run_dispatch(
    candidates: &[PathBuf],
    output: &Path,
    now: NaiveDateTime,
    settings: &PlanningConfig,
) -> Result<DispatchSummary, DispatchError> {
    let dataset = resolve_dataset(candidates)?.to_path_buf();
    info!(dataset = %dataset.display(), "Using dataset");

    let load = read_dataset(&dataset)?;
    let rows_read = load.records.len();
    let recommendations = plan_dispatch(load.records, now, settings);
    write_dispatch(output, &recommendations)?;

    info!(
        rows_read,
        rows_skipped = load.skipped,
        series = recommendations.len(),
        "Wrote dispatch table"
    );
    Ok(DispatchSummary {
        dataset,
        rows_read,
        rows_skipped: load.skipped,
        recommendations,
    })
}
