//! Moving-average-plus-momentum baseline for a single (stop, route) series.

use crate::error::DispatchError;
use crate::forecast::utility::{diffs, mean, tail};
use crate::records::DemandRecord;

/// Forecast steps, in hours ahead of the current hour.
pub const HORIZONS: [u32; 3] = [1, 2, 3];
/// Samples averaged for the level estimate.
const LEVEL_SAMPLES: usize = 4;
/// Samples whose successive differences give the momentum.
const MOMENTUM_SAMPLES: usize = 6;
const MOMENTUM_DIFFS: usize = 3;
const MOMENTUM_DAMPING: f64 = 0.25;
/// Level assumed for a series with no history at all.
const EMPTY_LEVEL: f64 = 12.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Baseline {
    pub level: f64,
    pub trend: f64,
    pub predictions: [f64; 3],
    pub buses: [u32; 3],
    pub capacity: f64,
    pub reason: String,
}

/// The last `samples` boarding counts, padded at the end with their mean
/// (or [`EMPTY_LEVEL`]) up to [`LEVEL_SAMPLES`] values.
pub fn recent_window(boarded: &[f64], samples: usize) -> Vec<f64> {
    let mut window = tail(boarded, samples).to_vec();
    if window.len() < LEVEL_SAMPLES {
        let fill = if window.is_empty() {
            EMPTY_LEVEL
        } else {
            mean(&window)
        };
        window.resize(LEVEL_SAMPLES, fill);
    }
    window
}

/// Mean of the last three differences over the last six samples; 0 with less history.
pub fn momentum(window: &[f64]) -> f64 {
    if window.len() < MOMENTUM_SAMPLES {
        return 0.0;
    }
    let deltas = diffs(tail(window, MOMENTUM_SAMPLES));
    mean(tail(&deltas, MOMENTUM_DIFFS))
}

/// Buses needed to carry `demand` at `load_factor` of `capacity`; never below one.
pub fn buses_for(demand: f64, capacity: f64, load_factor: f64) -> u32 {
    let per_bus = (capacity * load_factor).max(1.0);
    ((demand / per_bus).ceil() as u32).max(1)
}

/// Forecasts the next three hours for one series.
///
/// `series` may be in any order; the newest row supplies capacity and the
/// conditions quoted in the reason text.
pub fn predict(
    series: &[DemandRecord],
    recent_samples: usize,
    load_factor: f64,
) -> Result<Baseline, DispatchError> {
    let mut ordered: Vec<&DemandRecord> = series.iter().collect();
    ordered.sort_by_key(|r| r.timestamp());
    let Some(base) = ordered.last() else {
        return Err(DispatchError::EmptySeries {
            stop_id: String::new(),
            route_id: String::new(),
        });
    };

    let capacity = f64::from(base.bus_capacity);
    let boarded: Vec<f64> = ordered
        .iter()
        .map(|r| f64::from(r.passengers_boarded))
        .collect();
    let window = recent_window(&boarded, recent_samples);
    let level = mean(tail(&window, LEVEL_SAMPLES));
    let trend = momentum(&window);

    let predictions =
        HORIZONS.map(|k| (level + f64::from(k) * MOMENTUM_DAMPING * trend).max(0.0));
    let buses = predictions.map(|p| buses_for(p, capacity, load_factor));

    let reason = format!(
        "Baseline avg(last 4h)+trend; congestion {}, weather {}, last occupancy {:.0}%, wait {:.0}m.",
        base.congestion,
        base.weather,
        f64::from(base.occupancy_percent),
        f64::from(base.avg_waiting_time_minutes),
    );

    Ok(Baseline {
        level,
        trend,
        predictions,
        buses,
        capacity,
        reason,
    })
}
