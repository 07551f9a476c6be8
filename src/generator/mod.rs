//! Synthetic one-year demand dataset.
//!
//! Each (day, hour, stop) cell combines seasonal weather, a two-peak
//! time-of-day curve, congestion, day-to-day noise, and a slow upward trend.
//! All randomness flows from a single seeded `ChaCha8Rng`, so a seed and a
//! reference date fully determine the output.

pub mod tables;

use chrono::{Datelike, Duration, NaiveDate};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use std::path::Path;
use tracing::{debug, info};

use crate::config::{SimulationConfig, StopConfig};
use crate::error::DispatchError;
use crate::output::write_dataset_atomic;
use crate::records::{Congestion, DemandRecord, Weather};
use tables::{
    congestion_distribution, flow_factor, hour_multiplier, mean_wait_minutes,
    weather_distribution, weather_factor,
};

/// Convoy derating applied to boarded passengers outside event surges.
const BOARDING_EFFICIENCY: f64 = 0.98;
const EVENT_DEMAND_SURGE: f64 = 1.12;
const EVENT_LEFT_BEHIND_SURGE: f64 = 1.08;
const DAY_NOISE_SD: f64 = 0.08;
const WAIT_SD: f64 = 1.8;

/// Unrounded outcome of one simulated stop-hour.
#[derive(Debug, Clone, PartialEq)]
pub struct DemandSample {
    pub demand: f64,
    pub boarded: f64,
    pub left_behind: f64,
    pub occupancy: f64,
    pub wait_minutes: f64,
    pub recommended_buses: u32,
    pub event: bool,
}

/// Conditions shared by every stop during one simulated hour.
#[derive(Debug, Clone, Copy)]
pub struct HourContext {
    pub hour: u32,
    pub weather: Weather,
    pub congestion: Congestion,
    /// Fraction of the simulated window already elapsed, in years.
    pub elapsed_years: f64,
}

pub struct Generator<'a> {
    config: &'a SimulationConfig,
    rng: ChaCha8Rng,
}

impl<'a> Generator<'a> {
    pub fn new(config: &'a SimulationConfig) -> Self {
        Self {
            config,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
        }
    }

    /// Simulates every sampled hour of the `days`-long window ending (exclusive) at `today`.
    ///
    /// Rows come back sorted by (date, hour, stop id).
    pub fn generate(mut self, today: NaiveDate) -> Vec<DemandRecord> {
        let cfg = self.config;
        let start = today
            .checked_sub_signed(Duration::days(i64::from(cfg.days)))
            .unwrap_or(NaiveDate::MIN);
        let hours = cfg.first_hour..=cfg.last_hour;
        let mut rows =
            Vec::with_capacity(cfg.days as usize * hours.clone().count() * cfg.stops.len());

        for date in start.iter_days().take_while(|d| *d < today) {
            let weather = weather_distribution(date.month()).sample(&mut self.rng);
            let elapsed_years = (date - start).num_days() as f64 / 365.0;

            for hour in hours.clone() {
                let congestion =
                    congestion_distribution(hour, date.weekday()).sample(&mut self.rng);
                let ctx = HourContext {
                    hour,
                    weather,
                    congestion,
                    elapsed_years,
                };

                for stop in &cfg.stops {
                    let sample = self.simulate(stop, &ctx);
                    rows.push(self.to_record(date, stop, &ctx, &sample));
                }
            }
            debug!(date = %date, weather = %weather, "Simulated day");
        }

        rows.sort_by(|a, b| {
            (a.date, a.hour, &a.stop_id).cmp(&(b.date, b.hour, &b.stop_id))
        });
        rows
    }

    /// Draws demand for one stop-hour and sizes the convoy for it.
    pub fn simulate(&mut self, stop: &StopConfig, ctx: &HourContext) -> DemandSample {
        let cfg = self.config;
        let capacity = f64::from(cfg.bus_capacity);
        let trend = 0.9 + 0.2 * ctx.elapsed_years;
        let day_noise = gaussian(&mut self.rng, 1.0, DAY_NOISE_SD).clamp(0.82, 1.18);
        let lam = stop.base_rate
            * hour_multiplier(ctx.hour)
            * weather_factor(ctx.weather)
            * day_noise
            * trend;

        let mut demand = gaussian(&mut self.rng, lam, (0.10 * lam).max(2.0)).max(0.0);
        let effective = capacity * cfg.load_factor * flow_factor(ctx.congestion);
        let buses = ((demand / effective.max(1.0)).ceil() as u32).max(1);
        let convoy = f64::from(buses) * capacity * cfg.load_factor;

        let mut boarded = demand.min(convoy * BOARDING_EFFICIENCY);
        let mut left_behind = (demand - boarded).max(0.0);
        let wait_minutes =
            gaussian(&mut self.rng, mean_wait_minutes(ctx.congestion), WAIT_SD).clamp(2.0, 25.0);

        let event = cfg.event_stops.iter().any(|id| *id == stop.id)
            && cfg.event_hours.contains(&ctx.hour)
            && self.rng.gen_range(0.0..1.0) < cfg.event_probability;
        if event {
            // Surged left-behind passengers count as demand, so the
            // conservation `left = demand - boarded` still holds afterwards.
            let surged = demand * EVENT_DEMAND_SURGE;
            boarded = surged.min(convoy);
            left_behind = (left_behind * EVENT_LEFT_BEHIND_SURGE).max(surged - boarded);
            demand = boarded + left_behind;
        }

        let occupancy = (boarded / (f64::from(buses) * capacity) * 100.0).clamp(0.0, 100.0);

        DemandSample {
            demand,
            boarded,
            left_behind,
            occupancy,
            wait_minutes,
            recommended_buses: buses,
            event,
        }
    }

    fn to_record(
        &self,
        date: NaiveDate,
        stop: &StopConfig,
        ctx: &HourContext,
        sample: &DemandSample,
    ) -> DemandRecord {
        DemandRecord {
            date,
            hour: ctx.hour,
            stop_name: stop.name.clone(),
            stop_id: stop.id.clone(),
            route_id: self.config.route_id.clone(),
            passengers_boarded: round_count(sample.boarded),
            passengers_left_behind: round_count(sample.left_behind),
            bus_capacity: self.config.bus_capacity,
            occupancy_percent: round_count(sample.occupancy),
            avg_waiting_time_minutes: round_count(sample.wait_minutes),
            congestion: ctx.congestion,
            weather: ctx.weather,
            special_event: sample.event,
            recommended_buses: sample.recommended_buses,
        }
    }
}

/// Generates the dataset and atomically replaces `output` with it.
#[tracing::instrument(skip(config), fields(output = %output.display(), seed = config.seed))]
pub fn generate_dataset(
    config: &SimulationConfig,
    today: NaiveDate,
    output: &Path,
) -> Result<Vec<DemandRecord>, DispatchError> {
    let rows = Generator::new(config).generate(today);
    write_dataset_atomic(output, &rows)?;

    let days = rows.first().zip(rows.last()).map_or(0, |(first, last)| {
        (last.date - first.date).num_days() + 1
    });
    info!(
        rows = rows.len(),
        days,
        stops = config.stops.len(),
        "Wrote dataset"
    );
    Ok(rows)
}

fn gaussian<R: Rng + ?Sized>(rng: &mut R, mean: f64, sd: f64) -> f64 {
    match Normal::new(mean, sd) {
        Ok(dist) => dist.sample(rng),
        Err(_) => mean,
    }
}

/// Rounds half to even, saturating at zero.
fn round_count(value: f64) -> u32 {
    value.max(0.0).round_ties_even() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, 1).unwrap()
    }

    fn short_config(days: u32) -> SimulationConfig {
        SimulationConfig {
            days,
            ..Default::default()
        }
    }

    #[test]
    fn test_full_year_shape() {
        let config = SimulationConfig::default();
        let rows = Generator::new(&config).generate(today());

        assert_eq!(rows.len(), 365 * 18 * 7);
        assert_eq!(rows.first().unwrap().date, today() - Duration::days(365));
        assert_eq!(rows.last().unwrap().date, today() - Duration::days(1));

        let keys: HashSet<_> = rows
            .iter()
            .map(|r| (r.stop_id.clone(), r.route_id.clone(), r.date, r.hour))
            .collect();
        assert_eq!(keys.len(), rows.len());
        assert!(rows.iter().all(|r| (5..=22).contains(&r.hour)));
    }

    #[test]
    fn test_rows_sorted_by_date_hour_stop() {
        let config = short_config(3);
        let rows = Generator::new(&config).generate(today());
        assert!(rows.windows(2).all(|w| {
            (w[0].date, w[0].hour, &w[0].stop_id) <= (w[1].date, w[1].hour, &w[1].stop_id)
        }));
    }

    #[test]
    fn test_same_seed_same_rows() {
        let config = short_config(10);
        let a = Generator::new(&config).generate(today());
        let b = Generator::new(&config).generate(today());
        assert_eq!(a, b);

        let other = SimulationConfig {
            seed: 12,
            ..short_config(10)
        };
        let c = Generator::new(&other).generate(today());
        assert_ne!(a, c);
    }

    #[test]
    fn test_row_invariants() {
        let config = short_config(60);
        let rows = Generator::new(&config).generate(today());
        for r in &rows {
            assert!(r.occupancy_percent <= 100);
            assert!((2..=25).contains(&r.avg_waiting_time_minutes));
            assert!(r.recommended_buses >= 1);
            assert_eq!(r.bus_capacity, 60);
        }
    }

    #[test]
    fn test_weather_constant_within_a_day() {
        let config = short_config(5);
        let rows = Generator::new(&config).generate(today());
        for date in rows.iter().map(|r| r.date).collect::<HashSet<_>>() {
            let weathers: HashSet<_> = rows
                .iter()
                .filter(|r| r.date == date)
                .map(|r| r.weather)
                .collect();
            assert_eq!(weathers.len(), 1);
        }
    }

    #[test]
    fn test_events_only_at_event_stops_and_hours() {
        let config = short_config(120);
        let rows = Generator::new(&config).generate(today());
        let events: Vec<_> = rows.iter().filter(|r| r.special_event).collect();

        assert!(!events.is_empty());
        for r in events {
            assert!(r.stop_id == "AMC601" || r.stop_id == "GOT401");
            assert!((17..=19).contains(&r.hour));
        }
    }

    #[test]
    fn test_samples_conserve_passengers() {
        let config = SimulationConfig {
            event_probability: 1.0,
            ..Default::default()
        };
        let mut generator = Generator::new(&config);
        let event_stop = config.stops.iter().find(|s| s.id == "AMC601").unwrap();

        for hour in 5..=22 {
            for congestion in [Congestion::Low, Congestion::Medium, Congestion::High] {
                let ctx = HourContext {
                    hour,
                    weather: Weather::Rain,
                    congestion,
                    elapsed_years: 0.5,
                };
                for stop in [&config.stops[0], event_stop] {
                    let s = generator.simulate(stop, &ctx);
                    assert!(s.boarded <= s.demand + 1e-9);
                    assert!(s.left_behind >= 0.0);
                    assert!((s.left_behind - (s.demand - s.boarded).max(0.0)).abs() < 1e-9);
                    assert!((0.0..=100.0).contains(&s.occupancy));
                    assert!((2.0..=25.0).contains(&s.wait_minutes));
                    assert!(s.recommended_buses >= 1);
                    assert_eq!(s.event, stop.id == "AMC601" && (17..=19).contains(&hour));
                }
            }
        }
    }

    #[test]
    fn test_round_count_half_to_even() {
        assert_eq!(round_count(2.5), 2);
        assert_eq!(round_count(3.5), 4);
        assert_eq!(round_count(-0.4), 0);
    }

    #[test]
    fn test_generate_dataset_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("peak_hours_1y.csv");
        let rows = generate_dataset(&short_config(2), today(), &out).unwrap();

        let content = std::fs::read_to_string(&out).unwrap();
        assert_eq!(content.lines().count(), rows.len() + 1);
        assert!(content.starts_with("Date,Time,Bus_Stop_Name"));
    }
}
