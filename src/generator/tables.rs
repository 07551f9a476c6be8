//! Probability tables and demand curves behind the simulator.

use chrono::Weekday;
use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};

use crate::records::{Congestion, Weather, is_peak_hour};

/// A fixed categorical distribution over a small set of outcomes.
#[derive(Debug, Clone, Copy)]
pub struct Categorical<T: 'static> {
    outcomes: &'static [(T, f64)],
}

impl<T: Copy + 'static> Categorical<T> {
    pub const fn new(outcomes: &'static [(T, f64)]) -> Self {
        Self { outcomes }
    }

    pub fn outcomes(&self) -> &'static [(T, f64)] {
        self.outcomes
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> T {
        let idx = WeightedIndex::new(self.outcomes.iter().map(|(_, p)| *p))
            .map(|dist| dist.sample(rng))
            .unwrap_or(0);
        self.outcomes[idx].0
    }
}

const DRY: Categorical<Weather> = Categorical::new(&[
    (Weather::Clear, 0.70),
    (Weather::Cloudy, 0.25),
    (Weather::Rain, 0.05),
]);
const LATE_DRY: Categorical<Weather> = Categorical::new(&[
    (Weather::Clear, 0.65),
    (Weather::Cloudy, 0.30),
    (Weather::Rain, 0.05),
]);
const SHOULDER: Categorical<Weather> = Categorical::new(&[
    (Weather::Clear, 0.60),
    (Weather::Cloudy, 0.30),
    (Weather::Rain, 0.10),
]);
const PRE_MONSOON: Categorical<Weather> = Categorical::new(&[
    (Weather::Clear, 0.55),
    (Weather::Cloudy, 0.35),
    (Weather::Rain, 0.10),
]);
const EARLY_MONSOON: Categorical<Weather> = Categorical::new(&[
    (Weather::Clear, 0.50),
    (Weather::Cloudy, 0.35),
    (Weather::Rain, 0.15),
]);
const MONSOON: Categorical<Weather> = Categorical::new(&[
    (Weather::Clear, 0.45),
    (Weather::Cloudy, 0.35),
    (Weather::Rain, 0.20),
]);

/// Daily weather distribution for a calendar month (1-12).
pub fn weather_distribution(month: u32) -> Categorical<Weather> {
    match month {
        1 | 2 | 12 => DRY,
        11 => LATE_DRY,
        3 | 10 => SHOULDER,
        4 | 9 => PRE_MONSOON,
        5 => EARLY_MONSOON,
        6..=8 => MONSOON,
        _ => SHOULDER,
    }
}

const PEAK_TRAFFIC: Categorical<Congestion> =
    Categorical::new(&[(Congestion::High, 0.7), (Congestion::Medium, 0.3)]);
const WEEKEND_TRAFFIC: Categorical<Congestion> =
    Categorical::new(&[(Congestion::Medium, 0.6), (Congestion::Low, 0.4)]);
const OFF_PEAK_TRAFFIC: Categorical<Congestion> =
    Categorical::new(&[(Congestion::Medium, 0.45), (Congestion::Low, 0.55)]);

/// Congestion distribution for an hour of the day on a given weekday.
///
/// Peak windows win over the weekend rule.
pub fn congestion_distribution(hour: u32, weekday: Weekday) -> Categorical<Congestion> {
    let weekend = matches!(weekday, Weekday::Sat | Weekday::Sun);
    if is_peak_hour(hour) {
        PEAK_TRAFFIC
    } else if weekend && (11..=22).contains(&hour) {
        WEEKEND_TRAFFIC
    } else {
        OFF_PEAK_TRAFFIC
    }
}

/// Relative demand by hour: a flat floor plus morning and evening bumps.
pub fn hour_multiplier(hour: u32) -> f64 {
    let h = hour as f64;
    let am = (-0.5 * ((h - 8.0) / 1.6).powi(2)).exp();
    let pm = (-0.5 * ((h - 18.0) / 1.9).powi(2)).exp();
    0.45 + am + 1.05 * pm
}

pub fn weather_factor(weather: Weather) -> f64 {
    match weather {
        Weather::Clear => 1.0,
        Weather::Cloudy => 0.95,
        Weather::Rain => 0.88,
    }
}

/// Share of nominal throughput a bus keeps under the given traffic.
pub fn flow_factor(congestion: Congestion) -> f64 {
    match congestion {
        Congestion::Low => 1.0,
        Congestion::Medium => 0.94,
        Congestion::High => 0.88,
    }
}

pub fn mean_wait_minutes(congestion: Congestion) -> f64 {
    match congestion {
        Congestion::Low => 4.0,
        Congestion::Medium => 7.0,
        Congestion::High => 11.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_weather_tables_sum_to_one() {
        for month in 1..=12 {
            let total: f64 = weather_distribution(month)
                .outcomes()
                .iter()
                .map(|(_, p)| p)
                .sum();
            assert!((total - 1.0).abs() < 1e-9, "month {month} sums to {total}");
        }
    }

    #[test]
    fn test_monsoon_is_wettest() {
        let rain = |m| {
            weather_distribution(m)
                .outcomes()
                .iter()
                .find(|(w, _)| *w == Weather::Rain)
                .map(|(_, p)| *p)
                .unwrap()
        };
        assert!(rain(7) > rain(1));
        assert_eq!(rain(6), 0.20);
        assert_eq!(rain(12), 0.05);
    }

    #[test]
    fn test_congestion_lookup() {
        let outcomes = |h, d| congestion_distribution(h, d).outcomes();
        assert_eq!(outcomes(8, Weekday::Mon)[0], (Congestion::High, 0.7));
        // peak beats weekend
        assert_eq!(outcomes(18, Weekday::Sat)[0], (Congestion::High, 0.7));
        assert_eq!(outcomes(13, Weekday::Sun)[0], (Congestion::Medium, 0.6));
        assert_eq!(outcomes(13, Weekday::Wed)[0], (Congestion::Medium, 0.45));
        assert_eq!(outcomes(6, Weekday::Sat)[0], (Congestion::Medium, 0.45));
    }

    #[test]
    fn test_peak_congestion_never_low() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let dist = congestion_distribution(8, Weekday::Tue);
        for _ in 0..500 {
            assert_ne!(dist.sample(&mut rng), Congestion::Low);
        }
    }

    #[test]
    fn test_hour_multiplier_peaks() {
        assert!(hour_multiplier(8) > hour_multiplier(12));
        assert!(hour_multiplier(18) > hour_multiplier(8));
        assert!(hour_multiplier(13) > 0.45);
        assert!((hour_multiplier(8) - (1.45 + 1.05 * (-0.5f64 * (10.0f64 / 1.9).powi(2)).exp())).abs() < 1e-12);
    }

    #[test]
    fn test_flow_factor_below_one_under_congestion() {
        assert_eq!(flow_factor(Congestion::Low), 1.0);
        assert!(flow_factor(Congestion::High) < flow_factor(Congestion::Medium));
    }
}
