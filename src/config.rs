//! Run configuration.
//!
//! Every path and tunable the batch jobs need lives here and is resolved once
//! at process start: defaults, then an optional YAML file, then `PEAK_DATA_DIR`,
//! then command-line overrides (applied in `main`).

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Upper bound for any day count read from config.
pub const MAX_DAYS: i64 = 36_500;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base directory for every relative path below.
    pub data_dir: PathBuf,
    /// Forecaster inputs, first existing file wins.
    pub dataset_candidates: Vec<PathBuf>,
    /// Where the generator writes its dataset.
    pub dataset_output: PathBuf,
    pub dispatch_output: PathBuf,
    /// Directory holding `history_{stop}_{route}.png` images.
    pub plots_dir: PathBuf,
    pub dashboard_output: PathBuf,
    /// Live CCTV count file served by the API.
    pub counts_file: PathBuf,
    pub simulation: SimulationConfig,
    pub planning: PlanningConfig,
    pub api: ApiConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            dataset_candidates: vec![
                PathBuf::from("peak_hours_1y.csv"),
                PathBuf::from("peak_hours.csv"),
            ],
            dataset_output: PathBuf::from("peak_hours_1y.csv"),
            dispatch_output: PathBuf::from("dispatch_next_3h_explained.csv"),
            plots_dir: PathBuf::from("plots"),
            dashboard_output: PathBuf::from("dashboard_peak.html"),
            counts_file: PathBuf::from("backend_database/bmtc_cctv_counts.csv"),
            simulation: SimulationConfig::default(),
            planning: PlanningConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

/// Parameters of the synthetic one-year dataset.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub seed: u64,
    pub route_id: String,
    pub bus_capacity: u32,
    pub load_factor: f64,
    /// Length of the trailing window ending today.
    pub days: u32,
    pub first_hour: u32,
    pub last_hour: u32,
    pub stops: Vec<StopConfig>,
    /// Stops that see occasional evening event crowds.
    pub event_stops: Vec<String>,
    pub event_hours: Vec<u32>,
    pub event_probability: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 11,
            route_id: "365J".to_string(),
            bus_capacity: 60,
            load_factor: 0.85,
            days: 365,
            first_hour: 5,
            last_hour: 22,
            stops: default_stops(),
            event_stops: vec!["AMC601".to_string(), "GOT401".to_string()],
            event_hours: vec![17, 18, 19],
            event_probability: 0.12,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StopConfig {
    pub name: String,
    pub id: String,
    /// Mean hourly boardings before time-of-day, weather and trend scaling.
    pub base_rate: f64,
}

impl StopConfig {
    fn new(name: &str, id: &str, base_rate: f64) -> Self {
        Self {
            name: name.to_string(),
            id: id.to_string(),
            base_rate,
        }
    }
}

fn default_stops() -> Vec<StopConfig> {
    vec![
        StopConfig::new("Kempegowda Bus Station (Majestic)", "KBS001", 36.0),
        StopConfig::new("Maharani College", "MHC101", 32.0),
        StopConfig::new("K.R. Circle", "KRC201", 38.0),
        StopConfig::new("Koli Farm Gate", "KFG301", 28.0),
        StopConfig::new("Gottigere", "GOT401", 26.0),
        StopConfig::new("Bannerghatta Circle", "BGC501", 31.0),
        StopConfig::new("AMC College", "AMC601", 29.0),
    ]
}

/// Parameters of the baseline forecaster.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlanningConfig {
    pub load_factor: f64,
    /// Only series observed within this many days of the newest row are planned.
    pub window_days: i64,
    /// How many trailing samples feed the moving average.
    pub recent_samples: usize,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            load_factor: 0.85,
            window_days: 30,
            recent_samples: 48,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub bind: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".to_string(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Resolves `path` against [`Config::data_dir`] unless it is absolute.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }

    pub fn dataset_candidates(&self) -> Vec<PathBuf> {
        self.dataset_candidates
            .iter()
            .map(|p| self.resolve(p))
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let sim = &self.simulation;
        if sim.bus_capacity == 0 {
            return Err(ConfigError::Invalid("bus_capacity must be positive".into()));
        }
        for lf in [sim.load_factor, self.planning.load_factor] {
            if !(lf > 0.0 && lf <= 1.0) {
                return Err(ConfigError::Invalid(format!(
                    "load_factor must be in (0, 1], got {lf}"
                )));
            }
        }
        if sim.stops.is_empty() {
            return Err(ConfigError::Invalid("at least one stop is required".into()));
        }
        let mut seen = HashSet::new();
        if let Some(stop) = sim.stops.iter().find(|s| !seen.insert(s.id.as_str())) {
            return Err(ConfigError::Invalid(format!("duplicate stop id {}", stop.id)));
        }
        if i64::from(sim.days) > MAX_DAYS {
            return Err(ConfigError::Invalid(format!(
                "simulation days must be at most {MAX_DAYS}, got {}",
                sim.days
            )));
        }
        if sim.first_hour > sim.last_hour || sim.last_hour > 23 {
            return Err(ConfigError::Invalid(format!(
                "invalid service hours {}..={}",
                sim.first_hour, sim.last_hour
            )));
        }
        if !(0.0..=1.0).contains(&sim.event_probability) {
            return Err(ConfigError::Invalid(format!(
                "event_probability must be in [0, 1], got {}",
                sim.event_probability
            )));
        }
        if self.dataset_candidates.is_empty() {
            return Err(ConfigError::Invalid("no dataset candidates configured".into()));
        }
        if !(0..=MAX_DAYS).contains(&self.planning.window_days) {
            return Err(ConfigError::Invalid(format!(
                "window_days must be in 0..={MAX_DAYS}, got {}",
                self.planning.window_days
            )));
        }
        if self.planning.recent_samples == 0 {
            return Err(ConfigError::Invalid("recent_samples must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse config: {0}")]
    ParseError(String),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.simulation.stops.len(), 7);
        assert_eq!(config.simulation.last_hour - config.simulation.first_hour + 1, 18);
    }

    #[test]
    fn test_load_partial_yaml_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "data_dir: /srv/peak").unwrap();
        writeln!(file, "simulation:").unwrap();
        writeln!(file, "  seed: 7").unwrap();
        writeln!(file, "  route_id: 500D").unwrap();
        writeln!(file, "planning:").unwrap();
        writeln!(file, "  window_days: 14").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.simulation.seed, 7);
        assert_eq!(config.simulation.route_id, "500D");
        assert_eq!(config.simulation.bus_capacity, 60);
        assert_eq!(config.planning.window_days, 14);
        assert_eq!(config.planning.recent_samples, 48);
        assert_eq!(
            config.dataset_candidates()[0],
            PathBuf::from("/srv/peak/peak_hours_1y.csv")
        );
    }

    #[test]
    fn test_resolve_keeps_absolute_paths() {
        let config = Config {
            data_dir: PathBuf::from("data"),
            ..Default::default()
        };
        assert_eq!(config.resolve(Path::new("x.csv")), PathBuf::from("data/x.csv"));
        assert_eq!(config.resolve(Path::new("/tmp/x.csv")), PathBuf::from("/tmp/x.csv"));
    }

    #[test]
    fn test_validate_rejects_bad_load_factor() {
        let mut config = Config::default();
        config.planning.load_factor = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_example_config_matches_defaults() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/peak_dispatch.example.yaml");
        let config = Config::load(path).unwrap();
        config.validate().unwrap();
        assert_eq!(config.simulation.route_id, "365J");
        assert_eq!(config.simulation.event_hours, vec![17, 18, 19]);
        assert_eq!(config.api.bind, "0.0.0.0:5000");
        assert_eq!(config.dataset_output, Config::default().dataset_output);

        let stops = |c: &SimulationConfig| -> Vec<(String, String, f64)> {
            c.stops
                .iter()
                .map(|s| (s.name.clone(), s.id.clone(), s.base_rate))
                .collect()
        };
        assert_eq!(stops(&config.simulation), stops(&SimulationConfig::default()));
    }

    #[test]
    fn test_validate_bounds_day_counts() {
        let mut config = Config::default();
        config.planning.window_days = 100_000_000;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.simulation.days = 100_000_000;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.planning.window_days = MAX_DAYS;
        config.simulation.days = MAX_DAYS as u32;
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_zero_recent_samples() {
        let mut config = Config::default();
        config.planning.recent_samples = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_duplicate_stop_ids() {
        let mut config = Config::default();
        let copy = config.simulation.stops[0].clone();
        config.simulation.stops.push(copy);
        let err = config.validate().unwrap_err();
        assert_eq!(err.to_string(), "Invalid config: duplicate stop id KBS001");
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load("/nonexistent/peak_dispatch.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::ReadError(_)));
    }
}
