//! CLI entry point for the peak-hour dispatch pipeline.
//!
//! Provides subcommands for generating the synthetic demand dataset, planning
//! the next three hours of dispatch, drawing history plots, rendering the
//! dashboard, and serving live passenger counts over HTTP.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use peak_dispatch::config::Config;
use peak_dispatch::{api, dashboard, forecast, generator, plots};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "peak_dispatch")]
#[command(about = "Bus stop demand simulation and peak-hour dispatch planning", long_about = None)]
struct Cli {
    /// YAML config file; built-in defaults are used when omitted
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the synthetic one-year demand dataset
    Generate {
        /// CSV file to (atomically) replace
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Random seed
        #[arg(short, long)]
        seed: Option<u64>,

        /// Last day of the window (exclusive); defaults to today
        #[arg(long, value_name = "YYYY-MM-DD")]
        today: Option<NaiveDate>,
    },
    /// Forecast the next three hours and write the dispatch table
    Dispatch {
        /// Dataset to read; repeat to give fallbacks in priority order
        #[arg(short, long)]
        input: Vec<PathBuf>,

        /// Dispatch CSV to overwrite
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Draw one history chart per (stop, route) series
    Plots {
        /// Dataset to read; repeat to give fallbacks in priority order
        #[arg(short, long)]
        input: Vec<PathBuf>,

        /// Directory to write history_{stop}_{route}.png into
        #[arg(short, long)]
        plots_dir: Option<PathBuf>,
    },
    /// Render the dispatch table as a static HTML dashboard
    Dashboard {
        /// Dispatch CSV to read
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Directory containing history_{stop}_{route}.png plots
        #[arg(short, long)]
        plots_dir: Option<PathBuf>,

        /// HTML file to write
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Serve the live CCTV passenger counts as JSON
    Serve {
        /// Count CSV, read fresh on every request
        #[arg(short, long)]
        counts_file: Option<PathBuf>,

        /// Address to listen on (e.g., "0.0.0.0:5000")
        #[arg(short, long)]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/peak_dispatch.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("peak_dispatch.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    if let Err(e) = run(cli.command, config).await {
        error!(error = %e, "Run failed");
        return Err(e);
    }
    Ok(())
}

/// Defaults, then the YAML file, then `PEAK_DATA_DIR`.
fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(p) => Config::load(p).with_context(|| format!("loading {}", p.display()))?,
        None => Config::default(),
    };
    if let Ok(dir) = std::env::var("PEAK_DATA_DIR") {
        config.data_dir = PathBuf::from(dir);
    }
    config.validate()?;
    info!(data_dir = %config.data_dir.display(), "Loaded configuration");
    Ok(config)
}

async fn run(command: Commands, mut config: Config) -> Result<()> {
    match command {
        Commands::Generate {
            output,
            seed,
            today,
        } => {
            if let Some(seed) = seed {
                config.simulation.seed = seed;
            }
            let output = config.resolve(output.as_deref().unwrap_or(config.dataset_output.as_path()));
            let today = today.unwrap_or_else(|| Local::now().date_naive());
            generator::generate_dataset(&config.simulation, today, &output)?;
        }
        Commands::Dispatch { input, output } => {
            let candidates = if input.is_empty() {
                config.dataset_candidates()
            } else {
                input.iter().map(|p| config.resolve(p)).collect()
            };
            let output = config.resolve(output.as_deref().unwrap_or(config.dispatch_output.as_path()));
            let summary = forecast::run_dispatch(
                &candidates,
                &output,
                Local::now().naive_local(),
                &config.planning,
            )?;
            info!(
                output = %output.display(),
                rows = summary.recommendations.len(),
                "Dispatch table ready"
            );
        }
        Commands::Plots { input, plots_dir } => {
            let candidates = if input.is_empty() {
                config.dataset_candidates()
            } else {
                input.iter().map(|p| config.resolve(p)).collect()
            };
            let plots_dir = config.resolve(plots_dir.as_deref().unwrap_or(config.plots_dir.as_path()));
            plots::run_plots(&candidates, &plots_dir)?;
        }
        Commands::Dashboard {
            input,
            plots_dir,
            output,
        } => {
            let input = config.resolve(input.as_deref().unwrap_or(config.dispatch_output.as_path()));
            let plots_dir = config.resolve(plots_dir.as_deref().unwrap_or(config.plots_dir.as_path()));
            let output = config.resolve(output.as_deref().unwrap_or(config.dashboard_output.as_path()));
            dashboard::build_dashboard(&input, &plots_dir, &output, Local::now().naive_local())?;
        }
        Commands::Serve { counts_file, bind } => {
            let counts_file =
                config.resolve(counts_file.as_deref().unwrap_or(config.counts_file.as_path()));
            let bind = bind.unwrap_or_else(|| config.api.bind.clone());
            api::serve(&bind, counts_file).await?;
        }
    }

    Ok(())
}
