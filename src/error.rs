use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("No dataset found. Expected one of: {}", display_paths(.candidates))]
    NoDataset { candidates: Vec<PathBuf> },
    #[error("Malformed row at line {line}: {reason}")]
    MalformedRow { line: u64, reason: String },
    #[error("Series {stop_id}/{route_id} has no usable rows")]
    EmptySeries { stop_id: String, route_id: String },
    #[error("Plot error: {0}")]
    Plot(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl From<tempfile::PersistError> for DispatchError {
    fn from(err: tempfile::PersistError) -> Self {
        DispatchError::Io(err.error)
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
