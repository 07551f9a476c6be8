//! Live CCTV passenger counts.
//!
//! The counts file is re-read on every request; nothing is cached.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use serde_json::{Map, Number, Value, json};
use std::path::PathBuf;
use thiserror::Error;
use tracing::warn;

/// Column positions of the nine per-stop counts in a headerless count row.
const BUSSTOP_COLUMNS: [usize; 9] = [2, 4, 6, 8, 10, 12, 14, 16, 18];

#[derive(Clone)]
pub struct CountsState {
    pub counts_file: PathBuf,
}

#[derive(Debug, Error)]
pub enum CountsError {
    #[error("CSV file '{0}' not found.")]
    Missing(String),
    #[error("Counts file has no rows")]
    Empty,
    #[error("Row has {found} columns, expected at least {expected}")]
    ShortRow { found: usize, expected: usize },
    #[error("Column {column} is not a number: {value:?}")]
    NotANumber { column: usize, value: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Serialize, PartialEq)]
pub struct BusstopCount {
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct BusstopCounts {
    pub timestamp: String,
    pub busstops: Vec<BusstopCount>,
    pub total: i64,
}

/// Integer value of a count cell; fractional cells are truncated.
fn parse_count(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    raw.parse::<i64>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(|v| v.trunc() as i64)
    })
}

/// Per-stop counts from the newest row of a headerless count file.
pub fn latest_busstop_counts(text: &str) -> Result<BusstopCounts, CountsError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut latest = None;
    for record in rdr.records() {
        let record = record?;
        if !record.iter().all(|f| f.trim().is_empty()) {
            latest = Some(record);
        }
    }
    let row = latest.ok_or(CountsError::Empty)?;

    let expected = BUSSTOP_COLUMNS[BUSSTOP_COLUMNS.len() - 1] + 1;
    if row.len() < expected {
        return Err(CountsError::ShortRow {
            found: row.len(),
            expected,
        });
    }
    let count_at = |column: usize| {
        let value = row.get(column).unwrap_or_default();
        parse_count(value).ok_or_else(|| CountsError::NotANumber {
            column,
            value: value.to_string(),
        })
    };

    let busstops = BUSSTOP_COLUMNS
        .iter()
        .enumerate()
        .map(|(i, &column)| {
            Ok(BusstopCount {
                name: format!("Bus Stop {}", i + 1),
                count: count_at(column)?,
            })
        })
        .collect::<Result<Vec<_>, CountsError>>()?;

    Ok(BusstopCounts {
        timestamp: row.get(0).unwrap_or_default().to_string(),
        busstops,
        total: count_at(row.len() - 1)?,
    })
}

/// Integer, float, or string, in that order; blank cells become null.
fn typed_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::from(i);
    }
    if let Some(n) = trimmed.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(n);
    }
    Value::String(raw.to_string())
}

/// Every row of a headed count file as a JSON object keyed by column name.
pub fn records_as_json(text: &str) -> Result<Vec<Map<String, Value>>, CountsError> {
    let mut rdr = csv::Reader::from_reader(text.as_bytes());
    let headers = rdr.headers()?.clone();
    let mut rows = Vec::new();

    for record in rdr.records() {
        let record = record?;
        let row: Map<String, Value> = headers
            .iter()
            .zip(record.iter())
            .map(|(name, value)| (name.to_string(), typed_value(value)))
            .collect();
        rows.push(row);
    }

    Ok(rows)
}

async fn read_counts(state: &CountsState) -> Result<String, CountsError> {
    if !state.counts_file.is_file() {
        return Err(CountsError::Missing(
            state.counts_file.display().to_string(),
        ));
    }
    Ok(tokio::fs::read_to_string(&state.counts_file).await?)
}

/// Latest per-stop counts.
pub async fn busstop_counts(
    State(state): State<CountsState>,
) -> Result<Json<BusstopCounts>, (StatusCode, Json<Value>)> {
    let result = match read_counts(&state).await {
        Ok(text) => latest_busstop_counts(&text),
        Err(e) => Err(e),
    };
    result.map(Json).map_err(|e| {
        warn!(error = %e, "Bus stop counts unavailable");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
    })
}

/// The whole count file; failures are reported in the payload.
pub async fn passenger_counts(State(state): State<CountsState>) -> Json<Value> {
    let result = match read_counts(&state).await {
        Ok(text) => records_as_json(&text),
        Err(e) => Err(e),
    };
    match result {
        Ok(data) => Json(json!({ "status": "success", "data": data })),
        Err(e) => {
            warn!(error = %e, "Passenger counts unavailable");
            Json(json!({ "status": "error", "message": e.to_string() }))
        }
    }
}
