//! Reading and writing the pipeline's CSV and HTML files.
//!
//! The dataset and dashboard are replaced atomically through a temp file in
//! the destination directory. The dispatch table is a terminal artifact and is
//! simply truncated and rewritten.

use csv::{ReaderBuilder, WriterBuilder};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use tracing::{debug, warn};

use crate::error::DispatchError;
use crate::records::{
    DATASET_HEADER, DISPATCH_HEADER, DemandRecord, DispatchRecommendation, DispatchRow,
};

/// Rows read from a dataset file plus how many were dropped as malformed.
#[derive(Debug, Default)]
pub struct DatasetLoad {
    pub records: Vec<DemandRecord>,
    pub skipped: usize,
}

/// Writes `header` then every row of `rows` to `writer`.
///
/// The header goes out even when `rows` is empty.
pub fn write_csv<W: Write, T: Serialize>(
    writer: W,
    header: &[&str],
    rows: impl IntoIterator<Item = T>,
) -> Result<(), DispatchError> {
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(writer);
    writer.write_record(header)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Runs `write` against a temp file next to `path`, then renames it over `path`.
///
/// Readers see either the old file or the complete new one.
pub fn replace_atomically<F>(path: &Path, prefix: &str, write: F) -> Result<(), DispatchError>
where
    F: FnOnce(&mut File) -> Result<(), DispatchError>,
{
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let suffix = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();
    let mut tmp = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(&suffix)
        .tempfile_in(dir)?;
    write(tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;

    debug!(path = %path.display(), "Replaced file atomically");
    Ok(())
}

pub fn write_dataset_atomic(path: &Path, rows: &[DemandRecord]) -> Result<(), DispatchError> {
    replace_atomically(path, "peak1y_", |file| write_csv(file, &DATASET_HEADER, rows))
}

/// Loads a dataset, dropping rows that fail to parse.
///
/// A missing header or an unreadable file is still an error.
pub fn read_dataset(path: &Path) -> Result<DatasetLoad, DispatchError> {
    let file = File::open(path)?;
    read_dataset_from(file)
}

pub fn read_dataset_from<R: io::Read>(reader: R) -> Result<DatasetLoad, DispatchError> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(reader);
    let mut load = DatasetLoad::default();

    for result in rdr.deserialize::<DemandRecord>() {
        match result {
            Ok(record) => load.records.push(record),
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                let line = e.position().map_or(0, |p| p.line());
                let err = DispatchError::MalformedRow {
                    line,
                    reason: e.to_string(),
                };
                warn!(error = %err, "Dropping row");
                load.skipped += 1;
            }
        }
    }

    Ok(load)
}

/// Overwrites `path` with the dispatch table.
pub fn write_dispatch(path: &Path, rows: &[DispatchRecommendation]) -> Result<(), DispatchError> {
    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let file = File::create(path)?;
    write_csv(file, &DISPATCH_HEADER, rows.iter().map(DispatchRow::from))
}

pub fn read_dispatch(path: &Path) -> Result<Vec<DispatchRow>, DispatchError> {
    let file = File::open(path)?;
    let mut rdr = csv::Reader::from_reader(file);
    let mut rows = Vec::new();

    for result in rdr.deserialize() {
        let row: DispatchRow = result?;
        rows.push(row);
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{HorizonPlan, sample_record};
    use chrono::NaiveDate;
    use std::fs;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, 2).unwrap()
    }

    fn recommendation(stop_id: &str) -> DispatchRecommendation {
        let base = day().and_hms_opt(10, 0, 0).unwrap();
        let horizon = |k: i64| HorizonPlan {
            timestamp: base + chrono::Duration::hours(k),
            predicted_demand: 40.5 + k as f64,
            buses: 1,
        };
        DispatchRecommendation {
            route_id: "365J".into(),
            stop_id: stop_id.into(),
            horizons: [horizon(1), horizon(2), horizon(3)],
            reason: "Baseline avg(last 4h)+trend; congestion Low, weather Clear, last occupancy 50%, wait 4m.".into(),
            bus_capacity: 60.0,
            load_factor: 0.85,
        }
    }

    #[test]
    fn test_dataset_atomic_write_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("peak_hours_1y.csv");
        let rows = vec![sample_record("KBS001", day(), 8, 30)];

        write_dataset_atomic(&path, &rows).unwrap();
        write_dataset_atomic(&path, &rows).unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["peak_hours_1y.csv".to_string()]);

        let load = read_dataset(&path).unwrap();
        assert_eq!(load.records, rows);
        assert_eq!(load.skipped, 0);
    }

    #[test]
    fn test_read_dataset_drops_malformed_rows() {
        let data = format!(
            "{}\n\
             2025-05-02,08:00,A,A1,365J,10,0,60,20,5,Low,Clear,0,1\n\
             not-a-date,08:00,A,A1,365J,10,0,60,20,5,Low,Clear,0,1\n\
             2025-05-02,nine,A,A1,365J,10,0,60,20,5,Low,Clear,0,1\n\
             2025-05-02,09:00,A,A1\n\
             2025-05-02,10:00,A,A1,365J,12,0,60,20,5,Low,Clear,0,1\n",
            DATASET_HEADER.join(",")
        );
        let load = read_dataset_from(data.as_bytes()).unwrap();

        assert_eq!(load.records.len(), 2);
        assert_eq!(load.skipped, 3);
        assert_eq!(load.records[1].passengers_boarded, 12);
    }

    #[test]
    fn test_header_only_dataset_is_empty() {
        let data = format!("{}\n", DATASET_HEADER.join(","));
        let load = read_dataset_from(data.as_bytes()).unwrap();
        assert!(load.records.is_empty());
        assert_eq!(load.skipped, 0);
    }

    #[test]
    fn test_write_dispatch_empty_still_has_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dispatch.csv");

        write_dispatch(&path, &[]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim_end(), DISPATCH_HEADER.join(","));
        assert!(read_dispatch(&path).unwrap().is_empty());
    }

    #[test]
    fn test_dispatch_round_trips_through_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dispatch.csv");
        let recs = vec![recommendation("KBS001"), recommendation("MHC101")];

        write_dispatch(&path, &recs).unwrap();
        let rows = read_dispatch(&path).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], DispatchRow::from(&recs[0]));
        assert_eq!(rows[1].stop_id, "MHC101");
        assert!(rows[0].reason.contains("wait 4m."));
    }

    #[test]
    fn test_write_dispatch_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dispatch.csv");

        write_dispatch(&path, &[recommendation("A"), recommendation("B")]).unwrap();
        write_dispatch(&path, &[recommendation("C")]).unwrap();

        let rows = read_dispatch(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].stop_id, "C");
    }
}
