//! Row types for the demand dataset and the dispatch table.
//!
//! Both files are plain CSV with fixed column names, so the serde renames
//! here are the wire format. Keep [`DATASET_HEADER`] and [`DISPATCH_HEADER`]
//! in the same order as the struct fields.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hours of the day (inclusive ranges) treated as morning and evening peaks.
pub const PEAK_WINDOWS: [(u32, u32); 2] = [(7, 9), (17, 20)];

pub fn is_peak_hour(hour: u32) -> bool {
    PEAK_WINDOWS
        .iter()
        .any(|&(start, end)| (start..=end).contains(&hour))
}

pub const DATASET_HEADER: [&str; 14] = [
    "Date",
    "Time",
    "Bus_Stop_Name",
    "Bus_Stop_ID",
    "Route_ID",
    "Passengers_Boarded",
    "Passengers_Left_Behind",
    "Bus_Capacity",
    "Occupancy_Percent",
    "Avg_Waiting_Time_Mins",
    "Traffic_Congestion_Level",
    "Weather",
    "Special_Events_Nearby",
    "Recommended_Buses",
];

pub const DISPATCH_HEADER: [&str; 14] = [
    "Route_ID",
    "Bus_Stop_ID",
    "T+1_Timestamp",
    "T+2_Timestamp",
    "T+3_Timestamp",
    "Pred_t+1",
    "Buses_t+1",
    "Pred_t+2",
    "Buses_t+2",
    "Pred_t+3",
    "Buses_t+3",
    "Dispatch_Reason",
    "Bus_Capacity",
    "Load_Factor",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Weather {
    Clear,
    Cloudy,
    Rain,
}

impl Weather {
    pub fn as_str(&self) -> &'static str {
        match self {
            Weather::Clear => "Clear",
            Weather::Cloudy => "Cloudy",
            Weather::Rain => "Rain",
        }
    }
}

impl fmt::Display for Weather {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Congestion {
    Low,
    Medium,
    High,
}

impl Congestion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Congestion::Low => "Low",
            Congestion::Medium => "Medium",
            Congestion::High => "High",
        }
    }
}

impl fmt::Display for Congestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One hourly observation for a single stop on a single route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandRecord {
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    #[serde(rename = "Time", with = "clock_hour")]
    pub hour: u32,
    #[serde(rename = "Bus_Stop_Name")]
    pub stop_name: String,
    #[serde(rename = "Bus_Stop_ID")]
    pub stop_id: String,
    #[serde(rename = "Route_ID")]
    pub route_id: String,
    #[serde(rename = "Passengers_Boarded")]
    pub passengers_boarded: u32,
    #[serde(rename = "Passengers_Left_Behind")]
    pub passengers_left_behind: u32,
    #[serde(rename = "Bus_Capacity")]
    pub bus_capacity: u32,
    #[serde(rename = "Occupancy_Percent")]
    pub occupancy_percent: u32,
    #[serde(rename = "Avg_Waiting_Time_Mins")]
    pub avg_waiting_time_minutes: u32,
    #[serde(rename = "Traffic_Congestion_Level")]
    pub congestion: Congestion,
    #[serde(rename = "Weather")]
    pub weather: Weather,
    #[serde(rename = "Special_Events_Nearby", with = "flag")]
    pub special_event: bool,
    #[serde(rename = "Recommended_Buses")]
    pub recommended_buses: u32,
}

impl DemandRecord {
    pub fn timestamp(&self) -> NaiveDateTime {
        let time = NaiveTime::from_hms_opt(self.hour, 0, 0).unwrap_or(NaiveTime::MIN);
        self.date.and_time(time)
    }
}

/// Forecast and bus count for one step of the planning horizon.
#[derive(Debug, Clone, PartialEq)]
pub struct HorizonPlan {
    pub timestamp: NaiveDateTime,
    pub predicted_demand: f64,
    pub buses: u32,
}

/// Next-three-hours plan for one (route, stop) series.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchRecommendation {
    pub route_id: String,
    pub stop_id: String,
    pub horizons: [HorizonPlan; 3],
    pub reason: String,
    pub bus_capacity: f64,
    pub load_factor: f64,
}

/// Flat CSV shape of a [`DispatchRecommendation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRow {
    #[serde(rename = "Route_ID")]
    pub route_id: String,
    #[serde(rename = "Bus_Stop_ID")]
    pub stop_id: String,
    #[serde(rename = "T+1_Timestamp")]
    pub t1_timestamp: NaiveDateTime,
    #[serde(rename = "T+2_Timestamp")]
    pub t2_timestamp: NaiveDateTime,
    #[serde(rename = "T+3_Timestamp")]
    pub t3_timestamp: NaiveDateTime,
    #[serde(rename = "Pred_t+1")]
    pub pred_1: f64,
    #[serde(rename = "Buses_t+1")]
    pub buses_1: u32,
    #[serde(rename = "Pred_t+2")]
    pub pred_2: f64,
    #[serde(rename = "Buses_t+2")]
    pub buses_2: u32,
    #[serde(rename = "Pred_t+3")]
    pub pred_3: f64,
    #[serde(rename = "Buses_t+3")]
    pub buses_3: u32,
    #[serde(rename = "Dispatch_Reason")]
    pub reason: String,
    #[serde(rename = "Bus_Capacity")]
    pub bus_capacity: f64,
    #[serde(rename = "Load_Factor")]
    pub load_factor: f64,
}

impl From<&DispatchRecommendation> for DispatchRow {
    fn from(rec: &DispatchRecommendation) -> Self {
        let [h1, h2, h3] = &rec.horizons;
        DispatchRow {
            route_id: rec.route_id.clone(),
            stop_id: rec.stop_id.clone(),
            t1_timestamp: h1.timestamp,
            t2_timestamp: h2.timestamp,
            t3_timestamp: h3.timestamp,
            pred_1: h1.predicted_demand,
            buses_1: h1.buses,
            pred_2: h2.predicted_demand,
            buses_2: h2.buses,
            pred_3: h3.predicted_demand,
            buses_3: h3.buses,
            reason: rec.reason.clone(),
            bus_capacity: rec.bus_capacity,
            load_factor: rec.load_factor,
        }
    }
}

impl DispatchRow {
    /// `(timestamp, prediction, buses)` for T+1..T+3.
    pub fn horizons(&self) -> [(NaiveDateTime, f64, u32); 3] {
        [
            (self.t1_timestamp, self.pred_1, self.buses_1),
            (self.t2_timestamp, self.pred_2, self.buses_2),
            (self.t3_timestamp, self.pred_3, self.buses_3),
        ]
    }
}

/// `Time` column: written as `HH:00`, read from `HH:MM` or `HH:MM:SS`.
mod clock_hour {
    use chrono::{NaiveTime, Timelike};
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(hour: &u32, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{:02}:00", hour))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let raw = raw.trim();
        NaiveTime::parse_from_str(raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
            .map(|t| t.hour())
            .map_err(|e| de::Error::custom(format!("invalid time {raw:?}: {e}")))
    }
}

/// `0`/`1` boolean column.
mod flag {
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        match u8::deserialize(deserializer)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(de::Error::custom(format!("expected 0 or 1, got {other}"))),
        }
    }
}

// Used by tests across the crate.
#[cfg(test)]
pub(crate) fn sample_record(stop_id: &str, date: NaiveDate, hour: u32, boarded: u32) -> DemandRecord {
    DemandRecord {
        date,
        hour,
        stop_name: format!("Stop {stop_id}"),
        stop_id: stop_id.to_string(),
        route_id: "365J".to_string(),
        passengers_boarded: boarded,
        passengers_left_behind: 0,
        bus_capacity: 60,
        occupancy_percent: 40,
        avg_waiting_time_minutes: 7,
        congestion: Congestion::Medium,
        weather: Weather::Clear,
        special_event: false,
        recommended_buses: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    #[test]
    fn test_peak_hours() {
        let peaks: Vec<u32> = (0..24).filter(|h| is_peak_hour(*h)).collect();
        assert_eq!(peaks, vec![7, 8, 9, 17, 18, 19, 20]);
    }

    #[test]
    fn test_dataset_row_matches_header() {
        let mut writer = csv::Writer::from_writer(vec![]);
        writer.serialize(sample_record("KBS001", day(), 8, 31)).unwrap();
        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        let mut lines = text.lines();

        assert_eq!(lines.next().unwrap(), DATASET_HEADER.join(","));
        assert_eq!(
            lines.next().unwrap(),
            "2025-03-14,08:00,Stop KBS001,KBS001,365J,31,0,60,40,7,Medium,Clear,0,1"
        );
    }

    #[test]
    fn test_dispatch_row_matches_header() {
        let ts = day().and_hms_opt(9, 0, 0).unwrap();
        let row = DispatchRow {
            route_id: "365J".into(),
            stop_id: "KBS001".into(),
            t1_timestamp: ts,
            t2_timestamp: ts,
            t3_timestamp: ts,
            pred_1: 1.0,
            buses_1: 1,
            pred_2: 2.0,
            buses_2: 1,
            pred_3: 3.0,
            buses_3: 1,
            reason: "r".into(),
            bus_capacity: 60.0,
            load_factor: 0.85,
        };
        let mut writer = csv::Writer::from_writer(vec![]);
        writer.serialize(&row).unwrap();
        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();

        assert_eq!(text.lines().next().unwrap(), DISPATCH_HEADER.join(","));
        assert!(text.contains("2025-03-14T09:00:00"));
    }

    #[test]
    fn test_time_column_accepts_seconds() {
        let data = format!(
            "{}\n2025-03-14,17:00:00,A,A1,365J,1,0,60,2,5,High,Rain,1,1\n",
            DATASET_HEADER.join(",")
        );
        let mut rdr = csv::Reader::from_reader(data.as_bytes());
        let rec: DemandRecord = rdr.deserialize().next().unwrap().unwrap();

        assert_eq!(rec.hour, 17);
        assert!(rec.special_event);
        assert_eq!(rec.weather, Weather::Rain);
        assert_eq!(rec.timestamp(), day().and_hms_opt(17, 0, 0).unwrap());
    }

    #[test]
    fn test_flag_rejects_other_values() {
        let data = format!(
            "{}\n2025-03-14,17:00,A,A1,365J,1,0,60,2,5,High,Rain,2,1\n",
            DATASET_HEADER.join(",")
        );
        let mut rdr = csv::Reader::from_reader(data.as_bytes());
        let rec: Result<DemandRecord, _> = rdr.deserialize().next().unwrap();
        assert!(rec.is_err());
    }
}
