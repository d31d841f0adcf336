//! Source-neutral records consumed by the synthesis core.
//!
//! Loaders (see [`crate::source`]) translate provider-specific payloads into
//! these shapes; nothing downstream knows where the data came from.

use chrono::Weekday;
use serde::{Deserialize, Serialize};

/// Weekly operating pattern. Each maps onto one `calendar.txt` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DayType {
    Weekday,
    Saturday,
    Sunday,
}

impl DayType {
    pub const ALL: [DayType; 3] = [DayType::Weekday, DayType::Saturday, DayType::Sunday];

    pub fn service_id(&self) -> &'static str {
        match self {
            DayType::Weekday => "WD",
            DayType::Saturday => "SAT",
            DayType::Sunday => "SUN",
        }
    }

    pub fn runs_on(&self, weekday: Weekday) -> bool {
        match self {
            DayType::Weekday => !matches!(weekday, Weekday::Sat | Weekday::Sun),
            DayType::Saturday => weekday == Weekday::Sat,
            DayType::Sunday => weekday == Weekday::Sun,
        }
    }
}

/// A point stop, e.g. a bus stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopRecord {
    pub id: String,
    pub name: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

/// A station that may carry several line codes ("NS24,NE6,CC1").
#[derive(Debug, Clone, PartialEq)]
pub struct StationRecord {
    pub name: String,
    pub codes: Vec<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl StationRecord {
    pub fn parse_codes(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Raw first/last departure strings (`HHMM`) for one day type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceTimes {
    pub first: Option<String>,
    pub last: Option<String>,
}

/// One stop of one route direction.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceRecord {
    pub route_id: String,
    pub direction: String,
    pub stop_id: String,
    pub sequence: u32,
    pub distance_km: Option<f64>,
    pub weekday: ServiceTimes,
    pub saturday: ServiceTimes,
    pub sunday: ServiceTimes,
}

/// Service metadata for one route direction.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRecord {
    pub route_id: String,
    pub direction: String,
    pub operator: String,
    pub headway: String,
}

#[derive(Debug, Clone, Default)]
pub struct SourceData {
    pub stops: Vec<StopRecord>,
    pub stations: Vec<StationRecord>,
    pub sequences: Vec<SequenceRecord>,
    pub services: Vec<ServiceRecord>,
}
