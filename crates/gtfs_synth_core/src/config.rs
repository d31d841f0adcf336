use std::path::Path;

use chrono::NaiveDate;
use gtfs_synth_model::GtfsTime;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_SINK_BUFFER_SIZE: usize = 100_000;
pub const DEFAULT_ARCHIVE_NAME: &str = "singapore-gtfs.zip";

/// Tunables for one synthesis run. Every field has a default, so a config
/// file only needs the values it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub bus: BusTimingConfig,
    pub limits: PhysicalLimits,
    pub rail: RailTimingConfig,
    pub calendar: CalendarConfig,
    pub sink_buffer_size: usize,
    pub archive_name: String,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            bus: BusTimingConfig::default(),
            limits: PhysicalLimits::default(),
            rail: RailTimingConfig::default(),
            calendar: CalendarConfig::default(),
            sink_buffer_size: DEFAULT_SINK_BUFFER_SIZE,
            archive_name: DEFAULT_ARCHIVE_NAME.to_string(),
        }
    }
}

impl SynthesisConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// How the per-stop distance of a sequence record is to be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMode {
    /// Distance from the first stop of the route (LTA `Distance`).
    #[default]
    Cumulative,
    /// Distance from the preceding stop; summed along the route.
    FromPrevious,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusTimingConfig {
    /// Nominal travel time per kilometre. 144 s/km is 25 km/h.
    pub seconds_per_km: f64,
    pub fallback_first_departure: GtfsTime,
    pub fallback_last_departure: GtfsTime,
    pub fallback_headway_minutes: f64,
    pub distance_mode: DistanceMode,
    /// Distances beyond this, or not finite, are treated as missing.
    pub max_distance_km: f64,
}

impl Default for BusTimingConfig {
    fn default() -> Self {
        Self {
            seconds_per_km: 144.0,
            fallback_first_departure: GtfsTime::from_hms(5, 30, 0),
            fallback_last_departure: GtfsTime::from_hms(23, 30, 0),
            fallback_headway_minutes: 15.0,
            distance_mode: DistanceMode::Cumulative,
            max_distance_km: 1000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicalLimits {
    /// Gap forced between two visits whose nominal times do not increase.
    pub min_increment_secs: i32,
    /// 1.33 km/min.
    pub max_speed_kmh: f64,
}

impl Default for PhysicalLimits {
    fn default() -> Self {
        Self {
            min_increment_secs: 30,
            max_speed_kmh: 79.8,
        }
    }
}

impl PhysicalLimits {
    /// Shortest whole number of seconds in which `distance_km` can be
    /// covered without exceeding the speed ceiling.
    pub fn min_travel_secs(&self, distance_km: f64) -> i32 {
        if distance_km <= 0.0 || self.max_speed_kmh <= 0.0 {
            return 0;
        }
        (distance_km * 3600.0 / self.max_speed_kmh).ceil() as i32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakWindow {
    pub start: GtfsTime,
    pub end: GtfsTime,
}

impl PeakWindow {
    pub fn contains(&self, seconds: i32) -> bool {
        (self.start.total_seconds()..=self.end.total_seconds()).contains(&seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RailTimingConfig {
    pub first_departure: GtfsTime,
    pub last_departure: GtfsTime,
    pub peak_windows: Vec<PeakWindow>,
    pub peak_headway_minutes: u32,
    pub off_peak_headway_minutes: u32,
    pub minutes_per_station: u32,
}

impl Default for RailTimingConfig {
    fn default() -> Self {
        Self {
            first_departure: GtfsTime::from_hms(5, 30, 0),
            last_departure: GtfsTime::from_hms(23, 30, 0),
            peak_windows: vec![
                PeakWindow {
                    start: GtfsTime::from_hms(7, 0, 0),
                    end: GtfsTime::from_hms(9, 0, 0),
                },
                PeakWindow {
                    start: GtfsTime::from_hms(17, 0, 0),
                    end: GtfsTime::from_hms(20, 0, 0),
                },
            ],
            peak_headway_minutes: 3,
            off_peak_headway_minutes: 6,
            minutes_per_station: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap_or_default(),
            end_date: NaiveDate::from_ymd_opt(2030, 12, 31).unwrap_or_default(),
        }
    }
}
