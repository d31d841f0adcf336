use std::collections::HashMap;

use gtfs_synth_model::{LocationType, Stop};

use crate::records::{StationRecord, StopRecord};

#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredStop {
    pub id: String,
    pub name: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl RegisteredStop {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.lat?, self.lon?))
    }

    pub fn to_gtfs(&self) -> Stop {
        Stop {
            stop_id: self.id.clone(),
            stop_name: Some(self.name.clone()),
            stop_lat: self.lat,
            stop_lon: self.lon,
            location_type: LocationType::StopOrPlatform,
            parent_station: None,
        }
    }
}

impl From<&StopRecord> for RegisteredStop {
    fn from(record: &StopRecord) -> Self {
        Self {
            id: record.id.trim().to_string(),
            name: record.name.clone(),
            lat: record.lat,
            lon: record.lon,
        }
    }
}

/// Deduplicated set of canonical stops, iterated in insertion order.
///
/// The first record inserted under an id wins; later candidates with the same
/// id are rejected, so callers insert higher-priority sources first.
#[derive(Debug, Default, Clone)]
pub struct StopRegistry {
    stops: Vec<RegisteredStop>,
    index: HashMap<String, usize>,
}

impl StopRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the candidate was newly added.
    pub fn insert(&mut self, candidate: RegisteredStop) -> bool {
        if candidate.id.is_empty() || self.index.contains_key(&candidate.id) {
            return false;
        }
        self.index.insert(candidate.id.clone(), self.stops.len());
        self.stops.push(candidate);
        true
    }

    /// Inserts one stop per line code of an interchange station. Returns the
    /// number of codes that were new.
    pub fn insert_station(&mut self, station: &StationRecord) -> usize {
        station
            .codes
            .iter()
            .filter(|code| {
                self.insert(RegisteredStop {
                    id: code.to_string(),
                    name: format!("{} {}", station.name, code),
                    lat: station.lat,
                    lon: station.lon,
                })
            })
            .count()
    }

    pub fn exists(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&RegisteredStop> {
        self.index.get(id).map(|&position| &self.stops[position])
    }

    pub fn coordinates(&self, id: &str) -> Option<(f64, f64)> {
        self.get(id)?.coordinates()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredStop> {
        self.stops.iter()
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    pub fn gtfs_stops(&self) -> impl Iterator<Item = Stop> + '_ {
        self.stops.iter().map(RegisteredStop::to_gtfs)
    }
}
