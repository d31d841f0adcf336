//! Loading of LTA DataMall exports and the rail station GeoJSON layer.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use tracing::{debug, info};

use crate::error::SourceError;
use crate::records::{
    ServiceRecord, ServiceTimes, SequenceRecord, SourceData, StationRecord, StopRecord,
};

pub const BUS_STOPS_FILE: &str = "bus_stops.json";
pub const BUS_SERVICES_FILE: &str = "bus_services.json";
pub const BUS_ROUTES_FILE: &str = "bus_routes.json";
pub const RAIL_DATA_FILE: &str = "rail_data.json";

/// Headway assumed for a service whose record carries no `AM_Peak_Freq`.
const DEFAULT_PEAK_FREQUENCY: &str = "12-15";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LtaBusStop {
    #[serde(deserialize_with = "string_or_number")]
    pub bus_stop_code: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LtaBusService {
    #[serde(deserialize_with = "string_or_number")]
    pub service_no: String,
    #[serde(default)]
    pub operator: String,
    #[serde(deserialize_with = "string_or_number")]
    pub direction: String,
    #[serde(rename = "AM_Peak_Freq", default = "default_peak_frequency")]
    pub am_peak_freq: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LtaBusRoute {
    #[serde(deserialize_with = "string_or_number")]
    pub service_no: String,
    #[serde(deserialize_with = "string_or_number")]
    pub direction: String,
    pub stop_sequence: u32,
    #[serde(deserialize_with = "string_or_number")]
    pub bus_stop_code: String,
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(rename = "WD_FirstBus", default)]
    pub wd_first_bus: Option<String>,
    #[serde(rename = "WD_LastBus", default)]
    pub wd_last_bus: Option<String>,
    #[serde(rename = "SAT_FirstBus", default)]
    pub sat_first_bus: Option<String>,
    #[serde(rename = "SAT_LastBus", default)]
    pub sat_last_bus: Option<String>,
    #[serde(rename = "SUN_FirstBus", default)]
    pub sun_first_bus: Option<String>,
    #[serde(rename = "SUN_LastBus", default)]
    pub sun_last_bus: Option<String>,
}

impl From<LtaBusStop> for StopRecord {
    fn from(stop: LtaBusStop) -> Self {
        StopRecord {
            id: stop.bus_stop_code,
            name: stop.description,
            lat: stop.latitude,
            lon: stop.longitude,
        }
    }
}

impl From<LtaBusService> for ServiceRecord {
    fn from(service: LtaBusService) -> Self {
        ServiceRecord {
            route_id: service.service_no,
            direction: service.direction,
            operator: service.operator,
            headway: service.am_peak_freq,
        }
    }
}

impl From<LtaBusRoute> for SequenceRecord {
    fn from(route: LtaBusRoute) -> Self {
        SequenceRecord {
            route_id: route.service_no,
            direction: route.direction,
            stop_id: route.bus_stop_code,
            sequence: route.stop_sequence,
            distance_km: route.distance,
            weekday: ServiceTimes {
                first: route.wd_first_bus,
                last: route.wd_last_bus,
            },
            saturday: ServiceTimes {
                first: route.sat_first_bus,
                last: route.sat_last_bus,
            },
            sunday: ServiceTimes {
                first: route.sun_first_bus,
                last: route.sun_last_bus,
            },
        }
    }
}

/// DataMall responses wrap records in `{"value": [...]}`; saved exports are
/// plain arrays. Both are accepted.
#[derive(Deserialize)]
#[serde(untagged)]
enum Payload<T> {
    Records(Vec<T>),
    Wrapped { value: Vec<T> },
}

impl<T> Payload<T> {
    fn into_records(self) -> Vec<T> {
        match self {
            Payload::Records(records) | Payload::Wrapped { value: records } => records,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    properties: FeatureProperties,
    #[serde(default)]
    geometry: Option<Geometry>,
}

#[derive(Debug, Default, Deserialize)]
struct FeatureProperties {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    stop_type: Option<String>,
    #[serde(default)]
    station_codes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    /// `[lon, lat]`
    #[serde(default)]
    coordinates: Vec<f64>,
}

impl Feature {
    fn into_station(self) -> Option<StationRecord> {
        if self.properties.stop_type.as_deref() != Some("station") {
            return None;
        }
        let coordinates = self.geometry.map(|g| g.coordinates).unwrap_or_default();
        let (lon, lat) = match coordinates.as_slice() {
            [lon, lat, ..] => (Some(*lon), Some(*lat)),
            _ => (None, None),
        };
        Some(StationRecord {
            name: self.properties.name.unwrap_or_default(),
            codes: StationRecord::parse_codes(
                self.properties.station_codes.as_deref().unwrap_or_default(),
            ),
            lat,
            lon,
        })
    }
}

fn default_peak_frequency() -> String {
    DEFAULT_PEAK_FREQUENCY.to_string()
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        String(String),
        Integer(i64),
        Float(f64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::String(value) => value,
        Raw::Integer(value) => value.to_string(),
        Raw::Float(value) => value.to_string(),
    })
}

pub fn parse_bus_stops(json: &str) -> Result<Vec<StopRecord>, serde_json::Error> {
    parse_records::<LtaBusStop, StopRecord>(json)
}

pub fn parse_bus_services(json: &str) -> Result<Vec<ServiceRecord>, serde_json::Error> {
    parse_records::<LtaBusService, ServiceRecord>(json)
}

pub fn parse_bus_routes(json: &str) -> Result<Vec<SequenceRecord>, serde_json::Error> {
    parse_records::<LtaBusRoute, SequenceRecord>(json)
}

/// Stations from the GeoJSON layer; non-station features are ignored.
pub fn parse_rail_stations(json: &str) -> Result<Vec<StationRecord>, serde_json::Error> {
    let collection: FeatureCollection = serde_json::from_str(json)?;
    Ok(collection
        .features
        .into_iter()
        .filter_map(Feature::into_station)
        .collect())
}

fn parse_records<S, T>(json: &str) -> Result<Vec<T>, serde_json::Error>
where
    S: DeserializeOwned,
    T: From<S>,
{
    let payload: Payload<S> = serde_json::from_str(json)?;
    Ok(payload.into_records().into_iter().map(T::from).collect())
}

fn read_source(dir: &Path, file: &str) -> Result<String, SourceError> {
    let path = dir.join(file);
    if !path.is_file() {
        return Err(SourceError::MissingFile(file.to_string()));
    }
    debug!(file, "reading source file");
    std::fs::read_to_string(&path).map_err(|source| SourceError::Io {
        file: file.to_string(),
        source,
    })
}

fn json_error(file: &str) -> impl FnOnce(serde_json::Error) -> SourceError + '_ {
    move |source| SourceError::Json {
        file: file.to_string(),
        source,
    }
}

/// Reads all four source files from `dir`. Any missing or malformed file is
/// fatal.
pub fn load_dir(dir: &Path) -> Result<SourceData, SourceError> {
    if !dir.is_dir() {
        return Err(SourceError::NotADirectory(dir.to_path_buf()));
    }
    let data = SourceData {
        stops: parse_bus_stops(&read_source(dir, BUS_STOPS_FILE)?)
            .map_err(json_error(BUS_STOPS_FILE))?,
        services: parse_bus_services(&read_source(dir, BUS_SERVICES_FILE)?)
            .map_err(json_error(BUS_SERVICES_FILE))?,
        sequences: parse_bus_routes(&read_source(dir, BUS_ROUTES_FILE)?)
            .map_err(json_error(BUS_ROUTES_FILE))?,
        stations: parse_rail_stations(&read_source(dir, RAIL_DATA_FILE)?)
            .map_err(json_error(RAIL_DATA_FILE))?,
    };
    info!(
        stops = data.stops.len(),
        services = data.services.len(),
        sequences = data.sequences.len(),
        stations = data.stations.len(),
        "source data loaded"
    );
    Ok(data)
}
