//! Hand-maintained lookup tables: agencies, line colours, station orderings.
//!
//! The built-in [`ReferenceData::singapore`] set can be replaced wholesale by
//! a JSON document of the same shape, so a network change does not need a
//! rebuild.

use std::collections::BTreeMap;
use std::path::Path;

use gtfs_synth_model::{Agency, FeedInfo, GtfsColor, GtfsDate, Route, RouteType};
use serde::{Deserialize, Serialize};

use crate::config::CalendarConfig;
use crate::error::ConfigError;
use crate::records::StopRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgencyReference {
    pub id: String,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusRouteDefaults {
    /// Prepended to the service number to form `route_long_name`.
    pub long_name_prefix: String,
    pub color: GtfsColor,
    pub route_type: RouteType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RailLine {
    pub code: String,
    pub agency: String,
    pub name: String,
    pub color: GtfsColor,
    /// Station codes in travel order of direction 0. Empty for lines whose
    /// ordering is not known; those get a route but no trips.
    #[serde(default)]
    pub stations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedReference {
    pub publisher_name: String,
    pub publisher_url: String,
    pub version: String,
    pub contact_url: Option<String>,
    pub contact_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceData {
    pub version: String,
    pub timezone: String,
    pub language: String,
    pub agencies: Vec<AgencyReference>,
    /// Source operator code to agency id.
    pub operators: BTreeMap<String, String>,
    pub default_agency: String,
    pub bus_routes: BusRouteDefaults,
    pub rail_lines: Vec<RailLine>,
    /// Stops added after all sourced stops, unless their id is already taken.
    #[serde(default)]
    pub supplemental_stops: Vec<StopRecord>,
    pub feed: FeedReference,
}

impl Default for ReferenceData {
    fn default() -> Self {
        Self::singapore()
    }
}

impl ReferenceData {
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

    pub fn agency_for_operator(&self, operator: &str) -> &str {
        self.operators
            .get(operator.trim())
            .map(String::as_str)
            .unwrap_or(&self.default_agency)
    }

    pub fn gtfs_agencies(&self) -> Vec<Agency> {
        self.agencies
            .iter()
            .map(|agency| Agency {
                agency_id: Some(agency.id.clone()),
                agency_name: agency.name.clone(),
                agency_url: agency.url.clone(),
                agency_timezone: self.timezone.clone(),
                agency_lang: Some(self.language.clone()),
            })
            .collect()
    }

    pub fn bus_route(&self, route_id: &str, operator: &str) -> Route {
        Route {
            route_id: route_id.to_string(),
            agency_id: Some(self.agency_for_operator(operator).to_string()),
            route_short_name: Some(route_id.to_string()),
            route_long_name: Some(format!("{}{}", self.bus_routes.long_name_prefix, route_id)),
            route_type: self.bus_routes.route_type,
            route_color: Some(self.bus_routes.color),
        }
    }

    pub fn rail_routes(&self) -> impl Iterator<Item = Route> + '_ {
        self.rail_lines.iter().map(|line| Route {
            route_id: line.code.clone(),
            agency_id: Some(line.agency.clone()),
            route_short_name: Some(line.code.clone()),
            route_long_name: Some(line.name.clone()),
            route_type: RouteType::Subway,
            route_color: Some(line.color),
        })
    }

    pub fn feed_info(&self, calendar: &CalendarConfig) -> FeedInfo {
        FeedInfo {
            feed_publisher_name: self.feed.publisher_name.clone(),
            feed_publisher_url: self.feed.publisher_url.clone(),
            feed_lang: self.language.clone(),
            feed_start_date: Some(GtfsDate::from(calendar.start_date)),
            feed_end_date: Some(GtfsDate::from(calendar.end_date)),
            feed_version: Some(self.feed.version.clone()),
            feed_contact_url: self.feed.contact_url.clone(),
            feed_contact_email: self.feed.contact_email.clone(),
        }
    }

    /// Singapore bus and rail network as of 2025.
    pub fn singapore() -> Self {
        let agency = |id: &str, name: &str, url: &str| AgencyReference {
            id: id.into(),
            name: name.into(),
            url: url.into(),
        };
        let line = |code: &str, agency: &str, name: &str, rgb: (u8, u8, u8), stations| RailLine {
            code: code.into(),
            agency: agency.into(),
            name: name.into(),
            color: GtfsColor::new(rgb.0, rgb.1, rgb.2),
            stations,
        };
        let lrt_grey = (0x74, 0x84, 0x77);

        Self {
            version: "2025.1".into(),
            timezone: "Asia/Singapore".into(),
            language: "en".into(),
            agencies: vec![
                agency("LTA", "Land Transport Authority", "https://www.lta.gov.sg"),
                agency("SBST", "SBS Transit", "https://www.sbstransit.com.sg"),
                agency("SMRT", "SMRT Corporation", "https://www.smrt.com.sg"),
                agency("TTS", "Tower Transit Singapore", "https://towertransit.sg"),
                agency("GAS", "Go-Ahead Singapore", "https://www.go-aheadsingapore.com"),
            ],
            operators: ["SBST", "SMRT", "TTS", "GAS", "LTA"]
                .iter()
                .map(|code| (code.to_string(), code.to_string()))
                .collect(),
            default_agency: "LTA".into(),
            bus_routes: BusRouteDefaults {
                long_name_prefix: "Bus Service ".into(),
                color: GtfsColor::new(0x44, 0x44, 0x44),
                route_type: RouteType::Bus,
            },
            rail_lines: vec![
                line(
                    "NS",
                    "SMRT",
                    "North-South Line",
                    (0xD4, 0x2E, 0x12),
                    numbered("NS", (1..=28).filter(|n| *n != 6 && *n != 18)),
                ),
                line(
                    "EW",
                    "SMRT",
                    "East-West Line",
                    (0x00, 0x96, 0x45),
                    numbered("EW", 1..=33),
                ),
                line(
                    "NE",
                    "SBST",
                    "North East Line",
                    (0x8F, 0x41, 0x99),
                    numbered("NE", (1..=18).filter(|n| *n != 2)),
                ),
                line(
                    "CC",
                    "SMRT",
                    "Circle Line",
                    (0xFA, 0x9E, 0x0D),
                    numbered("CC", (1..=29).filter(|n| *n != 18)),
                ),
                line(
                    "DT",
                    "SBST",
                    "Downtown Line",
                    (0x00, 0x5E, 0xC4),
                    numbered("DT", (1..=35).filter(|n| *n != 4)),
                ),
                line(
                    "TE",
                    "SMRT",
                    "Thomson-East Coast Line",
                    (0x9D, 0x5B, 0x25),
                    numbered("TE", (1..=29).filter(|n| *n != 21)),
                ),
                line("BP", "SMRT", "Bukit Panjang LRT", lrt_grey, Vec::new()),
                line("SK", "SBST", "Sengkang LRT", lrt_grey, Vec::new()),
                line("PG", "SBST", "Punggol LRT", lrt_grey, Vec::new()),
            ],
            supplemental_stops: vec![StopRecord {
                id: "NE18".into(),
                name: "Punggol Coast NE18".into(),
                lat: Some(1.4251),
                lon: Some(103.9056),
            }],
            feed: FeedReference {
                publisher_name: "Singapore GTFS".into(),
                publisher_url: "https://github.com/thecrapone/singapore-gtfs-2025".into(),
                version: "1.0".into(),
                contact_url: Some(
                    "https://github.com/thecrapone/singapore-gtfs-2025/issues".into(),
                ),
                contact_email: Some("support@example.com".into()),
            },
        }
    }
}

fn numbered(prefix: &str, numbers: impl Iterator<Item = u32>) -> Vec<String> {
    numbers.map(|n| format!("{prefix}{n}")).collect()
}
