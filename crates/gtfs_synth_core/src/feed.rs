use std::path::Path;

use gtfs_synth_model::{
    Agency, Calendar, FeedInfo, GtfsDate, Route, ServiceAvailability, Stop, StopTime, Trip,
};
use serde::Serialize;

use crate::config::CalendarConfig;
use crate::error::SinkError;
use crate::records::DayType;
use crate::sink::{BatchWriter, CsvTableWriter};

pub const AGENCY_FILE: &str = "agency.txt";
pub const STOPS_FILE: &str = "stops.txt";
pub const ROUTES_FILE: &str = "routes.txt";
pub const TRIPS_FILE: &str = "trips.txt";
pub const STOP_TIMES_FILE: &str = "stop_times.txt";
pub const CALENDAR_FILE: &str = "calendar.txt";
pub const FEED_INFO_FILE: &str = "feed_info.txt";

/// Tables of a generated feed, in archive order.
pub const FEED_FILE_NAMES: &[&str] = &[
    AGENCY_FILE,
    CALENDAR_FILE,
    STOPS_FILE,
    ROUTES_FILE,
    TRIPS_FILE,
    STOP_TIMES_FILE,
    FEED_INFO_FILE,
];

/// A row type with a fixed file name and column list.
pub trait GtfsTable: Serialize {
    const FILE_NAME: &'static str;
    const HEADERS: &'static [&'static str];
}

impl GtfsTable for Agency {
    const FILE_NAME: &'static str = AGENCY_FILE;
    const HEADERS: &'static [&'static str] = &[
        "agency_id",
        "agency_name",
        "agency_url",
        "agency_timezone",
        "agency_lang",
    ];
}

impl GtfsTable for Stop {
    const FILE_NAME: &'static str = STOPS_FILE;
    const HEADERS: &'static [&'static str] = &[
        "stop_id",
        "stop_name",
        "stop_lat",
        "stop_lon",
        "location_type",
        "parent_station",
    ];
}

impl GtfsTable for Route {
    const FILE_NAME: &'static str = ROUTES_FILE;
    const HEADERS: &'static [&'static str] = &[
        "route_id",
        "agency_id",
        "route_short_name",
        "route_long_name",
        "route_type",
        "route_color",
    ];
}

impl GtfsTable for Trip {
    const FILE_NAME: &'static str = TRIPS_FILE;
    const HEADERS: &'static [&'static str] = &[
        "route_id",
        "service_id",
        "trip_id",
        "trip_headsign",
        "direction_id",
    ];
}

impl GtfsTable for StopTime {
    const FILE_NAME: &'static str = STOP_TIMES_FILE;
    const HEADERS: &'static [&'static str] = &[
        "trip_id",
        "arrival_time",
        "departure_time",
        "stop_id",
        "stop_sequence",
    ];
}

impl GtfsTable for Calendar {
    const FILE_NAME: &'static str = CALENDAR_FILE;
    const HEADERS: &'static [&'static str] = &[
        "service_id",
        "monday",
        "tuesday",
        "wednesday",
        "thursday",
        "friday",
        "saturday",
        "sunday",
        "start_date",
        "end_date",
    ];
}

impl GtfsTable for FeedInfo {
    const FILE_NAME: &'static str = FEED_INFO_FILE;
    const HEADERS: &'static [&'static str] = &[
        "feed_publisher_name",
        "feed_publisher_url",
        "feed_lang",
        "feed_start_date",
        "feed_end_date",
        "feed_version",
        "feed_contact_url",
        "feed_contact_email",
    ];
}

/// Opens the CSV file for a table inside `dir`, header included.
pub fn table_writer<T: GtfsTable>(dir: &Path) -> Result<CsvTableWriter, SinkError> {
    CsvTableWriter::create(&dir.join(T::FILE_NAME), T::HEADERS)
}

/// Writes a complete table in one batch. Returns the row count.
pub fn write_table<T: GtfsTable>(dir: &Path, rows: &[T]) -> Result<usize, SinkError> {
    let mut writer = table_writer::<T>(dir)?;
    writer.write_batch(rows)?;
    BatchWriter::<T>::finish(&mut writer)?;
    Ok(rows.len())
}

/// One calendar row per day type, all sharing the configured validity range.
pub fn calendar_rows(config: &CalendarConfig) -> Vec<Calendar> {
    use chrono::Weekday::*;

    DayType::ALL
        .iter()
        .map(|day| {
            let runs = |weekday| ServiceAvailability::from(day.runs_on(weekday));
            Calendar {
                service_id: day.service_id().to_string(),
                monday: runs(Mon),
                tuesday: runs(Tue),
                wednesday: runs(Wed),
                thursday: runs(Thu),
                friday: runs(Fri),
                saturday: runs(Sat),
                sunday: runs(Sun),
                start_date: GtfsDate::from(config.start_date),
                end_date: GtfsDate::from(config.end_date),
            }
        })
        .collect()
}
