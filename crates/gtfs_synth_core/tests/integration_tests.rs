use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use gtfs_synth_core::geo::haversine_km;
use gtfs_synth_core::{
    load_dir, FeedAssembler, ReferenceData, SourceError, SynthesisConfig, FEED_FILE_NAMES,
};
use gtfs_synth_model::{GtfsTime, Stop, StopTime, Trip};

const BUS_STOPS: &str = r#"[
  {"BusStopCode": "01012", "RoadName": "Victoria St", "Description": "Hotel Grand Pacific",
   "Latitude": 1.29684825487647, "Longitude": 103.85253591654006},
  {"BusStopCode": "01013", "RoadName": "Victoria St", "Description": "St. Joseph's Church",
   "Latitude": 1.29770970610083, "Longitude": 103.8532247463225},
  {"BusStopCode": "01019", "RoadName": "Victoria St", "Description": "Bras Basah Cplx",
   "Latitude": 1.29698951191332, "Longitude": 103.85302201172507},
  {"BusStopCode": "01012", "RoadName": "Duplicate", "Description": "Ignored",
   "Latitude": 0.0, "Longitude": 0.0}
]"#;

const BUS_SERVICES: &str = r#"{"odata.metadata": "BusServices", "value": [
  {"ServiceNo": "10", "Operator": "SBST", "Direction": 1, "AM_Peak_Freq": "15"},
  {"ServiceNo": "10", "Operator": "SBST", "Direction": 2, "AM_Peak_Freq": "abc"},
  {"ServiceNo": "NR1", "Operator": "XYZ", "Direction": 1, "AM_Peak_Freq": "30-30"}
]}"#;

const BUS_ROUTES: &str = r#"[
  {"ServiceNo": "10", "Direction": 1, "StopSequence": 2, "BusStopCode": "01013", "Distance": 2.0},
  {"ServiceNo": "10", "Direction": 1, "StopSequence": 1, "BusStopCode": "01012", "Distance": 0,
   "WD_FirstBus": "0530", "WD_LastBus": "0545", "SAT_FirstBus": "0600", "SAT_LastBus": "0700",
   "SUN_FirstBus": "0600", "SUN_LastBus": "0600"},
  {"ServiceNo": "10", "Direction": 2, "StopSequence": 1, "BusStopCode": "01013", "Distance": 0,
   "WD_FirstBus": "2330", "WD_LastBus": "0015", "SAT_FirstBus": "-", "SAT_LastBus": "-",
   "SUN_FirstBus": "0600", "SUN_LastBus": "0630"},
  {"ServiceNo": "10", "Direction": 2, "StopSequence": 2, "BusStopCode": "99999", "Distance": 0.3},
  {"ServiceNo": "10", "Direction": 2, "StopSequence": 3, "BusStopCode": "01019", "Distance": 0.3},
  {"ServiceNo": "10", "Direction": 2, "StopSequence": 4, "BusStopCode": "01012", "Distance": 0.3},
  {"ServiceNo": "NR1", "Direction": 1, "StopSequence": 1, "BusStopCode": "01019", "Distance": 0,
   "WD_FirstBus": "0100", "WD_LastBus": "0200", "SAT_FirstBus": "0100", "SAT_LastBus": "0200",
   "SUN_FirstBus": "0100", "SUN_LastBus": "0200"},
  {"ServiceNo": "NR1", "Direction": 1, "StopSequence": 2, "BusStopCode": "01012", "Distance": 0.01},
  {"ServiceNo": "99", "Direction": 1, "StopSequence": 1, "BusStopCode": "01012", "Distance": 0}
]"#;

const RAIL_DATA: &str = r#"{"type": "FeatureCollection", "features": [
  {"type": "Feature", "properties": {"name": "Jurong East", "stop_type": "station",
   "station_codes": "NS1,EW24"}, "geometry": {"type": "Point", "coordinates": [103.7422, 1.3332]}},
  {"type": "Feature", "properties": {"name": "Bukit Batok", "stop_type": "station",
   "station_codes": "NS2"}, "geometry": {"type": "Point", "coordinates": [103.7496, 1.3490]}},
  {"type": "Feature", "properties": {"name": "Bukit Gombak", "stop_type": "station",
   "station_codes": "NS3"}, "geometry": {"type": "Point", "coordinates": [103.7518, 1.3587]}},
  {"type": "Feature", "properties": {"name": "Jurong East Exit A", "stop_type": "entrance"},
   "geometry": {"type": "Point", "coordinates": [103.7420, 1.3330]}}
]}"#;

fn temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time")
        .as_nanos();
    std::env::temp_dir().join(format!("{}_{}_{}", prefix, std::process::id(), nanos))
}

fn write_file(dir: &Path, name: &str, contents: &str) {
    fs::write(dir.join(name), contents).expect("write file");
}

fn source_dir(prefix: &str) -> PathBuf {
    let dir = temp_dir(prefix);
    fs::create_dir_all(&dir).expect("create dir");
    write_file(&dir, "bus_stops.json", BUS_STOPS);
    write_file(&dir, "bus_services.json", BUS_SERVICES);
    write_file(&dir, "bus_routes.json", BUS_ROUTES);
    write_file(&dir, "rail_data.json", RAIL_DATA);
    dir
}

fn test_config() -> SynthesisConfig {
    SynthesisConfig {
        sink_buffer_size: 50,
        ..SynthesisConfig::default()
    }
}

fn read_rows<T: serde::de::DeserializeOwned>(path: &Path) -> Vec<T> {
    csv::Reader::from_path(path)
        .expect("open table")
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .expect("parse table")
}

struct Generated {
    dir: PathBuf,
    stops: Vec<Stop>,
    trips: Vec<Trip>,
    stop_times: Vec<StopTime>,
}

fn generate(prefix: &str) -> (Generated, gtfs_synth_core::AssemblyOutcome) {
    let input = source_dir(prefix);
    let output = input.join("gtfs");
    let config = test_config();
    let reference = ReferenceData::singapore();

    let source = load_dir(&input).expect("load source");
    let outcome = FeedAssembler::new(&config, &reference)
        .assemble(&source, &output)
        .expect("assemble feed");

    let generated = Generated {
        stops: read_rows(&output.join("stops.txt")),
        trips: read_rows(&output.join("trips.txt")),
        stop_times: read_rows(&output.join("stop_times.txt")),
        dir: output,
    };
    (generated, outcome)
}

fn arrivals_of<'a>(stop_times: &'a [StopTime], trip_id: &str) -> Vec<(&'a str, String)> {
    stop_times
        .iter()
        .filter(|st| st.trip_id == trip_id)
        .map(|st| {
            (
                st.stop_id.as_str(),
                st.arrival_time.map(|t| t.to_string()).unwrap_or_default(),
            )
        })
        .collect()
}

#[test]
fn writes_every_table_and_packages_them() {
    let (generated, outcome) = generate("gtfs_synth_tables");

    for name in FEED_FILE_NAMES {
        assert!(generated.dir.join(name).is_file(), "{name} missing");
    }

    let archive_path = outcome.summary.archive.clone().expect("archive written");
    let archive = zip::ZipArchive::new(fs::File::open(&archive_path).expect("open zip"))
        .expect("read zip");
    let mut names: Vec<_> = archive.file_names().map(str::to_string).collect();
    names.sort();
    let mut expected: Vec<_> = FEED_FILE_NAMES.iter().map(|n| n.to_string()).collect();
    expected.sort();
    assert_eq!(names, expected);

    assert_eq!(outcome.summary.trips, generated.trips.len());
    assert_eq!(outcome.summary.stop_times, generated.stop_times.len());
    assert_eq!(outcome.summary.stops, generated.stops.len());
    assert!(outcome.summary.sink_flushes > 2);

    let agency = fs::read_to_string(generated.dir.join("agency.txt")).expect("agency");
    assert!(agency.starts_with("agency_id,agency_name,agency_url,agency_timezone,agency_lang\n"));
    assert!(agency.contains("SBST,SBS Transit,https://www.sbstransit.com.sg,Asia/Singapore,en\n"));
    let calendar = fs::read_to_string(generated.dir.join("calendar.txt")).expect("calendar");
    assert_eq!(calendar.lines().count(), 4);
    let feed_info = fs::read_to_string(generated.dir.join("feed_info.txt")).expect("feed info");
    assert!(feed_info.contains("Singapore GTFS,"));
    assert!(feed_info.contains(",20250101,20301231,1.0,"));
}

#[test]
fn stop_registry_deduplicates_and_splits_stations() {
    let (generated, _) = generate("gtfs_synth_stops");

    let ids: Vec<_> = generated.stops.iter().map(|s| s.stop_id.as_str()).collect();
    assert_eq!(
        ids,
        vec!["01012", "01013", "01019", "NS1", "EW24", "NS2", "NS3", "NE18"]
    );
    let hotel = &generated.stops[0];
    assert_eq!(hotel.stop_name.as_deref(), Some("Hotel Grand Pacific"));
    assert_eq!(hotel.stop_lat, Some(1.29684825487647));
    let jurong = generated.stops.iter().find(|s| s.stop_id == "EW24").expect("EW24");
    assert_eq!(jurong.stop_name.as_deref(), Some("Jurong East EW24"));
}

#[test]
fn every_reference_resolves() {
    let (generated, _) = generate("gtfs_synth_integrity");
    let stop_ids: HashSet<_> = generated.stops.iter().map(|s| s.stop_id.as_str()).collect();
    let trip_ids: HashSet<_> = generated.trips.iter().map(|t| t.trip_id.as_str()).collect();

    assert_eq!(trip_ids.len(), generated.trips.len(), "duplicate trip ids");
    for stop_time in &generated.stop_times {
        assert!(stop_ids.contains(stop_time.stop_id.as_str()), "{}", stop_time.stop_id);
        assert!(trip_ids.contains(stop_time.trip_id.as_str()), "{}", stop_time.trip_id);
    }

    let routes = fs::read_to_string(generated.dir.join("routes.txt")).expect("routes");
    let route_ids: HashSet<_> = routes
        .lines()
        .skip(1)
        .filter_map(|line| line.split(',').next())
        .collect();
    for trip in &generated.trips {
        assert!(route_ids.contains(trip.route_id.as_str()), "{}", trip.route_id);
        assert!(["WD", "SAT", "SUN"].contains(&trip.service_id.as_str()));
    }
}

#[test]
fn arrivals_increase_and_respect_the_speed_ceiling() {
    let (generated, _) = generate("gtfs_synth_physics");
    let coordinates: HashMap<_, _> = generated
        .stops
        .iter()
        .filter_map(|s| Some((s.stop_id.as_str(), (s.stop_lat?, s.stop_lon?))))
        .collect();

    let mut by_trip: BTreeMap<&str, Vec<&StopTime>> = BTreeMap::new();
    for stop_time in &generated.stop_times {
        by_trip.entry(stop_time.trip_id.as_str()).or_default().push(stop_time);
    }
    assert_eq!(by_trip.len(), generated.trips.len());

    for (trip_id, visits) in by_trip {
        for pair in visits.windows(2) {
            let (from, to) = (pair[0], pair[1]);
            let departed = from.departure_time.expect("departure").total_seconds();
            let arrived = to.arrival_time.expect("arrival").total_seconds();
            assert!(arrived > departed, "{trip_id}: time does not increase");
            assert!(to.stop_sequence > from.stop_sequence, "{trip_id}: sequence");

            let (a, b) = (coordinates[from.stop_id.as_str()], coordinates[to.stop_id.as_str()]);
            let km = haversine_km(a.0, a.1, b.0, b.1);
            let hours = (arrived - departed) as f64 / 3600.0;
            assert!(km / hours <= 79.8 + 1e-9, "{trip_id}: {} km/h", km / hours);
        }
    }
}

#[test]
fn bus_route_times_follow_distance() {
    let (generated, _) = generate("gtfs_synth_bus");

    // 05:30-05:45 at a 15 minute headway is a single departure.
    let weekday: Vec<_> = generated
        .trips
        .iter()
        .filter(|t| t.route_id == "10" && t.service_id == "WD" && t.trip_id.starts_with("10_1_"))
        .collect();
    assert_eq!(weekday.len(), 1);
    assert_eq!(weekday[0].trip_id, "10_1_WD_0");
    assert_eq!(weekday[0].trip_headsign.as_deref(), Some("Dir 1"));
    assert_eq!(
        arrivals_of(&generated.stop_times, "10_1_WD_0"),
        vec![
            ("01012", "05:30:00".to_string()),
            ("01013", "05:34:48".to_string())
        ]
    );

    // Equal first and last departure still yields one trip.
    assert!(generated.trips.iter().any(|t| t.trip_id == "10_1_SUN_0"));
    assert!(!generated.trips.iter().any(|t| t.trip_id == "10_1_SUN_1"));
}

#[test]
fn malformed_values_fall_back_and_are_reported() {
    let (generated, outcome) = generate("gtfs_synth_fallbacks");
    let counts = outcome.notices.count_by_code();

    // Direction 2 has an unparsable headway: 15 minutes.
    let sunday: Vec<_> = generated
        .trips
        .iter()
        .filter(|t| t.trip_id.starts_with("10_2_SUN_"))
        .collect();
    assert_eq!(sunday.len(), 2);
    assert_eq!(
        arrivals_of(&generated.stop_times, "10_2_SUN_1")[0].1,
        "06:15:00"
    );
    assert_eq!(counts.get("malformed_headway"), Some(&1));

    // Saturday times "-" fall back to 05:30-23:30.
    assert_eq!(
        arrivals_of(&generated.stop_times, "10_2_SAT_0")[0].1,
        "05:30:00"
    );
    assert_eq!(counts.get("malformed_service_time"), Some(&2));

    // The weekday window 23:30-00:15 runs past midnight.
    let late: Vec<_> = generated
        .trips
        .iter()
        .filter(|t| t.trip_id.starts_with("10_2_WD_"))
        .collect();
    assert_eq!(late.len(), 3);
    assert_eq!(
        arrivals_of(&generated.stop_times, "10_2_WD_2")[0].1,
        "24:00:00"
    );
}

#[test]
fn unknown_stops_are_dropped_once_reported() {
    let (generated, outcome) = generate("gtfs_synth_unknown");

    let visits = arrivals_of(&generated.stop_times, "10_2_SUN_0");
    let stops: Vec<_> = visits.iter().map(|(stop, _)| *stop).collect();
    assert_eq!(stops, vec!["01013", "01019", "01012"]);
    let sequences: Vec<u32> = generated
        .stop_times
        .iter()
        .filter(|st| st.trip_id == "10_2_SUN_0")
        .map(|st| st.stop_sequence)
        .collect();
    assert_eq!(sequences, vec![1, 3, 4]);

    // Equal distances are forced 30 seconds apart or pushed by the ceiling.
    let times: Vec<i32> = visits
        .iter()
        .map(|(_, time)| GtfsTime::parse(time).expect("time").total_seconds())
        .collect();
    assert!(times[2] > times[1]);

    let counts = outcome.notices.count_by_code();
    assert_eq!(counts.get("unknown_stop_reference"), Some(&1));
    assert_eq!(counts.get("route_group_without_service"), Some(&1));
    assert_eq!(outcome.summary.skipped_route_groups, 1);
    assert!(!generated.trips.iter().any(|t| t.route_id == "99"));
}

#[test]
fn rail_lines_run_both_ways_with_peak_headways() {
    let (generated, outcome) = generate("gtfs_synth_rail");

    assert_eq!(
        arrivals_of(&generated.stop_times, "NS_0_WD_0"),
        vec![
            ("NS1", "05:30:00".to_string()),
            ("NS2", "05:33:00".to_string()),
            ("NS3", "05:36:00".to_string())
        ]
    );
    assert_eq!(
        arrivals_of(&generated.stop_times, "NS_0_WD_1")[0].1,
        "05:36:00"
    );
    assert_eq!(
        arrivals_of(&generated.stop_times, "NS_1_SAT_0"),
        vec![
            ("NS3", "05:30:00".to_string()),
            ("NS2", "05:33:00".to_string()),
            ("NS1", "05:36:00".to_string())
        ]
    );
    // Off-peak until 07:00, then every three minutes.
    assert_eq!(arrivals_of(&generated.stop_times, "NS_0_WD_15")[0].1, "07:00:00");
    assert_eq!(arrivals_of(&generated.stop_times, "NS_0_WD_16")[0].1, "07:03:00");

    let reverse = generated
        .trips
        .iter()
        .find(|t| t.trip_id == "NS_1_SUN_0")
        .expect("reverse trip");
    assert_eq!(reverse.trip_headsign.as_deref(), Some("To NS1"));

    // EW and NE know a single station each; CC, DT and TE none.
    assert_eq!(outcome.summary.skipped_rail_lines, 5);
    assert_eq!(outcome.summary.rail_patterns, 2);
    assert!(!generated.trips.iter().any(|t| t.route_id == "EW"));
}

#[test]
fn identical_input_gives_identical_tables() {
    let (first, _) = generate("gtfs_synth_determinism_a");
    let (second, _) = generate("gtfs_synth_determinism_b");

    for name in FEED_FILE_NAMES {
        let a = fs::read(first.dir.join(name)).expect("first");
        let b = fs::read(second.dir.join(name)).expect("second");
        assert!(a == b, "{name} differs between runs");
    }
}

#[test]
fn missing_source_file_stops_the_run() {
    let dir = temp_dir("gtfs_synth_missing_source");
    fs::create_dir_all(&dir).expect("create dir");
    write_file(&dir, "bus_stops.json", BUS_STOPS);
    write_file(&dir, "bus_services.json", BUS_SERVICES);
    write_file(&dir, "rail_data.json", RAIL_DATA);

    match load_dir(&dir) {
        Err(SourceError::MissingFile(name)) => assert_eq!(name, "bus_routes.json"),
        other => panic!("expected missing bus_routes.json, got {other:?}"),
    }
}
