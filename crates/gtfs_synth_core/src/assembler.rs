use std::collections::HashSet;
use std::path::{Path, PathBuf};

use gtfs_synth_model::{DirectionId, Route, Stop, StopTime, Trip};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{DistanceMode, SynthesisConfig};
use crate::error::{SinkError, SynthesisError};
use crate::feed::{calendar_rows, table_writer, write_table, FEED_FILE_NAMES};
use crate::grouping::{group, RouteGroup, RouteGroups};
use crate::notice::{NoticeContainer, SynthesisNotice};
use crate::package::package_feed;
use crate::progress::{NoOpProgressHandler, ProgressHandler};
use crate::records::{DayType, ServiceRecord, SourceData};
use crate::reference::{RailLine, ReferenceData};
use crate::registry::{RegisteredStop, StopRegistry};
use crate::service::{minutes_to_seconds, Headway, HeadwaySource, ServiceWindow};
use crate::sink::{BufferedSink, TripSink};
use crate::synth::{PatternStop, SynthesisStats, TimetableSynthesizer, TravelTime, TripPattern};

static NO_PROGRESS: NoOpProgressHandler = NoOpProgressHandler;

/// A trip pattern together with everything needed to expand it into trips.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternPlan {
    pub pattern: TripPattern,
    pub headway: Headway,
    pub windows: Vec<(DayType, ServiceWindow)>,
}

/// Row counts and adjustments of one run, written to the run report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FeedSummary {
    pub reference_version: String,
    pub agencies: usize,
    pub stops: usize,
    pub routes: usize,
    pub calendars: usize,
    pub trips: usize,
    pub stop_times: usize,
    pub bus_patterns: usize,
    pub rail_patterns: usize,
    pub skipped_route_groups: usize,
    pub skipped_rail_lines: usize,
    pub dropped_stop_visits: usize,
    pub monotonic_adjustments: usize,
    pub speed_adjustments: usize,
    pub sink_flushes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive: Option<PathBuf>,
}

pub struct AssemblyOutcome {
    pub summary: FeedSummary,
    pub notices: NoticeContainer,
}

/// Drives a complete run: stop registry, route groups, bus and rail
/// synthesis, fixed tables and the archive.
pub struct FeedAssembler<'a> {
    config: &'a SynthesisConfig,
    reference: &'a ReferenceData,
    progress: &'a dyn ProgressHandler,
    archive: ArchiveTarget,
}

enum ArchiveTarget {
    InOutputDir,
    At(PathBuf),
    Disabled,
}

impl<'a> FeedAssembler<'a> {
    pub fn new(config: &'a SynthesisConfig, reference: &'a ReferenceData) -> Self {
        Self {
            config,
            reference,
            progress: &NO_PROGRESS,
            archive: ArchiveTarget::InOutputDir,
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn ProgressHandler) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_archive_path(mut self, path: PathBuf) -> Self {
        self.archive = ArchiveTarget::At(path);
        self
    }

    pub fn without_archive(mut self) -> Self {
        self.archive = ArchiveTarget::Disabled;
        self
    }

    /// Bus stops first, then one stop per rail station code, then the
    /// supplemental stops of the reference data.
    pub fn build_registry(&self, source: &SourceData) -> StopRegistry {
        let mut registry = StopRegistry::new();
        let bus = source
            .stops
            .iter()
            .filter(|stop| registry.insert(RegisteredStop::from(*stop)))
            .count();
        let rail: usize = source
            .stations
            .iter()
            .map(|station| registry.insert_station(station))
            .sum();
        let supplemental = self
            .reference
            .supplemental_stops
            .iter()
            .filter(|stop| registry.insert(RegisteredStop::from(*stop)))
            .count();
        info!(bus, rail, supplemental, "stop registry built");
        registry
    }

    /// One route per distinct bus service number, followed by the rail lines.
    pub fn route_table(&self, services: &[ServiceRecord]) -> Vec<Route> {
        let mut seen = HashSet::new();
        let mut routes: Vec<Route> = services
            .iter()
            .filter(|service| seen.insert(service.route_id.trim()))
            .map(|service| {
                self.reference
                    .bus_route(service.route_id.trim(), &service.operator)
            })
            .collect();
        routes.extend(self.reference.rail_routes());
        routes
    }

    pub fn plan_bus(
        &self,
        groups: &RouteGroups,
        registry: &StopRegistry,
        notices: &mut NoticeContainer,
    ) -> Vec<PatternPlan> {
        groups
            .iter()
            .map(|group| self.plan_bus_group(group, registry, notices))
            .collect()
    }

    fn plan_bus_group(
        &self,
        group: &RouteGroup,
        registry: &StopRegistry,
        notices: &mut NoticeContainer,
    ) -> PatternPlan {
        let bus = &self.config.bus;
        let route_id = group.key.route_id.as_str();
        let direction = group.key.direction.as_str();

        let mut reported = HashSet::new();
        for stop in &group.stops {
            if !registry.exists(&stop.stop_id) && reported.insert(stop.stop_id.as_str()) {
                debug!(route_id, direction, stop_id = %stop.stop_id, "unknown stop in sequence");
                notices.push(SynthesisNotice::unknown_stop(
                    route_id,
                    direction,
                    &stop.stop_id,
                ));
            }
        }

        if group.headway.source == HeadwaySource::Fallback {
            notices.push(SynthesisNotice::malformed_headway(
                route_id,
                direction,
                &group.headway_descriptor,
                group.headway.minutes,
            ));
        }

        let mut windows = Vec::with_capacity(DayType::ALL.len());
        for day in DayType::ALL {
            let times = group.service_times(day);
            let resolved = ServiceWindow::resolve(
                times.first.as_deref(),
                times.last.as_deref(),
                bus.fallback_first_departure,
                bus.fallback_last_departure,
            );
            if resolved.start_fallback {
                notices.push(SynthesisNotice::malformed_service_time(
                    route_id,
                    direction,
                    day.service_id(),
                    &format!("{}_FirstBus", day.service_id()),
                    times.first.as_deref(),
                    &bus.fallback_first_departure.to_string(),
                ));
            }
            if resolved.end_fallback {
                notices.push(SynthesisNotice::malformed_service_time(
                    route_id,
                    direction,
                    day.service_id(),
                    &format!("{}_LastBus", day.service_id()),
                    times.last.as_deref(),
                    &bus.fallback_last_departure.to_string(),
                ));
            }
            windows.push((day, resolved.window));
        }

        let mut travelled = 0.0;
        let stops = group
            .stops
            .iter()
            .map(|stop| {
                let raw = stop.distance_km.filter(|km| {
                    let plausible = km.is_finite() && km.abs() <= bus.max_distance_km;
                    if !plausible {
                        notices.push(SynthesisNotice::malformed_distance(
                            route_id,
                            direction,
                            &stop.stop_id,
                            stop.sequence,
                            *km,
                        ));
                    }
                    plausible
                });
                let distance_km = match bus.distance_mode {
                    DistanceMode::Cumulative => raw,
                    DistanceMode::FromPrevious => {
                        travelled += raw.unwrap_or(0.0);
                        Some(travelled)
                    }
                };
                PatternStop {
                    stop_id: stop.stop_id.clone(),
                    stop_sequence: stop.sequence,
                    distance_km,
                }
            })
            .collect();

        PatternPlan {
            pattern: TripPattern {
                route_id: route_id.to_string(),
                trip_prefix: format!("{route_id}_{direction}"),
                direction_id: if direction == "1" {
                    DirectionId::Direction0
                } else {
                    DirectionId::Direction1
                },
                headsign: format!("Dir {direction}"),
                stops,
                travel: TravelTime::PerKilometre {
                    seconds_per_km: bus.seconds_per_km,
                },
            },
            headway: Headway::Fixed(group.headway.seconds()),
            windows,
        }
    }

    /// Two patterns (forward and reverse) per rail line with a usable
    /// station ordering. Stations missing from the registry are left out
    /// before positions are assigned.
    pub fn plan_rail(
        &self,
        registry: &StopRegistry,
        notices: &mut NoticeContainer,
    ) -> Vec<PatternPlan> {
        let mut plans = Vec::new();
        for line in &self.reference.rail_lines {
            if line.stations.is_empty() {
                debug!(line = %line.code, "no station ordering, no trips generated");
                continue;
            }
            let known: Vec<&str> = line
                .stations
                .iter()
                .map(String::as_str)
                .filter(|code| registry.exists(code))
                .collect();
            info!(line = %line.code, stations = known.len(), "planning rail line");
            if known.len() < 2 {
                warn!(line = %line.code, stations = known.len(), "too few known stations, line skipped");
                notices.push(SynthesisNotice::degenerate_rail_line(&line.code, known.len()));
                continue;
            }
            let reversed: Vec<&str> = known.iter().rev().copied().collect();
            plans.push(self.rail_plan(line, DirectionId::Direction0, &known));
            plans.push(self.rail_plan(line, DirectionId::Direction1, &reversed));
        }
        plans
    }

    fn rail_plan(&self, line: &RailLine, direction: DirectionId, stations: &[&str]) -> PatternPlan {
        let rail = &self.config.rail;
        let window = ServiceWindow::new(rail.first_departure, rail.last_departure);
        let last = stations.last().copied().unwrap_or_default();
        PatternPlan {
            pattern: TripPattern {
                route_id: line.code.clone(),
                trip_prefix: format!("{}_{}", line.code, direction.index()),
                direction_id: direction,
                headsign: format!("To {last}"),
                stops: stations
                    .iter()
                    .enumerate()
                    .map(|(position, code)| PatternStop {
                        stop_id: code.to_string(),
                        stop_sequence: position as u32 + 1,
                        distance_km: None,
                    })
                    .collect(),
                travel: TravelTime::PerStop {
                    seconds_per_stop: minutes_to_seconds(rail.minutes_per_station),
                },
            },
            headway: Headway::from_rail_config(rail),
            windows: DayType::ALL.iter().map(|day| (*day, window)).collect(),
        }
    }

    /// Expands every plan for each of its day types into `sink`.
    pub fn synthesize_into(
        &self,
        plans: &[PatternPlan],
        registry: &StopRegistry,
        sink: &mut dyn TripSink,
    ) -> Result<SynthesisStats, SinkError> {
        let synthesizer = TimetableSynthesizer::new(registry, self.config.limits);
        let mut stats = SynthesisStats::default();
        self.progress.set_total_patterns(plans.len());
        for plan in plans {
            for (day, window) in &plan.windows {
                let day_stats =
                    synthesizer.synthesize(&plan.pattern, *day, *window, &plan.headway, sink)?;
                stats.merge(&day_stats);
            }
            self.progress.increment_pattern_progress();
        }
        Ok(stats)
    }

    /// Synthesizes the complete feed into `output_dir`.
    pub fn assemble(
        &self,
        source: &SourceData,
        output_dir: &Path,
    ) -> Result<AssemblyOutcome, SynthesisError> {
        std::fs::create_dir_all(output_dir).map_err(|source| SynthesisError::OutputDir {
            path: output_dir.to_path_buf(),
            source,
        })?;
        let mut notices = NoticeContainer::new();
        let mut summary = FeedSummary {
            reference_version: self.reference.version.clone(),
            ..FeedSummary::default()
        };

        self.progress.on_start_stage("stops");
        let registry = self.build_registry(source);
        let stops: Vec<Stop> = registry.gtfs_stops().collect();
        summary.stops = write_table(output_dir, &stops)?;
        summary.routes = write_table(output_dir, &self.route_table(&source.services))?;
        self.progress.on_finish_stage("stops");

        self.progress.on_start_stage("planning");
        let groups = group(
            &source.sequences,
            &source.services,
            self.config.bus.fallback_headway_minutes,
        );
        for key in groups.unmatched() {
            debug!(route_id = %key.route_id, direction = %key.direction, "no service record, skipped");
            notices.push(SynthesisNotice::route_without_service(
                &key.route_id,
                &key.direction,
            ));
        }
        summary.skipped_route_groups = groups.unmatched().len();
        info!(
            groups = groups.len(),
            skipped = summary.skipped_route_groups,
            "route groups built"
        );
        let mut plans = self.plan_bus(&groups, &registry, &mut notices);
        summary.bus_patterns = plans.len();
        let rail_notices_before = notices.len();
        let rail = self.plan_rail(&registry, &mut notices);
        summary.skipped_rail_lines = notices.len() - rail_notices_before;
        summary.rail_patterns = rail.len();
        plans.extend(rail);
        self.progress.on_finish_stage("planning");

        self.progress.on_start_stage("trips");
        let mut sink = BufferedSink::new(
            table_writer::<Trip>(output_dir)?,
            table_writer::<StopTime>(output_dir)?,
            self.config.sink_buffer_size,
        );
        let stats = self.synthesize_into(&plans, &registry, &mut sink)?;
        let written = sink.finalize()?;
        summary.trips = written.trips;
        summary.stop_times = written.stop_times;
        summary.sink_flushes = written.flushes;
        summary.dropped_stop_visits = stats.skipped_stops;
        summary.monotonic_adjustments = stats.monotonic_adjustments;
        summary.speed_adjustments = stats.speed_adjustments;
        self.progress.on_finish_stage("trips");
        info!(
            trips = summary.trips,
            stop_times = summary.stop_times,
            flushes = summary.sink_flushes,
            "trips synthesized"
        );

        summary.agencies = write_table(output_dir, &self.reference.gtfs_agencies())?;
        summary.calendars = write_table(output_dir, &calendar_rows(&self.config.calendar))?;
        write_table(
            output_dir,
            &[self.reference.feed_info(&self.config.calendar)],
        )?;

        let archive = match &self.archive {
            ArchiveTarget::Disabled => None,
            ArchiveTarget::InOutputDir => Some(output_dir.join(&self.config.archive_name)),
            ArchiveTarget::At(path) => Some(path.clone()),
        };
        if let Some(path) = archive {
            self.progress.on_start_stage("package");
            summary.archive = Some(package_feed(output_dir, &path, FEED_FILE_NAMES)?);
            self.progress.on_finish_stage("package");
        }

        Ok(AssemblyOutcome { summary, notices })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{SequenceRecord, ServiceTimes, StationRecord, StopRecord};
    use crate::sink::MemoryTableWriter;
    use gtfs_synth_model::GtfsTime;

    fn stop(id: &str, lat: f64, lon: f64) -> StopRecord {
        StopRecord {
            id: id.into(),
            name: format!("Stop {id}"),
            lat: Some(lat),
            lon: Some(lon),
        }
    }

    fn sequence(route: &str, direction: &str, stop_id: &str, seq: u32, km: f64) -> SequenceRecord {
        let times = ServiceTimes {
            first: Some("0530".into()),
            last: Some("0545".into()),
        };
        SequenceRecord {
            route_id: route.into(),
            direction: direction.into(),
            stop_id: stop_id.into(),
            sequence: seq,
            distance_km: Some(km),
            weekday: times.clone(),
            saturday: times.clone(),
            sunday: times,
        }
    }

    fn service(route: &str, direction: &str, headway: &str) -> ServiceRecord {
        ServiceRecord {
            route_id: route.into(),
            direction: direction.into(),
            operator: "SBST".into(),
            headway: headway.into(),
        }
    }

    fn small_reference() -> ReferenceData {
        let mut reference = ReferenceData::singapore();
        reference.rail_lines.truncate(1);
        reference.rail_lines[0].stations = vec!["NS1".into(), "NS2".into(), "NS3".into()];
        reference.supplemental_stops.clear();
        reference
    }

    fn source() -> SourceData {
        SourceData {
            stops: vec![stop("A", 1.30, 103.80), stop("B", 1.31, 103.80), stop("A", 9.0, 9.0)],
            stations: vec![
                StationRecord {
                    name: "Jurong East".into(),
                    codes: vec!["NS1".into(), "EW24".into()],
                    lat: Some(1.3332),
                    lon: Some(103.7422),
                },
                StationRecord {
                    name: "Bukit Batok".into(),
                    codes: vec!["NS2".into()],
                    lat: Some(1.3490),
                    lon: Some(103.7496),
                },
            ],
            sequences: vec![
                sequence("10", "1", "A", 1, 0.0),
                sequence("10", "1", "GONE", 2, 1.0),
                sequence("10", "1", "B", 3, 2.0),
                sequence("10", "2", "B", 1, 0.0),
            ],
            services: vec![service("10", "1", "15"), service("10", "1", "99")],
        }
    }

    #[test]
    fn registry_prefers_bus_stops_then_stations_then_supplements() {
        let config = SynthesisConfig::default();
        let reference = ReferenceData::singapore();
        let assembler = FeedAssembler::new(&config, &reference);
        let mut data = source();
        data.stations.push(StationRecord {
            name: "Fake".into(),
            codes: vec!["A".into()],
            lat: None,
            lon: None,
        });

        let registry = assembler.build_registry(&data);
        let ids: Vec<_> = registry.iter().map(|stop| stop.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "NS1", "EW24", "NS2", "NE18"]);
        assert_eq!(registry.coordinates("A"), Some((1.30, 103.80)));
        assert_eq!(registry.get("NS1").unwrap().name, "Jurong East NS1");
    }

    #[test]
    fn route_table_lists_each_service_once() {
        let config = SynthesisConfig::default();
        let reference = small_reference();
        let assembler = FeedAssembler::new(&config, &reference);

        let routes = assembler.route_table(&source().services);
        let ids: Vec<_> = routes.iter().map(|route| route.route_id.as_str()).collect();
        assert_eq!(ids, vec!["10", "NS"]);
    }

    #[test]
    fn bus_plan_maps_direction_and_reports_problems() {
        let config = SynthesisConfig::default();
        let reference = small_reference();
        let assembler = FeedAssembler::new(&config, &reference);
        let data = source();
        let registry = assembler.build_registry(&data);
        let groups = group(&data.sequences, &data.services, 15.0);
        let mut notices = NoticeContainer::new();

        let plans = assembler.plan_bus(&groups, &registry, &mut notices);
        assert_eq!(plans.len(), 1);
        let plan = &plans[0];
        assert_eq!(plan.pattern.trip_prefix, "10_1");
        assert_eq!(plan.pattern.direction_id, DirectionId::Direction0);
        assert_eq!(plan.pattern.headsign, "Dir 1");
        assert_eq!(plan.headway, Headway::Fixed(900));
        assert_eq!(plan.windows.len(), 3);

        let codes = notices.count_by_code();
        assert_eq!(codes.get("unknown_stop_reference"), Some(&1));
        assert_eq!(codes.len(), 1);
    }

    #[test]
    fn distances_from_previous_stop_are_accumulated() {
        let mut config = SynthesisConfig::default();
        config.bus.distance_mode = DistanceMode::FromPrevious;
        let reference = small_reference();
        let assembler = FeedAssembler::new(&config, &reference);
        let data = source();
        let registry = assembler.build_registry(&data);
        let groups = group(&data.sequences, &data.services, 15.0);

        let plans = assembler.plan_bus(&groups, &registry, &mut NoticeContainer::new());
        let distances: Vec<_> = plans[0]
            .pattern
            .stops
            .iter()
            .map(|stop| stop.distance_km)
            .collect();
        assert_eq!(distances, vec![Some(0.0), Some(1.0), Some(3.0)]);
    }

    #[test]
    fn implausible_distances_are_dropped_with_a_notice() {
        let config = SynthesisConfig::default();
        let reference = small_reference();
        let assembler = FeedAssembler::new(&config, &reference);
        let mut data = source();
        data.sequences[2].distance_km = Some(1.0e9);
        data.sequences[0].distance_km = Some(f64::INFINITY);
        let registry = assembler.build_registry(&data);
        let groups = group(&data.sequences, &data.services, 15.0);
        let mut notices = NoticeContainer::new();

        let plans = assembler.plan_bus(&groups, &registry, &mut notices);
        let distances: Vec<_> = plans[0]
            .pattern
            .stops
            .iter()
            .map(|stop| stop.distance_km)
            .collect();
        assert_eq!(distances, vec![None, Some(1.0), None]);
        assert_eq!(notices.count_by_code().get("malformed_distance"), Some(&2));
    }

    #[test]
    fn rail_plans_run_both_ways_over_known_stations() {
        let config = SynthesisConfig::default();
        let reference = small_reference();
        let assembler = FeedAssembler::new(&config, &reference);
        let registry = assembler.build_registry(&source());
        let mut notices = NoticeContainer::new();

        let plans = assembler.plan_rail(&registry, &mut notices);
        assert!(notices.is_empty());
        assert_eq!(plans.len(), 2);

        let forward: Vec<_> = plans[0].pattern.stops.iter().map(|s| s.stop_id.as_str()).collect();
        assert_eq!(forward, vec!["NS1", "NS2"]);
        assert_eq!(plans[0].pattern.headsign, "To NS2");
        assert_eq!(plans[1].pattern.trip_prefix, "NS_1");
        assert_eq!(plans[1].pattern.headsign, "To NS1");
        assert_eq!(plans[1].pattern.stops[0].stop_sequence, 1);
        assert_eq!(
            plans[0].windows[0].1,
            ServiceWindow::new(GtfsTime::from_hms(5, 30, 0), GtfsTime::from_hms(23, 30, 0))
        );
    }

    #[test]
    fn rail_line_with_one_known_station_is_skipped() {
        let config = SynthesisConfig::default();
        let mut reference = small_reference();
        reference.rail_lines[0].stations = vec!["NS1".into(), "NS99".into()];
        let assembler = FeedAssembler::new(&config, &reference);
        let registry = assembler.build_registry(&source());
        let mut notices = NoticeContainer::new();

        assert!(assembler.plan_rail(&registry, &mut notices).is_empty());
        assert_eq!(
            notices.iter().next().map(|n| n.code.as_str()),
            Some("degenerate_rail_line")
        );
    }

    #[test]
    fn synthesized_trips_reference_only_registered_stops() {
        let config = SynthesisConfig::default();
        let reference = small_reference();
        let assembler = FeedAssembler::new(&config, &reference);
        let data = source();
        let registry = assembler.build_registry(&data);
        let groups = group(&data.sequences, &data.services, 15.0);
        let mut notices = NoticeContainer::new();
        let mut plans = assembler.plan_bus(&groups, &registry, &mut notices);
        plans.extend(assembler.plan_rail(&registry, &mut notices));

        let mut sink = BufferedSink::new(
            MemoryTableWriter::<Trip>::default(),
            MemoryTableWriter::<StopTime>::default(),
            10,
        );
        let stats = assembler.synthesize_into(&plans, &registry, &mut sink).unwrap();
        sink.finalize().unwrap();
        let (trips, stop_times) = sink.into_writers();

        // One bus departure per day type; rail runs all day.
        let bus_trips = trips.rows.iter().filter(|t| t.route_id == "10").count();
        assert_eq!(bus_trips, 3);
        assert_eq!(stats.trips, trips.rows.len());
        assert!(stop_times.rows.iter().all(|st| registry.exists(&st.stop_id)));

        let trip_ids: HashSet<_> = trips.rows.iter().map(|t| t.trip_id.as_str()).collect();
        assert_eq!(trip_ids.len(), trips.rows.len());
        assert!(stop_times
            .rows
            .iter()
            .all(|st| trip_ids.contains(st.trip_id.as_str())));
    }
}
