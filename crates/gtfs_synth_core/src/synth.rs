//! Timetable synthesis: trip patterns, service windows and headways in,
//! timestamped stop visits out.

use gtfs_synth_model::{DirectionId, GtfsTime, StopTime, Trip};

use crate::config::PhysicalLimits;
use crate::error::SinkError;
use crate::geo::distance_between;
use crate::records::DayType;
use crate::registry::StopRegistry;
use crate::service::{departures, Headway, ServiceWindow};
use crate::sink::TripSink;

/// How nominal arrival times are derived from the trip start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TravelTime {
    /// Distance driven: `start + distance_km * seconds_per_km`.
    PerKilometre { seconds_per_km: f64 },
    /// Fixed interval: `start + position * seconds_per_stop`.
    PerStop { seconds_per_stop: i32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternStop {
    pub stop_id: String,
    pub stop_sequence: u32,
    /// Distance from the first stop of the pattern.
    pub distance_km: Option<f64>,
}

/// Ordered stops shared by every trip of one route direction.
#[derive(Debug, Clone, PartialEq)]
pub struct TripPattern {
    pub route_id: String,
    /// Leading part of the trip id, e.g. `"10_1"` or `"NS_0"`.
    pub trip_prefix: String,
    pub direction_id: DirectionId,
    pub headsign: String,
    pub stops: Vec<PatternStop>,
    pub travel: TravelTime,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SynthesisStats {
    pub trips: usize,
    pub stop_times: usize,
    /// Stop visits dropped because the stop is not registered.
    pub skipped_stops: usize,
    pub monotonic_adjustments: usize,
    pub speed_adjustments: usize,
}

impl SynthesisStats {
    pub fn merge(&mut self, other: &SynthesisStats) {
        self.trips += other.trips;
        self.stop_times += other.stop_times;
        self.skipped_stops += other.skipped_stops;
        self.monotonic_adjustments += other.monotonic_adjustments;
        self.speed_adjustments += other.speed_adjustments;
    }
}

pub fn trip_id(prefix: &str, day: DayType, index: usize) -> String {
    format!("{}_{}_{}", prefix, day.service_id(), index)
}

/// Generates trips for one pattern and day type.
///
/// Arrival times within a trip are strictly increasing and the implied
/// great-circle speed between consecutive visits never exceeds
/// [`PhysicalLimits::max_speed_kmh`]. Stops missing from the registry are
/// left out of the trip.
pub struct TimetableSynthesizer<'a> {
    registry: &'a StopRegistry,
    limits: PhysicalLimits,
}

impl<'a> TimetableSynthesizer<'a> {
    pub fn new(registry: &'a StopRegistry, limits: PhysicalLimits) -> Self {
        Self { registry, limits }
    }

    pub fn synthesize(
        &self,
        pattern: &TripPattern,
        day: DayType,
        window: ServiceWindow,
        headway: &Headway,
        sink: &mut dyn TripSink,
    ) -> Result<SynthesisStats, SinkError> {
        let mut stats = SynthesisStats::default();
        for (index, start) in departures(window, headway).enumerate() {
            let trip = Trip {
                route_id: pattern.route_id.clone(),
                service_id: day.service_id().to_string(),
                trip_id: trip_id(&pattern.trip_prefix, day, index),
                trip_headsign: Some(pattern.headsign.clone()),
                direction_id: Some(pattern.direction_id),
            };
            let stop_times = self.schedule_trip(pattern, &trip.trip_id, start, &mut stats);
            stats.trips += 1;
            stats.stop_times += stop_times.len();
            sink.append(trip, stop_times)?;
        }
        Ok(stats)
    }

    /// Stop visits of a single trip leaving the first stop at `start`.
    pub fn schedule_trip(
        &self,
        pattern: &TripPattern,
        trip_id: &str,
        start: i32,
        stats: &mut SynthesisStats,
    ) -> Vec<StopTime> {
        let mut stop_times = Vec::with_capacity(pattern.stops.len());
        let mut last: Option<(i32, &str)> = None;

        for (position, stop) in pattern.stops.iter().enumerate() {
            if !self.registry.exists(&stop.stop_id) {
                stats.skipped_stops += 1;
                continue;
            }

            // Float-to-int casts saturate; the additions must as well.
            let mut arrival = match pattern.travel {
                TravelTime::PerKilometre { seconds_per_km } => start
                    .saturating_add((stop.distance_km.unwrap_or(0.0) * seconds_per_km) as i32),
                TravelTime::PerStop { seconds_per_stop } => start.saturating_add(
                    i32::try_from(position)
                        .unwrap_or(i32::MAX)
                        .saturating_mul(seconds_per_stop),
                ),
            };

            if let Some((last_arrival, last_stop)) = last {
                if arrival <= last_arrival {
                    arrival = last_arrival.saturating_add(self.limits.min_increment_secs);
                    stats.monotonic_adjustments += 1;
                }
                if let (Some(from), Some(to)) = (
                    self.registry.coordinates(last_stop),
                    self.registry.coordinates(&stop.stop_id),
                ) {
                    let min_travel = self.limits.min_travel_secs(distance_between(from, to));
                    if arrival.saturating_sub(last_arrival) < min_travel {
                        arrival = last_arrival.saturating_add(min_travel);
                        stats.speed_adjustments += 1;
                    }
                }
            }

            let time = GtfsTime::from_seconds(arrival);
            stop_times.push(StopTime {
                trip_id: trip_id.to_string(),
                arrival_time: Some(time),
                departure_time: Some(time),
                stop_id: stop.stop_id.clone(),
                stop_sequence: stop.stop_sequence,
            });
            last = Some((arrival, stop.stop_id.as_str()));
        }
        stop_times
    }
}
