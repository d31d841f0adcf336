use std::collections::HashMap;

use crate::records::{DayType, SequenceRecord, ServiceRecord, ServiceTimes};
use crate::service::{resolve_headway, HeadwayResolution};

/// Composite (route, direction) key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteKey {
    pub route_id: String,
    pub direction: String,
}

impl RouteKey {
    pub fn new(route_id: impl Into<String>, direction: impl Into<String>) -> Self {
        Self {
            route_id: route_id.into(),
            direction: direction.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupStop {
    pub stop_id: String,
    pub sequence: u32,
    pub distance_km: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteGroup {
    pub key: RouteKey,
    pub operator: String,
    pub stops: Vec<GroupStop>,
    pub headway_descriptor: String,
    pub headway: HeadwayResolution,
    weekday: ServiceTimes,
    saturday: ServiceTimes,
    sunday: ServiceTimes,
}

impl RouteGroup {
    /// First/last departure strings for a day type, taken from the first stop
    /// of the sorted sequence.
    pub fn service_times(&self, day: DayType) -> &ServiceTimes {
        match day {
            DayType::Weekday => &self.weekday,
            DayType::Saturday => &self.saturday,
            DayType::Sunday => &self.sunday,
        }
    }
}

/// Route groups in order of first appearance in the sequence records.
#[derive(Debug, Default)]
pub struct RouteGroups {
    groups: Vec<RouteGroup>,
    index: HashMap<RouteKey, usize>,
    unmatched: Vec<RouteKey>,
}

impl RouteGroups {
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteGroup> {
        self.groups.iter()
    }

    pub fn get(&self, key: &RouteKey) -> Option<&RouteGroup> {
        self.index.get(key).map(|&position| &self.groups[position])
    }

    /// Keys that had stop sequences but no service record.
    pub fn unmatched(&self) -> &[RouteKey] {
        &self.unmatched
    }
}

/// Joins stop-sequence records with service metadata on (route, direction).
pub fn group(
    sequences: &[SequenceRecord],
    services: &[ServiceRecord],
    fallback_headway_minutes: f64,
) -> RouteGroups {
    let mut services_by_key: HashMap<RouteKey, &ServiceRecord> = HashMap::new();
    for service in services {
        services_by_key
            .entry(RouteKey::new(service.route_id.trim(), service.direction.trim()))
            .or_insert(service);
    }

    let mut order: Vec<RouteKey> = Vec::new();
    let mut by_key: HashMap<RouteKey, Vec<&SequenceRecord>> = HashMap::new();
    for record in sequences {
        let key = RouteKey::new(record.route_id.trim(), record.direction.trim());
        by_key
            .entry(key.clone())
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(record);
    }

    let mut result = RouteGroups::default();
    for key in order {
        let Some(mut records) = by_key.remove(&key) else {
            continue;
        };
        let Some(service) = services_by_key.get(&key) else {
            result.unmatched.push(key);
            continue;
        };
        records.sort_by_key(|record| record.sequence);
        let Some(first) = records.first() else {
            continue;
        };
        let group = RouteGroup {
            operator: service.operator.clone(),
            headway_descriptor: service.headway.clone(),
            headway: resolve_headway(&service.headway, fallback_headway_minutes),
            weekday: first.weekday.clone(),
            saturday: first.saturday.clone(),
            sunday: first.sunday.clone(),
            stops: records
                .iter()
                .map(|record| GroupStop {
                    stop_id: record.stop_id.trim().to_string(),
                    sequence: record.sequence,
                    distance_km: record.distance_km,
                })
                .collect(),
            key: key.clone(),
        };
        result.index.insert(key, result.groups.len());
        result.groups.push(group);
    }
    result
}
