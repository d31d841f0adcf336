use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const NOTICE_CODE_ROUTE_WITHOUT_SERVICE: &str = "route_group_without_service";
pub const NOTICE_CODE_MALFORMED_SERVICE_TIME: &str = "malformed_service_time";
pub const NOTICE_CODE_MALFORMED_HEADWAY: &str = "malformed_headway";
pub const NOTICE_CODE_MALFORMED_DISTANCE: &str = "malformed_distance";
pub const NOTICE_CODE_UNKNOWN_STOP: &str = "unknown_stop_reference";
pub const NOTICE_CODE_DEGENERATE_RAIL_LINE: &str = "degenerate_rail_line";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeSeverity {
    Error,
    Warning,
    Info,
}

/// A data problem that was worked around during synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisNotice {
    pub code: String,
    pub severity: NoticeSeverity,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, Value>,
}

impl SynthesisNotice {
    pub fn new(
        code: impl Into<String>,
        severity: NoticeSeverity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            severity,
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    pub fn route_without_service(route_id: &str, direction: &str) -> Self {
        SynthesisNotice::new(
            NOTICE_CODE_ROUTE_WITHOUT_SERVICE,
            NoticeSeverity::Warning,
            "stop sequence has no matching service record; route direction skipped",
        )
        .with_context_field("routeId", route_id)
        .with_context_field("direction", direction)
    }

    pub fn malformed_service_time(
        route_id: &str,
        direction: &str,
        service_id: &str,
        field: &str,
        value: Option<&str>,
        substituted: &str,
    ) -> Self {
        SynthesisNotice::new(
            NOTICE_CODE_MALFORMED_SERVICE_TIME,
            NoticeSeverity::Info,
            "first/last departure missing or not HHMM; default used",
        )
        .with_context_field("routeId", route_id)
        .with_context_field("direction", direction)
        .with_context_field("serviceId", service_id)
        .with_context_field("fieldName", field)
        .with_context_field("fieldValue", value)
        .with_context_field("substitutedValue", substituted)
    }

    pub fn malformed_headway(route_id: &str, direction: &str, value: &str, fallback: f64) -> Self {
        SynthesisNotice::new(
            NOTICE_CODE_MALFORMED_HEADWAY,
            NoticeSeverity::Info,
            "headway descriptor unparsable, not positive or a day or longer; fallback used",
        )
        .with_context_field("routeId", route_id)
        .with_context_field("direction", direction)
        .with_context_field("fieldValue", value)
        .with_context_field("fallbackMinutes", fallback)
    }

    pub fn malformed_distance(
        route_id: &str,
        direction: &str,
        stop_id: &str,
        stop_sequence: u32,
        value: f64,
    ) -> Self {
        SynthesisNotice::new(
            NOTICE_CODE_MALFORMED_DISTANCE,
            NoticeSeverity::Info,
            "distance not finite or implausibly large; treated as missing",
        )
        .with_context_field("routeId", route_id)
        .with_context_field("direction", direction)
        .with_context_field("stopId", stop_id)
        .with_context_field("stopSequence", stop_sequence)
        .with_context_field("fieldValue", value)
    }

    pub fn unknown_stop(route_id: &str, direction: &str, stop_id: &str) -> Self {
        SynthesisNotice::new(
            NOTICE_CODE_UNKNOWN_STOP,
            NoticeSeverity::Warning,
            "stop is not in stops.txt; visits dropped",
        )
        .with_context_field("routeId", route_id)
        .with_context_field("direction", direction)
        .with_context_field("stopId", stop_id)
    }

    pub fn degenerate_rail_line(line: &str, known_stations: usize) -> Self {
        SynthesisNotice::new(
            NOTICE_CODE_DEGENERATE_RAIL_LINE,
            NoticeSeverity::Warning,
            "rail line has fewer than two known stations; line skipped",
        )
        .with_context_field("routeId", line)
        .with_context_field("knownStations", known_stations)
    }

    pub fn insert_context_field<V: Serialize>(&mut self, name: impl Into<String>, value: V) {
        let serialized = serde_json::to_value(value).unwrap_or(Value::Null);
        self.context.insert(name.into(), serialized);
    }

    pub fn with_context_field<V: Serialize>(mut self, name: impl Into<String>, value: V) -> Self {
        self.insert_context_field(name, value);
        self
    }
}

#[derive(Debug, Default)]
pub struct NoticeContainer {
    notices: Vec<SynthesisNotice>,
}

impl NoticeContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, notice: SynthesisNotice) {
        self.notices.push(notice);
    }

    pub fn iter(&self) -> impl Iterator<Item = &SynthesisNotice> {
        self.notices.iter()
    }

    pub fn len(&self) -> usize {
        self.notices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notices.is_empty()
    }

    pub fn count_by_code(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for notice in &self.notices {
            *counts.entry(notice.code.clone()).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_is_serialized_in_key_order() {
        let notice = SynthesisNotice::unknown_stop("10", "1", "99999");
        let json = serde_json::to_string(&notice).unwrap();
        assert_eq!(
            json,
            r#"{"code":"unknown_stop_reference","severity":"warning","message":"stop is not in stops.txt; visits dropped","context":{"direction":"1","routeId":"10","stopId":"99999"}}"#
        );
    }

    #[test]
    fn counts_by_code() {
        let mut notices = NoticeContainer::new();
        notices.push(SynthesisNotice::unknown_stop("10", "1", "A"));
        notices.push(SynthesisNotice::unknown_stop("10", "1", "B"));
        notices.push(SynthesisNotice::degenerate_rail_line("TE", 1));

        let counts = notices.count_by_code();
        assert_eq!(counts[NOTICE_CODE_UNKNOWN_STOP], 2);
        assert_eq!(counts[NOTICE_CODE_DEGENERATE_RAIL_LINE], 1);
        assert_eq!(notices.len(), 3);
    }

    #[test]
    fn missing_value_serializes_as_null() {
        let notice = SynthesisNotice::malformed_service_time(
            "10",
            "1",
            "SUN",
            "SUN_FirstBus",
            None,
            "05:30:00",
        );
        assert_eq!(notice.context["fieldValue"], Value::Null);
        assert_eq!(notice.severity, NoticeSeverity::Info);
    }
}
