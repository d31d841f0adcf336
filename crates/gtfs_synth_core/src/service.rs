//! Service window and headway resolution for raw source strings.

use gtfs_synth_model::GtfsTime;

use crate::config::{PeakWindow, RailTimingConfig};

const SECONDS_PER_DAY: i32 = 24 * 3600;

/// Headways of a day or longer are treated as malformed.
pub const MAX_HEADWAY_MINUTES: f64 = 24.0 * 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadwaySource {
    /// `"low-high"` range, resolved to its midpoint.
    Range,
    /// A single number.
    Fixed,
    /// Unparsable, non-positive or a day or longer.
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadwayResolution {
    pub minutes: f64,
    pub source: HeadwaySource,
}

impl HeadwayResolution {
    pub fn seconds(&self) -> i32 {
        ((self.minutes * 60.0).round() as i32).max(1)
    }
}

/// Resolves a headway descriptor such as `"12-15"` or `"8"` to minutes.
pub fn resolve_headway(descriptor: &str, fallback_minutes: f64) -> HeadwayResolution {
    let fallback = HeadwayResolution {
        minutes: fallback_minutes,
        source: HeadwaySource::Fallback,
    };
    let trimmed = descriptor.trim();
    let resolved = match trimmed.split_once('-') {
        Some((low, high)) => match (parse_minutes(low), parse_minutes(high)) {
            (Some(low), Some(high)) => HeadwayResolution {
                minutes: (low + high) / 2.0,
                source: HeadwaySource::Range,
            },
            _ => return fallback,
        },
        None => match parse_minutes(trimmed) {
            Some(minutes) => HeadwayResolution {
                minutes,
                source: HeadwaySource::Fixed,
            },
            None => return fallback,
        },
    };
    if resolved.minutes > 0.0 && resolved.minutes < MAX_HEADWAY_MINUTES {
        resolved
    } else {
        fallback
    }
}

fn parse_minutes(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|ch| ch.is_ascii_digit() || ch == '.') {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|minutes| minutes.is_finite())
}

/// Whole minutes from configuration as seconds, saturating at `i32::MAX`.
pub fn minutes_to_seconds(minutes: u32) -> i32 {
    i32::try_from(minutes.saturating_mul(60)).unwrap_or(i32::MAX)
}

/// Parses an `HHMM` departure string into seconds of day.
pub fn parse_hhmm(raw: &str) -> Option<i32> {
    let trimmed = raw.trim();
    if trimmed.len() != 4 || !trimmed.chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = trimmed[0..2].parse().ok()?;
    let minutes: i32 = trimmed[2..4].parse().ok()?;
    if hours > 24 || minutes > 59 {
        return None;
    }
    Some(hours * 3600 + minutes * 60)
}

/// Departure window in seconds of the service day. `end` may exceed 24 h.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceWindow {
    pub start: i32,
    pub end: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowResolution {
    pub window: ServiceWindow,
    pub start_fallback: bool,
    pub end_fallback: bool,
    pub wrapped: bool,
}

impl ServiceWindow {
    pub fn new(start: GtfsTime, end: GtfsTime) -> Self {
        Self {
            start: start.total_seconds(),
            end: end.total_seconds(),
        }
    }

    /// Builds a window from raw first/last strings, substituting the
    /// defaults for anything missing or non-numeric. An end earlier than the
    /// start is taken to run past midnight.
    pub fn resolve(
        first: Option<&str>,
        last: Option<&str>,
        default_first: GtfsTime,
        default_last: GtfsTime,
    ) -> WindowResolution {
        let parsed_start = first.and_then(parse_hhmm);
        let parsed_end = last.and_then(parse_hhmm);
        let start = parsed_start.unwrap_or(default_first.total_seconds());
        let mut end = parsed_end.unwrap_or(default_last.total_seconds());
        let wrapped = end < start;
        if wrapped {
            end += SECONDS_PER_DAY;
        }
        WindowResolution {
            window: ServiceWindow { start, end },
            start_fallback: parsed_start.is_none(),
            end_fallback: parsed_end.is_none(),
            wrapped,
        }
    }
}

/// Spacing between consecutive departures.
#[derive(Debug, Clone, PartialEq)]
pub enum Headway {
    Fixed(i32),
    Peaked {
        peak: i32,
        off_peak: i32,
        peak_windows: Vec<PeakWindow>,
    },
}

impl Headway {
    pub fn from_rail_config(config: &RailTimingConfig) -> Self {
        Headway::Peaked {
            peak: minutes_to_seconds(config.peak_headway_minutes).max(1),
            off_peak: minutes_to_seconds(config.off_peak_headway_minutes).max(1),
            peak_windows: config.peak_windows.clone(),
        }
    }

    /// Seconds until the departure after one leaving at `departure`.
    pub fn after(&self, departure: i32) -> i32 {
        match self {
            Headway::Fixed(seconds) => (*seconds).max(1),
            Headway::Peaked {
                peak,
                off_peak,
                peak_windows,
            } => {
                if peak_windows.iter().any(|window| window.contains(departure)) {
                    *peak
                } else {
                    *off_peak
                }
            }
        }
    }
}

/// Departure times within a window. The first departure is always produced,
/// subsequent ones only while strictly before the window end. Iteration ends
/// if the next departure cannot be represented.
pub fn departures(window: ServiceWindow, headway: &Headway) -> impl Iterator<Item = i32> + '_ {
    let mut next = Some(window.start);
    std::iter::from_fn(move || {
        let current = next?;
        next = current
            .checked_add(headway.after(current))
            .filter(|following| *following < window.end);
        Some(current)
    })
}
