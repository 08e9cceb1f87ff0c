// LogTally - core/filter.rs
//
// Line filters applied before application resolution: time window,
// intraday range, host names, and content patterns (with inversion).
// Core layer: pure logic, no I/O.

use crate::util::error::ConfigError;
use chrono::{NaiveDateTime, NaiveTime};
use regex::{Regex, RegexBuilder};
use std::collections::HashSet;

// =============================================================================
// Time window
// =============================================================================

/// Position of an event relative to the configured time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowCheck {
    /// Older than the lower bound: skip the line.
    Before,
    Inside,
    /// Newer than the upper bound: stop reading the file.
    After,
}

/// Absolute time window. Lower bound inclusive, upper bound inclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

impl TimeWindow {
    /// Build a window, rejecting one whose start is after its end.
    pub fn new(
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<Self, ConfigError> {
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(ConfigError::EmptyTimeWindow {
                    start: s.to_string(),
                    end: e.to_string(),
                });
            }
        }
        Ok(Self { start, end })
    }

    pub fn check(&self, time: NaiveDateTime) -> WindowCheck {
        match (self.start, self.end) {
            (Some(start), _) if time < start => WindowCheck::Before,
            (_, Some(end)) if time > end => WindowCheck::After,
            _ => WindowCheck::Inside,
        }
    }
}

/// Parse a `--since`/`--until` argument: `YYYY-MM-DD[ HH:MM[:SS]]`.
///
/// A bare date means midnight when `end_of_day` is false and 23:59:59 when
/// it is true, so `--until 2024-01-31` covers the whole day.
pub fn parse_datetime_arg(value: &str, end_of_day: bool) -> Result<NaiveDateTime, ConfigError> {
    let value = value.trim();
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Ok(dt);
        }
    }
    let date = chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        ConfigError::InvalidDateTime {
            value: value.to_string(),
        }
    })?;
    let time = if end_of_day {
        NaiveTime::from_hms_opt(23, 59, 59)
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)
    };
    time.map(|t| date.and_time(t))
        .ok_or_else(|| ConfigError::InvalidDateTime {
            value: value.to_string(),
        })
}

// =============================================================================
// Intraday range
// =============================================================================

/// Time-of-day range `HH:MM,HH:MM`, bounds inclusive at minute precision.
/// A start later than the end wraps around midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    start: NaiveTime,
    end: NaiveTime,
}

impl TimeRange {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidTimeRange {
            value: value.to_string(),
        };
        let (start, end) = value.split_once(',').ok_or_else(invalid)?;
        let start = NaiveTime::parse_from_str(start.trim(), "%H:%M").map_err(|_| invalid())?;
        let end = NaiveTime::parse_from_str(end.trim(), "%H:%M").map_err(|_| invalid())?;
        Ok(Self { start, end })
    }

    /// Whether the local time `ltime` (`HH:MM[:SS]`) falls inside the range.
    /// Unparseable times are outside.
    pub fn between(&self, ltime: &str) -> bool {
        let Some(hm) = ltime.trim().get(..5) else {
            return false;
        };
        let Ok(t) = NaiveTime::parse_from_str(hm, "%H:%M") else {
            return false;
        };
        if self.start <= self.end {
            self.start <= t && t <= self.end
        } else {
            t >= self.start || t <= self.end
        }
    }
}

// =============================================================================
// Host filter
// =============================================================================

/// Host name filter with shell-style wildcards (`web*`, `db-?`).
///
/// Accepted host names are cached for the lifetime of the filter, so a
/// repeated host is matched against the patterns only once.
#[derive(Debug, Clone, Default)]
pub struct HostFilter {
    patterns: Vec<glob::Pattern>,
    accepted: HashSet<String>,
}

impl HostFilter {
    pub fn new(hosts: &[String]) -> Result<Self, ConfigError> {
        let patterns = hosts
            .iter()
            .map(|h| {
                glob::Pattern::new(h).map_err(|e| ConfigError::ValueOutOfRange {
                    field: "hosts".to_string(),
                    value: h.clone(),
                    expected: format!("a host name or wildcard pattern ({e})"),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            patterns,
            accepted: HashSet::new(),
        })
    }

    pub fn is_active(&self) -> bool {
        !self.patterns.is_empty()
    }

    /// Whether a line from `host` passes. Lines without a host always pass.
    pub fn accepts(&mut self, host: Option<&str>) -> bool {
        let Some(host) = host.filter(|h| !h.is_empty()) else {
            return true;
        };
        if !self.is_active() || self.accepted.contains(host) {
            return true;
        }
        if self.patterns.iter().any(|p| p.matches(host)) {
            self.accepted.insert(host.to_string());
            true
        } else {
            false
        }
    }
}

// =============================================================================
// Content pattern filter
// =============================================================================

/// Outcome of the content pattern filter for one raw line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternCheck {
    /// The line passed the filter (honouring inversion).
    pub selected: bool,

    /// Byte span of the first pattern match, for non-inverted selection.
    pub span: Option<(usize, usize)>,
}

/// Content patterns searched in the raw line. Without patterns every line
/// is selected, unless inverted, in which case none is.
#[derive(Debug, Clone, Default)]
pub struct PatternFilter {
    patterns: Vec<Regex>,
    invert: bool,
}

impl PatternFilter {
    pub fn new(
        patterns: &[String],
        ignore_case: bool,
        invert: bool,
    ) -> Result<Self, ConfigError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(p)
                    .case_insensitive(ignore_case)
                    .build()
                    .map_err(|e| ConfigError::InvalidRegex {
                        pattern: p.clone(),
                        source: e,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns, invert })
    }

    pub fn check(&self, line: &str) -> PatternCheck {
        if self.patterns.is_empty() {
            return PatternCheck {
                selected: !self.invert,
                span: None,
            };
        }
        let found = self
            .patterns
            .iter()
            .find_map(|p| p.find(line))
            .map(|m| (m.start(), m.end()));
        if self.invert {
            PatternCheck {
                selected: found.is_none(),
                span: None,
            }
        } else {
            PatternCheck {
                selected: found.is_some(),
                span: found,
            }
        }
    }
}
