// LogTally - core/timestamp.rs
//
// Turns the textual date/time parts of a parsed event into a comparable
// instant. Years missing from the line are inferred from the log file's
// modification time, with a rollover rule for files rotated in January.

use crate::core::model::ParsedEvent;
use crate::util::error::ParseError;
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};

/// Month names and numerals mapped to the canonical two-digit numeral.
const MONTHS: [(&str, &str, &str); 12] = [
    ("Jan", "1", "01"),
    ("Feb", "2", "02"),
    ("Mar", "3", "03"),
    ("Apr", "4", "04"),
    ("May", "5", "05"),
    ("Jun", "6", "06"),
    ("Jul", "7", "07"),
    ("Aug", "8", "08"),
    ("Sep", "9", "09"),
    ("Oct", "10", "10"),
    ("Nov", "11", "11"),
    ("Dec", "12", "12"),
];

/// Normalise a month (three-letter name, one- or two-digit numeral) to its
/// canonical two-digit numeral. Returns `None` for anything else.
pub fn normalize_month(month: &str) -> Option<&'static str> {
    let month = month.trim();
    MONTHS
        .iter()
        .find(|(name, short, canonical)| {
            month.eq_ignore_ascii_case(name) || month == *short || month == *canonical
        })
        .map(|(_, _, canonical)| *canonical)
}

/// Year inference for events that carry no explicit year.
///
/// Computed once per file from its modification time. When the file was
/// last written in January, events from any other month are assumed to
/// belong to the previous year (the file spans a year-end rotation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearInference {
    file_year: i32,
    january_rollover: bool,
}

impl YearInference {
    pub fn from_mtime(mtime: NaiveDateTime) -> Self {
        Self {
            file_year: mtime.year(),
            january_rollover: mtime.month() == 1,
        }
    }

    /// Year to assume for an event in `month` (canonical numeral).
    pub fn year_for(&self, month: &str) -> i32 {
        if self.january_rollover && month != "01" {
            self.file_year - 1
        } else {
            self.file_year
        }
    }
}

/// Compute the absolute instant of `event`.
///
/// `file` and `line_number` only feed error messages. An unknown month or a
/// malformed day, time, or year is a `ParseError`, fatal for the file.
pub fn event_time(
    event: &ParsedEvent,
    years: &YearInference,
    file: &str,
    line_number: u64,
) -> Result<NaiveDateTime, ParseError> {
    let month = normalize_month(&event.month).ok_or_else(|| ParseError::UnknownMonth {
        file: file.to_string(),
        line_number,
        month: event.month.clone(),
    })?;

    let invalid = || ParseError::InvalidTimestamp {
        file: file.to_string(),
        line_number,
        raw: format!(
            "{}-{}-{} {}",
            event.year.as_deref().unwrap_or("?"),
            event.month,
            event.day,
            event.ltime
        ),
    };

    let year = match event.year.as_deref() {
        Some(y) => y.trim().parse::<i32>().map_err(|_| invalid())?,
        None => years.year_for(month),
    };
    // Canonical months are always valid numerals.
    let month_num: u32 = month.parse().map_err(|_| invalid())?;
    let day: u32 = event.day.trim().parse().map_err(|_| invalid())?;

    let date = NaiveDate::from_ymd_opt(year, month_num, day).ok_or_else(invalid)?;
    let time = NaiveTime::parse_from_str(event.ltime.trim(), "%H:%M:%S").map_err(|_| invalid())?;
    Ok(date.and_time(time))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mtime(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn event(month: &str, day: &str, ltime: &str, year: Option<&str>) -> ParsedEvent {
        ParsedEvent {
            host: None,
            apptag: None,
            month: month.to_string(),
            day: day.to_string(),
            ltime: ltime.to_string(),
            year: year.map(str::to_string),
            message: String::new(),
            repeat: None,
        }
    }

    #[test]
    fn test_normalize_month() {
        assert_eq!(normalize_month("Jan"), Some("01"));
        assert_eq!(normalize_month("dec"), Some("12"));
        assert_eq!(normalize_month("07"), Some("07"));
        assert_eq!(normalize_month("7"), Some("07"));
        assert_eq!(normalize_month("Foo"), None);
        assert_eq!(normalize_month("13"), None);
    }

    #[test]
    fn test_year_rollover_in_january() {
        let years = YearInference::from_mtime(mtime(2024, 1, 3));
        assert_eq!(years.year_for("12"), 2023);
        assert_eq!(years.year_for("01"), 2024);
    }

    #[test]
    fn test_no_rollover_outside_january() {
        let years = YearInference::from_mtime(mtime(2024, 6, 3));
        assert_eq!(years.year_for("12"), 2024);
        assert_eq!(years.year_for("01"), 2024);
    }

    #[test]
    fn test_event_time_infers_previous_year() {
        let years = YearInference::from_mtime(mtime(2024, 1, 3));
        let t = event_time(&event("Dec", "31", "23:59:59", None), &years, "f", 1).unwrap();
        assert_eq!(t, mtime(2023, 12, 31).date().and_hms_opt(23, 59, 59).unwrap());
        let t = event_time(&event("Jan", " 2", "00:00:01", None), &years, "f", 2).unwrap();
        assert_eq!(t, mtime(2024, 1, 2).date().and_hms_opt(0, 0, 1).unwrap());
    }

    #[test]
    fn test_explicit_year_wins() {
        let years = YearInference::from_mtime(mtime(2024, 1, 3));
        let t = event_time(&event("03", "05", "22:14:15", Some("2019")), &years, "f", 1).unwrap();
        assert_eq!(t, mtime(2019, 3, 5).date().and_hms_opt(22, 14, 15).unwrap());
    }

    #[test]
    fn test_unknown_month_is_error() {
        let years = YearInference::from_mtime(mtime(2024, 5, 1));
        let err = event_time(&event("Xyz", "1", "10:00:00", None), &years, "f", 9).unwrap_err();
        assert!(matches!(err, ParseError::UnknownMonth { line_number: 9, .. }));
    }

    #[test]
    fn test_malformed_time_is_error() {
        let years = YearInference::from_mtime(mtime(2024, 5, 1));
        let err = event_time(&event("May", "1", "25:00:00", None), &years, "f", 1).unwrap_err();
        assert!(matches!(err, ParseError::InvalidTimestamp { .. }));
    }
}
