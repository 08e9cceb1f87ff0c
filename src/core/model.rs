// LogTally - core/model.rs
//
// Core data model types. Pure data definitions with no I/O and no platform
// dependencies. These types are the shared vocabulary across all layers.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;

// =============================================================================
// Parsed event (output of a line format)
// =============================================================================

/// One decoded log line. Immutable once produced by a line format.
///
/// Date/time parts are kept textual exactly as captured; the timestamp
/// module turns them into a comparable instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedEvent {
    /// Originating host, when the format carries one.
    pub host: Option<String>,

    /// Application tag (e.g. the syslog program name).
    pub apptag: Option<String>,

    /// Month as captured: three-letter name or two-digit numeral.
    pub month: String,

    /// Day of month as captured (may be space-padded in the source).
    pub day: String,

    /// Local time of day, `HH:MM:SS`.
    pub ltime: String,

    /// Explicit year, when the format carries one.
    pub year: Option<String>,

    /// Message part of the line, matched by application rules.
    pub message: String,

    /// Repeat count of a "message repeated N times" line.
    pub repeat: Option<u64>,
}

// =============================================================================
// Rule engine outcome
// =============================================================================

/// Data handed to the remap collaborator to rewrite an output line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemapSpec {
    /// Remapped host value.
    pub host: Option<String>,

    /// Message text rebuilt from remapped field values.
    pub message: String,
}

/// Result of running an application's rule engine on one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchOutcome {
    /// A rule matched and was not voided by filter rejection.
    pub matched: bool,

    /// `Some(true)` for a filter match (or any match of an app with no
    /// filters), `Some(false)` for a partial match, `None` when unmatched.
    pub full_match: Option<bool>,

    /// Thread identifier captured by the rule's `thread` group.
    pub thread: Option<String>,

    /// Remap data, present only when a remapper is configured.
    pub remap: Option<RemapSpec>,
}

impl MatchOutcome {
    /// Outcome for a message no rule accepted.
    pub fn unmatched() -> Self {
        Self::default()
    }

    /// Outcome for a filter-rejected match that still carries a thread id.
    pub fn rejected(thread: Option<String>) -> Self {
        Self {
            thread,
            ..Self::default()
        }
    }
}

// =============================================================================
// Emission records (handed to the output dispatcher)
// =============================================================================

/// A line selected for output.
#[derive(Debug, Clone, Copy)]
pub struct EmittedLine<'a> {
    /// Name of the file the line was read from.
    pub filename: &'a str,

    /// 1-based line number, when line numbers were requested.
    pub line_number: Option<u64>,

    /// Decoded event. Absent for lines flushed from a thread cache.
    pub event: Option<&'a ParsedEvent>,

    /// Raw (possibly remapped) line text without trailing newline.
    pub raw: &'a str,

    /// Text matched by the content pattern, if any.
    pub pattern_match: Option<&'a str>,
}

// =============================================================================
// Statistics
// =============================================================================

/// Per-file processing statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FileStats {
    /// File path (or display name for non-file inputs).
    pub path: PathBuf,

    /// Physical lines read.
    pub lines: u64,

    /// Lines counted as matches (including repeat counts and thread flushes).
    pub matched: u64,

    /// Lines no line format could decode.
    pub unparsed: u64,

    /// App tags with no registered application.
    pub unknown_tags: BTreeSet<String>,

    /// Earliest event time among dispatched lines.
    pub first_event: Option<NaiveDateTime>,

    /// Latest event time among dispatched lines.
    pub last_event: Option<NaiveDateTime>,

    /// The file was abandoned early because an event exceeded the window.
    pub stopped_at_window_end: bool,

    /// Scanning stopped because the maximum match count was reached.
    pub stopped_at_max_count: bool,
}

impl FileStats {
    /// Widen the first/last event bounds to include `time`.
    pub fn record_event_time(&mut self, time: NaiveDateTime) {
        self.first_event = Some(match self.first_event {
            Some(first) if first <= time => first,
            _ => time,
        });
        self.last_event = Some(match self.last_event {
            Some(last) if last >= time => last,
            _ => time,
        });
    }
}

/// Per-application counters at the end of a run.
#[derive(Debug, Clone, Serialize)]
pub struct AppStats {
    pub name: String,
    pub lines: u64,
    pub unparsed: u64,
}

/// Aggregated statistics for a whole run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Files successfully processed.
    pub files: usize,

    /// Files that could not be read.
    pub files_with_errors: usize,

    pub total_lines: u64,
    pub total_matched: u64,
    pub total_unparsed: u64,

    pub first_event: Option<NaiveDateTime>,
    pub last_event: Option<NaiveDateTime>,

    /// Union of unknown app tags across files.
    pub unknown_tags: BTreeSet<String>,

    /// Applications that processed at least one line.
    pub apps: Vec<AppStats>,

    /// Per-file breakdown.
    pub file_stats: Vec<FileStats>,
}

impl RunSummary {
    /// Fold one file's statistics into the run totals.
    pub fn absorb(&mut self, stats: FileStats) {
        self.files += 1;
        self.total_lines += stats.lines;
        self.total_matched = self.total_matched.saturating_add(stats.matched);
        self.total_unparsed += stats.unparsed;
        if let Some(first) = stats.first_event {
            self.first_event = Some(self.first_event.map_or(first, |f| f.min(first)));
        }
        if let Some(last) = stats.last_event {
            self.last_event = Some(self.last_event.map_or(last, |l| l.max(last)));
        }
        self.unknown_tags
            .extend(stats.unknown_tags.iter().cloned());
        self.file_stats.push(stats);
    }
}
