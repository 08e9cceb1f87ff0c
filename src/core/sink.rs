// LogTally - core/sink.rs
//
// Output dispatcher contract. The pipeline hands every selected line and
// every per-file count record to an `EventSink`.

use crate::core::model::EmittedLine;

pub trait EventSink {
    /// A line selected for output.
    fn send_event(&mut self, line: EmittedLine<'_>);

    /// Terminal per-file record in count-only mode.
    fn send_count(&mut self, filename: &str, count: u64);
}

/// Owned copy of an emitted line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedLine {
    pub filename: String,
    pub line_number: Option<u64>,
    pub raw: String,
    pub pattern_match: Option<String>,
}

/// Sink that keeps everything in memory, for library callers and tests.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub lines: Vec<CollectedLine>,
    pub counts: Vec<(String, u64)>,
}

impl EventSink for CollectingSink {
    fn send_event(&mut self, line: EmittedLine<'_>) {
        self.lines.push(CollectedLine {
            filename: line.filename.to_string(),
            line_number: line.line_number,
            raw: line.raw.to_string(),
            pattern_match: line.pattern_match.map(str::to_string),
        });
    }

    fn send_count(&mut self, filename: &str, count: u64) {
        self.counts.push((filename.to_string(), count));
    }
}
