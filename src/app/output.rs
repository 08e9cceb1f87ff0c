// LogTally - app/output.rs
//
// Output dispatcher writing selected lines grep-style:
// `[file:][line:]raw` for lines and `file:count` for count records.

use crate::core::model::EmittedLine;
use crate::core::sink::EventSink;
use std::io::Write;

/// Sink writing to any `Write`, normally a locked, buffered stdout.
pub struct WriterSink<W: Write> {
    out: W,
    with_filename: bool,
    failed: bool,
}

impl<W: Write> WriterSink<W> {
    /// `with_filename` prefixes every line with its file name, as when
    /// several files are searched.
    pub fn new(out: W, with_filename: bool) -> Self {
        Self {
            out,
            with_filename,
            failed: false,
        }
    }

    /// Flush buffered output and give back the writer.
    pub fn finish(mut self) -> std::io::Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }

    fn write_record(&mut self, record: std::fmt::Arguments<'_>) {
        if self.failed {
            return;
        }
        if let Err(e) = self.out.write_fmt(record) {
            // Usually a closed pipe: stop writing, keep processing.
            tracing::warn!(error = %e, "Output write failed; suppressing further output");
            self.failed = true;
        }
    }
}

impl<W: Write> EventSink for WriterSink<W> {
    fn send_event(&mut self, line: EmittedLine<'_>) {
        let file = if self.with_filename { line.filename } else { "" };
        let sep = if self.with_filename { ":" } else { "" };
        match line.line_number {
            Some(n) => self.write_record(format_args!("{file}{sep}{n}:{}\n", line.raw)),
            None => self.write_record(format_args!("{file}{sep}{}\n", line.raw)),
        }
    }

    fn send_count(&mut self, filename: &str, count: u64) {
        self.write_record(format_args!("{filename}:{count}\n"));
    }
}
