// LogTally - core/threads.rs
//
// Thread correlation cache. In thread mode, matched lines sharing a thread
// identifier are buffered per application and emitted together once the
// thread is complete.

use crate::core::model::EmittedLine;
use crate::core::sink::EventSink;
use crate::util::constants;
use chrono::{Duration, NaiveDateTime};
use std::collections::{HashMap, VecDeque};

/// Call contract between the pipeline and a thread cache.
///
/// The `flush_*` methods return the number of lines counted as matches,
/// whether or not they were emitted.
pub trait ThreadCache {
    fn add_line(
        &mut self,
        line: &str,
        thread: &str,
        pattern_match: bool,
        full_match: bool,
        time: NaiveDateTime,
    );

    /// Drop unselected threads that have been idle too long.
    fn purge_threads(&mut self, now: NaiveDateTime);

    /// Flush selected threads that have been idle too long, oldest first.
    fn flush_old(
        &mut self,
        now: NaiveDateTime,
        emit: bool,
        max_remaining: Option<u64>,
        filename: &str,
        sink: &mut dyn EventSink,
    ) -> u64;

    /// Flush every selected thread and clear the cache.
    fn flush_all(
        &mut self,
        now: NaiveDateTime,
        emit: bool,
        max_remaining: Option<u64>,
        filename: &str,
        sink: &mut dyn EventSink,
    ) -> u64;
}

#[derive(Debug)]
struct ThreadBuffer {
    lines: VecDeque<String>,
    /// Some buffered line had both a pattern match and a full match.
    selected: bool,
    first_seen: NaiveDateTime,
    last_seen: NaiveDateTime,
}

/// In-memory thread cache keyed by thread identifier.
#[derive(Debug)]
pub struct BufferedThreadCache {
    threads: HashMap<String, ThreadBuffer>,
    idle_timeout: Duration,
    max_lines: usize,
}

impl Default for BufferedThreadCache {
    fn default() -> Self {
        Self::new(
            Duration::seconds(constants::THREAD_IDLE_TIMEOUT_SECS),
            constants::MAX_THREAD_LINES,
        )
    }
}

impl BufferedThreadCache {
    pub fn new(idle_timeout: Duration, max_lines: usize) -> Self {
        Self {
            threads: HashMap::new(),
            idle_timeout,
            max_lines,
        }
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// Emit (or just count) the given threads, oldest first, within budget.
    fn flush(
        &mut self,
        mut ids: Vec<String>,
        emit: bool,
        max_remaining: Option<u64>,
        filename: &str,
        sink: &mut dyn EventSink,
    ) -> u64 {
        ids.sort_by_key(|id| self.threads.get(id).map(|t| t.first_seen));
        let mut counted = 0u64;
        'threads: for id in ids {
            let Some(buffer) = self.threads.remove(&id) else {
                continue;
            };
            for line in &buffer.lines {
                if max_remaining.is_some_and(|max| counted >= max) {
                    break 'threads;
                }
                if emit {
                    sink.send_event(EmittedLine {
                        filename,
                        line_number: None,
                        event: None,
                        raw: line,
                        pattern_match: None,
                    });
                }
                counted += 1;
            }
        }
        counted
    }
}

impl ThreadCache for BufferedThreadCache {
    fn add_line(
        &mut self,
        line: &str,
        thread: &str,
        pattern_match: bool,
        full_match: bool,
        time: NaiveDateTime,
    ) {
        let buffer = self
            .threads
            .entry(thread.to_string())
            .or_insert_with(|| ThreadBuffer {
                lines: VecDeque::new(),
                selected: false,
                first_seen: time,
                last_seen: time,
            });
        buffer.lines.push_back(line.to_string());
        if buffer.lines.len() > self.max_lines {
            buffer.lines.pop_front();
        }
        buffer.selected |= pattern_match && full_match;
        buffer.last_seen = buffer.last_seen.max(time);
    }

    fn purge_threads(&mut self, now: NaiveDateTime) {
        let timeout = self.idle_timeout;
        let before = self.threads.len();
        self.threads
            .retain(|_, t| t.selected || now - t.last_seen <= timeout);
        let purged = before - self.threads.len();
        if purged > 0 {
            tracing::debug!(purged, remaining = self.threads.len(), "Purged idle threads");
        }
    }

    fn flush_old(
        &mut self,
        now: NaiveDateTime,
        emit: bool,
        max_remaining: Option<u64>,
        filename: &str,
        sink: &mut dyn EventSink,
    ) -> u64 {
        let timeout = self.idle_timeout;
        let ids: Vec<String> = self
            .threads
            .iter()
            .filter(|(_, t)| t.selected && now - t.last_seen > timeout)
            .map(|(id, _)| id.clone())
            .collect();
        self.flush(ids, emit, max_remaining, filename, sink)
    }

    fn flush_all(
        &mut self,
        _now: NaiveDateTime,
        emit: bool,
        max_remaining: Option<u64>,
        filename: &str,
        sink: &mut dyn EventSink,
    ) -> u64 {
        let ids: Vec<String> = self
            .threads
            .iter()
            .filter(|(_, t)| t.selected)
            .map(|(id, _)| id.clone())
            .collect();
        let counted = self.flush(ids, emit, max_remaining, filename, sink);
        self.threads.clear();
        counted
    }
}
