// LogTally - core/pipeline.rs
//
// Per-file orchestration of the matching pipeline. Each physical line is
// decoded, time-checked, filtered, attributed to an application, run through
// its rules, and then either emitted, buffered for thread correlation, or
// discarded. Core layer: reads from any `BufRead`, never opens files.

use crate::core::application::{Application, TagLookup, TagMap};
use crate::core::filter::{HostFilter, PatternFilter, TimeRange, TimeWindow, WindowCheck};
use crate::core::format::FormatCycler;
use crate::core::model::{EmittedLine, FileStats, MatchOutcome, ParsedEvent};
use crate::core::remap::Remapper;
use crate::core::sink::EventSink;
use crate::core::threads::{BufferedThreadCache, ThreadCache};
use crate::core::timestamp::{self, YearInference};
use crate::util::constants;
use crate::util::error::{LogTallyError, Result};
use crate::util::logging::preview;
use chrono::NaiveDateTime;
use std::borrow::Cow;
use std::io::BufRead;
use std::path::PathBuf;

// =============================================================================
// Options and filters
// =============================================================================

/// Run options consumed by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Buffer matched lines per thread id instead of emitting them directly.
    pub thread: bool,
    /// Emit nothing; stop each file at the first match.
    pub quiet: bool,
    /// Emit one count record per file instead of lines.
    pub count: bool,
    pub max_count: Option<u64>,
    /// Run application rules on selected lines.
    pub use_rules: bool,
    /// Select lines no rule matched instead of matched ones.
    pub unparsed: bool,
    /// Attach 1-based line numbers to emitted lines.
    pub line_number: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            thread: false,
            quiet: false,
            count: false,
            max_count: None,
            use_rules: true,
            unparsed: false,
            line_number: false,
        }
    }
}

impl RunOptions {
    /// Match budget per file. Quiet mode needs a single match.
    pub fn effective_max_count(&self) -> Option<u64> {
        if self.quiet {
            Some(1)
        } else {
            self.max_count
        }
    }

    /// Whether selected lines are forwarded to the sink.
    pub fn send_selected(&self) -> bool {
        !(self.quiet || self.count)
    }
}

/// Line filters, applied in this order: window, range, host, pattern.
#[derive(Debug, Clone, Default)]
pub struct LineFilters {
    pub window: TimeWindow,
    pub range: Option<TimeRange>,
    pub hosts: HostFilter,
    pub patterns: PatternFilter,
}

// =============================================================================
// Matcher
// =============================================================================

/// State carried from a matched line to a following repeat line.
#[derive(Debug, Clone)]
struct RepeatTarget {
    app: usize,
    thread: Option<String>,
    pattern_match: bool,
    full_match: bool,
    time: NaiveDateTime,
}

/// How a line was attributed to an application.
enum Resolution {
    /// Resolved; the outcome is set when the rules already ran to pick the
    /// application among several candidates.
    App(usize, Option<MatchOutcome>),
    Discard,
}

fn remapper_mut(remapper: &mut Option<Box<dyn Remapper>>) -> Option<&mut dyn Remapper> {
    match remapper {
        Some(r) => {
            let r: &mut dyn Remapper = &mut **r;
            Some(r)
        }
        None => None,
    }
}

/// The matching engine: formats, applications, filters, and thread caches
/// shared by every file of a run.
pub struct Matcher {
    formats: FormatCycler,
    apps: Vec<Application>,
    tagmap: TagMap,
    filters: LineFilters,
    options: RunOptions,
    caches: Vec<Box<dyn ThreadCache>>,
    remapper: Option<Box<dyn Remapper>>,
}

impl Matcher {
    /// `apps` must already be in identity order.
    pub fn new(
        formats: FormatCycler,
        apps: Vec<Application>,
        filters: LineFilters,
        options: RunOptions,
    ) -> Self {
        let tagmap = TagMap::build(&apps);
        let caches = apps
            .iter()
            .map(|_| Box::new(BufferedThreadCache::default()) as Box<dyn ThreadCache>)
            .collect();
        tracing::debug!(
            apps = apps.len(),
            tags = tagmap.len(),
            formats = formats.formats().len(),
            thread = options.thread,
            "Matcher ready"
        );
        Self {
            formats,
            apps,
            tagmap,
            filters,
            options,
            caches,
            remapper: None,
        }
    }

    pub fn with_remapper(mut self, remapper: Box<dyn Remapper>) -> Self {
        self.remapper = Some(remapper);
        self
    }

    /// Replace the thread caches, one per application.
    pub fn with_thread_caches<F>(mut self, mut make: F) -> Self
    where
        F: FnMut(&Application) -> Box<dyn ThreadCache>,
    {
        self.caches = self.apps.iter().map(&mut make).collect();
        self
    }

    pub fn apps(&self) -> &[Application] {
        &self.apps
    }

    pub fn formats(&self) -> &FormatCycler {
        &self.formats
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn into_apps(self) -> Vec<Application> {
        self.apps
    }

    /// Resolve the application of a line that passed the filters.
    fn resolve_app(
        &mut self,
        event: &ParsedEvent,
        applist: &[usize],
        raw: &str,
        stats: &mut FileStats,
    ) -> Resolution {
        if let Some(name) = self.formats.active().and_then(|f| f.app.as_deref()) {
            return match self.apps.iter().position(|a| a.name == name) {
                Some(idx) => Resolution::App(idx, None),
                None => {
                    tracing::debug!(app = name, "Line format names an application that is not loaded");
                    Resolution::Discard
                }
            };
        }

        let Some(apptag) = event.apptag.as_deref() else {
            if let [only] = applist {
                return Resolution::App(*only, None);
            }
            tracing::error!(line = preview(raw), "Unknown application for line");
            return Resolution::Discard;
        };

        let candidates = match self.tagmap.resolve(apptag) {
            TagLookup::Exact(apps) => apps.to_vec(),
            TagLookup::Prefix(apps) => apps,
            TagLookup::NotFound => {
                if stats.unknown_tags.len() < constants::MAX_UNKNOWN_TAGS {
                    stats.unknown_tags.insert(apptag.to_string());
                }
                return Resolution::Discard;
            }
        };
        if candidates.len() == 1 || !self.options.use_rules {
            return Resolution::App(candidates[0], None);
        }
        for idx in candidates {
            let outcome = self.apps[idx].process(event, remapper_mut(&mut self.remapper));
            if outcome.matched {
                return Resolution::App(idx, Some(outcome));
            }
        }
        tracing::error!(apptag, line = preview(raw), "No candidate application matched the line");
        Resolution::Discard
    }

    /// Emit, or count without emitting, the buffered threads of the file's
    /// applications. `all` flushes every selected thread.
    fn flush_threads(
        &mut self,
        applist: &[usize],
        now: NaiveDateTime,
        all: bool,
        matched: &mut u64,
        filename: &str,
        sink: &mut dyn EventSink,
    ) {
        let max_count = self.options.effective_max_count();
        let emit = self.options.send_selected();
        for &app in applist {
            let Some(cache) = self.caches.get_mut(app) else {
                continue;
            };
            cache.purge_threads(now);
            if max_count.is_some_and(|m| *matched >= m) {
                break;
            }
            let remaining = max_count.map(|m| m - *matched);
            let flushed = if all {
                cache.flush_all(now, emit, remaining, filename, sink)
            } else {
                cache.flush_old(now, emit, remaining, filename, sink)
            };
            *matched = matched.saturating_add(flushed);
        }
    }

    /// Run one file through the pipeline.
    ///
    /// `mtime` drives year inference for events without a year. `applist`
    /// holds the applications associated with the file; a single entry
    /// resolves lines that carry no app tag. A malformed timestamp is fatal
    /// for the file; per-line anomalies are only counted and logged.
    pub fn process_file<R: BufRead>(
        &mut self,
        name: &str,
        mut reader: R,
        mtime: NaiveDateTime,
        applist: &[usize],
        sink: &mut dyn EventSink,
    ) -> Result<FileStats> {
        let opts = self.options.clone();
        let max_count = opts.effective_max_count();
        let send_selected = opts.send_selected();
        let years = YearInference::from_mtime(mtime);

        let mut stats = FileStats {
            path: PathBuf::from(name),
            ..Default::default()
        };
        let mut matched: u64 = 0;
        let mut repeat_target: Option<RepeatTarget> = None;
        let mut last_app: Option<usize> = None;
        let mut last_time: Option<NaiveDateTime> = None;
        let mut buf: Vec<u8> = Vec::new();

        tracing::debug!(file = name, apps = applist.len(), %mtime, "Processing file");

        loop {
            buf.clear();
            let read = reader.read_until(b'\n', &mut buf).map_err(|e| LogTallyError::Io {
                path: PathBuf::from(name),
                operation: "read",
                source: e,
            })?;
            if read == 0 {
                break;
            }
            stats.lines += 1;
            let line_number = stats.lines;
            let text = String::from_utf8_lossy(&buf);
            let raw = text.trim_end_matches(['\n', '\r']);

            // ---- Decode ----
            let Some(caps) = self.formats.decode(raw) else {
                stats.unparsed += 1;
                continue;
            };
            let Some(format) = self.formats.active() else {
                continue;
            };
            let event = format.event(&caps);

            // ---- Repeat lines ----
            if let Some(repeat) = event.repeat {
                if let Some(target) = repeat_target.take() {
                    if !opts.thread {
                        matched = matched.saturating_add(repeat);
                    }
                    if opts.use_rules {
                        let app = &mut self.apps[target.app];
                        app.increase_last(repeat);
                        app.counter += 1;
                        if let (Some(thread), Some(cache)) =
                            (target.thread.as_deref(), self.caches.get_mut(target.app))
                        {
                            cache.add_line(raw, thread, target.pattern_match, target.full_match, target.time);
                        }
                    }
                } else if let Some(app) = last_app {
                    self.apps[app].counter += 1;
                }
                continue;
            }
            repeat_target = None;

            // ---- Time window and intraday range ----
            let time = timestamp::event_time(&event, &years, name, line_number)?;
            match self.filters.window.check(time) {
                WindowCheck::Before => continue,
                WindowCheck::After => {
                    if mtime < time {
                        tracing::error!(file = name, line = preview(raw), "Event is newer than the file modification time");
                    }
                    tracing::warn!(file = name, line = preview(raw), "Newer line, skipping the rest of the file");
                    stats.stopped_at_window_end = true;
                    break;
                }
                WindowCheck::Inside => {}
            }
            if self.filters.range.is_some_and(|r| !r.between(&event.ltime)) {
                continue;
            }
            last_time = Some(time);

            // ---- Host and content pattern ----
            if !self.filters.hosts.accepts(event.host.as_deref()) {
                continue;
            }
            let check = self.filters.patterns.check(raw);
            if !check.selected && !opts.thread {
                continue;
            }

            // ---- Application ----
            let (app_idx, pre_outcome) = match self.resolve_app(&event, applist, raw, &mut stats) {
                Resolution::App(idx, outcome) => (idx, outcome),
                Resolution::Discard => continue,
            };
            last_app = Some(app_idx);
            self.apps[app_idx].counter += 1;

            // ---- Rules ----
            let mut output: Cow<'_, str> = Cow::Borrowed(raw);
            let mut target = RepeatTarget {
                app: app_idx,
                thread: None,
                pattern_match: check.selected,
                full_match: false,
                time,
            };
            if opts.use_rules && (check.selected || opts.thread) {
                let outcome = match pre_outcome {
                    Some(outcome) => outcome,
                    None => self.apps[app_idx].process(&event, remapper_mut(&mut self.remapper)),
                };
                let full_match = outcome.full_match.unwrap_or(false);
                target.full_match = full_match;

                if !outcome.matched {
                    if opts.unparsed {
                        if let (Some(remapper), Some(spec)) = (self.remapper.as_mut(), outcome.remap.as_ref()) {
                            output = Cow::Owned(remapper.remap_line_text(&caps, raw, spec));
                        }
                    } else if let (true, Some(thread)) = (opts.thread, outcome.thread.as_deref()) {
                        // Rejected filter match: context for its thread only.
                        if let Some(cache) = self.caches.get_mut(app_idx) {
                            cache.add_line(raw, thread, check.selected, false, time);
                        }
                        continue;
                    } else {
                        if check.span.is_some() {
                            tracing::debug!(line = preview(raw), "Line not parsed by application rules");
                        }
                        continue;
                    }
                } else if opts.unparsed {
                    continue;
                } else if let Some(thread) = outcome.thread.as_deref() {
                    if let (Some(remapper), Some(spec)) = (self.remapper.as_mut(), outcome.remap.as_ref()) {
                        output = Cow::Owned(remapper.remap_line_text(&caps, raw, spec));
                    }
                    if let Some(cache) = self.caches.get_mut(app_idx) {
                        cache.add_line(&output, thread, check.selected, full_match, time);
                    }
                    target.thread = Some(thread.to_string());
                } else if !full_match && self.apps[app_idx].has_filters {
                    continue;
                } else if let (Some(remapper), Some(spec)) = (self.remapper.as_mut(), outcome.remap.as_ref()) {
                    output = Cow::Owned(remapper.remap_line_text(&caps, raw, spec));
                }
            }
            stats.record_event_time(time);
            repeat_target = Some(target);

            // ---- Dispatch ----
            if opts.thread {
                if line_number % constants::PURGE_THREADS_LIMIT == 0 {
                    self.flush_threads(applist, time, false, &mut matched, name, sink);
                }
            } else {
                matched = matched.saturating_add(1);
                if send_selected {
                    sink.send_event(EmittedLine {
                        filename: name,
                        line_number: opts.line_number.then_some(line_number),
                        event: Some(&event),
                        raw: &output,
                        pattern_match: check.span.map(|(s, e)| &raw[s..e]),
                    });
                }
            }

            if max_count.is_some_and(|m| matched >= m) {
                stats.stopped_at_max_count = true;
                break;
            }
        }

        if opts.thread {
            if let Some(now) = last_time {
                self.flush_threads(applist, now, true, &mut matched, name, sink);
            }
        }
        if opts.count {
            sink.send_count(name, matched);
        }

        stats.matched = matched;
        tracing::debug!(
            file = name,
            lines = stats.lines,
            matched = stats.matched,
            unparsed = stats.unparsed,
            unknown_tags = stats.unknown_tags.len(),
            "File processed"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::aggregate::Selector;
    use crate::core::application::{build_application, parse_app_toml, sort_applications, BuildOptions};
    use crate::core::format::{load_builtin_formats, parse_format_toml, validate_and_compile};
    use crate::core::sink::CollectingSink;
    use chrono::NaiveDate;
    use std::io::Cursor;
    use std::path::Path;

    const APP: &str = r#"
[app]
name = "app"

[[rules]]
name = "request"
pattern = 'user=(?P<user>\w+) status=(?P<status>\d+)'
"#;

    const MAIL: &str = r#"
[app]
name = "mail"
tags = ["postfix"]

[[rules]]
name = "from"
pattern = '(?P<thread>[0-9A-F]+): from=<(?P<from>[^>]*)>'

[[rules]]
name = "to"
pattern = '(?P<thread>[0-9A-F]+): to=<(?P<to>[^>]*)>'
"#;

    fn mtime() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn matcher_with(defs: &[&str], build: &BuildOptions, filters: LineFilters, options: RunOptions) -> Matcher {
        let mut apps: Vec<Application> = defs
            .iter()
            .map(|d| build_application(parse_app_toml(d, Path::new("t.app.toml")).unwrap(), build).unwrap())
            .collect();
        sort_applications(&mut apps);
        Matcher::new(FormatCycler::new(load_builtin_formats()), apps, filters, options)
    }

    fn matcher(options: RunOptions) -> Matcher {
        matcher_with(&[APP], &BuildOptions::default(), LineFilters::default(), options)
    }

    fn run(m: &mut Matcher, text: &str, sink: &mut CollectingSink) -> FileStats {
        let applist: Vec<usize> = (0..m.apps().len()).collect();
        m.process_file("test.log", Cursor::new(text.to_string()), mtime(), &applist, sink)
            .unwrap()
    }

    #[test]
    fn test_two_line_scenario_accumulates_results() {
        let mut m = matcher(RunOptions::default());
        let mut sink = CollectingSink::default();
        let text = "Jan 1 10:00:00 host1 app[123]: user=alice status=200\n\
                    Jan 1 10:00:05 host1 app[123]: user=bob status=404\n";
        let stats = run(&mut m, text, &mut sink);
        assert_eq!(stats.lines, 2);
        assert_eq!(stats.matched, 2);
        assert_eq!(sink.lines.len(), 2);

        let results = &m.apps()[0].rules[0].results;
        let key = |u: &str, s: &str| vec![Some("host1".to_string()), Some(u.into()), Some(s.into())];
        assert_eq!(results.len(), 2);
        assert_eq!(results.get(&key("alice", "200")), Some(1));
        assert_eq!(results.get(&key("bob", "404")), Some(1));
        let sel = Selector::parse(r#"status=="404""#).unwrap();
        assert_eq!(results.total(&sel, None).unwrap(), 1);
    }

    #[test]
    fn test_max_count_stops_scanning() {
        let mut m = matcher(RunOptions {
            max_count: Some(2),
            ..Default::default()
        });
        let mut sink = CollectingSink::default();
        let text: String = (0..5)
            .map(|i| format!("Jan 1 10:00:0{i} h app: user=u{i} status=200\n"))
            .collect();
        let stats = run(&mut m, &text, &mut sink);
        assert_eq!(sink.lines.len(), 2);
        assert_eq!(stats.lines, 2);
        assert!(stats.stopped_at_max_count);
    }

    #[test]
    fn test_repeat_line_bumps_last_result() {
        let mut m = matcher(RunOptions::default());
        let mut sink = CollectingSink::default();
        let text = "Jan 1 10:00:00 h app: user=alice status=200\n\
                    Jan 1 10:00:01 h last message repeated 5 times\n";
        let stats = run(&mut m, text, &mut sink);
        let results = &m.apps()[0].rules[0].results;
        let key = vec![Some("h".to_string()), Some("alice".into()), Some("200".into())];
        assert_eq!(results.get(&key), Some(6));
        assert_eq!(results.len(), 1);
        assert_eq!(stats.matched, 6);
        assert_eq!(sink.lines.len(), 1);
        assert_eq!(m.apps()[0].counter, 2);
    }

    #[test]
    fn test_repeat_after_filtered_line_is_ignored() {
        let filters = LineFilters {
            hosts: HostFilter::new(&["web*".to_string()]).unwrap(),
            ..Default::default()
        };
        let mut m = matcher_with(&[APP], &BuildOptions::default(), filters, RunOptions::default());
        let mut sink = CollectingSink::default();
        let text = "Jan 1 10:00:00 db1 app: user=alice status=200\n\
                    Jan 1 10:00:01 db1 message repeated 3 times\n";
        let stats = run(&mut m, text, &mut sink);
        assert_eq!(stats.matched, 0);
        assert!(m.apps()[0].rules[0].results.is_empty());
    }

    #[test]
    fn test_window_skips_and_stops() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(10, 0, 1);
        let end = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(10, 0, 3);
        let filters = LineFilters {
            window: TimeWindow::new(start, end).unwrap(),
            ..Default::default()
        };
        let mut m = matcher_with(&[APP], &BuildOptions::default(), filters, RunOptions::default());
        let mut sink = CollectingSink::default();
        let text: String = (0..6)
            .map(|i| format!("Jan 1 10:00:0{i} h app: user=u{i} status=200\n"))
            .collect();
        let stats = run(&mut m, &text, &mut sink);
        let raws: Vec<&str> = sink.lines.iter().map(|l| l.raw.as_str()).collect();
        assert_eq!(raws.len(), 3);
        assert!(raws[0].contains("u1"));
        assert!(stats.stopped_at_window_end);
        assert_eq!(stats.lines, 5);
    }

    #[test]
    fn test_unknown_tag_recorded_and_unparsable_counted() {
        let mut m = matcher(RunOptions::default());
        let mut sink = CollectingSink::default();
        let text = "Jan 1 10:00:00 h sshd[1]: Accepted password\n\
                    not a syslog line\n\
                    Jan 1 10:00:01 h app: user=a status=1\n";
        let stats = run(&mut m, text, &mut sink);
        assert!(stats.unknown_tags.contains("sshd"));
        assert_eq!(stats.unparsed, 1);
        assert_eq!(stats.matched, 1);
    }

    #[test]
    fn test_pattern_filter_and_unparsed_mode() {
        let filters = LineFilters {
            patterns: PatternFilter::new(&["alice".to_string()], false, false).unwrap(),
            ..Default::default()
        };
        let mut m = matcher_with(&[APP], &BuildOptions::default(), filters, RunOptions::default());
        let mut sink = CollectingSink::default();
        let text = "Jan 1 10:00:00 h app: user=alice status=200\n\
                    Jan 1 10:00:01 h app: user=bob status=200\n\
                    Jan 1 10:00:02 h app: alice logged out\n";
        run(&mut m, text, &mut sink);
        assert_eq!(sink.lines.len(), 1);
        assert_eq!(sink.lines[0].pattern_match.as_deref(), Some("alice"));

        let mut m = matcher(RunOptions {
            unparsed: true,
            ..Default::default()
        });
        let mut sink = CollectingSink::default();
        run(&mut m, text, &mut sink);
        assert_eq!(sink.lines.len(), 1);
        assert!(sink.lines[0].raw.ends_with("alice logged out"));
    }

    #[test]
    fn test_count_mode_sends_summary_only() {
        let mut m = matcher(RunOptions {
            count: true,
            line_number: true,
            ..Default::default()
        });
        let mut sink = CollectingSink::default();
        let text = "Jan 1 10:00:00 h app: user=a status=1\nJan 1 10:00:01 h app: user=b status=2\n";
        run(&mut m, text, &mut sink);
        assert!(sink.lines.is_empty());
        assert_eq!(sink.counts, vec![("test.log".to_string(), 2)]);
    }

    #[test]
    fn test_thread_mode_buffers_until_end_of_file() {
        let build = BuildOptions {
            thread: true,
            filters: vec![vec![("to".to_string(), r"bob@\S+".to_string())]],
            ..Default::default()
        };
        let options = RunOptions {
            thread: true,
            ..Default::default()
        };
        let mut m = matcher_with(&[MAIL], &build, LineFilters::default(), options);
        let mut sink = CollectingSink::default();
        let text = "Jan 1 10:00:00 mx postfix/qmgr[1]: 1A: from=<alice@x.org>\n\
                    Jan 1 10:00:01 mx postfix/qmgr[1]: 2B: from=<carol@x.org>\n\
                    Jan 1 10:00:02 mx postfix/smtp[2]: 1A: to=<bob@y.org>\n\
                    Jan 1 10:00:03 mx postfix/smtp[2]: 2B: to=<dave@y.org>\n";
        let stats = run(&mut m, text, &mut sink);
        let raws: Vec<&str> = sink.lines.iter().map(|l| l.raw.as_str()).collect();
        assert_eq!(raws.len(), 2);
        assert!(raws[0].ends_with("1A: from=<alice@x.org>"));
        assert!(raws[1].ends_with("1A: to=<bob@y.org>"));
        assert_eq!(stats.matched, 2);
    }

    #[test]
    fn test_single_app_file_resolves_untagged_lines() {
        let toml = r#"
[format]
id = "bare"
name = "Bare"

[parsing]
line_pattern = '^(?P<month>[A-Z][a-z]{2}) (?P<day>\d+) (?P<ltime>\S+) (?P<message>.*)$'
"#;
        let format = validate_and_compile(parse_format_toml(toml, Path::new("bare.format.toml")).unwrap(), false)
            .unwrap();
        let other = APP.replace("name = \"app\"", "name = \"other\"");
        let mut apps: Vec<Application> = [APP, other.as_str()]
            .iter()
            .map(|d| build_application(parse_app_toml(d, Path::new("t.app.toml")).unwrap(), &BuildOptions::default()).unwrap())
            .collect();
        sort_applications(&mut apps);
        let mut m = Matcher::new(FormatCycler::new(vec![format]), apps, LineFilters::default(), RunOptions::default());
        let text = "Jan 1 10:00:00 user=a status=1\n";

        let mut sink = CollectingSink::default();
        let stats = m.process_file("one.log", Cursor::new(text), mtime(), &[0], &mut sink).unwrap();
        assert_eq!(stats.matched, 1);
        assert_eq!(m.apps()[0].counter, 1);

        let mut sink = CollectingSink::default();
        let stats = m.process_file("both.log", Cursor::new(text), mtime(), &[0, 1], &mut sink).unwrap();
        assert_eq!(stats.matched, 0);
    }

    #[test]
    fn test_detection_reuses_promoted_format() {
        let mut m = matcher(RunOptions::default());
        let mut sink = CollectingSink::default();
        let text = "2024-01-01T10:00:00 h app: user=a status=1\n\
                    2024-01-01T10:00:01 h app: user=b status=2\n\
                    2024-01-01T10:00:02 h app: user=c status=3\n";
        run(&mut m, text, &mut sink);
        assert_eq!(m.formats().detection_count(), 1);
        assert_eq!(sink.lines.len(), 3);
    }

    #[test]
    fn test_huge_repeat_count_saturates() {
        let mut m = matcher(RunOptions::default());
        let mut sink = CollectingSink::default();
        let text = "Jan 1 10:00:00 h app: user=a status=1\n\
                    Jan 1 10:00:01 h last message repeated 18446744073709551615 times\n\
                    Jan 1 10:00:02 h app: user=b status=2\n";
        let stats = run(&mut m, text, &mut sink);
        assert_eq!(stats.matched, u64::MAX);
        assert_eq!(sink.lines.len(), 2);
        let key = vec![Some("h".to_string()), Some("a".into()), Some("1".into())];
        assert_eq!(m.apps()[0].rules[0].results.get(&key), Some(u64::MAX));
    }

    #[test]
    fn test_thread_mode_flushes_idle_threads_periodically() {
        let build = BuildOptions {
            thread: true,
            filters: vec![vec![("to".to_string(), r"bob@\S+".to_string())]],
            ..Default::default()
        };
        let options = RunOptions {
            thread: true,
            ..Default::default()
        };
        let mut m = matcher_with(&[MAIL], &build, LineFilters::default(), options);
        let mut sink = CollectingSink::default();

        let mut text = String::from(
            "Jan 1 10:00:00 mx postfix/qmgr[1]: 1A: from=<alice@x.org>\n\
             Jan 1 10:00:01 mx postfix/smtp[2]: 1A: to=<bob@y.org>\n",
        );
        for _ in 3..constants::PURGE_THREADS_LIMIT {
            text.push_str("Jan 1 10:00:02 mx postfix/qmgr[1]: queue scan\n");
        }
        // Line 1000 triggers the periodic flush; 1A has been idle for two hours.
        text.push_str("Jan 1 12:00:00 mx postfix/qmgr[1]: 2B: from=<carol@x.org>\n");
        text.push_str("Jan 1 12:00:01 mx postfix/qmgr[1]: 1A: from=<late@x.org>\n");

        let stats = run(&mut m, &text, &mut sink);
        assert_eq!(stats.lines, constants::PURGE_THREADS_LIMIT + 1);
        let raws: Vec<&str> = sink.lines.iter().map(|l| l.raw.as_str()).collect();
        assert_eq!(raws.len(), 2, "{raws:?}");
        assert!(raws[0].ends_with("1A: from=<alice@x.org>"));
        assert!(raws[1].ends_with("1A: to=<bob@y.org>"));
        assert_eq!(stats.matched, 2);
    }

    #[test]
    fn test_prefix_candidates_resolved_by_rules() {
        let alpha = r#"
[app]
name = "alpha"
tags = ["postfix"]

[[rules]]
name = "from"
pattern = 'from=<(?P<from>[^>]*)>'
"#;
        let beta = r#"
[app]
name = "beta"
tags = ["postfix/"]

[[rules]]
name = "to"
pattern = 'to=<(?P<to>[^>]*)>'
"#;
        let mut m = matcher_with(&[alpha, beta], &BuildOptions::default(), LineFilters::default(), RunOptions::default());
        let mut sink = CollectingSink::default();
        let text = "Jan 1 10:00:00 mx postfix/smtp[2]: 1A: to=<bob@y.org>\n\
                    Jan 1 10:00:01 mx postfix/smtp[2]: 1A: status=sent\n";
        let stats = run(&mut m, text, &mut sink);

        assert_eq!(stats.matched, 1);
        assert_eq!(sink.lines.len(), 1);
        let (alpha, beta) = (&m.apps()[0], &m.apps()[1]);
        assert_eq!((alpha.name.as_str(), beta.name.as_str()), ("alpha", "beta"));
        let key = vec![Some("mx".to_string()), Some("bob@y.org".to_string())];
        // The rules ran once for the resolved line, not again after resolution.
        assert_eq!(beta.rules[0].results.get(&key), Some(1));
        assert_eq!(beta.counter, 1);
        assert_eq!(beta.unparsed_counter, 1);
        assert_eq!(alpha.counter, 0);
        assert_eq!(alpha.unparsed_counter, 2);
    }
}
