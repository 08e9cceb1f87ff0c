// LogTally - core/format.rs
//
// Line format definitions, validation, and the cycling format detector.
// Core layer: accepts TOML strings, never touches the filesystem.
// I/O is handled by app::app_mgr which feeds user format files here.

use crate::core::model::ParsedEvent;
use crate::util::constants;
use crate::util::error::FormatError;
use regex::{Captures, Regex};
use serde::Deserialize;
use std::path::Path;

// =============================================================================
// TOML deserialization structures (raw input)
// =============================================================================

/// Raw TOML format definition as deserialized from a .toml file.
#[derive(Debug, Deserialize)]
pub struct FormatDefinition {
    pub format: FormatMeta,
    pub parsing: FormatParsingDef,
}

#[derive(Debug, Deserialize)]
pub struct FormatMeta {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Application every line of this format belongs to.
    #[serde(default)]
    pub app: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FormatParsingDef {
    pub line_pattern: String,
}

// =============================================================================
// Compiled line format
// =============================================================================

/// A compiled line format: decodes a physical log line into a `ParsedEvent`.
#[derive(Debug, Clone)]
pub struct LineFormat {
    /// Unique format identifier (e.g. "rfc3164").
    pub id: String,

    /// Human-readable name.
    pub name: String,

    /// Intrinsic application identity: every line of this format belongs
    /// to the named application, bypassing app-tag resolution.
    pub app: Option<String>,

    /// Compiled line pattern with the named groups listed in `ParsedEvent`.
    pub pattern: Regex,

    /// Whether this is a built-in format.
    pub is_builtin: bool,
}

impl LineFormat {
    /// Attempt to decode `line` with this format.
    pub fn try_match<'l>(&self, line: &'l str) -> Option<Captures<'l>> {
        self.pattern.captures(line)
    }

    /// Build the event from a successful match of this format's pattern.
    pub fn event(&self, caps: &Captures<'_>) -> ParsedEvent {
        let text = |name: &str| caps.name(name).map(|m| m.as_str().to_string());
        ParsedEvent {
            host: text("host"),
            apptag: text("apptag"),
            month: text("month").unwrap_or_default(),
            day: text("day").unwrap_or_default(),
            ltime: text("ltime").unwrap_or_default(),
            year: text("year"),
            message: text("message").unwrap_or_default(),
            repeat: caps
                .name("repeat")
                .and_then(|m| m.as_str().parse::<u64>().ok()),
        }
    }
}

/// Parse a TOML string into a `FormatDefinition`.
///
/// `source_path` is used for error messages only (not for I/O).
pub fn parse_format_toml(
    toml_content: &str,
    source_path: &Path,
) -> Result<FormatDefinition, FormatError> {
    toml::from_str(toml_content).map_err(|e| FormatError::TomlParse {
        path: source_path.to_path_buf(),
        source: e,
    })
}

/// Validate a `FormatDefinition` and compile it into a runtime `LineFormat`.
///
/// The pattern must define `month`, `day`, `ltime`, and at least one of
/// `message` or `repeat`.
pub fn validate_and_compile(
    def: FormatDefinition,
    is_builtin: bool,
) -> Result<LineFormat, FormatError> {
    let id = def.format.id;

    if id.is_empty() {
        return Err(FormatError::MissingField {
            format_id: "(empty)".to_string(),
            field: "format.id",
        });
    }
    if def.parsing.line_pattern.is_empty() {
        return Err(FormatError::MissingField {
            format_id: id,
            field: "parsing.line_pattern",
        });
    }
    if def.parsing.line_pattern.len() > constants::MAX_REGEX_PATTERN_LENGTH {
        return Err(FormatError::RegexTooLong {
            format_id: id,
            length: def.parsing.line_pattern.len(),
            max_length: constants::MAX_REGEX_PATTERN_LENGTH,
        });
    }

    let pattern = Regex::new(&def.parsing.line_pattern).map_err(|e| FormatError::InvalidRegex {
        format_id: id.clone(),
        pattern: def.parsing.line_pattern.clone(),
        source: e,
    })?;

    let names: Vec<&str> = pattern.capture_names().flatten().collect();
    for group in ["month", "day", "ltime"] {
        if !names.contains(&group) {
            return Err(FormatError::MissingGroup {
                format_id: id,
                group,
            });
        }
    }
    if !names.contains(&"message") && !names.contains(&"repeat") {
        return Err(FormatError::MissingGroup {
            format_id: id,
            group: "message",
        });
    }

    Ok(LineFormat {
        id,
        name: def.format.name,
        app: def.format.app.filter(|a| !a.is_empty()),
        pattern,
        is_builtin,
    })
}

// =============================================================================
// Format cycler (active format + cyclic detection)
// =============================================================================

/// Ordered, cyclable collection of line formats with one active format.
///
/// The active format is tried first on every line. Only when it fails are
/// the other formats probed, in cyclic order starting after the active one;
/// the first that matches becomes active. No format is ever discarded.
#[derive(Debug, Clone)]
pub struct FormatCycler {
    formats: Vec<LineFormat>,
    active: usize,
    detections: u64,
}

impl FormatCycler {
    pub fn new(formats: Vec<LineFormat>) -> Self {
        Self {
            formats,
            active: 0,
            detections: 0,
        }
    }

    /// The currently active format, if any formats are registered.
    pub fn active(&self) -> Option<&LineFormat> {
        self.formats.get(self.active)
    }

    /// Registered formats in cycle order.
    pub fn formats(&self) -> &[LineFormat] {
        &self.formats
    }

    /// Number of detection rounds run so far.
    pub fn detection_count(&self) -> u64 {
        self.detections
    }

    /// Try the active format only.
    pub fn try_active<'l>(&self, line: &'l str) -> Option<Captures<'l>> {
        self.active().and_then(|f| f.try_match(line))
    }

    /// Probe every non-active format in cyclic order. On the first match the
    /// matching format is promoted to active and its captures are returned.
    pub fn detect<'l>(&mut self, line: &'l str) -> Option<Captures<'l>> {
        let len = self.formats.len();
        if len == 0 {
            return None;
        }
        self.detections += 1;

        for step in 1..len {
            let idx = (self.active + step) % len;
            if let Some(caps) = self.formats[idx].try_match(line) {
                tracing::debug!(
                    from = %self.formats[self.active].id,
                    to = %self.formats[idx].id,
                    "Switching active line format"
                );
                self.active = idx;
                return Some(caps);
            }
        }
        None
    }

    /// Decode a line: active format first, detection on failure.
    /// On success the matching format is the active one.
    pub fn decode<'l>(&mut self, line: &'l str) -> Option<Captures<'l>> {
        if let Some(caps) = self.try_active(line) {
            return Some(caps);
        }
        self.detect(line)
    }
}

// =============================================================================
// Built-in formats (embedded at compile time)
// =============================================================================

/// Embedded TOML content for built-in formats.
/// Each tuple is (filename, TOML content).
pub fn builtin_format_sources() -> Vec<(&'static str, &'static str)> {
    vec![
        ("rfc3164.toml", include_str!("../../formats/rfc3164.toml")),
        ("rfc5424.toml", include_str!("../../formats/rfc5424.toml")),
        (
            "iso_syslog.toml",
            include_str!("../../formats/iso_syslog.toml"),
        ),
    ]
}

/// Load and validate all built-in formats.
///
/// Invalid formats are logged and skipped (non-fatal).
pub fn load_builtin_formats() -> Vec<LineFormat> {
    let mut formats = Vec::new();

    for (filename, content) in builtin_format_sources() {
        let path = format!("<builtin>/{filename}");
        match parse_format_toml(content, Path::new(&path))
            .and_then(|def| validate_and_compile(def, true))
        {
            Ok(format) => {
                tracing::debug!(format_id = %format.id, "Loaded built-in format");
                formats.push(format);
            }
            Err(e) => {
                tracing::error!(file = filename, error = %e, "Failed to load built-in format");
            }
        }
    }

    formats
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn builtin(id: &str) -> LineFormat {
        load_builtin_formats()
            .into_iter()
            .find(|f| f.id == id)
            .unwrap_or_else(|| panic!("built-in format {id} missing"))
    }

    #[test]
    fn test_load_builtin_formats() {
        let formats = load_builtin_formats();
        assert_eq!(formats.len(), builtin_format_sources().len());
        assert!(formats.iter().all(|f| f.is_builtin));
    }

    #[test]
    fn test_rfc3164_event() {
        let format = builtin("rfc3164");
        let line = "Jan  1 10:00:00 host1 app[123]: user=alice status=200";
        let caps = format.try_match(line).unwrap();
        let event = format.event(&caps);
        assert_eq!(event.month, "Jan");
        assert_eq!(event.day, "1");
        assert_eq!(event.ltime, "10:00:00");
        assert_eq!(event.host.as_deref(), Some("host1"));
        assert_eq!(event.apptag.as_deref(), Some("app"));
        assert_eq!(event.message, "user=alice status=200");
        assert_eq!(event.year, None);
        assert_eq!(event.repeat, None);
    }

    #[test]
    fn test_rfc3164_repeat_line() {
        let format = builtin("rfc3164");
        let line = "Jan  1 10:00:07 host1 last message repeated 5 times";
        let caps = format.try_match(line).unwrap();
        let event = format.event(&caps);
        assert_eq!(event.repeat, Some(5));
        assert_eq!(event.host.as_deref(), Some("host1"));
        assert_eq!(event.apptag, None);
    }

    #[test]
    fn test_rfc5424_event() {
        let format = builtin("rfc5424");
        let line = "<34>1 2024-03-05T22:14:15.003Z mymachine su - ID47 - 'su root' failed";
        let caps = format.try_match(line).unwrap();
        let event = format.event(&caps);
        assert_eq!(event.year.as_deref(), Some("2024"));
        assert_eq!(event.month, "03");
        assert_eq!(event.day, "05");
        assert_eq!(event.ltime, "22:14:15");
        assert_eq!(event.host.as_deref(), Some("mymachine"));
        assert_eq!(event.apptag.as_deref(), Some("su"));
        assert_eq!(event.message, "'su root' failed");
    }

    #[test]
    fn test_missing_group_rejected() {
        let toml = r#"
[format]
id = "bad"
name = "Bad"

[parsing]
line_pattern = '^(?P<month>\w+) (?P<message>.*)$'
"#;
        let def = parse_format_toml(toml, Path::new("bad.toml")).unwrap();
        match validate_and_compile(def, false) {
            Err(FormatError::MissingGroup { group, .. }) => assert_eq!(group, "day"),
            other => panic!("expected MissingGroup, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let toml = r#"
[format]
id = "bad"
name = "Bad"

[parsing]
line_pattern = '(?P<month>['
"#;
        let def = parse_format_toml(toml, Path::new("bad.toml")).unwrap();
        assert!(matches!(
            validate_and_compile(def, false),
            Err(FormatError::InvalidRegex { .. })
        ));
    }

    #[test]
    fn test_intrinsic_app_identity() {
        let toml = r#"
[format]
id = "postfix-native"
name = "Postfix"
app = "postfix"

[parsing]
line_pattern = '^(?P<month>\d{2})/(?P<day>\d{2}) (?P<ltime>\S+) (?P<message>.*)$'
"#;
        let def = parse_format_toml(toml, Path::new("p.toml")).unwrap();
        let format = validate_and_compile(def, false).unwrap();
        assert_eq!(format.app.as_deref(), Some("postfix"));
    }

    #[test]
    fn test_detection_promotes_and_is_not_rerun() {
        let mut cycler = FormatCycler::new(load_builtin_formats());
        assert_eq!(cycler.active().unwrap().id, "rfc3164");

        let iso = "2024-01-01T10:00:00+01:00 host1 app[1]: first";
        assert!(cycler.try_active(iso).is_none());
        assert!(cycler.decode(iso).is_some());
        assert_eq!(cycler.active().unwrap().id, "iso-syslog");
        assert_eq!(cycler.detection_count(), 1);

        for msg in ["second", "third", "fourth"] {
            let line = format!("2024-01-01T10:00:01+01:00 host1 app[1]: {msg}");
            assert!(cycler.decode(&line).is_some());
        }
        assert_eq!(cycler.detection_count(), 1);

        let bsd = "Jan  1 10:00:02 host1 app[1]: back to bsd";
        assert!(cycler.decode(bsd).is_some());
        assert_eq!(cycler.active().unwrap().id, "rfc3164");
        assert_eq!(cycler.detection_count(), 2);
    }

    #[test]
    fn test_unparsable_line_keeps_active_format() {
        let mut cycler = FormatCycler::new(load_builtin_formats());
        assert!(cycler.decode("complete garbage").is_none());
        assert_eq!(cycler.active().unwrap().id, "rfc3164");
    }

    #[test]
    fn test_empty_cycler_decodes_nothing() {
        let mut cycler = FormatCycler::new(Vec::new());
        assert!(cycler.decode("Jan  1 10:00:00 h a: m").is_none());
        assert!(cycler.active().is_none());
    }
}
