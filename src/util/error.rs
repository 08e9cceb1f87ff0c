// LogTally - util/error.rs
//
// Typed error hierarchy with context-preserving error chains.
// Configuration-time failures surface as distinct typed errors; per-line
// anomalies never appear here (they are absorbed into counters and logs).

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Top-level error type for all LogTally operations.
/// Errors are categorised by the subsystem that produced them.
#[derive(Debug)]
pub enum LogTallyError {
    /// config.toml or CLI option validation failed.
    Config(ConfigError),

    /// A line format definition is invalid.
    Format(FormatError),

    /// An application definition (or one of its rules) is invalid.
    App(AppError),

    /// A report item definition is invalid.
    Report(ReportError),

    /// An aggregation query could not be evaluated.
    Aggregate(AggregateError),

    /// A log line could not be normalised (fatal for the current file).
    Parse(ParseError),

    /// I/O error with path context.
    Io {
        path: PathBuf,
        operation: &'static str,
        source: io::Error,
    },
}

impl fmt::Display for LogTallyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "Configuration error: {e}"),
            Self::Format(e) => write!(f, "Format error: {e}"),
            Self::App(e) => write!(f, "Application error: {e}"),
            Self::Report(e) => write!(f, "Report error: {e}"),
            Self::Aggregate(e) => write!(f, "Aggregation error: {e}"),
            Self::Parse(e) => write!(f, "Parse error: {e}"),
            Self::Io {
                path,
                operation,
                source,
            } => write!(
                f,
                "I/O error during {operation} on '{}': {source}",
                path.display()
            ),
        }
    }
}

impl std::error::Error for LogTallyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Format(e) => Some(e),
            Self::App(e) => Some(e),
            Self::Report(e) => Some(e),
            Self::Aggregate(e) => Some(e),
            Self::Parse(e) => Some(e),
            Self::Io { source, .. } => Some(source),
        }
    }
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

/// Errors related to configuration loading and run option validation.
#[derive(Debug)]
pub enum ConfigError {
    /// TOML parsing failed.
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A config value is out of the allowed range.
    ValueOutOfRange {
        field: String,
        value: String,
        expected: String,
    },

    /// A date/time argument could not be parsed.
    InvalidDateTime { value: String },

    /// The time window is empty (start after end).
    EmptyTimeWindow { start: String, end: String },

    /// An intraday range argument is malformed.
    InvalidTimeRange { value: String },

    /// A filter group argument is malformed.
    InvalidFilter { value: String, reason: String },

    /// A search or host pattern is not a valid regex.
    InvalidRegex {
        pattern: String,
        source: regex::Error,
    },

    /// I/O error reading config file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TomlParse { path, source } => {
                write!(f, "Config parse error '{}': {source}", path.display())
            }
            Self::ValueOutOfRange {
                field,
                value,
                expected,
            } => write!(
                f,
                "Config '{field}' = '{value}' is out of range. Expected: {expected}"
            ),
            Self::InvalidDateTime { value } => write!(
                f,
                "Invalid date/time '{value}'. Expected YYYY-MM-DD[ HH:MM[:SS]]"
            ),
            Self::EmptyTimeWindow { start, end } => {
                write!(f, "Time window start '{start}' is after its end '{end}'")
            }
            Self::InvalidTimeRange { value } => {
                write!(f, "Invalid time range '{value}'. Expected HH:MM,HH:MM")
            }
            Self::InvalidFilter { value, reason } => {
                write!(f, "Invalid filter '{value}': {reason}")
            }
            Self::InvalidRegex { pattern, source } => {
                write!(f, "Invalid pattern '{pattern}': {source}")
            }
            Self::Io { path, source } => {
                write!(f, "Config I/O error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TomlParse { source, .. } => Some(source),
            Self::InvalidRegex { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for LogTallyError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Format errors
// ---------------------------------------------------------------------------

/// Errors related to line format definitions.
#[derive(Debug)]
pub enum FormatError {
    /// TOML file could not be parsed.
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A required field is missing from the format definition.
    MissingField {
        format_id: String,
        field: &'static str,
    },

    /// The line pattern is invalid.
    InvalidRegex {
        format_id: String,
        pattern: String,
        source: regex::Error,
    },

    /// The line pattern exceeds the maximum allowed length.
    RegexTooLong {
        format_id: String,
        length: usize,
        max_length: usize,
    },

    /// The line pattern lacks a capture group every event needs.
    MissingGroup {
        format_id: String,
        group: &'static str,
    },
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TomlParse { path, source } => {
                write!(f, "Failed to parse TOML '{}': {source}", path.display())
            }
            Self::MissingField { format_id, field } => {
                write!(f, "Format '{format_id}': missing required field '{field}'")
            }
            Self::InvalidRegex {
                format_id,
                pattern,
                source,
            } => write!(
                f,
                "Format '{format_id}': invalid line pattern ('{pattern}'): {source}"
            ),
            Self::RegexTooLong {
                format_id,
                length,
                max_length,
            } => write!(
                f,
                "Format '{format_id}': line pattern is {length} chars, \
                 exceeds maximum of {max_length}"
            ),
            Self::MissingGroup { format_id, group } => write!(
                f,
                "Format '{format_id}': line pattern has no '{group}' capture group"
            ),
        }
    }
}

impl std::error::Error for FormatError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TomlParse { source, .. } => Some(source),
            Self::InvalidRegex { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<FormatError> for LogTallyError {
    fn from(e: FormatError) -> Self {
        Self::Format(e)
    }
}

// ---------------------------------------------------------------------------
// Application errors
// ---------------------------------------------------------------------------

/// Errors building an application or one of its rules.
#[derive(Debug)]
pub enum AppError {
    /// TOML file could not be parsed.
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A required field is missing from the application definition.
    MissingField {
        app: String,
        field: &'static str,
    },

    /// The application defines no rules at all.
    NoRules { app: String },

    /// A rule pattern is empty.
    EmptyPattern { app: String, rule: String },

    /// A rule pattern is not a valid regex.
    InvalidPattern {
        app: String,
        rule: String,
        source: regex::Error,
    },

    /// A rule pattern exceeds the maximum allowed length.
    PatternTooLong {
        app: String,
        rule: String,
        length: usize,
        max_length: usize,
    },

    /// A rule produced an empty key-field set.
    EmptyKeyFields { app: String, rule: String },

    /// Definition file exceeds the maximum allowed size.
    FileTooLarge {
        path: PathBuf,
        size: u64,
        max_size: u64,
    },

    /// Two definitions declare the same application name.
    DuplicateName { name: String, path: PathBuf },

    /// Maximum number of applications exceeded.
    TooManyApps { count: usize, max: usize },

    /// I/O error reading a definition file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TomlParse { path, source } => {
                write!(f, "Failed to parse TOML '{}': {source}", path.display())
            }
            Self::MissingField { app, field } => {
                write!(f, "App '{app}': missing required field '{field}'")
            }
            Self::NoRules { app } => write!(f, "App '{app}' has no defined rules"),
            Self::EmptyPattern { app, rule } => {
                write!(f, "App '{app}': empty pattern for rule '{rule}'")
            }
            Self::InvalidPattern { app, rule, source } => {
                write!(f, "App '{app}': illegal regex pattern for rule '{rule}': {source}")
            }
            Self::PatternTooLong {
                app,
                rule,
                length,
                max_length,
            } => write!(
                f,
                "App '{app}': pattern of rule '{rule}' is {length} chars, \
                 exceeds maximum of {max_length}"
            ),
            Self::EmptyKeyFields { app, rule } => {
                write!(f, "App '{app}': rule '{rule}' has an empty key-field set")
            }
            Self::FileTooLarge {
                path,
                size,
                max_size,
            } => write!(
                f,
                "Definition '{}' is {size} bytes, exceeds maximum of {max_size} bytes",
                path.display()
            ),
            Self::DuplicateName { name, path } => write!(
                f,
                "Duplicate app name '{name}' in '{}'",
                path.display()
            ),
            Self::TooManyApps { count, max } => {
                write!(f, "Too many apps loaded ({count}), maximum is {max}")
            }
            Self::Io { path, source } => {
                write!(
                    f,
                    "I/O error reading definition '{}': {source}",
                    path.display()
                )
            }
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TomlParse { source, .. } => Some(source),
            Self::InvalidPattern { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<AppError> for LogTallyError {
    fn from(e: AppError) -> Self {
        Self::App(e)
    }
}

// ---------------------------------------------------------------------------
// Report errors
// ---------------------------------------------------------------------------

/// Errors in a report item definition. Always recoverable: the offending
/// item is skipped and the remaining items are still built.
#[derive(Debug)]
pub enum ReportError {
    /// The item references a rule the application does not define.
    MissingRule { item: String, rule: String },

    /// A required option is absent.
    MissingOption { item: String, option: &'static str },

    /// An option value is invalid.
    InvalidOption {
        item: String,
        option: String,
        reason: String,
    },
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRule { item, rule } => write!(
                f,
                "Report item '{item}' uses undefined or inactive rule '{rule}'"
            ),
            Self::MissingOption { item, option } => {
                write!(f, "Report item '{item}': missing option '{option}'")
            }
            Self::InvalidOption {
                item,
                option,
                reason,
            } => write!(f, "Report item '{item}': invalid option '{option}': {reason}"),
        }
    }
}

impl std::error::Error for ReportError {}

impl From<ReportError> for LogTallyError {
    fn from(e: ReportError) -> Self {
        Self::Report(e)
    }
}

// ---------------------------------------------------------------------------
// Aggregation errors
// ---------------------------------------------------------------------------

/// Errors evaluating aggregation queries over a rule's result table.
#[derive(Debug)]
pub enum AggregateError {
    /// A condition expression does not match `*` or `field=="literal"`.
    InvalidCondition { text: String },

    /// The literal of a condition is not a valid regex.
    InvalidRegex {
        pattern: String,
        source: regex::Error,
    },

    /// A referenced field is not a key field of the rule.
    UnknownField { rule: String, field: String },

    /// A value field does not hold an integer.
    NotAnInteger { field: String, value: String },

    /// A total or weight does not fit in a 64-bit integer.
    Overflow { rule: String },
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCondition { text } => write!(
                f,
                "Invalid condition '{text}'. Expected * or field==\"regex\" / field!=\"regex\""
            ),
            Self::InvalidRegex { pattern, source } => {
                write!(f, "Invalid condition regex '{pattern}': {source}")
            }
            Self::UnknownField { rule, field } => {
                write!(f, "Field '{field}' is not a key field of rule '{rule}'")
            }
            Self::NotAnInteger { field, value } => {
                write!(f, "Value field '{field}' holds a non-integer value '{value}'")
            }
            Self::Overflow { rule } => {
                write!(f, "Aggregate of rule '{rule}' overflows a 64-bit integer")
            }
        }
    }
}

impl std::error::Error for AggregateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidRegex { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<AggregateError> for LogTallyError {
    fn from(e: AggregateError) -> Self {
        Self::Aggregate(e)
    }
}

// ---------------------------------------------------------------------------
// Parse errors
// ---------------------------------------------------------------------------

/// Errors normalising a parsed event's time. Fatal for the current file.
#[derive(Debug)]
pub enum ParseError {
    /// The month is neither a three-letter name nor a two-digit numeral.
    UnknownMonth {
        file: String,
        line_number: u64,
        month: String,
    },

    /// Year, day, or local time is malformed.
    InvalidTimestamp {
        file: String,
        line_number: u64,
        raw: String,
    },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownMonth {
                file,
                line_number,
                month,
            } => write!(f, "'{file}' line {line_number}: unknown month '{month}'"),
            Self::InvalidTimestamp {
                file,
                line_number,
                raw,
            } => write!(f, "'{file}' line {line_number}: invalid timestamp '{raw}'"),
        }
    }
}

impl std::error::Error for ParseError {}

impl From<ParseError> for LogTallyError {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

/// Convenience type alias for LogTally results.
pub type Result<T> = std::result::Result<T, LogTallyError>;
