// LogTally - util/constants.rs
//
// Single source of truth for all named constants, limits, and defaults.

// =============================================================================
// Application metadata
// =============================================================================

/// Application display name.
pub const APP_NAME: &str = "LogTally";

/// Application identifier used for config/data directories.
pub const APP_ID: &str = "LogTally";

/// Current application version (updated by release script).
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Pipeline limits
// =============================================================================

/// Number of processed lines between two purges of the thread caches.
pub const PURGE_THREADS_LIMIT: u64 = 1_000;

/// Idle time after which a buffered thread is considered complete (or stale).
pub const THREAD_IDLE_TIMEOUT_SECS: i64 = 3_600;

/// Maximum number of lines buffered per thread before the oldest are dropped.
pub const MAX_THREAD_LINES: usize = 10_000;

/// Maximum number of distinct unknown app tags remembered per file.
/// Further tags are still counted as discarded lines but not recorded.
pub const MAX_UNKNOWN_TAGS: usize = 1_000;

// =============================================================================
// Definition limits
// =============================================================================

/// Maximum regex pattern length to prevent ReDoS.
pub const MAX_REGEX_PATTERN_LENGTH: usize = 8_192;

/// Maximum size of an application or format definition file in bytes.
pub const MAX_DEFINITION_FILE_SIZE: u64 = 256 * 1024; // 256 KB

/// Maximum number of application definitions that can be loaded.
pub const MAX_APPS: usize = 500;

/// File suffix of application definition files.
pub const APP_FILE_SUFFIX: &str = ".app.toml";

/// File suffix of user-defined line format files.
pub const FORMAT_FILE_SUFFIX: &str = ".format.toml";

// =============================================================================
// Input discovery
// =============================================================================

/// Maximum directory recursion depth when walking directory inputs.
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Hard upper bound on max match count (prevents configuration mistakes).
pub const ABSOLUTE_MAX_COUNT: u64 = 1_000_000_000;

// =============================================================================
// Logging
// =============================================================================

/// Default log level. Matched lines go to stdout, so diagnostics stay quiet.
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Maximum length of a log line included in diagnostic output.
pub const DEBUG_MAX_LINE_PREVIEW: usize = 200;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Application definitions subdirectory name.
pub const APPS_DIR_NAME: &str = "apps";

/// Default report title.
pub const DEFAULT_REPORT_TITLE: &str = "Log report";
