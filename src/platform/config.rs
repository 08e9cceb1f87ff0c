// LogTally - platform/config.rs
//
// Platform directory resolution and config.toml loading with startup
// validation. Invalid values produce warnings and fall back to defaults;
// the run always starts.
//
// Uses the `directories` crate for XDG (Linux), AppData (Windows),
// Library (macOS) compliance.

use crate::util::constants;
use crate::util::error::ConfigError;
use directories::ProjectDirs;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Resolved platform paths for LogTally configuration.
#[derive(Debug, Clone)]
pub struct PlatformPaths {
    /// Configuration directory (e.g. ~/.config/logtally/).
    pub config_dir: PathBuf,

    /// Default directory of application definitions (`<config_dir>/apps`).
    pub apps_dir: PathBuf,
}

impl PlatformPaths {
    /// Resolve platform-appropriate paths.
    ///
    /// Falls back to the current directory if platform dirs cannot be
    /// determined.
    pub fn resolve() -> Self {
        let config_dir = match ProjectDirs::from("", "", constants::APP_ID) {
            Some(dirs) => dirs.config_dir().to_path_buf(),
            None => {
                tracing::warn!("Could not determine platform directories, using current directory");
                PathBuf::from(".")
            }
        };
        let apps_dir = config_dir.join(constants::APPS_DIR_NAME);
        tracing::debug!(
            config = %config_dir.display(),
            apps = %apps_dir.display(),
            "Platform paths resolved"
        );
        Self {
            config_dir,
            apps_dir,
        }
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(constants::CONFIG_FILE_NAME)
    }
}

// =============================================================================
// config.toml loading and validation
// =============================================================================

/// Raw deserialisable shape of config.toml.
///
/// Unknown keys are ignored so newer config files still load.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub main: MainSection,
    /// `[fields]`: `${name}` macros for rule patterns.
    pub fields: BTreeMap<String, String>,
    pub logging: LoggingSection,
    pub report: ReportSection,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct MainSection {
    /// Directory of `*.app.toml` / `*.format.toml` files.
    pub app_dir: Option<String>,
    /// Default maximum match count per file.
    pub max_count: Option<i64>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: Option<String>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct ReportSection {
    pub title: Option<String>,
    pub subreports: Vec<SubreportSection>,
}

/// `[[report.subreports]]` entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct SubreportSection {
    pub name: String,
    pub title: String,
}

/// Validated configuration derived from `config.toml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub app_dir: Option<PathBuf>,
    pub max_count: Option<u64>,
    pub fields: BTreeMap<String, String>,
    /// Logging level string (for init before tracing is available).
    pub log_level: Option<String>,
    pub report_title: String,
    pub subreports: Vec<SubreportSection>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            app_dir: None,
            max_count: None,
            fields: BTreeMap::new(),
            log_level: None,
            report_title: constants::DEFAULT_REPORT_TITLE.to_string(),
            subreports: Vec::new(),
        }
    }
}

/// Load and validate a config file.
///
/// Returns the validated config and a list of non-fatal warnings. A missing
/// file yields defaults with no warnings; an unreadable or unparseable file
/// yields defaults plus a warning.
pub fn load_config(config_path: &Path) -> (RunConfig, Vec<String>) {
    let mut warnings: Vec<String> = Vec::new();

    if !config_path.exists() {
        tracing::debug!(path = %config_path.display(), "No config file found; using defaults");
        return (RunConfig::default(), warnings);
    }

    let content = match std::fs::read_to_string(config_path) {
        Ok(c) => c,
        Err(e) => {
            let err = ConfigError::Io {
                path: config_path.to_path_buf(),
                source: e,
            };
            let msg = format!("{err}. Using defaults.");
            tracing::warn!("{}", msg);
            warnings.push(msg);
            return (RunConfig::default(), warnings);
        }
    };

    let raw: RawConfig = match toml::from_str(&content) {
        Ok(r) => r,
        Err(e) => {
            let err = ConfigError::TomlParse {
                path: config_path.to_path_buf(),
                source: e,
            };
            let msg = format!("{err}. Using defaults.");
            tracing::warn!("{}", msg);
            warnings.push(msg);
            return (RunConfig::default(), warnings);
        }
    };

    tracing::info!(path = %config_path.display(), "Loaded config file");
    let (config, mut field_warnings) = validate(raw, config_path.parent());
    warnings.append(&mut field_warnings);

    if !warnings.is_empty() {
        tracing::warn!(count = warnings.len(), "Config validation produced warnings");
    }
    (config, warnings)
}

/// Validate a raw config. Relative `app_dir` paths resolve against
/// `base_dir`, the directory holding the config file.
pub fn validate(raw: RawConfig, base_dir: Option<&Path>) -> (RunConfig, Vec<String>) {
    let mut warnings = Vec::new();
    let mut config = RunConfig::default();

    // -- Main: app_dir --
    if let Some(dir) = raw.main.app_dir.filter(|d| !d.trim().is_empty()) {
        let dir = PathBuf::from(dir.trim());
        config.app_dir = Some(match base_dir {
            Some(base) if dir.is_relative() => base.join(dir),
            _ => dir,
        });
    }

    // -- Main: max_count --
    if let Some(count) = raw.main.max_count {
        match u64::try_from(count) {
            Ok(c) if (1..=constants::ABSOLUTE_MAX_COUNT).contains(&c) => config.max_count = Some(c),
            _ => warnings.push(format!(
                "[main] max_count = {count} is out of range (1-{}). Ignoring it.",
                constants::ABSOLUTE_MAX_COUNT
            )),
        }
    }

    // -- Fields --
    for (name, value) in raw.fields {
        if name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') && !name.is_empty() {
            config.fields.insert(name, value);
        } else {
            warnings.push(format!(
                "[fields] '{name}' is not a valid macro name (letters, digits, '_'). Ignoring it."
            ));
        }
    }

    // -- Logging: level --
    if let Some(level) = raw.logging.level {
        let valid = ["error", "warn", "info", "debug", "trace"];
        if valid.contains(&level.to_lowercase().as_str()) {
            config.log_level = Some(level);
        } else {
            warnings.push(format!(
                "[logging] level = \"{level}\" is not recognised. \
                 Valid values: error, warn, info, debug, trace. Using default ({}).",
                constants::DEFAULT_LOG_LEVEL
            ));
        }
    }

    // -- Report --
    if let Some(title) = raw.report.title.filter(|t| !t.trim().is_empty()) {
        config.report_title = title;
    }
    for sub in raw.report.subreports {
        if sub.name.trim().is_empty() {
            warnings.push("[[report.subreports]] entry without a name. Ignoring it.".to_string());
        } else if config.subreports.iter().any(|s| s.name == sub.name) {
            warnings.push(format!(
                "[[report.subreports]] '{}' is declared twice. Keeping the first.",
                sub.name
            ));
        } else {
            config.subreports.push(sub);
        }
    }

    (config, warnings)
}
