// LogTally - app/app_mgr.rs
//
// Loads application definitions (`*.app.toml`) and user line formats
// (`*.format.toml`) from the application directory. User formats override
// built-in formats with the same id. Invalid definitions are logged and
// skipped; loading never aborts the run.

use crate::core::application::{self, Application, BuildOptions};
use crate::core::format::{self, LineFormat};
use crate::platform::fs;
use crate::util::constants;
use crate::util::error::{AppError, LogTallyError};
use std::path::{Path, PathBuf};

/// Load all line formats: built-in first, then user-defined overrides.
pub fn load_formats(app_dir: Option<&Path>) -> (Vec<LineFormat>, Vec<LogTallyError>) {
    let mut formats = format::load_builtin_formats();
    let mut errors = Vec::new();

    tracing::debug!(builtin_count = formats.len(), "Loaded built-in formats");

    let Some(dir) = app_dir.filter(|d| d.is_dir()) else {
        return (formats, errors);
    };
    for (path, content) in read_definitions(dir, constants::FORMAT_FILE_SUFFIX, &mut errors) {
        match format::parse_format_toml(&content, &path).and_then(|def| format::validate_and_compile(def, false)) {
            Ok(user_format) => {
                if let Some(pos) = formats.iter().position(|f| f.id == user_format.id) {
                    tracing::info!(format_id = %user_format.id, "User format overrides built-in");
                    formats[pos] = user_format;
                } else {
                    tracing::info!(format_id = %user_format.id, "Loaded user-defined format");
                    formats.push(user_format);
                }
            }
            Err(e) => errors.push(e.into()),
        }
    }
    (formats, errors)
}

/// Load and build the applications of `dir`, in identity order.
///
/// With an empty `selected` list every enabled application is loaded.
/// Otherwise exactly the named applications are loaded, enabled or not.
pub fn load_applications(
    dir: &Path,
    opts: &BuildOptions,
    selected: &[String],
) -> (Vec<Application>, Vec<LogTallyError>) {
    let mut apps: Vec<Application> = Vec::new();
    let mut errors = Vec::new();

    if !dir.is_dir() {
        tracing::warn!(dir = %dir.display(), "Application directory does not exist");
        return (apps, errors);
    }

    for (path, content) in read_definitions(dir, constants::APP_FILE_SUFFIX, &mut errors) {
        let def = match application::parse_app_toml(&content, &path) {
            Ok(def) => def,
            Err(e) => {
                errors.push(e.into());
                continue;
            }
        };
        let name = def.app.name.trim().to_string();
        let wanted = if selected.is_empty() {
            def.app.enabled
        } else {
            selected.iter().any(|s| *s == name)
        };
        if !wanted {
            tracing::debug!(app = %name, "Skipping application");
            continue;
        }
        if apps.iter().any(|a| a.name == name) {
            errors.push(AppError::DuplicateName { name, path }.into());
            continue;
        }
        if apps.len() >= constants::MAX_APPS {
            errors.push(
                AppError::TooManyApps {
                    count: apps.len() + 1,
                    max: constants::MAX_APPS,
                }
                .into(),
            );
            break;
        }
        match application::build_application(def, opts) {
            Ok(app) => {
                tracing::info!(app = %app.name, path = %path.display(), rules = app.rules.len(), "Loaded application");
                apps.push(app);
            }
            Err(e) => errors.push(e.into()),
        }
    }

    for name in selected {
        if !apps.iter().any(|a| &a.name == name) {
            tracing::warn!(app = %name, "Selected application was not loaded");
        }
    }

    application::sort_applications(&mut apps);
    tracing::info!(total = apps.len(), errors = errors.len(), "Application loading complete");
    (apps, errors)
}

/// Read every definition file of `dir` ending in `suffix`, sorted by path.
fn read_definitions(dir: &Path, suffix: &str, errors: &mut Vec<LogTallyError>) -> Vec<(PathBuf, String)> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            errors.push(
                AppError::Io {
                    path: dir.to_path_buf(),
                    source: e,
                }
                .into(),
            );
            return Vec::new();
        }
    };

    let mut paths: Vec<PathBuf> = Vec::new();
    for entry_result in entries {
        match entry_result {
            Ok(entry) => {
                let path = entry.path();
                let matches = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(suffix));
                if matches && path.is_file() {
                    paths.push(path);
                }
            }
            Err(e) => errors.push(
                AppError::Io {
                    path: dir.to_path_buf(),
                    source: e,
                }
                .into(),
            ),
        }
    }
    paths.sort();

    let mut out = Vec::with_capacity(paths.len());
    for path in paths {
        match fs::read_limited(&path, constants::MAX_DEFINITION_FILE_SIZE) {
            Ok(Ok(content)) => out.push((path, content)),
            Ok(Err(size)) => errors.push(
                AppError::FileTooLarge {
                    path,
                    size,
                    max_size: constants::MAX_DEFINITION_FILE_SIZE,
                }
                .into(),
            ),
            Err(e) => errors.push(AppError::Io { path, source: e }.into()),
        }
    }
    out
}
