// LogTally - app/run.rs
//
// Run driver: discovers the input files, sequences them through the
// matcher one at a time, and folds the per-file statistics into a run
// summary. A file that cannot be read or decoded is logged and skipped.

use crate::core::application::Application;
use crate::core::model::{AppStats, FileStats, RunSummary};
use crate::core::pipeline::Matcher;
use crate::core::sink::EventSink;
use crate::platform::fs;
use crate::util::error::{LogTallyError, Result};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

/// A log file to process and the applications associated with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    pub path: PathBuf,
    /// Application indices, in identity order.
    pub apps: Vec<usize>,
}

/// Resolve the files of a run.
///
/// Explicit inputs are used as given, directories walked recursively up to
/// `max_depth`; each carries every application. Without explicit inputs the
/// applications' file globs are expanded and each file carries the
/// applications whose globs produced it.
pub fn discover_inputs(inputs: &[PathBuf], apps: &[Application], max_depth: usize) -> Vec<InputFile> {
    let mut found: BTreeMap<PathBuf, Vec<usize>> = BTreeMap::new();

    if inputs.is_empty() {
        for (idx, app) in apps.iter().enumerate() {
            for pattern in &app.files {
                let paths = match glob::glob(pattern) {
                    Ok(paths) => paths,
                    Err(e) => {
                        tracing::warn!(app = %app.name, pattern = %pattern, error = %e, "Invalid file glob");
                        continue;
                    }
                };
                for path in paths.flatten().filter(|p| p.is_file()) {
                    let entry = found.entry(path).or_default();
                    if !entry.contains(&idx) {
                        entry.push(idx);
                    }
                }
            }
        }
        tracing::debug!(files = found.len(), "Expanded application file globs");
        return found
            .into_iter()
            .map(|(path, apps)| InputFile { path, apps })
            .collect();
    }

    let all: Vec<usize> = (0..apps.len()).collect();
    let mut ordered: Vec<PathBuf> = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut files: Vec<PathBuf> = walkdir::WalkDir::new(input)
                .max_depth(max_depth)
                .follow_links(false)
                .into_iter()
                .filter_map(|entry| match entry {
                    Ok(e) if e.file_type().is_file() => Some(e.into_path()),
                    Ok(_) => None,
                    Err(e) => {
                        tracing::warn!(root = %input.display(), error = %e, "Error walking directory");
                        None
                    }
                })
                .collect();
            files.sort();
            ordered.extend(files);
        } else {
            ordered.push(input.clone());
        }
    }
    let mut seen = HashSet::new();
    ordered
        .into_iter()
        .filter(|p| seen.insert(p.clone()))
        .map(|path| InputFile {
            path,
            apps: all.clone(),
        })
        .collect()
}

fn process_one(matcher: &mut Matcher, input: &InputFile, sink: &mut dyn EventSink) -> Result<FileStats> {
    let (reader, mtime) = fs::open_log(&input.path).map_err(|e| LogTallyError::Io {
        path: input.path.clone(),
        operation: "open",
        source: e,
    })?;
    let name = input.path.display().to_string();
    matcher.process_file(&name, reader, mtime, &input.apps, sink)
}

/// Process every input file in order and summarise the run.
pub fn run_files(matcher: &mut Matcher, inputs: &[InputFile], sink: &mut dyn EventSink) -> RunSummary {
    let mut summary = RunSummary::default();

    for input in inputs {
        match process_one(matcher, input, sink) {
            Ok(stats) => {
                tracing::info!(
                    file = %input.path.display(),
                    lines = stats.lines,
                    matched = stats.matched,
                    "Processed file"
                );
                summary.absorb(stats);
            }
            Err(e) => {
                tracing::error!(file = %input.path.display(), error = %e, "Skipping file");
                summary.files_with_errors += 1;
            }
        }
    }

    summary.apps = matcher
        .apps()
        .iter()
        .filter(|a| a.counter > 0)
        .map(|a| AppStats {
            name: a.name.clone(),
            lines: a.counter,
            unparsed: a.unparsed_counter,
        })
        .collect();

    if !summary.unknown_tags.is_empty() {
        let tags: Vec<&str> = summary.unknown_tags.iter().map(String::as_str).collect();
        tracing::warn!(tags = %tags.join(", "), "Lines with unknown app tags were skipped");
    }
    tracing::info!(
        files = summary.files,
        errors = summary.files_with_errors,
        lines = summary.total_lines,
        matched = summary.total_matched,
        "Run complete"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::application::{build_application, parse_app_toml, BuildOptions};
    use crate::core::format::{load_builtin_formats, FormatCycler};
    use crate::core::pipeline::{LineFilters, RunOptions};
    use crate::core::sink::CollectingSink;
    use std::path::Path;
    use tempfile::TempDir;

    fn app(name: &str, files: &str) -> Application {
        let toml = format!(
            "[app]\nname = \"{name}\"\nfiles = [{files}]\n[[rules]]\nname = \"r\"\npattern = 'user=(?P<user>\\w+)'\n"
        );
        build_application(parse_app_toml(&toml, Path::new("t.app.toml")).unwrap(), &BuildOptions::default()).unwrap()
    }

    #[test]
    fn test_globs_associate_files_with_apps() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("web.log"), "").unwrap();
        std::fs::write(dir.path().join("mail.log"), "").unwrap();
        let d = dir.path().display();
        let apps = vec![
            app("mail", &format!("\"{d}/mail.log\", \"{d}/*.log\"")),
            app("web", &format!("\"{d}/web.log\"")),
        ];
        let inputs = discover_inputs(&[], &apps, 10);
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0].path, dir.path().join("mail.log"));
        assert_eq!(inputs[0].apps, vec![0]);
        assert_eq!(inputs[1].apps, vec![0, 1]);
    }

    #[test]
    fn test_explicit_directory_is_walked() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("a.log"), "").unwrap();
        std::fs::write(dir.path().join("sub").join("b.log"), "").unwrap();
        let apps = vec![app("x", "")];
        let inputs = discover_inputs(&[dir.path().to_path_buf()], &apps, 10);
        assert_eq!(inputs.len(), 2);
        assert!(inputs.iter().all(|i| i.apps == vec![0]));

        let shallow = discover_inputs(&[dir.path().to_path_buf()], &apps, 1);
        assert_eq!(shallow.len(), 1);
    }

    #[test]
    fn test_run_files_summarises_and_skips_missing() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("x.log");
        std::fs::write(&log, "Jan 1 10:00:00 h x: user=alice\nJan 1 10:00:01 h x: nothing\n").unwrap();
        let mut matcher = Matcher::new(
            FormatCycler::new(load_builtin_formats()),
            vec![app("x", "")],
            LineFilters::default(),
            RunOptions::default(),
        );
        let inputs = vec![
            InputFile {
                path: log,
                apps: vec![0],
            },
            InputFile {
                path: dir.path().join("missing.log"),
                apps: vec![0],
            },
        ];
        let mut sink = CollectingSink::default();
        let summary = run_files(&mut matcher, &inputs, &mut sink);
        assert_eq!(summary.files, 1);
        assert_eq!(summary.files_with_errors, 1);
        assert_eq!(summary.total_lines, 2);
        assert_eq!(summary.total_matched, 1);
        assert_eq!(summary.apps.len(), 1);
        assert_eq!(summary.apps[0].lines, 2);
        assert_eq!(summary.apps[0].unparsed, 1);
    }
}
