// LogTally - main.rs
//
// Command-line entry point. Handles:
// 1. CLI argument parsing
// 2. Config loading and logging initialisation
// 3. Line format and application loading
// 4. The run over all input files, and the optional JSON report

use clap::Parser;
use logtally::app::{app_mgr, output::WriterSink, run};
use logtally::core::application::{self, BuildOptions};
use logtally::core::filter::{self, HostFilter, PatternFilter, TimeRange, TimeWindow};
use logtally::core::format::FormatCycler;
use logtally::core::model::RunSummary;
use logtally::core::pipeline::{LineFilters, Matcher, RunOptions};
use logtally::core::report::{self, Report, SubreportSpec};
use logtally::platform::config::{self, PlatformPaths};
use logtally::util::constants;
use logtally::util::error::{ConfigError, LogTallyError};
use serde::Serialize;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

/// LogTally - classify, filter and tally log lines with per-application rules.
///
/// Lines are attributed to applications by their syslog tag and matched
/// against each application's regex rules. Selected lines are printed like
/// grep; `--report` prints aggregated results as JSON.
#[derive(Parser, Debug)]
#[command(name = "logtally", version, about)]
struct Cli {
    /// Log files or directories. Defaults to the applications' own files.
    inputs: Vec<PathBuf>,

    /// Select lines containing a match of PATTERN (repeatable).
    #[arg(short = 'e', long = "regexp", value_name = "PATTERN")]
    patterns: Vec<String>,

    /// Match patterns case-insensitively.
    #[arg(short = 'i', long = "ignore-case")]
    ignore_case: bool,

    /// Select lines matching none of the patterns.
    #[arg(short = 'v', long = "invert")]
    invert: bool,

    /// Print only a count of matching lines per file.
    #[arg(short = 'c', long = "count")]
    count: bool,

    /// Print nothing; exit status tells whether anything matched.
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,

    /// Stop reading a file after NUM matching lines.
    #[arg(short = 'm', long = "max-count", value_name = "NUM")]
    max_count: Option<u64>,

    /// Prefix each output line with its line number.
    #[arg(short = 'n', long = "line-number")]
    line_number: bool,

    /// Correlate lines by thread id and print whole threads.
    #[arg(long = "thread")]
    thread: bool,

    /// Do not apply application rules; select on patterns only.
    #[arg(long = "no-rules")]
    no_rules: bool,

    /// Select lines no application rule matched.
    #[arg(short = 'u', long = "unparsed", conflicts_with = "report")]
    unparsed: bool,

    /// Print the aggregated report as JSON after the run.
    #[arg(short = 'r', long = "report")]
    report: bool,

    /// Only lines from these hosts (wildcards allowed, repeatable).
    #[arg(short = 'H', long = "hosts", value_name = "HOST")]
    hosts: Vec<String>,

    /// Filter group `key=regex[,key=regex...]` (repeatable).
    #[arg(short = 'F', long = "filter", value_name = "FILTER")]
    filters: Vec<String>,

    /// Restrict to these applications (repeatable).
    #[arg(short = 'a', long = "apps", value_name = "APP")]
    apps: Vec<String>,

    /// Skip events before this time: YYYY-MM-DD[ HH:MM[:SS]].
    #[arg(long = "since", value_name = "DATETIME")]
    since: Option<String>,

    /// Stop at events after this time: YYYY-MM-DD[ HH:MM[:SS]].
    #[arg(long = "until", value_name = "DATETIME")]
    until: Option<String>,

    /// Only events whose time of day is in HH:MM,HH:MM.
    #[arg(long = "time", value_name = "RANGE")]
    time: Option<String>,

    /// Directory of application and format definitions.
    #[arg(long = "app-dir", value_name = "DIR")]
    app_dir: Option<PathBuf>,

    /// Configuration file (defaults to the platform config directory).
    #[arg(long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable debug logging (equivalent to RUST_LOG=debug).
    #[arg(short = 'd', long = "debug")]
    debug: bool,
}

#[derive(Serialize)]
struct ReportOutput<'a> {
    report: Report,
    summary: &'a RunSummary,
}

fn line_filters(cli: &Cli) -> Result<LineFilters, ConfigError> {
    let start = cli
        .since
        .as_deref()
        .map(|s| filter::parse_datetime_arg(s, false))
        .transpose()?;
    let end = cli
        .until
        .as_deref()
        .map(|s| filter::parse_datetime_arg(s, true))
        .transpose()?;
    Ok(LineFilters {
        window: TimeWindow::new(start, end)?,
        range: cli.time.as_deref().map(TimeRange::parse).transpose()?,
        hosts: HostFilter::new(&cli.hosts)?,
        patterns: PatternFilter::new(&cli.patterns, cli.ignore_case, cli.invert)?,
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let paths = PlatformPaths::resolve();
    let config_path = cli.config.clone().unwrap_or_else(|| paths.config_file());
    let (run_config, warnings) = config::load_config(&config_path);

    logtally::util::logging::init(cli.debug, run_config.log_level.as_deref());
    for warning in &warnings {
        tracing::warn!("{}", warning);
    }
    tracing::info!(
        version = constants::APP_VERSION,
        config = %config_path.display(),
        "LogTally starting"
    );

    match run_cli(&cli, run_config, &paths) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            tracing::error!(error = %e, "Fatal error");
            eprintln!("logtally: {e}");
            ExitCode::from(2)
        }
    }
}

/// Run with the parsed CLI. Returns whether anything matched.
fn run_cli(cli: &Cli, run_config: config::RunConfig, paths: &PlatformPaths) -> Result<bool, LogTallyError> {
    let filters = line_filters(cli)?;
    let filter_groups = cli
        .filters
        .iter()
        .map(|f| application::parse_filter_group(f))
        .collect::<Result<Vec<_>, _>>()?;
    let max_count = match cli.max_count.or(run_config.max_count) {
        Some(0) => {
            return Err(ConfigError::ValueOutOfRange {
                field: "max-count".to_string(),
                value: "0".to_string(),
                expected: format!("1-{}", constants::ABSOLUTE_MAX_COUNT),
            }
            .into())
        }
        other => other.map(|m| m.min(constants::ABSOLUTE_MAX_COUNT)),
    };

    let app_dir = cli
        .app_dir
        .clone()
        .or(run_config.app_dir.clone())
        .unwrap_or_else(|| paths.apps_dir.clone());
    let build = BuildOptions {
        fields: run_config.fields.clone(),
        filters: filter_groups,
        thread: cli.thread,
        hosts: cli.hosts.clone(),
        report: cli.report,
    };

    let (formats, format_errors) = app_mgr::load_formats(Some(&app_dir));
    let (apps, app_errors) = app_mgr::load_applications(&app_dir, &build, &cli.apps);
    for err in format_errors.iter().chain(&app_errors) {
        tracing::warn!(error = %err, "Definition skipped");
    }
    if apps.is_empty() {
        return Err(ConfigError::ValueOutOfRange {
            field: "app-dir".to_string(),
            value: app_dir.display().to_string(),
            expected: "a directory with at least one valid application definition".to_string(),
        }
        .into());
    }

    let inputs = run::discover_inputs(&cli.inputs, &apps, constants::DEFAULT_MAX_DEPTH);
    if inputs.is_empty() {
        tracing::warn!("No input files to process");
    }

    let options = RunOptions {
        thread: cli.thread,
        quiet: cli.quiet,
        count: cli.count,
        max_count,
        use_rules: !cli.no_rules,
        unparsed: cli.unparsed,
        line_number: cli.line_number,
    };
    let mut matcher = Matcher::new(FormatCycler::new(formats), apps, filters, options);

    let stdout = std::io::stdout();
    let mut sink = WriterSink::new(BufWriter::new(stdout.lock()), inputs.len() > 1);
    let summary = run::run_files(&mut matcher, &inputs, &mut sink);
    let mut out = sink.finish().map_err(|e| LogTallyError::Io {
        path: PathBuf::from("<stdout>"),
        operation: "write",
        source: e,
    })?;

    if cli.report {
        let subreports: Vec<SubreportSpec> = run_config
            .subreports
            .iter()
            .map(|s| SubreportSpec {
                name: s.name.clone(),
                title: s.title.clone(),
            })
            .collect();
        let output = ReportOutput {
            report: report::build_report(&run_config.report_title, &subreports, matcher.apps()),
            summary: &summary,
        };
        let write = serde_json::to_writer_pretty(&mut out, &output)
            .map_err(std::io::Error::from)
            .and_then(|_| writeln!(out))
            .and_then(|_| out.flush());
        write.map_err(|e| LogTallyError::Io {
            path: PathBuf::from("<stdout>"),
            operation: "write",
            source: e,
        })?;
    }

    Ok(summary.total_matched > 0)
}
