// LogTally - core/application.rs
//
// Application definitions, validation, and the per-application rule engine.
// Core layer: accepts TOML strings, never touches the filesystem.
// I/O is handled by app::app_mgr which feeds definition files here.

use crate::core::model::{MatchOutcome, ParsedEvent, RemapSpec};
use crate::core::remap::Remapper;
use crate::core::report::{self, ReportItem, ReportItemDef};
use crate::core::rule::{self, Rule, THREAD_GROUP};
use crate::util::error::{AppError, ConfigError, ReportError};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

// =============================================================================
// TOML deserialization structures (raw input)
// =============================================================================

/// Raw TOML application definition as deserialized from a .app.toml file.
#[derive(Debug, Deserialize)]
pub struct AppDefinition {
    pub app: AppMeta,
    #[serde(default)]
    pub rules: Vec<RuleDef>,
    #[serde(default)]
    pub report: Vec<ReportItemDef>,
}

#[derive(Debug, Deserialize)]
pub struct AppMeta {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// App tags resolving lines to this application. Defaults to the name.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Log file globs, may contain `${host}`.
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i64,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct RuleDef {
    pub name: String,
    pub pattern: String,
}

/// A filter group: field name → replacement pattern, from one `--filter`.
pub type FilterGroup = Vec<(String, String)>;

/// Run-wide settings that shape how definitions compile into applications.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Shared `${name}` macros.
    pub fields: BTreeMap<String, String>,
    pub filters: Vec<FilterGroup>,
    pub thread: bool,
    /// Host names substituted for `${host}` in file globs.
    pub hosts: Vec<String>,
    pub report: bool,
}

/// Parse one `--filter` argument: `key=regex[,key=regex...]`.
pub fn parse_filter_group(value: &str) -> Result<FilterGroup, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidFilter {
        value: value.to_string(),
        reason,
    };
    let mut group: FilterGroup = Vec::new();
    for part in value.split(',') {
        let (key, pattern) = part
            .split_once('=')
            .ok_or_else(|| invalid(format!("'{part}' is not key=regex")))?;
        let key = key.trim();
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(invalid(format!("'{key}' is not a group name")));
        }
        if pattern.is_empty() {
            return Err(invalid(format!("empty pattern for '{key}'")));
        }
        regex::Regex::new(pattern).map_err(|e| ConfigError::InvalidRegex {
            pattern: pattern.to_string(),
            source: e,
        })?;
        if group.iter().any(|(k, _)| k == key) {
            return Err(invalid(format!("'{key}' given twice")));
        }
        group.push((key.to_string(), pattern.to_string()));
    }
    Ok(group)
}

/// Parse a TOML string into an `AppDefinition`.
///
/// `source_path` is used for error messages only (not for I/O).
pub fn parse_app_toml(toml_content: &str, source_path: &Path) -> Result<AppDefinition, AppError> {
    toml::from_str(toml_content).map_err(|e| AppError::TomlParse {
        path: source_path.to_path_buf(),
        source: e,
    })
}

// =============================================================================
// Application
// =============================================================================

/// A compiled application: ordered rules, counters, and report items.
#[derive(Debug)]
pub struct Application {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    /// File globs with `${host}` already expanded.
    pub files: Vec<String>,
    pub enabled: bool,
    pub priority: i64,

    pub rules: Vec<Rule>,
    pub report_items: Vec<ReportItem>,

    /// Lines attributed to this application.
    pub counter: u64,
    /// Lines no rule matched (counted only when the app has no filters).
    pub unparsed_counter: u64,
    /// Some rule carries filter keys.
    pub has_filters: bool,

    thread_mode: bool,
    reporting: bool,
    last_rule: Option<usize>,
}

/// Compile a definition into an `Application`.
///
/// Rule errors are fatal for the application. Report item errors are not:
/// the item is logged and skipped.
pub fn build_application(def: AppDefinition, opts: &BuildOptions) -> Result<Application, AppError> {
    let name = def.app.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::MissingField {
            app: "(empty)".to_string(),
            field: "app.name",
        });
    }
    if def.rules.is_empty() {
        return Err(AppError::NoRules { app: name });
    }

    let mut rules = Vec::new();
    for rule_def in &def.rules {
        // Multi-line TOML strings are joined into one pattern.
        let pattern = rule_def.pattern.replace(['\r', '\n'], "");
        if opts.filters.is_empty() {
            let pattern = rule::substitute_macros(&pattern, &opts.fields);
            rules.push(Rule::new(&name, &rule_def.name, &pattern, None)?);
            continue;
        }
        for group in &opts.filters {
            let (substituted, keys) = rule::substitute_filter_group(&pattern, group);
            let substituted = rule::substitute_macros(&substituted, &opts.fields);
            if keys.len() >= group.len() {
                rules.push(Rule::new(&name, &rule_def.name, &substituted, Some(keys))?);
            } else if opts.thread {
                rules.push(Rule::new(&name, &rule_def.name, &substituted, None)?);
            }
        }
    }

    let has_filters = rules.iter().any(Rule::is_filter);
    if has_filters {
        // Stable: filter rules first, each group in definition order.
        rules.sort_by_key(|r| !r.is_filter());
    } else {
        for rule in &mut rules {
            rule.full_match = true;
        }
    }

    let mut tags: Vec<String> = def
        .app
        .tags
        .iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    if tags.is_empty() {
        tags.push(name.clone());
    }
    tags.dedup();

    let hosts: Vec<&str> = if opts.hosts.is_empty() {
        vec!["*"]
    } else {
        opts.hosts.iter().map(String::as_str).collect()
    };
    let mut files: Vec<String> = Vec::new();
    for pattern in &def.app.files {
        for host in &hosts {
            let expanded = pattern.replace("${host}", host);
            if !files.contains(&expanded) {
                files.push(expanded);
            }
        }
    }

    let mut report_items = Vec::new();
    if opts.report {
        for item_def in &def.report {
            match report::parse_report_item(item_def, &rules) {
                Ok(item) => {
                    for data in &item.data {
                        rules[data.rule_index].used_by_report = true;
                    }
                    report_items.push(item);
                }
                Err(e @ ReportError::MissingRule { .. }) => {
                    tracing::debug!(app = %name, error = %e, "Skipping report item");
                }
                Err(e) => {
                    tracing::error!(app = %name, item = %item_def.name, error = %e, "Skipping report item");
                }
            }
        }
    }

    tracing::debug!(
        app = %name,
        rules = rules.len(),
        filters = rules.iter().filter(|r| r.is_filter()).count(),
        report_items = report_items.len(),
        enabled = def.app.enabled,
        priority = def.app.priority,
        "Built application"
    );

    Ok(Application {
        name,
        description: def.app.description,
        tags,
        files,
        enabled: def.app.enabled,
        priority: def.app.priority,
        rules,
        report_items,
        counter: 0,
        unparsed_counter: 0,
        has_filters,
        thread_mode: opts.thread,
        reporting: opts.report,
        last_rule: None,
    })
}

impl Application {
    /// Run the rule engine on one event.
    ///
    /// The first rule whose pattern matches the message decides the outcome.
    /// A filter rule with a missing filter key voids the match (keeping the
    /// thread id, if any). Results are accumulated when reporting, when the
    /// app has no filters, or when the rule is a filter or feeds a report.
    pub fn process(
        &mut self,
        event: &ParsedEvent,
        mut remapper: Option<&mut dyn Remapper>,
    ) -> MatchOutcome {
        for (idx, rule) in self.rules.iter_mut().enumerate() {
            let Some(caps) = rule.pattern.captures(&event.message) else {
                continue;
            };
            self.last_rule = Some(idx);

            let (values, remap) = match remapper.as_deref_mut() {
                Some(r) => {
                    let mut values = r.match_to_values(&caps, &rule.key_fields);
                    let host = r.map_value(event.host.as_deref(), "host");
                    if let Some(first) = values.first_mut() {
                        *first = host.clone();
                    }
                    let message = r.match_to_string(&caps, &event.message, &rule.key_fields, &values);
                    (values, Some(RemapSpec { host, message }))
                }
                None => (rule.key_values(&caps, event.host.as_deref()), None),
            };

            let thread = if self.thread_mode && rule.has_thread_group() {
                caps.name(THREAD_GROUP).map(|m| m.as_str().to_string())
            } else {
                None
            };

            if rule.rejects(&caps) {
                return MatchOutcome::rejected(thread);
            }
            if self.reporting || rule.is_filter() || !self.has_filters || rule.used_by_report {
                rule.add_result(values);
            }
            return MatchOutcome {
                matched: true,
                full_match: Some(rule.full_match),
                thread,
                remap,
            };
        }

        self.last_rule = None;
        if !self.has_filters {
            self.unparsed_counter += 1;
        }
        MatchOutcome::unmatched()
    }

    /// Bump the last result of the most recently matched rule by `k`.
    pub fn increase_last(&mut self, k: u64) {
        if let Some(rule) = self.last_rule.and_then(|idx| self.rules.get_mut(idx)) {
            rule.increase_last(k);
        }
    }

    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name == name)
    }
}

/// Sort applications into identity order: `(priority, name)`.
pub fn sort_applications(apps: &mut [Application]) {
    apps.sort_by(|a, b| (a.priority, &a.name).cmp(&(b.priority, &b.name)));
}

// =============================================================================
// Tag map
// =============================================================================

/// Result of resolving an app tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagLookup<'a> {
    /// The tag is registered.
    Exact(&'a [usize]),
    /// Registered tags that are prefixes of the tag, in tag order.
    Prefix(Vec<usize>),
    NotFound,
}

/// App tag → candidate application indices.
#[derive(Debug, Clone, Default)]
pub struct TagMap {
    tags: BTreeMap<String, Vec<usize>>,
}

impl TagMap {
    /// Build the map from applications in identity order.
    pub fn build(apps: &[Application]) -> Self {
        let mut tags: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (idx, app) in apps.iter().enumerate() {
            for tag in &app.tags {
                let entry = tags.entry(tag.clone()).or_default();
                if !entry.contains(&idx) {
                    entry.push(idx);
                }
            }
        }
        Self { tags }
    }

    pub fn resolve(&self, apptag: &str) -> TagLookup<'_> {
        if let Some(apps) = self.tags.get(apptag) {
            return TagLookup::Exact(apps);
        }
        let mut found: Vec<usize> = Vec::new();
        for (tag, apps) in &self.tags {
            if apptag.starts_with(tag.as_str()) {
                for &idx in apps {
                    if !found.contains(&idx) {
                        found.push(idx);
                    }
                }
            }
        }
        if found.is_empty() {
            TagLookup::NotFound
        } else {
            TagLookup::Prefix(found)
        }
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::remap::tests::MaskingRemapper;

    const WEB_APP: &str = r#"
[app]
name = "web"
tags = ["app"]
files = ["/var/log/${host}/web.log"]
priority = 5

[[rules]]
name = "request"
pattern = 'user=(?P<user>\w+) status=(?P<status>\d+)'
"#;

    fn event(host: &str, message: &str) -> ParsedEvent {
        ParsedEvent {
            host: Some(host.to_string()),
            apptag: Some("app".to_string()),
            month: "Jan".to_string(),
            day: "1".to_string(),
            ltime: "10:00:00".to_string(),
            year: None,
            message: message.to_string(),
            repeat: None,
        }
    }

    fn build(toml: &str, opts: &BuildOptions) -> Application {
        let def = parse_app_toml(toml, Path::new("test.app.toml")).unwrap();
        build_application(def, opts).unwrap()
    }

    #[test]
    fn test_parse_filter_group() {
        let group = parse_filter_group(r"user=alice|bob,client=10\.0\..*").unwrap();
        assert_eq!(
            group,
            vec![
                ("user".to_string(), "alice|bob".to_string()),
                ("client".to_string(), r"10\.0\..*".to_string()),
            ]
        );
        assert!(parse_filter_group("user").is_err());
        assert!(parse_filter_group("user=").is_err());
        assert!(parse_filter_group("user=(").is_err());
        assert!(parse_filter_group("user=a,user=b").is_err());
    }

    #[test]
    fn test_build_expands_files_and_tags() {
        let opts = BuildOptions {
            hosts: vec!["h1".into(), "h2".into()],
            ..Default::default()
        };
        let app = build(WEB_APP, &opts);
        assert_eq!(app.tags, vec!["app"]);
        assert_eq!(app.files, vec!["/var/log/h1/web.log", "/var/log/h2/web.log"]);
        assert!(!app.has_filters);
        assert!(app.rules.iter().all(|r| r.full_match));
    }

    #[test]
    fn test_no_rules_is_error() {
        let def = parse_app_toml("[app]\nname = \"empty\"\n", Path::new("e.app.toml")).unwrap();
        assert!(matches!(
            build_application(def, &BuildOptions::default()),
            Err(AppError::NoRules { .. })
        ));
    }

    #[test]
    fn test_invalid_rule_is_error() {
        let toml = "[app]\nname = \"bad\"\n[[rules]]\nname = \"r\"\npattern = '(?P<x>'\n";
        let def = parse_app_toml(toml, Path::new("b.app.toml")).unwrap();
        assert!(matches!(
            build_application(def, &BuildOptions::default()),
            Err(AppError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_process_accumulates_results() {
        let mut app = build(WEB_APP, &BuildOptions::default());
        let a = app.process(&event("host1", "user=alice status=200"), None);
        let b = app.process(&event("host1", "user=bob status=404"), None);
        assert!(a.matched && b.matched);
        assert_eq!(a.full_match, Some(true));

        let results = &app.rules[0].results;
        let key = |u: &str, s: &str| vec![Some("host1".to_string()), Some(u.into()), Some(s.into())];
        assert_eq!(results.get(&key("alice", "200")), Some(1));
        assert_eq!(results.get(&key("bob", "404")), Some(1));
    }

    #[test]
    fn test_unmatched_counts_unparsed() {
        let mut app = build(WEB_APP, &BuildOptions::default());
        let outcome = app.process(&event("h", "something else"), None);
        assert_eq!(outcome, MatchOutcome::unmatched());
        assert_eq!(app.unparsed_counter, 1);
    }

    #[test]
    fn test_filter_rejection_voids_match() {
        let toml = r#"
[app]
name = "ssh"

[[rules]]
name = "login"
pattern = 'login(?: user=(?P<user>\w+))?(?: from (?P<client>\S+))?'
"#;
        let opts = BuildOptions {
            filters: vec![vec![("client".to_string(), r"10\.\S+".to_string())]],
            ..Default::default()
        };
        let mut app = build(toml, &opts);
        assert!(app.has_filters);
        assert_eq!(
            app.rules[0].filter_keys.as_deref(),
            Some(&["client".to_string()][..])
        );

        let rejected = app.process(&event("h", "login user=bob"), None);
        assert!(!rejected.matched);
        assert_eq!(rejected.full_match, None);

        let accepted = app.process(&event("h", "login user=bob from 10.0.0.1"), None);
        assert!(accepted.matched);
        assert_eq!(accepted.full_match, Some(true));
        assert_eq!(app.unparsed_counter, 0);
    }

    #[test]
    fn test_partial_filter_group_kept_only_in_thread_mode() {
        let opts = BuildOptions {
            filters: vec![vec![("client".to_string(), "x".to_string())]],
            ..Default::default()
        };
        let mut def = parse_app_toml(WEB_APP, Path::new("w.app.toml")).unwrap();
        def.rules.push(RuleDef {
            name: "conn".into(),
            pattern: r"from (?P<client>\S+)".into(),
        });
        let app = build_application(def, &opts).unwrap();
        assert_eq!(app.rules.len(), 1);
        assert!(app.rules[0].is_filter());

        let thread_opts = BuildOptions {
            thread: true,
            ..opts
        };
        let app = build(WEB_APP, &thread_opts);
        assert_eq!(app.rules.len(), 1);
        assert!(!app.rules[0].is_filter());
    }

    #[test]
    fn test_filter_rules_are_ordered_first() {
        let toml = r#"
[app]
name = "ssh"

[[rules]]
name = "plain"
pattern = 'session (?P<thread>\d+) opened'

[[rules]]
name = "filter"
pattern = 'user=(?P<user>\w+)'
"#;
        let opts = BuildOptions {
            filters: vec![vec![("user".to_string(), "alice".to_string())]],
            thread: true,
            ..Default::default()
        };
        let app = build(toml, &opts);
        let names: Vec<&str> = app.rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["filter", "plain"]);
        assert!(!app.rules[1].full_match);
    }

    #[test]
    fn test_thread_id_returned_in_thread_mode() {
        let toml = r#"
[app]
name = "mail"

[[rules]]
name = "queued"
pattern = '(?P<thread>[0-9A-F]+): from=<(?P<from>[^>]*)>'
"#;
        let opts = BuildOptions {
            thread: true,
            ..Default::default()
        };
        let mut app = build(toml, &opts);
        let outcome = app.process(&event("mx", "4F2A1: from=<a@b.c>"), None);
        assert!(outcome.matched);
        assert_eq!(outcome.thread.as_deref(), Some("4F2A1"));
    }

    #[test]
    fn test_increase_last_targets_last_matched_rule() {
        let mut app = build(WEB_APP, &BuildOptions::default());
        app.process(&event("h", "user=alice status=200"), None);
        app.increase_last(5);
        let key = vec![Some("h".to_string()), Some("alice".into()), Some("200".into())];
        assert_eq!(app.rules[0].results.get(&key), Some(6));
        assert_eq!(app.rules[0].results.len(), 1);
    }

    #[test]
    fn test_remapper_rewrites_values_and_message() {
        let mut app = build(WEB_APP, &BuildOptions::default());
        let mut remapper = MaskingRemapper;
        let outcome = app.process(&event("h", "user=alice status=200"), Some(&mut remapper));
        let remap = outcome.remap.unwrap();
        assert_eq!(remap.host.as_deref(), Some("<host>"));
        assert_eq!(remap.message, "user=<user> status=<status>");
    }

    #[test]
    fn test_tag_map_resolution() {
        let mut apps = vec![
            build(WEB_APP, &BuildOptions::default()),
            build(
                "[app]\nname = \"postfix\"\ntags = [\"postfix\"]\n[[rules]]\nname = \"r\"\npattern = 'x'\n",
                &BuildOptions::default(),
            ),
        ];
        sort_applications(&mut apps);
        let tagmap = TagMap::build(&apps);
        assert_eq!(apps[0].name, "postfix");
        assert_eq!(tagmap.resolve("postfix"), TagLookup::Exact(&[0]));
        assert_eq!(tagmap.resolve("postfix/smtpd"), TagLookup::Prefix(vec![0]));
        assert_eq!(tagmap.resolve("sshd"), TagLookup::NotFound);
    }
}
