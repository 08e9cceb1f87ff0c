// LogTally - core/report.rs
//
// Report item definitions and report assembly. Items are validated against
// their application's rules when the application is built; at the end of a
// run every subreport collects the results of its items across all
// applications. Rendering is left to the caller: the assembled report is a
// plain serialisable structure.

use crate::core::aggregate::{Selector, TableCell, TableField};
use crate::core::application::Application;
use crate::core::rule::Rule;
use crate::util::error::ReportError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

// =============================================================================
// TOML deserialization structures (raw input)
// =============================================================================

/// Raw `[[report]]` entry of an application definition.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportItemDef {
    pub name: String,
    #[serde(default)]
    pub subreport: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub data: Vec<ReportDataDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportDataDef {
    pub rule: String,
    pub spec: String,
}

// =============================================================================
// Compiled report items
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportFunction {
    Total,
    Top { n: usize, header: String },
    Table { headers: Vec<String> },
}

impl ReportFunction {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Total => "total",
            Self::Top { .. } => "top",
            Self::Table { .. } => "table",
        }
    }

    fn headers(&self) -> Vec<String> {
        match self {
            Self::Total => Vec::new(),
            Self::Top { header, .. } => vec![header.clone()],
            Self::Table { headers } => headers.clone(),
        }
    }
}

/// Integer field whose values weigh each result, e.g. `size[KB]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueField {
    pub name: String,
    /// Unit the values are expressed in (`KB`, `Mbits`, ...).
    pub unit: Option<String>,
    /// `+` prefix: sum values instead of ranking by the maximum.
    pub sum: bool,
}

/// One data line of a report item.
#[derive(Debug, Clone)]
pub struct ReportData {
    pub rule: String,
    /// Index of the rule in its application.
    pub rule_index: usize,
    pub selector: Selector,
    pub fields: Vec<TableField>,
    pub value: Option<ValueField>,
}

#[derive(Debug, Clone)]
pub struct ReportItem {
    pub name: String,
    pub subreport: String,
    pub title: String,
    pub color: Option<String>,
    pub function: ReportFunction,
    pub data: Vec<ReportData>,
}

fn color_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^([a-z]+|#[0-9a-f]{6})$").expect("color_regex: invalid regex"))
}

fn function_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"^\s*(?P<function>table|top|total)\s*(?:\(\s*(?:(?P<topnum>-?\d+)\s*,)?\s*(?P<headers>"[^"]*"(?:\s*,\s*"[^"]*")*)\s*\))?\s*$"#,
        )
        .expect("function_regex: invalid regex")
    })
}

fn data_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"^\(\s*(?P<condition>\*|\w+\s*(?:!=|==)\s*"[^"]*")\s*,\s*(?P<fields>(?:\w+|"[^"]*")(?:\s*,\s*(?:\w+|"[^"]*"))*)(?:\s*:\s*(?P<sum>\+)?(?P<valfld>\w+)(?:\[(?P<unit>(?:|K|M|G|T)(?:b|bits|B|Bytes))\])?)?\s*\)$"#,
        )
        .expect("data_regex: invalid regex")
    })
}

fn split_list(text: &str) -> Vec<String> {
    text.split(',').map(|s| s.trim().to_string()).collect()
}

fn unquote(text: &str) -> Option<&str> {
    text.strip_prefix('"').and_then(|t| t.strip_suffix('"'))
}

fn parse_function(item: &str, text: &str) -> Result<ReportFunction, ReportError> {
    let invalid = |reason: &str| ReportError::InvalidOption {
        item: item.to_string(),
        option: "function".to_string(),
        reason: reason.to_string(),
    };
    let caps = function_regex()
        .captures(text)
        .ok_or_else(|| invalid("expected total, top(N, \"Header\") or table(\"H1\", ...)"))?;
    let headers: Vec<String> = caps
        .name("headers")
        .map(|h| {
            split_list(h.as_str())
                .iter()
                .map(|s| unquote(s).unwrap_or(s).to_string())
                .collect()
        })
        .unwrap_or_default();

    match &caps["function"] {
        "total" if !headers.is_empty() => Err(invalid("function \"total\" has no headers")),
        "total" => Ok(ReportFunction::Total),
        "top" => {
            let n = caps
                .name("topnum")
                .and_then(|m| m.as_str().parse::<usize>().ok())
                .ok_or_else(|| invalid("the first argument of \"top\" must be a non-negative integer"))?;
            match headers.as_slice() {
                [header] => Ok(ReportFunction::Top {
                    n,
                    header: header.clone(),
                }),
                _ => Err(invalid("function \"top\" takes exactly one header")),
            }
        }
        _ => {
            if caps.name("topnum").is_some() {
                return Err(invalid("function \"table\" takes no count"));
            }
            if headers.is_empty() {
                return Err(invalid("function \"table\" needs headers"));
            }
            Ok(ReportFunction::Table { headers })
        }
    }
}

fn parse_data(
    item: &str,
    function: &ReportFunction,
    def: &ReportDataDef,
    rule_index: usize,
    rule: &Rule,
) -> Result<ReportData, ReportError> {
    let invalid = |reason: String| ReportError::InvalidOption {
        item: item.to_string(),
        option: def.rule.clone(),
        reason,
    };
    let caps = data_regex()
        .captures(def.spec.trim())
        .ok_or_else(|| invalid("syntax error in report data".to_string()))?;

    let selector = Selector::parse(&caps["condition"]).map_err(|e| invalid(e.to_string()))?;
    let fields: Vec<String> = split_list(&caps["fields"]);
    let value = caps.name("valfld").map(|v| ValueField {
        name: v.as_str().to_string(),
        unit: caps.name("unit").map(|u| u.as_str().to_string()),
        sum: caps.name("sum").is_some(),
    });

    let n_headers = function.headers().len();
    if fields.len() < n_headers {
        return Err(invalid("more headers than fields".to_string()));
    }
    let check_field = |field: &str| {
        if rule.has_field(field) {
            Ok(())
        } else {
            Err(invalid(format!("field '{field}' is not a group of rule '{}'", rule.name)))
        }
    };

    match function {
        ReportFunction::Total => {
            if let Some(field) = selector.field() {
                check_field(field)?;
            }
            if let Some(v) = &value {
                check_field(&v.name)?;
            }
            if fields.len() > 1 {
                return Err(invalid("multiple row descriptions".to_string()));
            }
            if unquote(&fields[0]).is_none() {
                return Err(invalid("a description must be double-quoted".to_string()));
            }
        }
        ReportFunction::Top { .. } => {
            if let Some(v) = &value {
                check_field(&v.name)?;
            }
            if fields.len() != 1 || unquote(&fields[0]).is_some() {
                return Err(invalid("missing field specification".to_string()));
            }
        }
        ReportFunction::Table { .. } => {
            if value.is_some() {
                return Err(invalid("table data takes no value field".to_string()));
            }
            if let Some(field) = selector.field() {
                check_field(field)?;
            }
        }
    }

    let fields = fields
        .into_iter()
        .map(|f| match unquote(&f) {
            Some(label) => Ok(TableField::Label(label.to_string())),
            None => check_field(&f).map(|_| TableField::Field(f)),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ReportData {
        rule: def.rule.clone(),
        rule_index,
        selector,
        fields,
        value,
    })
}

/// Validate a report item against the rules of its application.
///
/// A reference to an unknown rule is `ReportError::MissingRule`; every other
/// problem is `MissingOption` or `InvalidOption`.
pub fn parse_report_item(def: &ReportItemDef, rules: &[Rule]) -> Result<ReportItem, ReportError> {
    let item = def.name.as_str();
    let missing = |option: &'static str| ReportError::MissingOption {
        item: item.to_string(),
        option,
    };

    let mut indices = Vec::with_capacity(def.data.len());
    for data in &def.data {
        let idx = rules
            .iter()
            .position(|r| r.name == data.rule)
            .ok_or_else(|| ReportError::MissingRule {
                item: item.to_string(),
                rule: data.rule.clone(),
            })?;
        indices.push(idx);
    }

    let subreport = def.subreport.clone().ok_or_else(|| missing("subreport"))?;
    let title = def.title.clone().ok_or_else(|| missing("title"))?;
    let function = parse_function(item, def.function.as_deref().ok_or_else(|| missing("function"))?)?;

    if let Some(color) = &def.color {
        if !color_regex().is_match(color) {
            return Err(ReportError::InvalidOption {
                item: item.to_string(),
                option: "color".to_string(),
                reason: format!("'{color}' is not a color name or #rrggbb"),
            });
        }
    }
    if def.data.is_empty() {
        return Err(missing("data"));
    }

    let data = def
        .data
        .iter()
        .zip(indices)
        .map(|(d, idx)| parse_data(item, &function, d, idx, &rules[idx]))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ReportItem {
        name: def.name.clone(),
        subreport,
        title,
        color: def.color.clone(),
        function,
        data,
    })
}

// =============================================================================
// Report assembly
// =============================================================================

/// Subreport declared in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SubreportSpec {
    pub name: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TotalRow {
    pub value: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopRow {
    pub value: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ItemRows {
    Totals(Vec<TotalRow>),
    Top(Vec<TopRow>),
    Table(Vec<Vec<TableCell>>),
}

impl ItemRows {
    fn is_empty(&self) -> bool {
        match self {
            Self::Totals(r) => r.is_empty(),
            Self::Top(r) => r.is_empty(),
            Self::Table(r) => r.is_empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemResult {
    pub app: String,
    pub title: String,
    pub color: Option<String>,
    pub function: &'static str,
    pub headers: Vec<String>,
    pub rows: ItemRows,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubreportResult {
    pub name: String,
    pub title: String,
    pub items: Vec<ItemResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub title: String,
    pub subreports: Vec<SubreportResult>,
}

const UNIT_PREFIXES: [&str; 5] = ["", "K", "M", "G", "T"];

/// Scale `value`, expressed in `unit`, to the largest prefix up to T that
/// keeps it at or above one.
pub fn format_with_unit(value: i64, unit: &str) -> String {
    let (prefix, suffix) = match unit.chars().next() {
        Some(c @ ('K' | 'M' | 'G' | 'T')) => (c.to_string(), &unit[1..]),
        _ => (String::new(), unit),
    };
    let base = if suffix.starts_with('b') { 1000.0 } else { 1024.0 };
    let mut level = UNIT_PREFIXES.iter().position(|p| *p == prefix).unwrap_or(0);
    let mut scaled = value as f64;
    let mut scaled_up = false;
    while scaled.abs() >= base && level + 1 < UNIT_PREFIXES.len() {
        scaled /= base;
        level += 1;
        scaled_up = true;
    }
    if scaled_up {
        format!("{scaled:.1} {}{suffix}", UNIT_PREFIXES[level])
    } else {
        format!("{value} {}{suffix}", UNIT_PREFIXES[level])
    }
}

fn item_rows(app: &Application, item: &ReportItem) -> ItemRows {
    let run = |data: &ReportData| -> Option<&Rule> { app.rules.get(data.rule_index) };
    match &item.function {
        ReportFunction::Total => {
            let mut rows = Vec::new();
            for data in &item.data {
                let Some(rule) = run(data) else { continue };
                let value_field = data.value.as_ref().map(|v| v.name.as_str());
                match rule.results.total(&data.selector, value_field) {
                    Ok(0) => {}
                    Ok(total) => {
                        let value = match data.value.as_ref().and_then(|v| v.unit.as_deref()) {
                            Some(unit) => format_with_unit(total, unit),
                            None => total.to_string(),
                        };
                        let description = data
                            .fields
                            .iter()
                            .find_map(|f| match f {
                                TableField::Label(l) => Some(l.clone()),
                                TableField::Field(_) => None,
                            })
                            .unwrap_or_default();
                        rows.push(TotalRow { value, description });
                    }
                    Err(e) => {
                        tracing::error!(app = %app.name, item = %item.name, error = %e, "Report total failed");
                    }
                }
            }
            ItemRows::Totals(rows)
        }
        ReportFunction::Top { n, .. } => {
            let mut entries = Vec::new();
            let mut unit = None;
            for data in &item.data {
                let Some(rule) = run(data) else { continue };
                let Some(TableField::Field(group)) = data.fields.first() else {
                    continue;
                };
                let value_field = data.value.as_ref().map(|v| v.name.as_str());
                let use_max = !data.value.as_ref().is_some_and(|v| v.sum);
                if unit.is_none() {
                    unit = data.value.as_ref().and_then(|v| v.unit.clone());
                }
                match rule.results.top_n(*n, value_field, use_max, group) {
                    Ok(top) => entries.extend(top),
                    Err(e) => {
                        tracing::error!(app = %app.name, item = %item.name, error = %e, "Report top failed");
                    }
                }
            }
            entries.sort_by(|a, b| b.total.cmp(&a.total));
            ItemRows::Top(
                entries
                    .into_iter()
                    .map(|e| TopRow {
                        value: match &unit {
                            Some(u) => format_with_unit(e.total, u),
                            None => e.total.to_string(),
                        },
                        values: e.values,
                    })
                    .collect(),
            )
        }
        ReportFunction::Table { headers } => {
            let mut rows = Vec::new();
            for data in &item.data {
                let Some(rule) = run(data) else { continue };
                match rule.results.list_events(&data.selector, headers.len(), &data.fields) {
                    Ok(list) => rows.extend(list),
                    Err(e) => {
                        tracing::error!(app = %app.name, item = %item.name, error = %e, "Report table failed");
                    }
                }
            }
            ItemRows::Table(rows)
        }
    }
}

/// Merge table items of a subreport that share title and headers.
fn compact_tables(items: &mut Vec<ItemResult>) {
    let mut i = 0;
    while i < items.len() {
        let mut j = i + 1;
        while j < items.len() {
            let mergeable = items[i].function == "table"
                && items[j].function == "table"
                && items[i].title == items[j].title
                && items[i].headers == items[j].headers;
            if mergeable {
                let other = items.remove(j);
                tracing::debug!(title = %other.title, "Merging identical report tables");
                if let (ItemRows::Table(dst), ItemRows::Table(src)) = (&mut items[i].rows, other.rows) {
                    dst.extend(src);
                }
            } else {
                j += 1;
            }
        }
        i += 1;
    }
}

/// Assemble the report from applications in identity order.
///
/// Without declared subreports, every subreport named by an item is used,
/// in order of first appearance.
pub fn build_report(title: &str, subreports: &[SubreportSpec], apps: &[Application]) -> Report {
    let specs: Vec<SubreportSpec> = if subreports.is_empty() {
        let mut found: Vec<SubreportSpec> = Vec::new();
        for item in apps.iter().flat_map(|a| &a.report_items) {
            if !found.iter().any(|s| s.name == item.subreport) {
                found.push(SubreportSpec {
                    name: item.subreport.clone(),
                    title: String::new(),
                });
            }
        }
        found
    } else {
        subreports.to_vec()
    };

    let mut result = Vec::new();
    for spec in specs {
        let mut items = Vec::new();
        for app in apps {
            for item in app.report_items.iter().filter(|i| i.subreport == spec.name) {
                let rows = item_rows(app, item);
                if rows.is_empty() {
                    continue;
                }
                items.push(ItemResult {
                    app: app.name.clone(),
                    title: item.title.clone(),
                    color: item.color.clone(),
                    function: item.function.kind(),
                    headers: item.function.headers(),
                    rows,
                });
            }
        }
        compact_tables(&mut items);
        if items.is_empty() {
            continue;
        }
        let title = if spec.title.is_empty() {
            spec.name.clone()
        } else {
            spec.title.clone()
        };
        result.push(SubreportResult {
            name: spec.name,
            title,
            items,
        });
    }

    Report {
        title: title.to_string(),
        subreports: result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::application::{build_application, parse_app_toml, BuildOptions};
    use crate::core::model::ParsedEvent;
    use std::path::Path;

    const SSH_APP: &str = r#"
[app]
name = "sshd"

[[rules]]
name = "accepted"
pattern = 'Accepted (?P<method>\w+) for (?P<user>\w+) from (?P<client>\S+)(?: size=(?P<size>\d+))?'

[[rules]]
name = "failed"
pattern = 'Failed password for (?P<user>\w+)'

[[report]]
name = "logins"
subreport = "logins"
title = "Successful logins"
function = 'table("Host", "User", "Method")'
data = [{ rule = "accepted", spec = '(*, host, user, method)' }]

[[report]]
name = "login_total"
subreport = "logins"
title = "Login totals"
function = "total"
data = [
    { rule = "accepted", spec = '(*, "Accepted logins")' },
    { rule = "failed", spec = '(*, "Failed logins")' },
]

[[report]]
name = "top_users"
subreport = "users"
title = "Top users"
function = 'top(2, "User")'
data = [{ rule = "accepted", spec = '(*, user)' }]

[[report]]
name = "ghost"
subreport = "logins"
title = "Unknown rule"
function = "total"
data = [{ rule = "missing", spec = '(*, "x")' }]
"#;

    fn event(message: &str) -> ParsedEvent {
        ParsedEvent {
            host: Some("h1".into()),
            apptag: Some("sshd".into()),
            month: "Jan".into(),
            day: "1".into(),
            ltime: "10:00:00".into(),
            year: None,
            message: message.into(),
            repeat: None,
        }
    }

    fn ssh_app() -> Application {
        let def = parse_app_toml(SSH_APP, Path::new("sshd.app.toml")).unwrap();
        let opts = BuildOptions {
            report: true,
            ..Default::default()
        };
        build_application(def, &opts).unwrap()
    }

    fn item_def(function: &str, spec: &str) -> ReportItemDef {
        ReportItemDef {
            name: "item".into(),
            subreport: Some("s".into()),
            title: Some("T".into()),
            color: None,
            function: Some(function.into()),
            data: vec![ReportDataDef {
                rule: "accepted".into(),
                spec: spec.into(),
            }],
        }
    }

    #[test]
    fn test_items_parsed_and_rules_flagged() {
        let app = ssh_app();
        assert_eq!(app.report_items.len(), 3);
        assert!(app.rules.iter().all(|r| r.used_by_report));
    }

    #[test]
    fn test_parse_function() {
        assert_eq!(parse_function("i", "total").unwrap(), ReportFunction::Total);
        assert_eq!(
            parse_function("i", r#"top(5, "User")"#).unwrap(),
            ReportFunction::Top {
                n: 5,
                header: "User".into()
            }
        );
        assert_eq!(
            parse_function("i", r#"table("A", "B")"#).unwrap(),
            ReportFunction::Table {
                headers: vec!["A".into(), "B".into()]
            }
        );
        assert!(parse_function("i", r#"total("A")"#).is_err());
        assert!(parse_function("i", r#"top(-1, "A")"#).is_err());
        assert!(parse_function("i", "median").is_err());
    }

    #[test]
    fn test_item_validation_errors() {
        let app = ssh_app();
        let rules = &app.rules;

        let missing_rule = ReportItemDef {
            data: vec![ReportDataDef {
                rule: "nope".into(),
                spec: "(*, user)".into(),
            }],
            ..item_def("total", "")
        };
        assert!(matches!(
            parse_report_item(&missing_rule, rules),
            Err(ReportError::MissingRule { .. })
        ));

        let unquoted_total = item_def("total", "(*, user)");
        assert!(matches!(
            parse_report_item(&unquoted_total, rules),
            Err(ReportError::InvalidOption { .. })
        ));

        let bad_field = item_def(r#"top(3, "X")"#, "(*, nosuch)");
        assert!(parse_report_item(&bad_field, rules).is_err());

        let table_with_value = item_def(r#"table("A")"#, "(*, user: size)");
        assert!(parse_report_item(&table_with_value, rules).is_err());

        let too_many_headers = item_def(r#"table("A", "B", "C")"#, "(*, user)");
        assert!(parse_report_item(&too_many_headers, rules).is_err());

        let bad_color = ReportItemDef {
            color: Some("not a color!".into()),
            ..item_def("total", r#"(*, "x")"#)
        };
        assert!(parse_report_item(&bad_color, rules).is_err());

        let no_title = ReportItemDef {
            title: None,
            ..item_def("total", r#"(*, "x")"#)
        };
        assert!(matches!(
            parse_report_item(&no_title, rules),
            Err(ReportError::MissingOption { option: "title", .. })
        ));
    }

    #[test]
    fn test_value_field_with_unit() {
        let app = ssh_app();
        let item = parse_report_item(&item_def(r#"top(3, "User")"#, "(*, user: +size[KB])"), &app.rules)
            .unwrap();
        let value = item.data[0].value.as_ref().unwrap();
        assert_eq!(value.name, "size");
        assert_eq!(value.unit.as_deref(), Some("KB"));
        assert!(value.sum);
    }

    #[test]
    fn test_build_report() {
        let mut apps = vec![ssh_app()];
        for msg in [
            "Accepted password for alice from 10.0.0.1",
            "Accepted password for alice from 10.0.0.1",
            "Accepted publickey for bob from 10.0.0.2",
            "Failed password for carol",
        ] {
            apps[0].process(&event(msg), None);
        }

        let report = build_report("Daily", &[], &apps);
        assert_eq!(report.title, "Daily");
        let names: Vec<&str> = report.subreports.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["logins", "users"]);

        let logins = &report.subreports[0];
        assert_eq!(logins.items.len(), 2);
        match &logins.items[1].rows {
            ItemRows::Totals(rows) => {
                assert_eq!(rows[0].value, "3");
                assert_eq!(rows[0].description, "Accepted logins");
                assert_eq!(rows[1].value, "1");
            }
            other => panic!("expected totals, got {other:?}"),
        }

        match &report.subreports[1].items[0].rows {
            ItemRows::Top(rows) => {
                assert_eq!(rows[0].value, "2");
                assert_eq!(rows[0].values, vec!["alice".to_string()]);
            }
            other => panic!("expected top, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_totals_and_empty_items_omitted() {
        let apps = vec![ssh_app()];
        let report = build_report("Empty", &[], &apps);
        assert!(report.subreports.is_empty());
    }

    #[test]
    fn test_compact_tables_merges_identical() {
        let row = |v: &str| vec![TableCell::Value(Some(v.to_string()))];
        let item = |rows| ItemResult {
            app: "a".into(),
            title: "Same".into(),
            color: None,
            function: "table",
            headers: vec!["H".into()],
            rows: ItemRows::Table(rows),
        };
        let mut items = vec![item(vec![row("x")]), item(vec![row("y")])];
        compact_tables(&mut items);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].rows, ItemRows::Table(vec![row("x"), row("y")]));
    }

    #[test]
    fn test_format_with_unit() {
        assert_eq!(format_with_unit(512, "KB"), "512 KB");
        assert_eq!(format_with_unit(2048, "KB"), "2.0 MB");
        assert_eq!(format_with_unit(1500, "bits"), "1.5 Kbits");
    }
}
