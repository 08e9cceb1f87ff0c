// LogTally - core/rule.rs
//
// Compiled field-extraction rules. A rule owns its pattern, the ordered
// key fields that shape its result table, and the optional filter keys
// that turn it into a filter rule.

use crate::core::aggregate::{ResultKey, ResultTable};
use crate::util::constants;
use crate::util::error::AppError;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Name of the capture group carrying a thread identifier.
pub const THREAD_GROUP: &str = "thread";

/// Name of the key field always placed first.
pub const HOST_FIELD: &str = "host";

/// One compiled rule of an application.
#[derive(Debug, Clone)]
pub struct Rule {
    /// Rule name as given in the application definition.
    pub name: String,

    pub pattern: Regex,

    /// `host` followed by every other named group in pattern order.
    pub key_fields: Vec<String>,

    /// Groups that must all capture for a match to count. `None` for plain
    /// rules.
    pub filter_keys: Option<Vec<String>>,

    /// Whether a match of this rule stands for the whole line.
    pub full_match: bool,

    /// Set when a report item reads this rule's results.
    pub used_by_report: bool,

    pub results: ResultTable,
}

impl Rule {
    /// Compile a rule. `app` only feeds error messages.
    pub fn new(
        app: &str,
        name: &str,
        pattern: &str,
        filter_keys: Option<Vec<String>>,
    ) -> Result<Self, AppError> {
        if pattern.trim().is_empty() {
            return Err(AppError::EmptyPattern {
                app: app.to_string(),
                rule: name.to_string(),
            });
        }
        if pattern.len() > constants::MAX_REGEX_PATTERN_LENGTH {
            return Err(AppError::PatternTooLong {
                app: app.to_string(),
                rule: name.to_string(),
                length: pattern.len(),
                max_length: constants::MAX_REGEX_PATTERN_LENGTH,
            });
        }
        let regex = Regex::new(pattern).map_err(|e| AppError::InvalidPattern {
            app: app.to_string(),
            rule: name.to_string(),
            source: e,
        })?;

        let mut key_fields = vec![HOST_FIELD.to_string()];
        for group in regex.capture_names().flatten() {
            if !key_fields.iter().any(|k| k == group) {
                key_fields.push(group.to_string());
            }
        }
        // Cannot fire while `host` leads every key; an empty key-field set
        // stays a definition error should that ever change.
        if key_fields.is_empty() {
            return Err(AppError::EmptyKeyFields {
                app: app.to_string(),
                rule: name.to_string(),
            });
        }

        Ok(Self {
            name: name.to_string(),
            pattern: regex,
            results: ResultTable::new(name, key_fields.clone()),
            key_fields,
            full_match: filter_keys.is_some(),
            filter_keys,
            used_by_report: false,
        })
    }

    pub fn is_filter(&self) -> bool {
        self.filter_keys.is_some()
    }

    pub fn has_thread_group(&self) -> bool {
        self.key_fields.iter().any(|k| k == THREAD_GROUP)
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.key_fields.iter().any(|k| k == field)
    }

    /// Key values of a match, in key-field order.
    ///
    /// The host comes from the pattern's own `host` group when it has one,
    /// otherwise from the event.
    pub fn key_values(&self, caps: &Captures<'_>, host: Option<&str>) -> ResultKey {
        self.key_fields
            .iter()
            .map(|field| match caps.name(field) {
                Some(m) => Some(m.as_str().to_string()),
                None if field == HOST_FIELD && self.pattern_has_host() => None,
                None if field == HOST_FIELD => host.map(str::to_string),
                None => None,
            })
            .collect()
    }

    fn pattern_has_host(&self) -> bool {
        self.pattern.capture_names().flatten().any(|n| n == HOST_FIELD)
    }

    /// Whether a match must be voided because a filter key did not capture.
    pub fn rejects(&self, caps: &Captures<'_>) -> bool {
        self.filter_keys
            .as_ref()
            .is_some_and(|keys| keys.iter().any(|k| caps.name(k).is_none()))
    }

    pub fn add_result(&mut self, key: ResultKey) {
        self.results.add(key);
    }

    /// Add `k` to the count of the last recorded key.
    pub fn increase_last(&mut self, k: u64) {
        self.results.increase_last(k);
    }
}

// =============================================================================
// Pattern preprocessing
// =============================================================================

/// Substitute `${name}` macros from the shared field table. Unknown macros
/// are left verbatim.
pub fn substitute_macros(pattern: &str, fields: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut rest = pattern;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => match fields.get(&after[..end]) {
                Some(value) => {
                    out.push_str(value);
                    rest = &after[end + 1..];
                }
                None => {
                    out.push_str(&rest[start..start + 2 + end + 1]);
                    rest = &after[end + 1..];
                }
            },
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn named_group_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\(\?P?<([A-Za-z_][A-Za-z0-9_]*)>").expect("named_group_regex: invalid regex")
    })
}

/// Index of the parenthesis closing a group whose body starts at `start`.
fn group_end(pattern: &str, start: usize) -> Option<usize> {
    let bytes = pattern.as_bytes();
    let mut depth = 1usize;
    let mut in_class = false;
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'[' if !in_class => in_class = true,
            b']' if in_class => in_class = false,
            b'(' if !in_class => depth += 1,
            b')' if !in_class => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Replace the body of every named group whose name is a key of `group`
/// with that key's pattern.
///
/// Returns the rewritten pattern and the substituted keys in pattern order.
pub fn substitute_filter_group(pattern: &str, group: &[(String, String)]) -> (String, Vec<String>) {
    let mut out = String::with_capacity(pattern.len());
    let mut keys: Vec<String> = Vec::new();
    let mut cursor = 0;

    for caps in named_group_regex().captures_iter(pattern) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if whole.start() < cursor {
            continue;
        }
        if whole.start() > 0 && pattern.as_bytes()[whole.start() - 1] == b'\\' {
            continue;
        }
        let Some((key, value)) = group.iter().find(|(k, _)| k == name.as_str()) else {
            continue;
        };
        let Some(end) = group_end(pattern, whole.end()) else {
            continue;
        };
        out.push_str(&pattern[cursor..whole.end()]);
        out.push_str(value);
        out.push(')');
        cursor = end + 1;
        if !keys.contains(key) {
            keys.push(key.clone());
        }
    }
    out.push_str(&pattern[cursor..]);
    (out, keys)
}
