// LogTally - core/aggregate.rs
//
// Per-rule result table and the aggregation queries run over it at report
// time: conditional totals, top-N rankings, and grouped tabular listings.
// Core layer: pure logic, no I/O.

use crate::util::error::AggregateError;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// One result key: values in key-field order, host first.
pub type ResultKey = Vec<Option<String>>;

// =============================================================================
// Selector (typed condition expression)
// =============================================================================

/// Comparison operator of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionOp {
    /// `field=="literal"`: the literal regex is found in the value.
    Eq,
    /// `field!="literal"`: the literal regex is not found in the value.
    Ne,
}

/// `field=="regex"` / `field!="regex"`, parsed once.
#[derive(Debug, Clone)]
pub struct Condition {
    pub field: String,
    pub op: ConditionOp,
    pub literal: Regex,
}

impl Condition {
    /// Whether `value` satisfies the condition. Absent values never do.
    pub fn accepts(&self, value: Option<&str>) -> bool {
        let Some(value) = value else {
            return false;
        };
        let found = self.literal.is_match(value);
        match self.op {
            ConditionOp::Eq => found,
            ConditionOp::Ne => !found,
        }
    }
}

/// Selects the result keys an aggregation runs over.
#[derive(Debug, Clone)]
pub enum Selector {
    /// `*`: every key.
    All,
    Where(Condition),
}

fn condition_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^\s*(\w+)\s*(==|!=)\s*"([^"]*)"\s*$"#).expect("condition grammar: invalid regex")
    })
}

impl Selector {
    /// Parse `*` or `field=="literal"` / `field!="literal"`.
    pub fn parse(text: &str) -> Result<Self, AggregateError> {
        if text.trim() == "*" {
            return Ok(Self::All);
        }
        let caps = condition_regex()
            .captures(text)
            .ok_or_else(|| AggregateError::InvalidCondition {
                text: text.to_string(),
            })?;
        let literal = &caps[3];
        let literal = Regex::new(literal).map_err(|e| AggregateError::InvalidRegex {
            pattern: literal.to_string(),
            source: e,
        })?;
        Ok(Self::Where(Condition {
            field: caps[1].to_string(),
            op: if &caps[2] == "==" {
                ConditionOp::Eq
            } else {
                ConditionOp::Ne
            },
            literal,
        }))
    }

    /// Name of the field the condition tests, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::All => None,
            Self::Where(c) => Some(&c.field),
        }
    }
}

// =============================================================================
// Query results
// =============================================================================

/// One rank of a top-N listing. Tied group values share a rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopEntry {
    pub total: i64,
    pub values: Vec<String>,
}

/// Count of one trailing value tuple inside a table row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCount {
    pub values: Vec<Option<String>>,
    pub count: u64,
}

/// Column specification entry of a table listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableField {
    /// Fixed label repeated on every row.
    Label(String),
    /// Key field projected from the result key.
    Field(String),
}

/// One cell of a table row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TableCell {
    Text(String),
    Value(Option<String>),
    Counts(Vec<TableCount>),
}

// =============================================================================
// Result table
// =============================================================================

/// Accumulated counts of one rule, keyed by its key-field values.
///
/// Append-only for the whole run: counts only grow and keys are never
/// removed.
#[derive(Debug, Clone)]
pub struct ResultTable {
    rule: String,
    key_fields: Vec<String>,
    counts: BTreeMap<ResultKey, u64>,
    last_key: Option<ResultKey>,
}

impl ResultTable {
    pub fn new(rule: &str, key_fields: Vec<String>) -> Self {
        Self {
            rule: rule.to_string(),
            key_fields,
            counts: BTreeMap::new(),
            last_key: None,
        }
    }

    pub fn key_fields(&self) -> &[String] {
        &self.key_fields
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn get(&self, key: &[Option<String>]) -> Option<u64> {
        self.counts.get(key).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ResultKey, &u64)> {
        self.counts.iter()
    }

    /// Count one occurrence of `key` and remember it as the last key.
    pub fn add(&mut self, key: ResultKey) {
        debug_assert_eq!(key.len(), self.key_fields.len());
        let count = self.counts.entry(key.clone()).or_insert(0);
        *count = count.saturating_add(1);
        self.last_key = Some(key);
    }

    /// Add `k` to the count of the last key added, if any.
    pub fn increase_last(&mut self, k: u64) {
        if let Some(key) = &self.last_key {
            if let Some(count) = self.counts.get_mut(key) {
                *count = count.saturating_add(k);
            }
        }
    }

    fn index_of(&self, field: &str) -> Result<usize, AggregateError> {
        self.key_fields
            .iter()
            .position(|f| f == field)
            .ok_or_else(|| AggregateError::UnknownField {
                rule: self.rule.clone(),
                field: field.to_string(),
            })
    }

    fn resolve<'a>(&self, selector: &'a Selector) -> Result<Option<(usize, &'a Condition)>, AggregateError> {
        match selector {
            Selector::All => Ok(None),
            Selector::Where(c) => Ok(Some((self.index_of(&c.field)?, c))),
        }
    }

    fn int_value(key: &ResultKey, idx: usize, field: &str) -> Result<i64, AggregateError> {
        let raw = key[idx].as_deref();
        raw.and_then(|v| v.trim().parse::<i64>().ok())
            .ok_or_else(|| AggregateError::NotAnInteger {
                field: field.to_string(),
                value: raw.unwrap_or("").to_string(),
            })
    }

    fn overflow(&self) -> AggregateError {
        AggregateError::Overflow {
            rule: self.rule.clone(),
        }
    }

    /// Weight of one key: its count, or count times the integer value field.
    fn weight(
        &self,
        key: &ResultKey,
        count: u64,
        value: Option<(usize, &str)>,
    ) -> Result<i64, AggregateError> {
        let count = i64::try_from(count).map_err(|_| self.overflow())?;
        match value {
            None => Ok(count),
            Some((idx, field)) => count
                .checked_mul(Self::int_value(key, idx, field)?)
                .ok_or_else(|| self.overflow()),
        }
    }

    /// Sum of counts (or count × value field) over the selected keys.
    pub fn total(
        &self,
        selector: &Selector,
        value_field: Option<&str>,
    ) -> Result<i64, AggregateError> {
        let cond = self.resolve(selector)?;
        let value = match value_field {
            Some(f) => Some((self.index_of(f)?, f)),
            None => None,
        };

        let mut total = 0i64;
        for (key, &count) in &self.counts {
            if let Some((idx, c)) = cond {
                if !c.accepts(key[idx].as_deref()) {
                    continue;
                }
            }
            total = total
                .checked_add(self.weight(key, count, value)?)
                .ok_or_else(|| self.overflow())?;
        }
        Ok(total)
    }

    /// Rank the distinct values of `group_field`.
    ///
    /// With a value field and `use_max`, each key is ranked by its integer
    /// value directly. Otherwise groups are ranked by their accumulated
    /// weight and exact ties share one rank. Keys without a group value are
    /// never ranked.
    pub fn top_n(
        &self,
        n: usize,
        value_field: Option<&str>,
        use_max: bool,
        group_field: &str,
    ) -> Result<Vec<TopEntry>, AggregateError> {
        if self.counts.is_empty() || n == 0 {
            return Ok(Vec::new());
        }
        let pos = self.index_of(group_field)?;
        let value = match value_field {
            Some(f) => Some((self.index_of(f)?, f)),
            None => None,
        };

        if let (Some((idx, field)), true) = (value, use_max) {
            let mut ranked = self
                .counts
                .keys()
                .filter_map(|key| key[pos].as_ref().map(|group| (key, group)))
                .map(|(key, group)| Ok((Self::int_value(key, idx, field)?, group.clone())))
                .collect::<Result<Vec<_>, AggregateError>>()?;
            ranked.sort_by(|a, b| b.cmp(a));
            return Ok(ranked
                .into_iter()
                .take(n)
                .map(|(total, group)| TopEntry {
                    total,
                    values: vec![group],
                })
                .collect());
        }

        let mut keys: Vec<(&ResultKey, &u64)> = self.counts.iter().collect();
        keys.sort_by(|a, b| a.0[pos].cmp(&b.0[pos]));

        // Accumulate per group; keys with no group value are not ranked.
        let mut groups: Vec<(String, i64)> = Vec::new();
        for (key, &count) in keys {
            let Some(group) = key[pos].as_deref() else {
                continue;
            };
            let weight = self.weight(key, count, value)?;
            if let Some((last, total)) = groups.last_mut() {
                if last.as_str() == group {
                    *total = total.checked_add(weight).ok_or_else(|| self.overflow())?;
                    continue;
                }
            }
            groups.push((group.to_string(), weight));
        }

        let mut top: Vec<TopEntry> = Vec::with_capacity(n + 1);
        for (group, total) in groups {
            for j in 0..n {
                if j == top.len() {
                    top.push(TopEntry {
                        total,
                        values: vec![group],
                    });
                    break;
                }
                if top[j].total == total {
                    top[j].values.push(group);
                    break;
                }
                if total > top[j].total {
                    top.insert(
                        j,
                        TopEntry {
                            total,
                            values: vec![group],
                        },
                    );
                    break;
                }
            }
            top.truncate(n);
        }
        Ok(top)
    }

    /// Tabular breakdown of the selected keys.
    ///
    /// Projected fields (non-labels) split into a grouping prefix and the
    /// trailing value fields. Rows come out in ascending order of the
    /// grouping prefix; keys sharing a prefix merge into one row whose value
    /// cell maps each trailing value tuple to its summed count. Keys whose
    /// condition field is absent are skipped.
    pub fn list_events(
        &self,
        selector: &Selector,
        cols: usize,
        fields: &[TableField],
    ) -> Result<Vec<Vec<TableCell>>, AggregateError> {
        if self.counts.is_empty() {
            return Ok(Vec::new());
        }
        let cond = self.resolve(selector)?;
        let pos = fields
            .iter()
            .filter_map(|f| match f {
                TableField::Field(name) => Some(self.index_of(name)),
                TableField::Label(_) => None,
            })
            .collect::<Result<Vec<usize>, AggregateError>>()?;
        if pos.is_empty() {
            return Ok(Vec::new());
        }
        let trailing = fields.len().saturating_sub(cols);
        let keylen = pos.len().saturating_sub(trailing + 1);

        let mut selected: Vec<(ResultKey, ResultKey, u64)> = Vec::new();
        for (key, &count) in &self.counts {
            if let Some((idx, c)) = cond {
                if !c.accepts(key[idx].as_deref()) {
                    continue;
                }
            }
            let tabkey: ResultKey = pos[..keylen].iter().map(|&i| key[i].clone()).collect();
            let value: ResultKey = pos[keylen..].iter().map(|&i| key[i].clone()).collect();
            selected.push((tabkey, value, count));
        }
        selected.sort_by(|a, b| a.0.cmp(&b.0));

        let mut rows = Vec::new();
        let mut current: Option<(ResultKey, BTreeMap<ResultKey, u64>)> = None;
        for (tabkey, value, count) in selected {
            if let Some((key, values)) = current.as_mut() {
                if *key == tabkey {
                    let sum = values.entry(value).or_insert(0);
                    *sum = sum.saturating_add(count);
                    continue;
                }
            }
            if let Some((key, values)) = current.take() {
                rows.push(Self::build_row(cols, fields, keylen, key, values));
            }
            current = Some((tabkey, BTreeMap::from([(value, count)])));
        }
        if let Some((key, values)) = current {
            rows.push(Self::build_row(cols, fields, keylen, key, values));
        }
        Ok(rows)
    }

    fn build_row(
        cols: usize,
        fields: &[TableField],
        keylen: usize,
        tabkey: ResultKey,
        values: BTreeMap<ResultKey, u64>,
    ) -> Vec<TableCell> {
        let mut counts = Some(
            values
                .into_iter()
                .map(|(values, count)| TableCount { values, count })
                .collect::<Vec<_>>(),
        );
        let mut tabkey = tabkey.into_iter();
        let mut j = 0;
        fields
            .iter()
            .take(cols)
            .map(|field| match field {
                TableField::Label(label) => TableCell::Text(label.clone()),
                TableField::Field(_) => {
                    let cell = if j < keylen {
                        TableCell::Value(tabkey.next().flatten())
                    } else {
                        counts
                            .take()
                            .map(TableCell::Counts)
                            .unwrap_or(TableCell::Value(None))
                    };
                    j += 1;
                    cell
                }
            })
            .collect()
    }
}
