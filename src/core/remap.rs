// LogTally - core/remap.rs
//
// Contract of the anonymisation/remap collaborator. The rule engine asks it
// for remapped key values and a rebuilt message; the pipeline asks it to
// rewrite the output line. No implementation ships with the crate.

use crate::core::aggregate::ResultKey;
use crate::core::model::RemapSpec;
use regex::Captures;

pub trait Remapper {
    /// Remapped values of a rule match, in `key_fields` order.
    fn match_to_values(&mut self, caps: &Captures<'_>, key_fields: &[String]) -> ResultKey;

    /// Remap a single value of the given kind (`"host"`, `"user"`, ...).
    fn map_value(&mut self, value: Option<&str>, kind: &str) -> Option<String>;

    /// Rebuild `message` with every captured group replaced by its
    /// remapped value.
    fn match_to_string(
        &mut self,
        caps: &Captures<'_>,
        message: &str,
        key_fields: &[String],
        values: &ResultKey,
    ) -> String;

    /// Rewrite a raw line decoded by a line format, substituting the spans
    /// of its `host` and `message` groups.
    fn remap_line_text(&mut self, line_caps: &Captures<'_>, line: &str, spec: &RemapSpec) -> String {
        let mut spans: Vec<(usize, usize, &str)> = Vec::new();
        if let (Some(m), Some(host)) = (line_caps.name("host"), spec.host.as_deref()) {
            spans.push((m.start(), m.end(), host));
        }
        if let Some(m) = line_caps.name("message") {
            spans.push((m.start(), m.end(), spec.message.as_str()));
        }
        spans.sort_by_key(|s| s.0);

        let mut out = String::with_capacity(line.len());
        let mut cursor = 0;
        for (start, end, text) in spans {
            if start < cursor {
                continue;
            }
            out.push_str(&line[cursor..start]);
            out.push_str(text);
            cursor = end;
        }
        out.push_str(&line[cursor..]);
        out
    }
}
