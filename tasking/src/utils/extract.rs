//! Extraction of `<label>…</label>` blocks from model output.
//!
//! LLMs emit control flags and payloads wrapped in pseudo-XML labels, often
//! with the closing tag missing or mangled (stop words cut generation right
//! at `</…>`). [`fix_incomplete_labels`] repairs the tag structure with a
//! stack pass; [`extract_by_label`] then pulls the first matching block.

use once_cell::sync::Lazy;
use regex::Regex;

static TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<(/?)([a-zA-Z][a-zA-Z0-9_-]*)(?:\s[^>]*)?>")
        .unwrap_or_else(|_| unreachable!("valid literal regex"))
});

static EMPTY_PAIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<([a-zA-Z][a-zA-Z0-9_-]*)(?:\s[^>]*)?>\s*</([a-zA-Z][a-zA-Z0-9_-]*)>")
        .unwrap_or_else(|_| unreachable!("valid literal regex"))
});

static BLANK_LINES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n\s*\n").unwrap_or_else(|_| unreachable!("valid literal regex")));

/// Extracts the content of the first label that matches, trying labels in
/// order. Label content is newline-delimited (`<label>\n…\n</label>`) and
/// captured greedily, so a repeated label spans from the first opener to the
/// last closer. Tolerates a missing closing tag. Returns an empty string
/// when no label matches.
pub fn extract_by_label(content: &str, labels: &[&str]) -> String {
    let content = fix_incomplete_labels(content);

    for label in labels {
        let closed = Regex::new(&format!(r"(?s)<{label}>\s*\n(.*)\n\s*</{label}>"));
        if let Ok(re) = closed {
            if let Some(caps) = re.captures(&content) {
                if let Some(m) = caps.get(1) {
                    return m.as_str().to_string();
                }
            }
        }
        let open_only = Regex::new(&format!(r"(?s)<{label}>\s*\n(.*)\n\s*"));
        if let Ok(re) = open_only {
            if let Some(caps) = re.captures(&content) {
                if let Some(m) = caps.get(1) {
                    return m.as_str().to_string();
                }
            }
        }
    }

    String::new()
}

struct ParsedTag {
    name: String,
    start: usize,
    end: usize,
    is_closing: bool,
}

fn parse_tags(text: &str) -> Vec<ParsedTag> {
    TAG.captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(ParsedTag {
                name: caps.get(2)?.as_str().to_string(),
                start: whole.start(),
                end: whole.end(),
                is_closing: caps.get(1).map(|m| m.as_str() == "/").unwrap_or(false),
            })
        })
        .collect()
}

/// Repairs unbalanced labels: drops closing tags with no matching opener,
/// appends closers for dangling openers, removes empty pairs, and collapses
/// blank lines.
pub fn fix_incomplete_labels(content: &str) -> String {
    let mut fixed = balance_with_stack(content);
    fixed = EMPTY_PAIR
        .replace_all(&fixed, |caps: &regex::Captures<'_>| {
            if caps[1] == caps[2] {
                String::new()
            } else {
                caps[0].to_string()
            }
        })
        .into_owned();
    fixed = BLANK_LINES.replace_all(&fixed, "\n").into_owned();
    fixed.trim().to_string()
}

/// Stack pass: matched pairs pop, surplus closers are cut out, and dangling
/// openers get a closing tag appended in reverse order.
fn balance_with_stack(text: &str) -> String {
    let tags = parse_tags(text);
    let mut stack: Vec<&ParsedTag> = Vec::new();
    // Byte ranges of surplus closing tags to drop.
    let mut drop_ranges: Vec<(usize, usize)> = Vec::new();

    for tag in &tags {
        if tag.is_closing {
            if stack.last().map(|t| t.name == tag.name).unwrap_or(false) {
                stack.pop();
            } else {
                drop_ranges.push((tag.start, tag.end));
            }
        } else {
            stack.push(tag);
        }
    }

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for (start, end) in drop_ranges {
        out.push_str(&text[cursor..start]);
        cursor = end;
    }
    out.push_str(&text[cursor..]);

    for tag in stack.iter().rev() {
        out.push_str(&format!("</{}>", tag.name));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: a well-formed label extracts its inner content.
    #[test]
    fn extracts_closed_label() {
        let content = "prefix\n<finish>\nTRUE\n</finish>\nsuffix";
        assert_eq!(extract_by_label(content, &["finish"]), "TRUE");
    }

    /// **Scenario**: labels are tried in order; the first match wins.
    #[test]
    fn tries_labels_in_order() {
        let content = "<finish_flag>\nFALSE\n</finish_flag>";
        assert_eq!(
            extract_by_label(content, &["finish", "finish_flag"]),
            "FALSE"
        );
    }

    /// **Scenario**: a label cut off before its closing tag (stop word hit)
    /// still extracts once the repair pass closes it.
    #[test]
    fn extracts_label_missing_closer() {
        let content = "<finish>\nTRUE\n";
        assert_eq!(extract_by_label(content, &["finish"]), "TRUE");
    }

    /// **Scenario**: a repeated label is captured greedily, spanning from the
    /// first opener to the last closer.
    #[test]
    fn repeated_label_spans_to_last_closer() {
        let content = "<finish>\nTRUE\n</finish>\n<finish>\nFALSE\n</finish>";
        let out = extract_by_label(content, &["finish"]);
        assert!(out.starts_with("TRUE"), "{}", out);
        assert!(out.ends_with("FALSE"), "{}", out);
    }

    /// **Scenario**: no matching label yields an empty string.
    #[test]
    fn missing_label_yields_empty() {
        assert_eq!(extract_by_label("no labels here", &["finish"]), "");
    }

    /// **Scenario**: a surplus closing tag is dropped by the repair pass.
    #[test]
    fn repair_drops_surplus_closer() {
        let fixed = fix_incomplete_labels("a</stray>b<keep>\nc\n</keep>");
        assert!(!fixed.contains("</stray>"), "{}", fixed);
        assert!(fixed.contains("<keep>"), "{}", fixed);
    }

    /// **Scenario**: a dangling opener gets its closing tag appended.
    #[test]
    fn repair_closes_dangling_opener() {
        let fixed = fix_incomplete_labels("<output>\npayload");
        assert!(fixed.ends_with("</output>"), "{}", fixed);
    }

    /// **Scenario**: empty tag pairs are removed.
    #[test]
    fn repair_removes_empty_pairs() {
        let fixed = fix_incomplete_labels("x<empty></empty>y");
        assert_eq!(fixed, "xy");
    }
}
