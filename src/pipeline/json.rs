//! Pull a JSON object out of free-form model output.
//!
//! Models asked for "JSON only" still wrap the object in commentary or code
//! fences. The extractor takes the widest span from the first `{` to the last
//! `}` and tries to parse it.
//!
//! ## Caveat
//!
//! The span is greedy. A reply holding two separate objects, or a stray brace
//! in the surrounding prose, produces a span that is not valid JSON, and the
//! result is [`StructuredRecord::NotFound`] even though a valid object is
//! present. Callers see the span policy in their output, so it stays as is.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

/// Message reported when no object could be parsed.
pub const NO_JSON_MESSAGE: &str = "No JSON found in the text.";

// `(?s)` lets `.` cross newlines; `.*` is greedy, so the match runs to the
// last closing brace.
static BRACE_SPAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

/// Outcome of [`extract_json`]. Not finding JSON is a normal result.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredRecord {
    Found(Value),
    NotFound,
}

impl StructuredRecord {
    pub fn is_found(&self) -> bool {
        matches!(self, StructuredRecord::Found(_))
    }

    /// The parsed value, if any.
    pub fn into_value(self) -> Option<Value> {
        match self {
            StructuredRecord::Found(v) => Some(v),
            StructuredRecord::NotFound => None,
        }
    }

    /// [`NO_JSON_MESSAGE`] when nothing was found.
    pub fn message(&self) -> Option<&'static str> {
        match self {
            StructuredRecord::Found(_) => None,
            StructuredRecord::NotFound => Some(NO_JSON_MESSAGE),
        }
    }
}

/// Locate and parse the brace-delimited span of `text`.
pub fn extract_json(text: &str) -> StructuredRecord {
    let Some(span) = BRACE_SPAN.find(text) else {
        debug!("No brace span in {} chars of text", text.len());
        return StructuredRecord::NotFound;
    };

    match serde_json::from_str::<Value>(span.as_str()) {
        Ok(value) => StructuredRecord::Found(value),
        Err(e) => {
            debug!("Brace span is not valid JSON: {}", e);
            StructuredRecord::NotFound
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_inside_noise() {
        let out = extract_json(r#"noise {"a":1} noise"#);
        assert_eq!(out, StructuredRecord::Found(json!({"a": 1})));
        assert_eq!(out.message(), None);
    }

    #[test]
    fn no_braces_is_not_found() {
        let out = extract_json("plain words only");
        assert_eq!(out, StructuredRecord::NotFound);
        assert_eq!(out.message(), Some("No JSON found in the text."));
    }

    #[test]
    fn two_groups_take_the_widest_span_and_fail() {
        // Span is `{1} junk {2}`, which does not parse.
        assert_eq!(extract_json("{1} junk {2}"), StructuredRecord::NotFound);
    }

    #[test]
    fn multiline_fenced_reply() {
        let reply = "Here you go:\n```json\n{\n  \"vendor\": \"Acme\",\n  \"total\": 12.5\n}\n```\nLet me know!";
        let value = extract_json(reply).into_value().unwrap();
        assert_eq!(value["vendor"], "Acme");
        assert_eq!(value["total"], 12.5);
    }

    #[test]
    fn nested_objects_survive_greedy_match() {
        let out = extract_json(r#"x {"a":{"b":[1,2]}} y"#);
        assert_eq!(out, StructuredRecord::Found(json!({"a": {"b": [1, 2]}})));
    }
}
