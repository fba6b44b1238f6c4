use docqa_core::Hit;
use serde_json::{Map, Value};

/// Text returned when a search has no hits.
pub const NO_RESULTS: &str = "No results found.";

/// Search hits in both shapes the host can use: a flat text payload and the
/// untouched structured list.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedResults {
    pub text: String,
    pub hits: Vec<Hit>,
}

/// Flatten `hits` into text while keeping them, in order, alongside.
///
/// Each document becomes `key: value` lines (null fields skipped) and
/// documents are separated by a blank line.
pub fn normalize_hits(hits: Vec<Hit>) -> NormalizedResults {
    if hits.is_empty() {
        return NormalizedResults {
            text: NO_RESULTS.to_string(),
            hits,
        };
    }
    let text = hits
        .iter()
        .map(|hit| render_document(&hit.document))
        .collect::<Vec<_>>()
        .join("\n\n");
    NormalizedResults { text, hits }
}

pub fn render_document(document: &Map<String, Value>) -> String {
    document
        .iter()
        .filter_map(|(key, value)| render_value(value).map(|v| format!("{key}: {v}")))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(_) | Value::Number(_) => Some(value.to_string()),
        // Arrays read as comma separated lists, nulls become empty slots.
        Value::Array(items) => Some(
            items
                .iter()
                .map(|item| render_value(item).unwrap_or_default())
                .collect::<Vec<_>>()
                .join(","),
        ),
        Value::Object(_) => Some(value.to_string()),
    }
}
