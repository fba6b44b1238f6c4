//! Request bodies as the service expects them on the wire.

use std::collections::BTreeMap;

use docqa_core::{InferenceMode, Message, Role, SearchMode, SearchOptions, SortBy, UserContext};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Terminates an answer event stream.
pub(crate) const DONE: &str = "[DONE]";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchBody<'a> {
    pub term: &'a str,
    pub mode: SearchMode,
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub filter: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sort_by: Vec<SortBy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facets: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub boost: BTreeMap<String, f64>,
}

impl<'a> SearchBody<'a> {
    pub fn new(term: &'a str, mode: SearchMode, options: SearchOptions) -> Self {
        Self {
            term,
            mode,
            filter: options.filter,
            sort_by: options.sort_by,
            facets: options.facets,
            limit: options.limit,
            offset: options.offset,
            boost: options.boost,
        }
    }
}

/// A prior turn as the answer endpoint sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct WireMessage {
    pub role: Role,
    pub content: String,
}

impl WireMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.text().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AnswerBody<'a> {
    pub conversation_id: Uuid,
    pub query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_context: Option<&'a UserContext>,
    pub inference_type: InferenceMode,
    pub messages: Vec<WireMessage>,
    pub stream: bool,
}

/// Decode one `data:` payload. Only JSON strings and objects are decoded;
/// any other payload, including bare numbers and `null`, is kept verbatim.
pub(crate) fn parse_chunk(data: &str) -> Value {
    match serde_json::from_str(data) {
        Ok(value @ (Value::String(_) | Value::Object(_))) => value,
        _ => Value::String(data.to_string()),
    }
}

/// Text a chunk contributes to the recorded answer, read the same way the
/// adapter reads it for the host.
pub(crate) fn chunk_text(chunk: &Value) -> Option<String> {
    match chunk {
        Value::String(s) => Some(s.clone()),
        Value::Bool(_) | Value::Number(_) => Some(chunk.to_string()),
        Value::Object(fields) => fields
            .get("text")
            .or_else(|| fields.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string),
        Value::Null | Value::Array(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_core::SortOrder;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn search_body_uses_service_field_names() {
        let mut filter = Map::new();
        filter.insert("inStock".into(), json!(true));
        let options = SearchOptions {
            filter: Some(filter),
            sort_by: vec![SortBy {
                property: "price".into(),
                order: Some(SortOrder::Desc),
            }],
            limit: Some(5),
            ..Default::default()
        };
        let body = serde_json::to_value(SearchBody::new("laptop", SearchMode::Hybrid, options))
            .unwrap();
        assert_eq!(
            body,
            json!({
                "term": "laptop",
                "mode": "hybrid",
                "where": {"inStock": true},
                "sortBy": [{"property": "price", "order": "desc"}],
                "limit": 5
            })
        );
    }

    #[test]
    fn non_json_payload_is_kept_as_text() {
        assert_eq!(parse_chunk("\"Hel\""), json!("Hel"));
        assert_eq!(parse_chunk("{\"text\":\"a\"}"), json!({"text": "a"}));
        assert_eq!(parse_chunk("plain words"), json!("plain words"));
    }

    #[test]
    fn json_scalars_are_kept_as_plain_text() {
        for token in [" 42", "null", "true", "[1]"] {
            assert_eq!(parse_chunk(token), json!(token));
            assert_eq!(chunk_text(&parse_chunk(token)).as_deref(), Some(token));
        }
        assert_eq!(parse_chunk(" \" world\""), json!(" world"));
    }

    #[test]
    fn chunk_text_reads_scalars_like_the_adapter() {
        assert_eq!(chunk_text(&json!(7)).as_deref(), Some("7"));
        assert_eq!(chunk_text(&json!(false)).as_deref(), Some("false"));
        assert_eq!(chunk_text(&json!({"message": "m"})).as_deref(), Some("m"));
        assert_eq!(chunk_text(&Value::Null), None);
    }
}
