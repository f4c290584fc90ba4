//! Graph message → UI message translation.
//!
//! The translator is total: malformed channel state yields an empty list so
//! a chat page renders with zero messages instead of failing. Within a
//! well-formed `messages` array the mapping is positional: one UI message per
//! raw message, in order, with content copied verbatim (empty strings
//! included).

use indexmap::IndexMap;
use pathway_protocol::{MessageKind, UiMessage, UiMessagePart};
use serde_json::{Map, Value, json};
use tracing::warn;

pub fn convert_graph_messages_to_ui_messages(input: Option<&Value>) -> Vec<UiMessage> {
    let Some(messages) = input
        .and_then(|state| state.get("messages"))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    messages
        .iter()
        .enumerate()
        .filter_map(|(index, raw)| convert_message(index, raw))
        .collect()
}

fn convert_message(index: usize, raw: &Value) -> Option<UiMessage> {
    let Some(object) = raw.as_object() else {
        warn!(index, "skipping graph message that is not an object");
        return None;
    };

    let (tag, fields) = decode_envelope(object);
    let kind = MessageKind::from_tag(tag);
    if kind == MessageKind::Unknown {
        warn!(index, tag, "unrecognised message kind, rendering as tool");
    }

    let id = fields
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or_else(|| format!("message-{index}"));

    Some(UiMessage {
        id,
        role: kind.role(),
        parts: vec![UiMessagePart::Text {
            text: content_text(fields.get("content")),
        }],
        metadata: assemble_metadata(kind, fields),
    })
}

/// Returns the kind tag and the field map for either serialized shape:
/// flat (`{"type": "ai", ...}`) or constructor
/// (`{"type": "constructor", "id": [.., "AIMessage"], "kwargs": {..}}`).
fn decode_envelope(object: &Map<String, Value>) -> (&str, &Map<String, Value>) {
    let tag = object.get("type").and_then(Value::as_str).unwrap_or("");
    if tag == "constructor"
        && let Some(kwargs) = object.get("kwargs").and_then(Value::as_object)
    {
        let class_name = object
            .get("id")
            .and_then(Value::as_array)
            .and_then(|path| path.last())
            .and_then(Value::as_str)
            .unwrap_or("");
        return (class_name, kwargs);
    }
    (tag, object)
}

fn content_text(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(blocks)) => blocks
            .iter()
            .filter_map(|block| match block {
                Value::String(text) => Some(text.as_str()),
                Value::Object(block) if block.get("type").and_then(Value::as_str) == Some("text") => {
                    block.get("text").and_then(Value::as_str)
                }
                _ => None,
            })
            .collect(),
        _ => String::new(),
    }
}

fn assemble_metadata(kind: MessageKind, fields: &Map<String, Value>) -> IndexMap<String, Value> {
    let mut metadata = IndexMap::new();

    if let Some(timestamp) = fields
        .get("additional_kwargs")
        .and_then(|kwargs| kwargs.get("timestamp"))
        .filter(|timestamp| !timestamp.is_null())
    {
        metadata.insert("timestamp".to_owned(), timestamp.clone());
    }

    let response_metadata = fields
        .get("response_metadata")
        .filter(|value| value.is_object())
        .cloned()
        .unwrap_or_else(|| json!({}));
    metadata.insert("response_metadata".to_owned(), response_metadata);

    if kind == MessageKind::Ai {
        for key in ["tool_calls", "invalid_tool_calls"] {
            let calls = fields
                .get(key)
                .filter(|value| value.is_array())
                .cloned()
                .unwrap_or_else(|| json!([]));
            metadata.insert(key.to_owned(), calls);
        }
    }

    metadata
}
