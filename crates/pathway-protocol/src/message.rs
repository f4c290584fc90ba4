//! Graph message kinds and the UI-facing message shape.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of a raw graph message, decoded from its provider tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Human,
    Ai,
    Tool,
    Unknown,
}

impl MessageKind {
    /// Accepts both the flat `type` tag (`human`, `ai`, `tool`) and the
    /// constructor class name (`HumanMessage`, `AIMessageChunk`, ...).
    pub fn from_tag(tag: &str) -> Self {
        let tag = tag.trim();
        let tag = tag.strip_suffix("Chunk").unwrap_or(tag);
        match tag.to_ascii_lowercase().as_str() {
            "human" | "humanmessage" | "user" => Self::Human,
            "ai" | "aimessage" | "assistant" => Self::Ai,
            "tool" | "toolmessage" => Self::Tool,
            _ => Self::Unknown,
        }
    }

    /// Unknown kinds render as tool output.
    pub fn role(self) -> MessageRole {
        match self {
            Self::Human => MessageRole::User,
            Self::Ai => MessageRole::Assistant,
            Self::Tool | Self::Unknown => MessageRole::Tool,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiMessagePart {
    Text { text: String },
}

/// A message as consumed by the chat UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiMessage {
    pub id: String,
    pub role: MessageRole,
    pub parts: Vec<UiMessagePart>,
    #[serde(default)]
    pub metadata: IndexMap<String, Value>,
}

impl UiMessage {
    /// Text of the first text part, if any.
    pub fn text(&self) -> Option<&str> {
        self.parts.iter().find_map(|part| match part {
            UiMessagePart::Text { text } => Some(text.as_str()),
        })
    }
}
