//! Model invocation configuration, prompts, and outputs.
//!
//! `ModelConfig` replaces an open key/value bag with named fields plus a
//! bounded passthrough map. Merging is a pure function: fields set on the
//! override win, unset fields fall back to the base.

use crate::error::{ResearchError, ResearchResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Upper bound on passthrough keys carried by a [`ModelConfig`].
pub const MAX_EXTRA_KEYS: usize = 32;

#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl ModelConfig {
    pub fn for_model(model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            ..Self::default()
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn insert_extra(&mut self, key: impl Into<String>, value: Value) -> ResearchResult<()> {
        let key = key.into();
        if !self.extra.contains_key(&key) && self.extra.len() >= MAX_EXTRA_KEYS {
            return Err(ResearchError::InvalidConfig(format!(
                "more than {MAX_EXTRA_KEYS} passthrough keys (rejected `{key}`)"
            )));
        }
        self.extra.insert(key, value);
        Ok(())
    }

    /// Rejects configurations that exceed the passthrough bound, e.g. ones
    /// deserialized from untrusted input.
    pub fn validate(&self) -> ResearchResult<()> {
        if self.extra.len() > MAX_EXTRA_KEYS {
            return Err(ResearchError::InvalidConfig(format!(
                "{} passthrough keys exceed the limit of {MAX_EXTRA_KEYS}",
                self.extra.len()
            )));
        }
        Ok(())
    }

    /// Returns `self` overridden by every field set on `overrides`.
    /// Passthrough keys merge key-wise; a merge that would carry more than
    /// [`MAX_EXTRA_KEYS`] of them is rejected.
    pub fn merged_with(&self, overrides: &ModelConfig) -> ResearchResult<ModelConfig> {
        overrides.validate()?;
        let mut extra = self.extra.clone();
        for (key, value) in &overrides.extra {
            extra.insert(key.clone(), value.clone());
        }

        let merged = ModelConfig {
            model: overrides.model.clone().or_else(|| self.model.clone()),
            api_key: overrides.api_key.clone().or_else(|| self.api_key.clone()),
            max_tokens: overrides.max_tokens.or(self.max_tokens),
            temperature: overrides.temperature.or(self.temperature),
            thread_id: overrides.thread_id.clone().or_else(|| self.thread_id.clone()),
            timeout_ms: overrides.timeout_ms.or(self.timeout_ms),
            extra,
        };
        merged.validate()?;
        Ok(merged)
    }
}

impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("thread_id", &self.thread_id)
            .field("timeout_ms", &self.timeout_ms)
            .field("extra_keys", &self.extra.len())
            .finish()
    }
}

/// Per-call runtime configuration; model options live in `configurable`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub configurable: ModelConfig,
}

impl RunConfig {
    pub fn new(configurable: ModelConfig) -> Self {
        Self { configurable }
    }

    pub fn for_thread(thread_id: impl Into<String>) -> Self {
        Self::new(ModelConfig::default().with_thread_id(thread_id))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: String,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_owned(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_owned(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_owned(),
            content: content.into(),
        }
    }
}

/// Either a bare prompt string or an explicit message list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prompt {
    Text(String),
    Messages(Vec<PromptMessage>),
}

impl Prompt {
    pub fn into_messages(self) -> Vec<PromptMessage> {
        match self {
            Self::Text(text) => vec![PromptMessage::user(text)],
            Self::Messages(messages) => messages,
        }
    }
}

impl From<&str> for Prompt {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for Prompt {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<PromptMessage>> for Prompt {
    fn from(messages: Vec<PromptMessage>) -> Self {
        Self::Messages(messages)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelOutput {
    pub provider: String,
    pub model: String,
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelChunk {
    pub delta: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
}
