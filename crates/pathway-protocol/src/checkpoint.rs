//! Checkpoint types.
//!
//! Checkpoints are owned by an external store and referenced by sessions via
//! their thread id. This crate only describes the slices the engine reads.

use crate::ids::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Named state slots of a checkpoint. Only `messages` is consumed here.
pub type ChannelValues = serde_json::Map<String, serde_json::Value>;

/// What produced a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointSource {
    Input,
    Loop,
    Update,
    Fork,
}

/// Summary of the latest checkpoint of a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointMetadata {
    pub checkpoint_id: CheckpointId,
    pub thread_id: ThreadId,
    pub step: i64,
    pub source: CheckpointSource,
    /// Nodes scheduled to run when the thread resumes. Empty once the graph
    /// has reached its end.
    #[serde(default)]
    pub next: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl CheckpointMetadata {
    /// Paused at an interruptible point: work remains and nothing failed.
    pub fn is_resumable(&self) -> bool {
        !self.next.is_empty() && self.error.is_none()
    }
}

/// A full checkpoint document: metadata plus channel values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointSnapshot {
    pub metadata: CheckpointMetadata,
    #[serde(default)]
    pub channel_values: ChannelValues,
}
