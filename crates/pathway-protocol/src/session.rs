//! Session record and status lifecycle.

use crate::error::{ResearchError, ResearchResult};
use crate::ids::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a research session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Failed,
    Abandoned,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Abandoned => "abandoned",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "abandoned" => Some(Self::Abandoned),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }

    /// Active sessions may move to any status; terminal ones only to themselves.
    pub fn can_transition_to(self, next: Self) -> bool {
        self == next || !self.is_terminal()
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One research session per chat conversation.
///
/// `thread_id` is minted once in [`Session::new`] and is the only key used to
/// address checkpoint state. `revision` increases by one on every mutation;
/// stores use it to reject writes based on a stale read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub thread_id: ThreadId,
    pub status: SessionStatus,
    pub research_brief: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub revision: u64,
}

impl Session {
    pub fn new(chat_id: ChatId, user_id: UserId, research_brief: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new_uuid(),
            chat_id,
            user_id,
            thread_id: ThreadId::new_uuid(),
            status: SessionStatus::Active,
            research_brief,
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Fails when the record cannot address checkpoint state.
    pub fn ensure_addressable(&self) -> ResearchResult<&ThreadId> {
        if self.thread_id.is_empty() {
            return Err(ResearchError::CorruptSession {
                session_id: self.id.to_string(),
                reason: "missing thread id".to_owned(),
            });
        }
        Ok(&self.thread_id)
    }

    pub fn transition(&mut self, next: SessionStatus) -> ResearchResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(ResearchError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.touch();
        Ok(())
    }

    pub fn set_research_brief(&mut self, brief: impl Into<String>) {
        self.research_brief = Some(brief.into());
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.revision += 1;
    }
}
