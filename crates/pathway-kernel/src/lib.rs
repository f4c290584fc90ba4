use std::path::PathBuf;
use std::sync::Arc;

use pathway_checkpoint::{
    CheckpointAdapter, FileCheckpointStore, convert_graph_messages_to_ui_messages,
};
use pathway_protocol::{
    ChatId, CheckpointMetadata, CheckpointStore, ResearchResult, Session, SessionStatus,
    SessionStore, UiMessage, UserId,
};
use pathway_sessions::{FileSessionStore, SessionManager};
use serde_json::Value;
use tracing::{debug, instrument};

#[derive(Clone)]
pub struct KernelBuilder {
    session_store: Arc<dyn SessionStore>,
    checkpoint_store: Arc<dyn CheckpointStore>,
}

impl KernelBuilder {
    /// File-backed stores under `root` (`sessions/` and `checkpoints/`).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            session_store: Arc::new(FileSessionStore::new(root.clone())),
            checkpoint_store: Arc::new(FileCheckpointStore::new(root)),
        }
    }

    pub fn with_stores(
        session_store: Arc<dyn SessionStore>,
        checkpoint_store: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            session_store,
            checkpoint_store,
        }
    }

    pub fn build(self) -> ResearchKernel {
        let sessions = SessionManager::new(self.session_store);
        let checkpoints = CheckpointAdapter::new(self.checkpoint_store, sessions.clone());
        ResearchKernel {
            sessions,
            checkpoints,
        }
    }
}

/// Whether a chat can resume, and what it would resume from.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointStatus {
    pub has_checkpoint: bool,
    pub session: Option<Session>,
    pub checkpoint: Option<CheckpointMetadata>,
}

#[derive(Clone)]
pub struct ResearchKernel {
    sessions: SessionManager,
    checkpoints: CheckpointAdapter,
}

impl ResearchKernel {
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn checkpoints(&self) -> &CheckpointAdapter {
        &self.checkpoints
    }

    /// A chat without a session has no checkpoint. Otherwise the metadata is
    /// reported whatever the session status; only an active session with a
    /// resumable checkpoint counts as `has_checkpoint`.
    #[instrument(skip(self), fields(user_id = %user_id, chat_id = %chat_id))]
    pub async fn checkpoint_status(
        &self,
        user_id: &UserId,
        chat_id: &ChatId,
    ) -> ResearchResult<CheckpointStatus> {
        let Some(session) = self.sessions.find_by_chat_id(user_id, chat_id).await? else {
            debug!("no session for chat");
            return Ok(CheckpointStatus {
                has_checkpoint: false,
                session: None,
                checkpoint: None,
            });
        };

        let state = self.checkpoints.resume_state(&session).await?;
        debug!(
            session_id = %session.id,
            has_checkpoint = state.resumable,
            "checkpoint status resolved"
        );

        Ok(CheckpointStatus {
            has_checkpoint: state.resumable,
            session: Some(session),
            checkpoint: state.metadata,
        })
    }

    /// Transcript of the chat's latest graph state; empty when there is none.
    #[instrument(skip(self), fields(user_id = %user_id, chat_id = %chat_id))]
    pub async fn chat_messages(
        &self,
        user_id: &UserId,
        chat_id: &ChatId,
    ) -> ResearchResult<Vec<UiMessage>> {
        let state = self
            .checkpoints
            .get_graph_final_state(chat_id, user_id)
            .await?
            .map(Value::Object);
        Ok(convert_graph_messages_to_ui_messages(state.as_ref()))
    }

    pub async fn start_session(
        &self,
        user_id: UserId,
        chat_id: ChatId,
        research_brief: Option<String>,
    ) -> ResearchResult<Session> {
        self.sessions
            .create_session(chat_id, user_id, research_brief)
            .await
    }

    pub async fn list_sessions(
        &self,
        user_id: &UserId,
        status: Option<SessionStatus>,
        limit: usize,
        offset: usize,
    ) -> ResearchResult<Vec<Session>> {
        self.sessions
            .get_user_sessions(user_id, status, limit, offset)
            .await
    }
}
