use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use pathway_protocol::{
    ChannelValues, ChatId, CheckpointMetadata, CheckpointSnapshot, CheckpointStore, ResearchError,
    ResearchResult, Session, ThreadId, UserId,
};
use pathway_sessions::SessionManager;
use tracing::{debug, instrument, warn};

mod file_store;
pub mod translate;

pub use file_store::FileCheckpointStore;
pub use translate::convert_graph_messages_to_ui_messages;

/// Answers checkpoint questions about sessions.
///
/// Store failures surface as `ResearchError::CheckpointStore` and are never
/// folded into "no checkpoint".
#[derive(Clone)]
pub struct CheckpointAdapter {
    store: Arc<dyn CheckpointStore>,
    sessions: SessionManager,
}

impl CheckpointAdapter {
    pub fn new(store: Arc<dyn CheckpointStore>, sessions: SessionManager) -> Self {
        Self { store, sessions }
    }

    /// Only active sessions can resume; the store is not consulted otherwise.
    #[instrument(skip(self, session), fields(session_id = %session.id, status = %session.status))]
    pub async fn has_resumable_checkpoint(&self, session: &Session) -> ResearchResult<bool> {
        if !session.is_active() {
            return Ok(false);
        }
        let metadata = self.get_checkpoint_metadata(session).await?;
        let resumable = is_resumable(session, metadata.as_ref());
        debug!(resumable, "checkpoint resumability resolved");
        Ok(resumable)
    }

    /// Metadata and resumability from a single store read. Metadata is
    /// returned whatever the session status.
    #[instrument(skip(self, session), fields(session_id = %session.id, status = %session.status))]
    pub async fn resume_state(&self, session: &Session) -> ResearchResult<ResumeState> {
        let metadata = self.get_checkpoint_metadata(session).await?;
        let resumable = is_resumable(session, metadata.as_ref());
        debug!(resumable, found = metadata.is_some(), "resume state resolved");
        Ok(ResumeState {
            resumable,
            metadata,
        })
    }

    #[instrument(skip(self, session), fields(session_id = %session.id))]
    pub async fn get_checkpoint_metadata(
        &self,
        session: &Session,
    ) -> ResearchResult<Option<CheckpointMetadata>> {
        let thread_id = session.ensure_addressable()?;
        self.store
            .get_metadata(thread_id)
            .await
            .map_err(into_checkpoint_error)
    }

    /// chat → session → thread → latest channel values. Any missing link is
    /// `None`; a session without a thread id is logged and treated the same.
    #[instrument(skip(self), fields(user_id = %user_id, chat_id = %chat_id))]
    pub async fn get_graph_final_state(
        &self,
        chat_id: &ChatId,
        user_id: &UserId,
    ) -> ResearchResult<Option<ChannelValues>> {
        let Some(session) = self.sessions.find_by_chat_id(user_id, chat_id).await? else {
            debug!("no session for chat");
            return Ok(None);
        };
        let thread_id = match session.ensure_addressable() {
            Ok(thread_id) => thread_id,
            Err(error) => {
                warn!(%error, "session cannot address checkpoint state");
                return Ok(None);
            }
        };
        self.store
            .get_latest_checkpoint(thread_id)
            .await
            .map_err(into_checkpoint_error)
    }
}

/// Latest checkpoint metadata of a session and whether it can resume.
#[derive(Debug, Clone, PartialEq)]
pub struct ResumeState {
    pub resumable: bool,
    pub metadata: Option<CheckpointMetadata>,
}

fn is_resumable(session: &Session, metadata: Option<&CheckpointMetadata>) -> bool {
    session.is_active() && metadata.is_some_and(CheckpointMetadata::is_resumable)
}

fn into_checkpoint_error(error: ResearchError) -> ResearchError {
    match error {
        ResearchError::CheckpointStore(_) => error,
        other => ResearchError::CheckpointStore(other.to_string()),
    }
}

/// Process-local checkpoint store, keyed by thread id.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    snapshots: RwLock<HashMap<ThreadId, CheckpointSnapshot>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the latest checkpoint of the snapshot's thread.
    pub fn put(&self, snapshot: CheckpointSnapshot) {
        self.snapshots
            .write()
            .insert(snapshot.metadata.thread_id.clone(), snapshot);
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn get_latest_checkpoint(
        &self,
        thread_id: &ThreadId,
    ) -> ResearchResult<Option<ChannelValues>> {
        Ok(self
            .snapshots
            .read()
            .get(thread_id)
            .map(|snapshot| snapshot.channel_values.clone()))
    }

    async fn get_metadata(
        &self,
        thread_id: &ThreadId,
    ) -> ResearchResult<Option<CheckpointMetadata>> {
        Ok(self
            .snapshots
            .read()
            .get(thread_id)
            .map(|snapshot| snapshot.metadata.clone()))
    }
}
