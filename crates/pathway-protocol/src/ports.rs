//! Collaborator ports.
//!
//! These traits are the only boundary between the engine and external
//! implementations (session persistence, checkpoint stores, model providers).
//!
//! Object-safety note:
//! - Traits use `async-trait` for async dyn-dispatch.
//! - Streaming uses boxed trait objects (`ModelChunkStream`).

use crate::checkpoint::{ChannelValues, CheckpointMetadata};
use crate::error::ResearchResult;
use crate::ids::{ChatId, ThreadId, UserId};
use crate::model::{ModelChunk, ModelConfig, ModelOutput, PromptMessage};
use crate::session::{Session, SessionStatus};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::sync::Arc;

pub type ModelChunkStream = BoxStream<'static, ResearchResult<ModelChunk>>;

/// Filters for listing a user's sessions.
#[derive(Debug, Clone, Default)]
pub struct SessionQuery {
    pub status: Option<SessionStatus>,
    pub chat_id: Option<ChatId>,
}

/// Persistence of session records.
///
/// Implementations must enforce uniqueness of `(user_id, chat_id)`: `insert`
/// fails with `ResearchError::SessionConflict` when a record already exists.
/// Any other failure is `ResearchError::StorageUnavailable`.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: &Session) -> ResearchResult<()>;

    /// Sessions owned by `user_id`, newest first.
    async fn query(
        &self,
        user_id: &UserId,
        filter: &SessionQuery,
        limit: usize,
        offset: usize,
    ) -> ResearchResult<Vec<Session>>;

    /// Direct lookup on the `(user_id, chat_id)` index.
    async fn find_by_chat_id(
        &self,
        user_id: &UserId,
        chat_id: &ChatId,
    ) -> ResearchResult<Option<Session>> {
        let filter = SessionQuery {
            status: None,
            chat_id: Some(chat_id.clone()),
        };
        Ok(self.query(user_id, &filter, 1, 0).await?.into_iter().next())
    }

    /// Replaces an existing record, matched on `(user_id, chat_id)`, only
    /// when the stored revision is `session.revision - 1`. A newer stored
    /// revision fails with `ResearchError::StaleSession`.
    async fn update(&self, session: &Session) -> ResearchResult<()>;
}

/// Read access to persisted graph execution state.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn get_latest_checkpoint(
        &self,
        thread_id: &ThreadId,
    ) -> ResearchResult<Option<ChannelValues>>;

    async fn get_metadata(
        &self,
        thread_id: &ThreadId,
    ) -> ResearchResult<Option<CheckpointMetadata>>;
}

/// A constructed model client.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn invoke(
        &self,
        messages: Vec<PromptMessage>,
        config: &ModelConfig,
    ) -> ResearchResult<ModelOutput>;

    async fn stream(
        &self,
        messages: Vec<PromptMessage>,
        config: &ModelConfig,
    ) -> ResearchResult<ModelChunkStream>;
}

/// Builds provider clients for a `(model, api_key)` pair.
#[async_trait]
pub trait ModelClientFactory: Send + Sync {
    async fn build(
        &self,
        model: &str,
        api_key: &str,
        config: &ModelConfig,
    ) -> ResearchResult<Arc<dyn ChatModel>>;
}
