//! # pathway-protocol: Research session engine contract
//!
//! Shared types, error taxonomy, and collaborator ports used by every crate
//! in the workspace. It carries no runtime dependencies (no tokio, no axum)
//! so that store and provider implementations can depend on it alone.
//!
//! ## Module Overview
//!
//! - [`ids`]: Typed ID wrappers (SessionId, ThreadId, ChatId, UserId, CheckpointId)
//! - [`session`]: Session record and its status lifecycle
//! - [`checkpoint`]: Checkpoint metadata, channel values, resumability
//! - [`message`]: Raw graph messages and UI-facing messages
//! - [`model`]: Model configuration, prompts, and invocation outputs
//! - [`ports`]: Collaborator ports (session store, checkpoint store, chat models)
//! - [`error`]: ResearchError, ResearchResult

pub mod checkpoint;
pub mod error;
pub mod ids;
pub mod message;
pub mod model;
pub mod ports;
pub mod session;

pub use checkpoint::{ChannelValues, CheckpointMetadata, CheckpointSource, CheckpointSnapshot};
pub use error::{ResearchError, ResearchResult};
pub use ids::{ChatId, CheckpointId, SessionId, ThreadId, UserId};
pub use message::{MessageKind, MessageRole, UiMessage, UiMessagePart};
pub use model::{
    MAX_EXTRA_KEYS, ModelChunk, ModelConfig, ModelOutput, Prompt, PromptMessage, RunConfig,
};
pub use ports::{
    ChatModel, CheckpointStore, ModelChunkStream, ModelClientFactory, SessionQuery, SessionStore,
};
pub use session::{Session, SessionStatus};
