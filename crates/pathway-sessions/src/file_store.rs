use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use pathway_protocol::{
    ChatId, ResearchError, ResearchResult, Session, SessionQuery, SessionStore, UserId,
};
use sha2::{Digest, Sha256};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

use crate::{matches_query, paginate_newest_first};

const LOCK_ATTEMPTS: usize = 400;
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(5);

/// One JSON document per session under
/// `<root>/sessions/<sha256(user)>/<sha256(chat)>.json`.
///
/// Inserts publish a fully written temp file with a hard link, which fails
/// if the target exists. The filesystem therefore enforces `(user, chat)`
/// uniqueness across processes, and readers never observe partial writes.
/// Updates hold `<file>.lock` while they compare revisions and replace the
/// document.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    root: PathBuf,
}

impl FileSessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn user_dir(&self, user_id: &UserId) -> PathBuf {
        self.root.join("sessions").join(digest(user_id.as_str()))
    }

    fn session_path(&self, user_id: &UserId, chat_id: &ChatId) -> PathBuf {
        self.user_dir(user_id)
            .join(format!("{}.json", digest(chat_id.as_str())))
    }

    async fn write_temp(dir: &Path, session: &Session) -> Result<PathBuf> {
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to create session dir {dir:?}"))?;

        let temp_path = dir.join(format!(".{}.tmp", uuid::Uuid::new_v4()));
        let payload = serde_json::to_vec_pretty(session).context("failed serializing session")?;
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("failed opening temp file {temp_path:?}"))?;
        file.write_all(&payload).await?;
        file.sync_all().await?;
        Ok(temp_path)
    }

    async fn read_session(path: &Path) -> Result<Option<Session>> {
        let raw = match fs::read(path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => {
                return Err(error).with_context(|| format!("failed reading session {path:?}"));
            }
        };
        let session = serde_json::from_slice(&raw)
            .with_context(|| format!("failed parsing session {path:?}"))?;
        Ok(Some(session))
    }

    async fn insert_inner(&self, session: &Session) -> Result<bool> {
        let dir = self.user_dir(&session.user_id);
        let target = self.session_path(&session.user_id, &session.chat_id);
        let temp_path = Self::write_temp(&dir, session).await?;

        let linked = fs::hard_link(&temp_path, &target).await;
        if let Err(error) = fs::remove_file(&temp_path).await {
            warn!(%error, path = ?temp_path, "failed removing temp session file");
        }
        match linked {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(error) => {
                Err(error).with_context(|| format!("failed publishing session {target:?}"))
            }
        }
    }

    async fn query_inner(
        &self,
        user_id: &UserId,
        filter: &SessionQuery,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Session>> {
        let dir = self.user_dir(user_id);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => {
                return Err(error).with_context(|| format!("failed listing sessions in {dir:?}"));
            }
        };

        let mut sessions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_session_file = path.extension().is_some_and(|ext| ext == "json")
                && !entry.file_name().to_string_lossy().starts_with('.');
            if !is_session_file {
                continue;
            }
            if let Some(session) = Self::read_session(&path).await?
                && matches_query(&session, user_id, filter)
            {
                sessions.push(session);
            }
        }
        Ok(paginate_newest_first(sessions, limit, offset))
    }

    /// Takes `<target>.lock` with `create_new`, waiting while another writer
    /// holds it.
    async fn acquire_lock(target: &Path) -> Result<PathBuf> {
        let lock_path = target.with_extension("json.lock");
        for _ in 0..LOCK_ATTEMPTS {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
                .await
            {
                Ok(_) => return Ok(lock_path),
                Err(error) if error.kind() == ErrorKind::AlreadyExists => {
                    tokio::time::sleep(LOCK_RETRY_DELAY).await;
                }
                Err(error) => {
                    return Err(error)
                        .with_context(|| format!("failed creating lock {lock_path:?}"));
                }
            }
        }
        bail!("timed out waiting for session lock {lock_path:?}")
    }

    /// `Ok(false)` means the stored revision moved on since `session` was read.
    async fn update_inner(&self, session: &Session) -> Result<bool> {
        let target = self.session_path(&session.user_id, &session.chat_id);
        let exists = fs::try_exists(&target)
            .await
            .with_context(|| format!("failed checking session {target:?}"))?;
        if !exists {
            bail!("no stored session for chat {}", session.chat_id);
        }

        let lock_path = Self::acquire_lock(&target).await?;
        let result = self.replace_locked(&target, session).await;
        if let Err(error) = fs::remove_file(&lock_path).await {
            warn!(%error, path = ?lock_path, "failed releasing session lock");
        }
        result
    }

    async fn replace_locked(&self, target: &Path, session: &Session) -> Result<bool> {
        let Some(stored) = Self::read_session(target).await? else {
            bail!("no stored session for chat {}", session.chat_id);
        };
        if stored.revision + 1 != session.revision {
            return Ok(false);
        }
        let temp_path = Self::write_temp(&self.user_dir(&session.user_id), session).await?;
        fs::rename(&temp_path, target)
            .await
            .with_context(|| format!("failed replacing session {target:?}"))?;
        Ok(true)
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    #[instrument(skip(self, session), fields(user_id = %session.user_id, chat_id = %session.chat_id))]
    async fn insert(&self, session: &Session) -> ResearchResult<()> {
        let inserted = self.insert_inner(session).await.map_err(storage_error)?;
        if !inserted {
            debug!("session file already exists");
            return Err(ResearchError::SessionConflict {
                user_id: session.user_id.to_string(),
                chat_id: session.chat_id.to_string(),
            });
        }
        debug!("session persisted");
        Ok(())
    }

    #[instrument(skip(self, filter), fields(user_id = %user_id))]
    async fn query(
        &self,
        user_id: &UserId,
        filter: &SessionQuery,
        limit: usize,
        offset: usize,
    ) -> ResearchResult<Vec<Session>> {
        self.query_inner(user_id, filter, limit, offset)
            .await
            .map_err(storage_error)
    }

    async fn find_by_chat_id(
        &self,
        user_id: &UserId,
        chat_id: &ChatId,
    ) -> ResearchResult<Option<Session>> {
        Self::read_session(&self.session_path(user_id, chat_id))
            .await
            .map_err(storage_error)
    }

    #[instrument(skip(self, session), fields(session_id = %session.id, revision = session.revision))]
    async fn update(&self, session: &Session) -> ResearchResult<()> {
        if !self.update_inner(session).await.map_err(storage_error)? {
            debug!("stored session is newer than the update");
            return Err(ResearchError::StaleSession {
                session_id: session.id.to_string(),
            });
        }
        Ok(())
    }
}

fn digest(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

fn storage_error(error: anyhow::Error) -> ResearchError {
    ResearchError::StorageUnavailable(format!("{error:#}"))
}
