use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use pathway_protocol::{
    ChatId, ResearchError, ResearchResult, Session, SessionQuery, SessionStatus, SessionStore,
    UserId,
};
use tracing::{debug, info, instrument, warn};

mod file_store;

pub use file_store::FileSessionStore;

const MAX_UPDATE_ATTEMPTS: usize = 8;

/// Owns session records: one per `(user, chat)`.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Get-or-create. A uniqueness conflict means another request won the
    /// race, so the stored record is returned instead of the fresh one.
    #[instrument(skip(self, research_brief), fields(user_id = %user_id, chat_id = %chat_id))]
    pub async fn create_session(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        research_brief: Option<String>,
    ) -> ResearchResult<Session> {
        let session = Session::new(chat_id, user_id, research_brief);
        match self.store.insert(&session).await {
            Ok(()) => {
                info!(
                    session_id = %session.id,
                    thread_id = %session.thread_id,
                    "session created"
                );
                Ok(session)
            }
            Err(ResearchError::SessionConflict { .. }) => {
                debug!("session already exists, returning stored record");
                self.store
                    .find_by_chat_id(&session.user_id, &session.chat_id)
                    .await?
                    .ok_or_else(|| {
                        ResearchError::StorageUnavailable(format!(
                            "session for chat {} conflicted but could not be read back",
                            session.chat_id
                        ))
                    })
            }
            Err(error) => Err(error),
        }
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get_user_sessions(
        &self,
        user_id: &UserId,
        status: Option<SessionStatus>,
        limit: usize,
        offset: usize,
    ) -> ResearchResult<Vec<Session>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let filter = SessionQuery {
            status,
            chat_id: None,
        };
        let mut sessions = self.store.query(user_id, &filter, limit, offset).await?;

        let before = sessions.len();
        sessions.retain(|session| session.user_id == *user_id);
        if sessions.len() != before {
            warn!(
                dropped = before - sessions.len(),
                "session store returned records owned by another user"
            );
        }
        debug!(count = sessions.len(), "sessions loaded");
        Ok(sessions)
    }

    #[instrument(skip(self), fields(user_id = %user_id, chat_id = %chat_id))]
    pub async fn find_by_chat_id(
        &self,
        user_id: &UserId,
        chat_id: &ChatId,
    ) -> ResearchResult<Option<Session>> {
        let session = self.store.find_by_chat_id(user_id, chat_id).await?;
        Ok(session.filter(|session| session.user_id == *user_id && session.chat_id == *chat_id))
    }

    /// Moves the session to `status`. Returns `None` when no session exists.
    ///
    /// A write that loses a race is re-applied to the fresh record, so a
    /// session that another writer already finished rejects the change with
    /// `InvalidTransition` instead of overwriting it.
    #[instrument(skip(self), fields(user_id = %user_id, chat_id = %chat_id, status = %status))]
    pub async fn update_status(
        &self,
        user_id: &UserId,
        chat_id: &ChatId,
        status: SessionStatus,
    ) -> ResearchResult<Option<Session>> {
        let updated = self
            .modify(user_id, chat_id, |session| session.transition(status))
            .await?;
        if let Some(session) = &updated {
            info!(session_id = %session.id, "session status updated");
        }
        Ok(updated)
    }

    #[instrument(skip(self, brief), fields(user_id = %user_id, chat_id = %chat_id))]
    pub async fn set_research_brief(
        &self,
        user_id: &UserId,
        chat_id: &ChatId,
        brief: impl Into<String>,
    ) -> ResearchResult<Option<Session>> {
        let brief = brief.into();
        self.modify(user_id, chat_id, |session| {
            session.set_research_brief(brief.clone());
            Ok(())
        })
        .await
    }

    /// Read, apply `change`, and conditionally write back, retrying on
    /// `StaleSession` with the latest stored record.
    async fn modify(
        &self,
        user_id: &UserId,
        chat_id: &ChatId,
        mut change: impl FnMut(&mut Session) -> ResearchResult<()>,
    ) -> ResearchResult<Option<Session>> {
        let mut attempt = 1;
        loop {
            let Some(mut session) = self.find_by_chat_id(user_id, chat_id).await? else {
                return Ok(None);
            };
            change(&mut session)?;
            match self.store.update(&session).await {
                Ok(()) => return Ok(Some(session)),
                Err(ResearchError::StaleSession { .. }) if attempt < MAX_UPDATE_ATTEMPTS => {
                    debug!(attempt, "session changed underneath update, retrying");
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// Process-local session store with a unique `(user, chat)` index.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<(UserId, ChatId), Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, session: &Session) -> ResearchResult<()> {
        let mut guard = self.sessions.lock();
        let key = (session.user_id.clone(), session.chat_id.clone());
        if guard.contains_key(&key) {
            return Err(ResearchError::SessionConflict {
                user_id: session.user_id.to_string(),
                chat_id: session.chat_id.to_string(),
            });
        }
        guard.insert(key, session.clone());
        Ok(())
    }

    async fn query(
        &self,
        user_id: &UserId,
        filter: &SessionQuery,
        limit: usize,
        offset: usize,
    ) -> ResearchResult<Vec<Session>> {
        let matching: Vec<Session> = self
            .sessions
            .lock()
            .values()
            .filter(|session| matches_query(session, user_id, filter))
            .cloned()
            .collect();
        Ok(paginate_newest_first(matching, limit, offset))
    }

    async fn find_by_chat_id(
        &self,
        user_id: &UserId,
        chat_id: &ChatId,
    ) -> ResearchResult<Option<Session>> {
        Ok(self
            .sessions
            .lock()
            .get(&(user_id.clone(), chat_id.clone()))
            .cloned())
    }

    async fn update(&self, session: &Session) -> ResearchResult<()> {
        let mut guard = self.sessions.lock();
        let key = (session.user_id.clone(), session.chat_id.clone());
        match guard.get_mut(&key) {
            Some(existing) if existing.revision + 1 == session.revision => {
                *existing = session.clone();
                Ok(())
            }
            Some(_) => Err(ResearchError::StaleSession {
                session_id: session.id.to_string(),
            }),
            None => Err(ResearchError::StorageUnavailable(format!(
                "no stored session for chat {}",
                session.chat_id
            ))),
        }
    }
}

pub(crate) fn matches_query(session: &Session, user_id: &UserId, filter: &SessionQuery) -> bool {
    session.user_id == *user_id
        && filter.status.is_none_or(|status| session.status == status)
        && filter
            .chat_id
            .as_ref()
            .is_none_or(|chat_id| session.chat_id == *chat_id)
}

/// Newest first; ties broken by id so pages are stable.
pub(crate) fn paginate_newest_first(
    mut sessions: Vec<Session>,
    limit: usize,
    offset: usize,
) -> Vec<Session> {
    sessions.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.id.as_str().cmp(b.id.as_str()))
    });
    sessions.into_iter().skip(offset).take(limit).collect()
}
