use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use clap::Parser;
use pathway_kernel::{KernelBuilder, ResearchKernel};
use pathway_protocol::{
    ChatId, ResearchError, Session, SessionId, SessionStatus, ThreadId, UiMessage, UserId,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

mod auth;
mod openapi;

use crate::auth::{Authenticator, StaticTokenAuthenticator, parse_token_pair};
use crate::openapi::openapi_spec;

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Parser)]
#[command(name = "pathway-api")]
#[command(about = "Research session and checkpoint status API")]
struct Cli {
    #[arg(long, env = "PATHWAY_ROOT", default_value = ".pathway")]
    root: PathBuf,
    #[arg(long, env = "PATHWAY_LISTEN", default_value = "127.0.0.1:8788")]
    listen: SocketAddr,
    /// Bearer token accepted for a user, as `TOKEN=USER`. Repeatable.
    #[arg(
        long = "auth-token",
        env = "PATHWAY_AUTH_TOKENS",
        value_delimiter = ',',
        value_parser = parse_token_pair
    )]
    auth_tokens: Vec<(String, String)>,
}

#[derive(Clone)]
struct AppState {
    kernel: ResearchKernel,
    auth: Arc<dyn Authenticator>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ChatQuery {
    chat_id: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct SessionListQuery {
    status: Option<String>,
    limit: Option<String>,
    offset: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartSessionRequest {
    chat_id: String,
    research_brief: Option<String>,
}

/// Session fields exposed to the chat UI.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionView {
    id: SessionId,
    thread_id: ThreadId,
    status: SessionStatus,
    research_brief: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<Session> for SessionView {
    fn from(session: Session) -> Self {
        Self {
            id: session.id,
            thread_id: session.thread_id,
            status: session.status,
            research_brief: session.research_brief,
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}

/// Session listing entry; carries the chat it belongs to.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatSessionView {
    chat_id: ChatId,
    #[serde(flatten)]
    session: SessionView,
}

impl From<Session> for ChatSessionView {
    fn from(session: Session) -> Self {
        Self {
            chat_id: session.chat_id.clone(),
            session: session.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SessionListResponse {
    sessions: Vec<ChatSessionView>,
}

#[derive(Debug, Serialize)]
struct MessagesResponse {
    messages: Vec<UiMessage>,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: "Unauthorized".to_owned(),
        }
    }

    fn internal(error: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: error.to_string(),
        }
    }
}

impl From<ResearchError> for ApiError {
    fn from(error: ResearchError) -> Self {
        match error {
            ResearchError::InvalidConfig(_) => Self::bad_request(error.to_string()),
            ResearchError::InvalidTransition { .. } | ResearchError::SessionConflict { .. } => {
                Self {
                    status: StatusCode::CONFLICT,
                    message: error.to_string(),
                }
            }
            other => {
                error!(error = %other, "request failed");
                Self::internal(other)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();
    let authenticator = StaticTokenAuthenticator::new(cli.auth_tokens);
    if authenticator.is_empty() {
        warn!("no auth tokens configured; every research request will be rejected");
    }

    let state = AppState {
        kernel: KernelBuilder::new(&cli.root).build(),
        auth: Arc::new(authenticator),
    };
    let app = router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    info!(listen = %cli.listen, root = %cli.root.display(), "pathway-api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/openapi.json", get(openapi_json))
        .route("/research/checkpoint", get(checkpoint_status))
        .route(
            "/research/sessions",
            get(list_sessions).post(start_session),
        )
        .route("/research/messages", get(chat_messages))
        .with_state(state)
}

async fn healthz() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "pathway-api"
    }))
}

async fn openapi_json() -> Json<Value> {
    Json(openapi_spec())
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> ApiResult<UserId> {
    state
        .auth
        .authenticate(headers)
        .await
        .ok_or_else(ApiError::unauthorized)
}

fn required_chat_id(query: &ChatQuery) -> ApiResult<ChatId> {
    query
        .chat_id
        .as_deref()
        .map(str::trim)
        .filter(|chat_id| !chat_id.is_empty())
        .map(ChatId::from)
        .ok_or_else(|| ApiError::bad_request("chatId is required"))
}

/// Query strings are checked after authentication so that unauthenticated
/// callers always see 401, and malformed ones still get a JSON error.
fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> ApiResult<T> {
    query
        .map(|Query(params)| params)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

async fn checkpoint_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<ChatQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let user_id = authenticate(&state, &headers).await?;
    let chat_id = required_chat_id(&query_params(query)?)?;

    let status = state.kernel.checkpoint_status(&user_id, &chat_id).await?;
    let Some(session) = status.session else {
        return Ok(Json(json!({
            "hasCheckpoint": false,
            "session": null,
        })));
    };

    Ok(Json(json!({
        "hasCheckpoint": status.has_checkpoint,
        "session": SessionView::from(session),
        "checkpoint": status.checkpoint,
    })))
}

async fn start_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<ChatSessionView>> {
    let user_id = authenticate(&state, &headers).await?;
    let request: StartSessionRequest = serde_json::from_slice(&body)
        .map_err(|error| ApiError::bad_request(format!("invalid request body: {error}")))?;
    let chat_id = required_chat_id(&ChatQuery {
        chat_id: Some(request.chat_id),
    })?;

    let session = state
        .kernel
        .start_session(user_id, chat_id, request.research_brief)
        .await?;
    Ok(Json(session.into()))
}

fn parse_count(name: &str, raw: Option<&str>) -> ApiResult<Option<usize>> {
    raw.map(|raw| {
        raw.trim()
            .parse::<usize>()
            .map_err(|_| ApiError::bad_request(format!("{name} must be a non-negative integer")))
    })
    .transpose()
}

async fn list_sessions(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<SessionListQuery>, QueryRejection>,
) -> ApiResult<Json<SessionListResponse>> {
    let user_id = authenticate(&state, &headers).await?;
    let query = query_params(query)?;

    let status = match query.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(
            SessionStatus::parse(raw)
                .ok_or_else(|| ApiError::bad_request(format!("unknown session status: {raw}")))?,
        ),
    };
    let limit = parse_count("limit", query.limit.as_deref())?
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let offset = parse_count("offset", query.offset.as_deref())?.unwrap_or(0);

    let sessions = state
        .kernel
        .list_sessions(&user_id, status, limit, offset)
        .await?;
    Ok(Json(SessionListResponse {
        sessions: sessions.into_iter().map(ChatSessionView::from).collect(),
    }))
}

async fn chat_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<ChatQuery>, QueryRejection>,
) -> ApiResult<Json<MessagesResponse>> {
    let user_id = authenticate(&state, &headers).await?;
    let chat_id = required_chat_id(&query_params(query)?)?;

    let messages = state.kernel.chat_messages(&user_id, &chat_id).await?;
    Ok(Json(MessagesResponse { messages }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            error!(%error, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    {
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(error) => {
                    error!(%error, "failed to install SIGTERM handler");
                }
            }
        };

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::{Bytes, to_bytes};
    use axum::extract::rejection::QueryRejection;
    use axum::extract::{Query, State};
    use axum::http::header::AUTHORIZATION;
    use axum::http::{HeaderMap, HeaderValue, StatusCode};
    use axum::response::IntoResponse;
    use chrono::Utc;
    use pathway_checkpoint::InMemoryCheckpointStore;
    use pathway_kernel::KernelBuilder;
    use pathway_protocol::{
        ChannelValues, ChatId, CheckpointId, CheckpointMetadata, CheckpointSnapshot,
        CheckpointSource, CheckpointStore, ResearchError, ResearchResult, Session,
        SessionQuery, SessionStore, ThreadId, UserId,
    };
    use pathway_sessions::InMemorySessionStore;
    use serde_json::{Value, json};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use super::{
        AppState, ChatQuery, SessionListQuery, chat_messages, checkpoint_status, healthz,
        list_sessions, router, start_session,
    };
    use crate::auth::StaticTokenAuthenticator;

    fn app() -> (AppState, Arc<InMemoryCheckpointStore>) {
        let checkpoints = Arc::new(InMemoryCheckpointStore::new());
        let state = AppState {
            kernel: KernelBuilder::with_stores(
                Arc::new(InMemorySessionStore::new()),
                checkpoints.clone(),
            )
            .build(),
            auth: Arc::new(StaticTokenAuthenticator::new([
                ("alice-token".to_owned(), "alice".to_owned()),
                ("bob-token".to_owned(), "bob".to_owned()),
            ])),
        };
        (state, checkpoints)
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
            headers.insert(AUTHORIZATION, value);
        }
        headers
    }

    fn chat(chat_id: &str) -> Result<Query<ChatQuery>, QueryRejection> {
        Ok(Query(ChatQuery {
            chat_id: Some(chat_id.to_owned()),
        }))
    }

    /// Serves the full router on an ephemeral port and issues one
    /// `GET` over HTTP/1.1, returning the status code and JSON body.
    async fn get(state: AppState, target: &str, token: Option<&str>) -> (u16, Value) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let server = tokio::spawn(async move { axum::serve(listener, router(state)).await });

        let mut stream = TcpStream::connect(addr).await.expect("connect");
        let auth = token
            .map(|token| format!("Authorization: Bearer {token}\r\n"))
            .unwrap_or_default();
        let request =
            format!("GET {target} HTTP/1.1\r\nHost: {addr}\r\n{auth}Connection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.expect("write");
        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.expect("read");
        server.abort();

        let raw = String::from_utf8(raw).expect("utf8 response");
        let (head, body) = raw.split_once("\r\n\r\n").expect("header terminator");
        let status = head
            .split_whitespace()
            .nth(1)
            .and_then(|code| code.parse().ok())
            .expect("status code");
        (status, serde_json::from_str(body).expect("json body"))
    }

    async fn read(response: impl IntoResponse) -> (StatusCode, Value) {
        let response = response.into_response();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        (status, serde_json::from_slice(&body).expect("json body"))
    }

    fn snapshot(thread_id: &ThreadId, next: &[&str]) -> CheckpointSnapshot {
        let mut channel_values = ChannelValues::new();
        channel_values.insert(
            "messages".to_owned(),
            json!([
                { "type": "human", "id": "h1", "content": "I want to become a data engineer" },
                {
                    "type": "ai",
                    "id": "a1",
                    "content": "Which stack do you use today?",
                    "tool_calls": []
                }
            ]),
        );
        CheckpointSnapshot {
            metadata: CheckpointMetadata {
                checkpoint_id: CheckpointId::from_string("cp-1"),
                thread_id: thread_id.clone(),
                step: 2,
                source: CheckpointSource::Loop,
                next: next.iter().map(|node| (*node).to_owned()).collect(),
                pending_question: Some("Which stack do you use today?".to_owned()),
                error: None,
                updated_at: Utc::now(),
            },
            channel_values,
        }
    }

    #[tokio::test]
    async fn healthz_reports_service() {
        let (status, body) = read(healthz().await).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok", "service": "pathway-api" }));
    }

    #[tokio::test]
    async fn checkpoint_requires_authentication() {
        let (state, _) = app();
        let (status, body) = read(
            checkpoint_status(State(state.clone()), HeaderMap::new(), chat("c1")).await,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({ "error": "Unauthorized" }));

        let (status, _) =
            read(checkpoint_status(State(state), bearer("forged"), chat("c1")).await).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn checkpoint_requires_chat_id() {
        let (state, _) = app();
        for query in [ChatQuery::default(), ChatQuery { chat_id: Some("  ".to_owned()) }] {
            let (status, body) = read(
                checkpoint_status(State(state.clone()), bearer("alice-token"), Ok(Query(query)))
                    .await,
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body, json!({ "error": "chatId is required" }));
        }
    }

    #[tokio::test]
    async fn checkpoint_without_session_omits_checkpoint_key() {
        let (state, _) = app();
        let (status, body) =
            read(checkpoint_status(State(state), bearer("alice-token"), chat("c1")).await).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "hasCheckpoint": false, "session": null }));
    }

    #[tokio::test]
    async fn checkpoint_reports_session_and_metadata() -> ResearchResult<()> {
        let (state, checkpoints) = app();
        let session = state
            .kernel
            .start_session(
                UserId::from_string("alice"),
                ChatId::from_string("c1"),
                Some("move into data engineering".to_owned()),
            )
            .await?;

        let (status, body) = read(
            checkpoint_status(State(state.clone()), bearer("alice-token"), chat("c1")).await,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["hasCheckpoint"], false);
        assert_eq!(body["checkpoint"], Value::Null);
        assert_eq!(body["session"]["threadId"], session.thread_id.as_str());

        checkpoints.put(snapshot(&session.thread_id, &["clarify_with_user"]));
        let (_, body) =
            read(checkpoint_status(State(state), bearer("alice-token"), chat("c1")).await).await;
        assert_eq!(body["hasCheckpoint"], true);
        assert_eq!(body["session"]["id"], session.id.as_str());
        assert_eq!(body["session"]["status"], "active");
        assert_eq!(body["session"]["researchBrief"], "move into data engineering");
        let mut fields: Vec<&str> = body["session"]
            .as_object()
            .map(|session| session.keys().map(String::as_str).collect())
            .unwrap_or_default();
        fields.sort_unstable();
        assert_eq!(
            fields,
            ["createdAt", "id", "researchBrief", "status", "threadId", "updatedAt"]
        );
        assert_eq!(body["checkpoint"]["checkpointId"], "cp-1");
        assert_eq!(body["checkpoint"]["next"], json!(["clarify_with_user"]));
        Ok(())
    }

    #[tokio::test]
    async fn other_users_cannot_see_a_session() -> ResearchResult<()> {
        let (state, _) = app();
        state
            .kernel
            .start_session(UserId::from_string("alice"), ChatId::from_string("c1"), None)
            .await?;
        let (_, body) =
            read(checkpoint_status(State(state), bearer("bob-token"), chat("c1")).await).await;
        assert_eq!(body, json!({ "hasCheckpoint": false, "session": null }));
        Ok(())
    }

    struct CorruptSessions;

    #[async_trait]
    impl SessionStore for CorruptSessions {
        async fn insert(&self, _session: &Session) -> ResearchResult<()> {
            Ok(())
        }

        async fn query(
            &self,
            user_id: &UserId,
            filter: &SessionQuery,
            _limit: usize,
            _offset: usize,
        ) -> ResearchResult<Vec<Session>> {
            let chat_id = filter
                .chat_id
                .clone()
                .unwrap_or_else(|| ChatId::from_string("c1"));
            let mut session = Session::new(chat_id, user_id.clone(), None);
            session.thread_id = ThreadId::from_string("");
            Ok(vec![session])
        }

        async fn update(&self, _session: &Session) -> ResearchResult<()> {
            Ok(())
        }
    }

    struct FailingCheckpoints;

    #[async_trait]
    impl CheckpointStore for FailingCheckpoints {
        async fn get_latest_checkpoint(
            &self,
            _thread_id: &ThreadId,
        ) -> ResearchResult<Option<ChannelValues>> {
            Err(ResearchError::CheckpointStore("database is locked".to_owned()))
        }

        async fn get_metadata(
            &self,
            _thread_id: &ThreadId,
        ) -> ResearchResult<Option<CheckpointMetadata>> {
            Err(ResearchError::CheckpointStore("database is locked".to_owned()))
        }
    }

    #[tokio::test]
    async fn internal_failures_are_500_with_message() -> ResearchResult<()> {
        let (mut state, _) = app();
        state.kernel = KernelBuilder::with_stores(
            Arc::new(InMemorySessionStore::new()),
            Arc::new(FailingCheckpoints),
        )
        .build();
        state
            .kernel
            .start_session(UserId::from_string("alice"), ChatId::from_string("c1"), None)
            .await?;

        let (status, body) =
            read(checkpoint_status(State(state), bearer("alice-token"), chat("c1")).await).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(
            body["error"]
                .as_str()
                .is_some_and(|message| message.contains("database is locked"))
        );
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_session_is_a_server_error() {
        let (mut state, _) = app();
        state.kernel = KernelBuilder::with_stores(
            Arc::new(CorruptSessions),
            Arc::new(InMemoryCheckpointStore::new()),
        )
        .build();

        let (status, body) = read(
            checkpoint_status(State(state.clone()), bearer("alice-token"), chat("c1")).await,
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().is_some_and(|m| m.contains("corrupt session")));

        let (status, body) =
            read(chat_messages(State(state), bearer("alice-token"), chat("c1")).await).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "messages": [] }));
    }

    #[tokio::test]
    async fn start_session_is_get_or_create() {
        let (state, _) = app();
        let body = Bytes::from_static(br#"{"chatId":"c1","researchBrief":"pivot"}"#);

        let (status, first) = read(
            start_session(State(state.clone()), bearer("alice-token"), body.clone()).await,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["chatId"], "c1");
        assert_eq!(first["researchBrief"], "pivot");

        let (_, second) =
            read(start_session(State(state.clone()), bearer("alice-token"), body).await).await;
        assert_eq!(first["id"], second["id"]);
        assert_eq!(first["threadId"], second["threadId"]);

        let (status, body) = read(
            start_session(
                State(state),
                bearer("alice-token"),
                Bytes::from_static(br#"{"researchBrief":"x"}"#),
            )
            .await,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().is_some_and(|m| m.contains("chatId")));
    }

    #[tokio::test]
    async fn list_sessions_paginates_and_validates() -> ResearchResult<()> {
        let (state, _) = app();
        let alice = UserId::from_string("alice");
        for chat_id in ["a", "b", "c"] {
            state
                .kernel
                .start_session(alice.clone(), ChatId::from_string(chat_id), None)
                .await?;
        }

        let (status, body) = read(
            list_sessions(
                State(state.clone()),
                bearer("alice-token"),
                Ok(Query(SessionListQuery::default())),
            )
            .await,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sessions"].as_array().map(Vec::len), Some(3));

        let (_, body) = read(
            list_sessions(
                State(state.clone()),
                bearer("alice-token"),
                Ok(Query(SessionListQuery {
                    status: Some("ACTIVE".to_owned()),
                    limit: Some("0".to_owned()),
                    offset: Some("1".to_owned()),
                })),
            )
            .await,
        )
        .await;
        assert_eq!(body["sessions"].as_array().map(Vec::len), Some(1));

        let (_, body) = read(
            list_sessions(
                State(state.clone()),
                bearer("bob-token"),
                Ok(Query(SessionListQuery::default())),
            )
            .await,
        )
        .await;
        assert_eq!(body, json!({ "sessions": [] }));

        for query in [
            SessionListQuery {
                status: Some("paused".to_owned()),
                ..SessionListQuery::default()
            },
            SessionListQuery {
                limit: Some("-1".to_owned()),
                ..SessionListQuery::default()
            },
        ] {
            let (status, _) = read(
                list_sessions(State(state.clone()), bearer("alice-token"), Ok(Query(query)))
                    .await,
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
        Ok(())
    }

    #[tokio::test]
    async fn messages_render_latest_checkpoint() -> ResearchResult<()> {
        let (state, checkpoints) = app();
        let session = state
            .kernel
            .start_session(UserId::from_string("alice"), ChatId::from_string("c1"), None)
            .await?;
        checkpoints.put(snapshot(&session.thread_id, &[]));

        let (status, body) =
            read(chat_messages(State(state), bearer("alice-token"), chat("c1")).await).await;
        assert_eq!(status, StatusCode::OK);
        let messages = body["messages"].as_array().cloned().unwrap_or_default();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(
            messages[1]["parts"],
            json!([{ "type": "text", "text": "Which stack do you use today?" }])
        );
        Ok(())
    }

    #[tokio::test]
    async fn malformed_queries_are_checked_after_authentication() -> ResearchResult<()> {
        let (state, _) = app();
        state
            .kernel
            .start_session(UserId::from_string("alice"), ChatId::from_string("a"), None)
            .await?;

        let duplicated = "/research/checkpoint?chatId=a&chatId=b";
        let (status, body) = get(state.clone(), duplicated, None).await;
        assert_eq!(status, 401);
        assert_eq!(body, json!({ "error": "Unauthorized" }));

        let (status, body) = get(state.clone(), duplicated, Some("alice-token")).await;
        assert_eq!(status, 400);
        assert!(body["error"].is_string());

        let (status, body) = get(state.clone(), "/research/sessions?limit=x&limit=y", None).await;
        assert_eq!(status, 401);
        assert_eq!(body, json!({ "error": "Unauthorized" }));

        let (status, body) = get(state, "/research/checkpoint?chatId=a", Some("alice-token")).await;
        assert_eq!(status, 200);
        assert_eq!(body["session"]["status"], "active");
        Ok(())
    }
}
