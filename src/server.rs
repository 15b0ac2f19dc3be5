//! HTTP API for the assistant.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `GET`    | `/stats` | Collection and model information |
//! | `POST`   | `/retrieve` | Nearest chunks for a query |
//! | `POST`   | `/chat` | Answer a question within a session |
//! | `GET`    | `/sessions/{id}` | Conversation history |
//! | `DELETE` | `/sessions/{id}` | Forget a session |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404),
//! `generation_failed` (502, the LLM call failed), `internal` (500, store
//! or indexing failures).
//!
//! # Sessions
//!
//! Sessions live in memory, at most `server.max_sessions` of them. Starting
//! a new one when the map is full drops the least recently used session.
//! Each session keeps its latest
//! [`MAX_HISTORY_TURNS`](crate::assistant::MAX_HISTORY_TURNS) turns.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser chat widget
//! can call the API directly.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

use fitflix_core::models::RetrievedResult;
use fitflix_core::retrieve::RetrievalStats;

use crate::assistant::{Assistant, ChatTurn, Session, Timings};
use crate::config::Config;
use crate::generation::{GenerationError, ModelInfo};

/// Shared server state. Each session has its own lock so turns within one
/// session run one at a time while different sessions proceed in parallel.
pub struct AppState {
    assistant: Assistant,
    sessions: Mutex<Sessions>,
}

impl AppState {
    pub fn new(assistant: Assistant) -> Self {
        let capacity = assistant.knowledge_base().config().server.max_sessions;
        Self {
            assistant,
            sessions: Mutex::new(Sessions::new(capacity)),
        }
    }
}

struct SessionEntry {
    session: Arc<Mutex<Session>>,
    last_used: u64,
}

/// Session map bounded by `capacity`, evicting the least recently used.
struct Sessions {
    entries: HashMap<String, SessionEntry>,
    capacity: usize,
    clock: u64,
}

impl Sessions {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
            clock: 0,
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn get(&mut self, id: &str) -> Option<Arc<Mutex<Session>>> {
        let now = self.tick();
        self.entries.get_mut(id).map(|entry| {
            entry.last_used = now;
            entry.session.clone()
        })
    }

    fn get_or_create(&mut self, id: String) -> Arc<Mutex<Session>> {
        if let Some(session) = self.get(&id) {
            return session;
        }

        if self.entries.len() >= self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(id, _)| id.clone());
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
                tracing::debug!("Evicted least recently used session {}", oldest);
            }
        }

        let session = Arc::new(Mutex::new(Session::with_id(id.clone())));
        let last_used = self.tick();
        self.entries.insert(
            id,
            SessionEntry {
                session: session.clone(),
                last_used,
            },
        );
        session
    }

    fn remove(&mut self, id: &str) -> bool {
        self.entries.remove(id).is_some()
    }
}

/// Build the assistant, index if needed, and serve until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let assistant = Assistant::from_config(config.clone())?;
    assistant.ensure_initialized().await?;

    let app = router(Arc::new(AppState::new(assistant)));

    println!("FIT-FLIX server listening on http://{}", bind_addr);
    tracing::info!("Serving on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/stats", get(handle_stats))
        .route("/retrieve", post(handle_retrieve))
        .route("/chat", post(handle_chat))
        .route(
            "/sessions/{id}",
            get(handle_get_session).delete(handle_delete_session),
        )
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn generation_failed(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_GATEWAY,
        code: "generation_failed".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /stats ============

#[derive(Serialize)]
struct StatsResponse {
    retrieval: RetrievalStats,
    model: ModelInfo,
    embedding_model: String,
    active_sessions: usize,
}

async fn handle_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let kb = state.assistant.knowledge_base();
    Json(StatsResponse {
        retrieval: kb.stats().await,
        model: state.assistant.model_info(),
        embedding_model: kb.embedding_model().to_string(),
        active_sessions: state.sessions.lock().await.len(),
    })
}

// ============ POST /retrieve ============

#[derive(Deserialize)]
struct RetrieveRequest {
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
    #[serde(default)]
    category: Option<String>,
}

#[derive(Serialize)]
struct RetrieveResponse {
    results: Vec<RetrievedResult>,
}

async fn handle_retrieve(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RetrieveRequest>,
) -> Result<Json<RetrieveResponse>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let kb = state.assistant.knowledge_base();
    let top_k = req.top_k.unwrap_or(kb.config().retrieval.top_k);
    if top_k == 0 {
        return Err(bad_request("top_k must be >= 1"));
    }

    let results = kb
        .retrieve(&req.query, top_k, req.category.as_deref())
        .await
        .map_err(|e| internal(format!("{:#}", e)))?;

    Ok(Json(RetrieveResponse { results }))
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    question: String,
    /// Continue an existing session. A new one is created when the id is
    /// absent or unknown, which includes evicted ids.
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Serialize)]
struct ChatResponse {
    session_id: String,
    answer: String,
    sources: Vec<String>,
    timings: Timings,
}

async fn handle_chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    if req.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }

    let session = {
        let id = req
            .session_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        state.sessions.lock().await.get_or_create(id)
    };

    let mut session = session.lock().await;
    let answer = state
        .assistant
        .answer(&mut session, &req.question)
        .await
        .map_err(|e| {
            tracing::error!("Chat failed for session {}: {:#}", session.id, e);
            if e.downcast_ref::<GenerationError>().is_some() {
                generation_failed(format!("{:#}", e))
            } else {
                internal(format!("{:#}", e))
            }
        })?;

    Ok(Json(ChatResponse {
        session_id: session.id.clone(),
        answer: answer.text,
        sources: answer.sources,
        timings: answer.timings,
    }))
}

// ============ /sessions/{id} ============

#[derive(Serialize)]
struct SessionResponse {
    session_id: String,
    history: Vec<ChatTurn>,
}

async fn handle_get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = state
        .sessions
        .lock()
        .await
        .get(&id)
        .ok_or_else(|| not_found(format!("session not found: {}", id)))?;

    let session = session.lock().await;
    Ok(Json(SessionResponse {
        session_id: session.id.clone(),
        history: session.history.clone(),
    }))
}

async fn handle_delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if state.sessions.lock().await.remove(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(format!("session not found: {}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::assistant::tests::echo_assistant;
    use crate::generation::tests::EchoClient;
    use crate::knowledge_base::tests::fixture;

    fn app(tmp: &TempDir, client: EchoClient) -> Router {
        app_with(fixture(tmp.path()), client)
    }

    fn app_with(config: Config, client: EchoClient) -> Router {
        let assistant = echo_assistant(config, Arc::new(client));
        router(Arc::new(AppState::new(assistant)))
    }

    async fn chat(app: &Router, session_id: &str) -> StatusCode {
        let body = serde_json::json!({ "question": "When is yoga?", "session_id": session_id });
        send(app, "POST", "/chat", Some(body)).await.0
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(json) => Body::from(json.to_string()),
                None => Body::empty(),
            })
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_health() {
        let tmp = TempDir::new().unwrap();
        let app = app(&tmp, EchoClient::ok("x"));
        let (status, json) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_chat_session_lifecycle() {
        let tmp = TempDir::new().unwrap();
        let app = app(&tmp, EchoClient::ok("Yoga is every morning."));

        let (status, json) = send(
            &app,
            "POST",
            "/chat",
            Some(serde_json::json!({ "question": "When is yoga?" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["answer"], "Yoga is every morning.");
        assert!(json["sources"].as_array().unwrap().contains(&"classes.md".into()));
        let id = json["session_id"].as_str().unwrap().to_string();

        let (status, json) = send(
            &app,
            "POST",
            "/chat",
            Some(serde_json::json!({ "question": "And spin?", "session_id": id })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["session_id"], id.as_str());

        let (status, json) = send(&app, "GET", &format!("/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["history"].as_array().unwrap().len(), 2);
        assert_eq!(json["history"][1]["question"], "And spin?");

        let (status, _) = send(&app, "DELETE", &format!("/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, json) = send(&app, "DELETE", &format!("/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["code"], "not_found");
    }

    #[tokio::test]
    async fn test_chat_errors() {
        let tmp = TempDir::new().unwrap();
        let app = app(&tmp, EchoClient::failing("upstream unavailable"));

        let (status, json) = send(
            &app,
            "POST",
            "/chat",
            Some(serde_json::json!({ "question": "   " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "bad_request");

        let (status, json) = send(
            &app,
            "POST",
            "/chat",
            Some(serde_json::json!({ "question": "When is yoga?" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(json["error"]["code"], "generation_failed");
        assert!(json["error"]["message"]
            .as_str()
            .unwrap()
            .contains("upstream unavailable"));
    }

    #[tokio::test]
    async fn test_least_recently_used_session_evicted() {
        let tmp = TempDir::new().unwrap();
        let mut config = fixture(tmp.path());
        config.server.max_sessions = 2;
        let app = app_with(config, EchoClient::ok("Yoga is every morning."));

        assert_eq!(chat(&app, "alice").await, StatusCode::OK);
        assert_eq!(chat(&app, "bob").await, StatusCode::OK);
        assert_eq!(chat(&app, "alice").await, StatusCode::OK);
        assert_eq!(chat(&app, "carol").await, StatusCode::OK);

        let (status, _) = send(&app, "GET", "/sessions/bob", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, json) = send(&app, "GET", "/sessions/alice", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["history"].as_array().unwrap().len(), 2);
        let (status, _) = send(&app, "GET", "/sessions/carol", None).await;
        assert_eq!(status, StatusCode::OK);

        let (_, json) = send(&app, "GET", "/stats", None).await;
        assert_eq!(json["active_sessions"], 2);
    }

    #[test]
    fn test_sessions_capacity_never_exceeded() {
        let mut sessions = Sessions::new(3);
        for i in 0..10 {
            sessions.get_or_create(format!("s{i}"));
            assert!(sessions.len() <= 3);
        }
        assert!(sessions.get("s9").is_some());
        assert!(sessions.get("s0").is_none());
        assert!(sessions.remove("s8"));
        assert!(!sessions.remove("s8"));
    }

    #[tokio::test]
    async fn test_chat_store_failure_is_internal() {
        let tmp = TempDir::new().unwrap();
        let mut config = fixture(tmp.path());
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        config.store.path = blocker.join("fitflix.sqlite");
        let app = app_with(config, EchoClient::ok("x"));

        let (status, json) = send(
            &app,
            "POST",
            "/chat",
            Some(serde_json::json!({ "question": "When is yoga?" })),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"]["code"], "internal");
    }

    #[tokio::test]
    async fn test_retrieve_and_stats() {
        let tmp = TempDir::new().unwrap();
        let app = app(&tmp, EchoClient::ok("x"));

        let (status, json) = send(
            &app,
            "POST",
            "/retrieve",
            Some(serde_json::json!({ "query": "protein shakes", "top_k": 2 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let results = json["results"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["metadata"]["source"], "nutrition.md");
        assert_eq!(results[0]["rank"], 1);

        let (status, json) = send(
            &app,
            "POST",
            "/retrieve",
            Some(serde_json::json!({ "query": "protein", "category": "classes" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["results"].as_array().unwrap().len(), 1);

        let (status, _) = send(
            &app,
            "POST",
            "/retrieve",
            Some(serde_json::json!({ "query": "" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, json) = send(&app, "GET", "/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["retrieval"]["status"], "ready");
        assert_eq!(json["retrieval"]["document_count"], 3);
        assert_eq!(json["model"]["model_name"], "echo");
        assert_eq!(json["embedding_model"], "feature-hash");
    }
}
