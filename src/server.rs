//! HTTP presentation layer.
//!
//! Serves one [`Session`] per client over a JSON API. Each session sits
//! behind its own `tokio::sync::Mutex`, so concurrent requests against the
//! same session queue up and are handled one at a time, in arrival order.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `POST`   | `/sessions` | Create a session, returns `{ "id": ... }` |
//! | `DELETE` | `/sessions/{id}` | Drop a session |
//! | `GET`    | `/sessions/{id}/transcript` | The chat transcript |
//! | `GET`    | `/sessions/{id}/activity` | What the session is doing |
//! | `POST`   | `/sessions/{id}/upload` | Replace the session's documents |
//! | `POST`   | `/sessions/{id}/messages` | Ask a question |
//!
//! Upload bodies carry base64 document data:
//!
//! ```json
//! { "documents": [ { "name": "report.pdf", "data": "JVBERi0xLjQK..." } ] }
//! ```
//!
//! Recoverable failures (a document that would not ingest, a question that
//! could not be answered) come back as `notices` in a `200` response.
//!
//! # Waiting
//!
//! `transcript`, `upload` and `messages` queue behind an event already in
//! flight on the same session, so a transcript read waits for a pending
//! answer. `GET /sessions/{id}/activity` does not take the session lock and
//! reports what the session is doing (`idle`, `ingesting`, `thinking`).
//!
//! # Expiry
//!
//! Sessions unused for `[server].session_idle_secs` are dropped by a
//! background sweep. Sessions with an event in flight are never dropped.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "unsupported document type: notes.txt" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `reset_failed` (500).

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use uuid::Uuid;

use crate::assistant::AssistantFactory;
use crate::config::Config;
use crate::error::Notice;
use crate::models::{SubmitOutcome, Turn, UploadOutcome, UploadedDocument};
use crate::progress::{Activity, SharedActivity};
use crate::session::Session;
use crate::staging::Stager;

/// How often idle sessions are looked for, at most.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    factory: Arc<dyn AssistantFactory>,
    sessions: Arc<RwLock<HashMap<Uuid, Arc<SessionEntry>>>>,
}

struct SessionEntry {
    session: Mutex<Session>,
    activity: Arc<SharedActivity>,
    last_used: std::sync::Mutex<Instant>,
}

impl SessionEntry {
    fn touch(&self) {
        if let Ok(mut last_used) = self.last_used.lock() {
            *last_used = Instant::now();
        }
    }

    fn idle_for(&self) -> Duration {
        self.last_used
            .lock()
            .map(|last_used| last_used.elapsed())
            .unwrap_or_default()
    }
}

impl AppState {
    pub fn new(config: Config, factory: Arc<dyn AssistantFactory>) -> Self {
        Self {
            config: Arc::new(config),
            factory,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn stager(&self) -> Stager {
        Stager::new(
            self.config.upload.staging_dir.clone(),
            Some(self.config.upload.max_document_bytes),
        )
    }

    async fn entry(&self, id: &str) -> Result<Arc<SessionEntry>, AppError> {
        let id = Uuid::parse_str(id).map_err(|_| bad_request(format!("invalid session id: {}", id)))?;
        let entry = self
            .sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found(format!("no session with id: {}", id)))?;
        entry.touch();
        Ok(entry)
    }

    /// Drop sessions unused for at least `max_idle`, keeping any with an
    /// event in flight. Returns how many were dropped.
    pub async fn expire_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|id, entry| {
            let keep = entry.idle_for() < max_idle || entry.session.try_lock().is_err();
            if !keep {
                info!(session = %id, "idle session expired");
            }
            keep
        });
        before - sessions.len()
    }
}

/// Build the router. Exposed separately from [`run_server`] for tests.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Base64 inflates payloads by a third; leave room for several documents.
    let body_limit = usize::try_from(state.config.upload.max_document_bytes.saturating_mul(4))
        .unwrap_or(usize::MAX);

    Router::new()
        .route("/health", get(handle_health))
        .route("/sessions", post(handle_create_session))
        .route("/sessions/{id}", delete(handle_delete_session))
        .route("/sessions/{id}/transcript", get(handle_transcript))
        .route("/sessions/{id}/activity", get(handle_activity))
        .route("/sessions/{id}/upload", post(handle_upload))
        .route("/sessions/{id}/messages", post(handle_message))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server on `[server].bind` with the default assistant.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let factory = crate::rag::factory(config)?;
    let bind_addr = config.server.bind.clone();
    let state = AppState::new(config.clone(), factory);

    if config.server.session_idle_secs > 0 {
        let max_idle = Duration::from_secs(config.server.session_idle_secs);
        let sweeper = state.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL.min(max_idle));
            loop {
                interval.tick().await;
                sweeper.expire_idle(max_idle).await;
            }
        });
    }

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(bind = %bind_addr, "docchat server listening");
    println!("docchat server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
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
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn reset_failed(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "reset_failed",
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

// ============ Sessions ============

#[derive(Serialize)]
struct CreateSessionResponse {
    id: Uuid,
}

async fn handle_create_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), AppError> {
    let activity = Arc::new(SharedActivity::default());
    let session = Session::start(state.factory.clone(), state.stager())
        .map_err(|e| reset_failed(e.to_string()))?
        .with_activity(activity.clone());
    let entry = SessionEntry {
        session: Mutex::new(session),
        activity,
        last_used: std::sync::Mutex::new(Instant::now()),
    };
    let id = Uuid::new_v4();
    state.sessions.write().await.insert(id, Arc::new(entry));
    info!(session = %id, "session created");
    Ok((StatusCode::CREATED, Json(CreateSessionResponse { id })))
}

async fn handle_delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let uuid = Uuid::parse_str(&id).map_err(|_| bad_request(format!("invalid session id: {}", id)))?;
    match state.sessions.write().await.remove(&uuid) {
        Some(_) => {
            info!(session = %uuid, "session dropped");
            Ok(StatusCode::NO_CONTENT)
        }
        None => Err(not_found(format!("no session with id: {}", id))),
    }
}

// ============ GET /sessions/{id}/transcript ============

#[derive(Serialize)]
struct TranscriptResponse {
    turns: Vec<Turn>,
}

async fn handle_transcript(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TranscriptResponse>, AppError> {
    let entry = state.entry(&id).await?;
    let turns = entry.session.lock().await.transcript().to_vec();
    Ok(Json(TranscriptResponse { turns }))
}

// ============ GET /sessions/{id}/activity ============

async fn handle_activity(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Activity>, AppError> {
    let entry = state.entry(&id).await?;
    Ok(Json(entry.activity.current()))
}

// ============ POST /sessions/{id}/upload ============

#[derive(Deserialize)]
struct UploadRequest {
    documents: Vec<UploadDocument>,
}

#[derive(Deserialize)]
struct UploadDocument {
    name: String,
    /// Standard base64.
    data: String,
}

#[derive(Serialize)]
struct UploadResponse {
    ingested: Vec<String>,
    notices: Vec<Notice>,
}

async fn handle_upload(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UploadRequest>,
) -> Result<Json<UploadResponse>, AppError> {
    let entry = state.entry(&id).await?;

    // The accepted type is a presentation-layer rule; reject before touching the session.
    let mut documents = Vec::with_capacity(req.documents.len());
    for doc in req.documents {
        if !state.config.upload.accepts(&doc.name) {
            return Err(bad_request(format!(
                "unsupported document type: {} (accepted: {})",
                doc.name,
                state.config.upload.accepted_extensions.join(", ")
            )));
        }
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(doc.data.as_bytes())
            .map_err(|e| bad_request(format!("invalid base64 in {}: {}", doc.name, e)))?;
        documents.push(UploadedDocument::new(doc.name, bytes));
    }

    let outcome = entry.session.lock().await.handle_upload(&documents).await;
    match outcome {
        UploadOutcome::Completed { ingested, notices } => {
            Ok(Json(UploadResponse { ingested, notices }))
        }
        UploadOutcome::Aborted(notice) => Err(reset_failed(notice.message)),
    }
}

// ============ POST /sessions/{id}/messages ============

#[derive(Deserialize)]
struct MessageRequest {
    text: String,
}

#[derive(Serialize)]
struct MessageResponse {
    answer: Option<String>,
    notices: Vec<Notice>,
}

async fn handle_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<MessageRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let entry = state.entry(&id).await?;
    let outcome = entry
        .session
        .lock()
        .await
        .handle_message_submit(&req.text)
        .await;
    let response = match outcome {
        SubmitOutcome::Ignored => MessageResponse {
            answer: None,
            notices: Vec::new(),
        },
        SubmitOutcome::Answered(answer) => MessageResponse {
            answer: Some(answer),
            notices: Vec::new(),
        },
        SubmitOutcome::Unanswered(notice) => MessageResponse {
            answer: None,
            notices: vec![notice],
        },
    };
    Ok(Json(response))
}
