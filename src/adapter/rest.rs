//! REST + SSE surface for the browser console and scripts (spec §6).
//!
//! Router shape, CORS layer, SSE streaming, and graceful shutdown are
//! grounded directly on `api/server.rs`'s `start_http_server` /
//! `events_sse` (the teacher's only HTTP entry point): same
//! `Router::new().nest("/api", ...).layer(cors).with_state(state)`
//! assembly, same `axum::serve(...).with_graceful_shutdown(...)` wiring,
//! same `async_stream::stream!` SSE loop with a `Lagged` notice on
//! overflow. The console UI itself is out of scope (spec §1 Non-goals),
//! so there is no static-asset fallback here, only the API surface and
//! the SSE stream it serves.

use std::collections::{HashMap, HashSet};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::core_api::CoreApi;
use crate::domain::{ImageAttachment, Role, ThreadFilter, ThreadStatus};
use crate::error::BusError;
use crate::invite::InviteOutcome;

#[derive(Clone)]
pub struct RestState {
    pub core: Arc<CoreApi>,
    pub upload_dir: PathBuf,
    pub upload_max_total_bytes: Option<u64>,
}

impl IntoResponse for BusError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, BusError>;

pub fn router(state: RestState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/threads", get(list_threads).post(create_thread))
        .route("/threads/{id}", get(get_thread).delete(delete_thread))
        .route(
            "/threads/{id}/messages",
            get(list_messages).post(post_message),
        )
        .route("/threads/{id}/state", post(set_thread_state))
        .route("/threads/{id}/close", post(close_thread))
        .route("/threads/{id}/archive", post(archive_thread))
        .route("/threads/{id}/unarchive", post(unarchive_thread))
        .route("/agents", get(list_agents))
        .route("/agents/register", post(register_agent))
        .route("/agents/heartbeat", post(heartbeat))
        .route("/agents/unregister", post(unregister))
        .route("/agents/invite", post(invite_agent))
        .route("/upload/image", post(upload_image));

    Router::new()
        .route("/health", get(health))
        .route("/events", get(events_sse))
        .nest("/api", api_routes)
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until `shutdown_rx` flips to `true`. Mirrors the
/// teacher's `start_http_server` signature and graceful-shutdown wiring.
pub async fn start_http_server(
    bind: SocketAddr,
    state: RestState,
    shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(%bind, "HTTP server listening");

    let handle = tokio::spawn(async move {
        let mut shutdown = shutdown_rx;
        if let Err(error) = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|v| *v).await;
            })
            .await
        {
            tracing::error!(%error, "HTTP server exited with error");
        }
    });

    Ok(handle)
}

// ── Response/request shapes ─────────────────────────────────────────

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(Deserialize)]
struct ListThreadsQuery {
    status: Option<String>,
    include_archived: Option<u8>,
}

async fn list_threads(
    State(state): State<RestState>,
    Query(query): Query<ListThreadsQuery>,
) -> ApiResult<Vec<crate::domain::Thread>> {
    let filter = ThreadFilter {
        status: query.status.as_deref().and_then(ThreadStatus::parse),
        include_archived: query.include_archived.unwrap_or(0) != 0,
    };
    let threads = state.core.list_threads(filter).await?;
    Ok(Json(threads))
}

#[derive(Deserialize)]
struct CreateThreadRequest {
    topic: String,
    #[serde(default)]
    metadata: HashMap<String, serde_json::Value>,
}

async fn create_thread(
    State(state): State<RestState>,
    Json(req): Json<CreateThreadRequest>,
) -> ApiResult<crate::domain::Thread> {
    let thread = state.core.create_thread(&req.topic, req.metadata).await?;
    Ok(Json(thread))
}

async fn get_thread(
    State(state): State<RestState>,
    Path(id): Path<String>,
) -> ApiResult<crate::domain::Thread> {
    Ok(Json(state.core.get_thread(&id).await?))
}

async fn delete_thread(
    State(state): State<RestState>,
    Path(id): Path<String>,
) -> Result<StatusCode, BusError> {
    state.core.delete_thread(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct ListMessagesQuery {
    after_seq: Option<i64>,
    limit: Option<i64>,
    include_system_prompt: Option<u8>,
}

async fn list_messages(
    State(state): State<RestState>,
    Path(id): Path<String>,
    Query(query): Query<ListMessagesQuery>,
) -> ApiResult<Vec<crate::domain::Message>> {
    let messages = state
        .core
        .list_messages(
            &id,
            query.after_seq.unwrap_or(0),
            query.limit.unwrap_or(200),
            query.include_system_prompt.unwrap_or(0) != 0,
        )
        .await?;
    Ok(Json(messages))
}

#[derive(Deserialize)]
struct PostMessageRequest {
    author: String,
    #[serde(default)]
    author_id: Option<String>,
    role: String,
    content: serde_json::Value,
    #[serde(default)]
    mentions: HashSet<String>,
    #[serde(default)]
    metadata: HashMap<String, serde_json::Value>,
}

async fn post_message(
    State(state): State<RestState>,
    Path(id): Path<String>,
    Json(req): Json<PostMessageRequest>,
) -> ApiResult<crate::domain::Message> {
    let role = Role::parse(&req.role)
        .ok_or_else(|| BusError::invalid_input(format!("unknown role {}", req.role)))?;
    let message = state
        .core
        .post_message(
            &id,
            req.author_id,
            &req.author,
            role,
            &req.content,
            req.mentions,
            req.metadata,
        )
        .await?;
    Ok(Json(message))
}

#[derive(Deserialize)]
struct SetThreadStateRequest {
    state: String,
}

async fn set_thread_state(
    State(state): State<RestState>,
    Path(id): Path<String>,
    Json(req): Json<SetThreadStateRequest>,
) -> ApiResult<crate::domain::Thread> {
    let status = ThreadStatus::parse(&req.state)
        .ok_or_else(|| BusError::invalid_input(format!("unknown state {}", req.state)))?;
    Ok(Json(state.core.set_thread_state(&id, status).await?))
}

#[derive(Deserialize, Default)]
struct CloseThreadRequest {
    summary: Option<String>,
}

async fn close_thread(
    State(state): State<RestState>,
    Path(id): Path<String>,
    body: Option<Json<CloseThreadRequest>>,
) -> ApiResult<crate::domain::Thread> {
    let summary = body.map(|Json(b)| b.summary).unwrap_or(None);
    Ok(Json(state.core.close_thread(&id, summary).await?))
}

async fn archive_thread(
    State(state): State<RestState>,
    Path(id): Path<String>,
) -> ApiResult<crate::domain::Thread> {
    Ok(Json(state.core.archive_thread(&id).await?))
}

async fn unarchive_thread(
    State(state): State<RestState>,
    Path(id): Path<String>,
) -> ApiResult<crate::domain::Thread> {
    Ok(Json(state.core.unarchive_thread(&id).await?))
}

async fn list_agents(State(state): State<RestState>) -> ApiResult<Vec<crate::domain::AgentView>> {
    Ok(Json(state.core.list_agents().await?))
}

#[derive(Deserialize)]
struct RegisterAgentRequest {
    ide: String,
    model: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    capabilities: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct RegisterAgentResponse {
    agent_id: String,
    token: String,
}

async fn register_agent(
    State(state): State<RestState>,
    Json(req): Json<RegisterAgentRequest>,
) -> ApiResult<RegisterAgentResponse> {
    let agent = state
        .core
        .register_agent(&req.ide, &req.model, req.name, req.capabilities)
        .await?;
    Ok(Json(RegisterAgentResponse {
        agent_id: agent.id,
        token: agent.token,
    }))
}

#[derive(Deserialize)]
struct AgentTokenRequest {
    agent_id: String,
    token: String,
}

async fn heartbeat(
    State(state): State<RestState>,
    Json(req): Json<AgentTokenRequest>,
) -> Result<StatusCode, BusError> {
    state.core.heartbeat(&req.agent_id, &req.token).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn unregister(
    State(state): State<RestState>,
    Json(req): Json<AgentTokenRequest>,
) -> Result<StatusCode, BusError> {
    state.core.unregister_agent(&req.agent_id, &req.token).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct InviteAgentRequest {
    agent_name: String,
    thread_id: String,
}

async fn invite_agent(
    State(state): State<RestState>,
    Json(req): Json<InviteAgentRequest>,
) -> ApiResult<InviteOutcome> {
    let outcome = state.core.invite_agent(&req.agent_name, &req.thread_id).await?;
    Ok(Json(outcome))
}

async fn upload_image(
    State(state): State<RestState>,
    mut multipart: Multipart,
) -> Result<Json<ImageAttachment>, BusError> {
    tokio::fs::create_dir_all(&state.upload_dir)
        .await
        .map_err(|e| BusError::internal(format!("failed to create upload dir: {e}")))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| BusError::invalid_input(format!("malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let original_name = field.file_name().unwrap_or("upload").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| BusError::invalid_input(format!("failed to read upload: {e}")))?;

        if let Some(max) = state.upload_max_total_bytes {
            if bytes.len() as u64 > max {
                return Err(BusError::invalid_input(format!(
                    "upload exceeds maximum of {max} bytes"
                )));
            }
        }

        let ext = std::path::Path::new(&original_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin");
        let stored_name = format!("{}.{}", uuid::Uuid::new_v4(), ext);
        let dest = state.upload_dir.join(&stored_name);
        tokio::fs::write(&dest, &bytes)
            .await
            .map_err(|e| BusError::internal(format!("failed to write upload: {e}")))?;

        return Ok(Json(ImageAttachment {
            url: format!("/uploads/{stored_name}"),
            name: original_name,
        }));
    }

    Err(BusError::invalid_input("multipart body missing a 'file' field"))
}

// ── SSE ──────────────────────────────────────────────────────────────

/// `{"type":"…","payload":{…}}` per spec §6. `Event` is internally
/// tagged for storage/MCP convenience, so we peel its own `type` field
/// back out into this envelope rather than double-tagging the wire
/// payload.
#[derive(Serialize)]
struct SseEnvelope {
    #[serde(rename = "type")]
    kind: &'static str,
    payload: serde_json::Value,
}

async fn events_sse(
    State(state): State<RestState>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let mut rx = state.core.events().subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let kind = event.kind();
                    let mut payload = serde_json::to_value(&event).unwrap_or(serde_json::Value::Null);
                    if let serde_json::Value::Object(map) = &mut payload {
                        map.remove("type");
                    }
                    let envelope = SseEnvelope { kind, payload };
                    if let Ok(json) = serde_json::to_string(&envelope) {
                        yield Ok(SseEvent::default().event(kind).data(json));
                    }
                }
                Err(RecvError::Lagged(count)) => {
                    warn!(count, "SSE subscriber lagged, events dropped");
                    let notice = serde_json::json!({"type": "bus.lagged", "payload": {"count": count}});
                    yield Ok(SseEvent::default().event("bus.lagged").data(notice.to_string()));
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(std::time::Duration::from_secs(15)).text("ping"))
}
