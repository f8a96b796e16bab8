//! HTTP surface over the pipeline: thin I/O wrappers, no business logic.
//!
//! Callers arrive pre-authenticated; the `x-user-id` header carries the
//! caller identity and is trusted verbatim.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        DefaultBodyLimit, Multipart, Path, State, WebSocketUpgrade,
    },
    http::{header, HeaderMap, Method},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use courrier_shared::codec::{self, SymmetricKey};
use courrier_shared::types::ChatMessage;
use courrier_store::Database;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::history;
use crate::hub::SessionRegistry;
use crate::pipeline::IngestPipeline;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: IngestPipeline,
    pub db: Arc<Mutex<Database>>,
    pub hub: SessionRegistry,
    pub key: SymmetricKey,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    // Body limit sits above the pipeline's 1 MiB payload ceiling so the
    // pipeline's own validation produces the 400, not the framework.
    Router::new()
        .route("/health", get(health_check))
        .route("/messages", post(send_message))
        .route("/attachments", post(upload_attachment))
        .route("/attachments/:id", get(download_attachment))
        .route("/history", post(fetch_history))
        .route("/events", get(events_ws))
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "HTTP API listening");
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageRequest {
    recipient_id: String,
    content: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadData {
    recipient_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryRequest {
    user_id: String,
    recipient_id: String,
}

/// Caller identity, already validated upstream of this service.
fn caller_id(headers: &HeaderMap) -> Result<String, ServerError> {
    headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(String::from)
        .ok_or_else(|| ServerError::Validation("Missing x-user-id header".to_string()))
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SendMessageRequest>,
) -> Result<Json<ChatMessage>, ServerError> {
    let caller = caller_id(&headers)?;
    let delivered = state
        .pipeline
        .send_message(&caller, &request.recipient_id, &request.content)
        .await?;
    Ok(Json(delivered))
}

async fn upload_attachment(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<ChatMessage>, ServerError> {
    let caller = caller_id(&headers)?;

    let mut file: Option<(String, bytes::Bytes)> = None;
    let mut upload_data: Option<UploadData> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::Validation(format!("Multipart error: {e}")))?
    {
        match field.name().unwrap_or("") {
            "file" => {
                let file_name = field.file_name().unwrap_or("").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::Validation(format!("Failed to read file: {e}")))?;
                file = Some((file_name, data));
            }
            "uploadData" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| ServerError::Validation(format!("Failed to read field: {e}")))?;
                upload_data = Some(
                    serde_json::from_str(&raw)
                        .map_err(|e| ServerError::Validation(format!("Invalid uploadData: {e}")))?,
                );
            }
            _ => {}
        }
    }

    let (file_name, data) =
        file.ok_or_else(|| ServerError::Validation("No file uploaded".to_string()))?;
    let upload_data = upload_data
        .ok_or_else(|| ServerError::Validation("Missing uploadData field".to_string()))?;

    let delivered = state
        .pipeline
        .ingest_attachment(&caller, &upload_data.recipient_id, &file_name, data)
        .await?;
    Ok(Json(delivered))
}

async fn download_attachment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Response, ServerError> {
    let caller = caller_id(&headers)?;

    let record = state
        .db
        .lock()
        .map_err(|_| ServerError::Internal("store lock poisoned".to_string()))?
        .get_message_by_id(id)?;

    // A caller outside the conversation learns nothing, not even existence.
    if !record.involves(&caller) {
        return Err(ServerError::NotFound("File not found".to_string()));
    }

    let blob = state
        .db
        .lock()
        .map_err(|_| ServerError::Internal("store lock poisoned".to_string()))?
        .get_attachment(id)?;

    let file_name = String::from_utf8(codec::open(&state.key, &record.content)?)
        .map_err(courrier_shared::CodecError::from)?;
    let data = codec::open_raw(&state.key, &blob.data)?;

    Ok((
        [
            (
                header::CONTENT_TYPE,
                "application/octet-stream".to_string(),
            ),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        data,
    )
        .into_response())
}

async fn fetch_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<HistoryRequest>,
) -> Result<Json<Vec<ChatMessage>>, ServerError> {
    let caller = caller_id(&headers)?;

    if request.user_id.is_empty() || request.recipient_id.is_empty() {
        return Err(ServerError::Validation(
            "Invalid request payload".to_string(),
        ));
    }
    if caller != request.user_id && caller != request.recipient_id {
        return Err(ServerError::Forbidden(
            "Caller is not a participant in this conversation".to_string(),
        ));
    }

    let messages =
        history::fetch_conversation(&state.db, &state.key, &request.user_id, &request.recipient_id)
            .await?;
    Ok(Json(messages))
}

async fn events_ws(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ServerError> {
    let caller = caller_id(&headers)?;
    Ok(ws.on_upgrade(move |socket| handle_session(socket, state.hub.clone(), caller)))
}

/// Bridge one websocket to one hub session. Sessions are push-only;
/// inbound client frames are drained and ignored.
async fn handle_session(mut socket: WebSocket, hub: SessionRegistry, user_id: String) {
    let mut session = hub.connect(&user_id).await;

    loop {
        tokio::select! {
            event = session.rx.recv() => match event {
                Some(frame) => {
                    if socket.send(WsMessage::Text(frame)).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(_)) => {}
                _ => break,
            },
        }
    }

    hub.disconnect(&user_id, session.id).await;
}
