//! HTTP Handlers

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};

use portfolio_advisor::analysis::Attachment;
use portfolio_advisor::assistant::PERFORMANCE_COMMAND;
use portfolio_advisor::{AssistantReply, ProgressUpdate, UserContext};

use crate::config::USER_ID_HEADER;
use crate::state::AppState;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub llm_connected: bool,
    pub market_data_live: bool,
    pub active_sessions: u64,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConversationRequest {
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// Report file, base64-encoded for JSON transport
#[derive(Debug, Serialize)]
pub struct AttachmentBody {
    pub filename: String,
    pub content_type: String,
    pub data_base64: String,
}

impl From<Attachment> for AttachmentBody {
    fn from(attachment: Attachment) -> Self {
        Self {
            filename: attachment.filename,
            content_type: attachment.content_type,
            data_base64: BASE64.encode(&attachment.bytes),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub conversation_id: String,
    pub response: String,
    pub requires_action: bool,
    pub error: bool,
    pub in_progress: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<AttachmentBody>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub progress_messages: Vec<ProgressUpdate>,
}

impl ChatResponse {
    fn new(conversation_id: String, reply: AssistantReply) -> Self {
        Self {
            conversation_id,
            response: reply.response_text,
            requires_action: reply.requires_action,
            error: reply.error,
            in_progress: reply.in_progress,
            attachment: reply.attachment.map(AttachmentBody::from),
            progress_messages: reply.progress_messages,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.into(),
        }),
    )
}

/// Signed-in user, as asserted by the auth layer in front of this server
fn user_id(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "Sign in required", "UNAUTHENTICATED"))
}

fn conversation_id(requested: Option<String>) -> String {
    requested
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// Run one turn on the caller's conversation, holding its lock throughout
async fn run_turn(
    state: &AppState,
    user_id: &str,
    conversation_id: &str,
    message: &str,
) -> Result<AssistantReply, ApiError> {
    let has_credentials = state.user_store.has_credentials(user_id).await.map_err(|e| {
        tracing::error!(error = %e, "User store unavailable");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, e.user_message(), "STORE_ERROR")
    })?;

    let session = state
        .sessions
        .get_or_create(user_id, conversation_id, || state.assistant.new_session())
        .await;
    let mut session = session.lock().await;

    let user = UserContext::new(user_id, has_credentials);
    Ok(state.assistant.handle(&mut session, &user, message).await)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let llm_connected = state.provider.health_check().await.unwrap_or(false);

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        llm_connected,
        market_data_live: state.market_data_live,
        active_sessions: state.sessions.count().await,
    })
}

/// One chat turn
pub async fn chat_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let user_id = user_id(&headers)?;
    if payload.message.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Message is empty", "EMPTY_MESSAGE"));
    }

    let conversation_id = conversation_id(payload.conversation_id);
    let reply = run_turn(&state, &user_id, &conversation_id, &payload.message).await?;
    Ok(Json(ChatResponse::new(conversation_id, reply)))
}

/// Drop a conversation's history, keeping the system prompt
pub async fn clear_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ConversationRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let user_id = user_id(&headers)?;
    let conversation_id = payload
        .conversation_id
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "conversation_id is required", "MISSING_CONVERSATION"))?;

    if let Some(session) = state.sessions.get(&user_id, &conversation_id).await {
        session.lock().await.clear();
    }
    Ok(Json(StatusResponse { status: "success" }))
}

/// End a conversation and release its session
pub async fn end_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(conversation_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let user_id = user_id(&headers)?;
    if !state.sessions.remove(&user_id, &conversation_id).await {
        return Err(api_error(StatusCode::NOT_FOUND, "No such conversation", "UNKNOWN_CONVERSATION"));
    }
    tracing::debug!(%user_id, %conversation_id, "Conversation ended");
    Ok(Json(StatusResponse { status: "success" }))
}

/// Multi-timeframe performance analysis with a CSV attachment
pub async fn portfolio_performance(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Option<Json<ConversationRequest>>,
) -> Result<Json<ChatResponse>, ApiError> {
    let user_id = user_id(&headers)?;
    let Json(payload) = payload.unwrap_or_default();

    let conversation_id = conversation_id(payload.conversation_id);
    let reply = run_turn(&state, &user_id, &conversation_id, PERFORMANCE_COMMAND).await?;
    Ok(Json(ChatResponse::new(conversation_id, reply)))
}
