//! HTTP handlers: the WebSocket upgrade and the read-only chat REST API.

use axum::Json;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use palaver_core::{ChatError, ChatPreview, OutboundMessage, UserId};
use palaver_store::clamp_page;
use serde::Deserialize;
use tracing::error;

use crate::auth::AuthUser;
use crate::connection::serve_connection;
use crate::health::{self, HealthResponse};
use crate::metrics;
use crate::server::AppState;
use crate::transport;

/// Error body for REST failures.
pub struct ApiError(ChatError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            ChatError::BadRequest(_) | ChatError::Decode(_) | ChatError::UnknownEvent(_) => {
                StatusCode::BAD_REQUEST
            }
            ChatError::NotInConversation => StatusCode::CONFLICT,
            ChatError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self.0.to_outbound())).into_response()
    }
}

/// GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(state.start_time, state.deps.hub.online_count()))
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => metrics::render(handle).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// GET /ws
pub async fn ws_handler(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ws: WebSocketUpgrade,
) -> Response {
    let deps = state.deps.clone();
    ws.on_upgrade(move |socket| async move {
        let (sink, stream) = transport::split(socket);
        serve_connection(sink, stream, user_id, deps).await;
    })
}

/// GET /api/v1/chats
pub async fn list_chats(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<ChatPreview>>, ApiError> {
    state
        .deps
        .store
        .list_previews(&user_id)
        .await
        .map(Json)
        .map_err(|err| {
            error!(%user_id, op = "list_previews", error = %err, "could not get all chats");
            ApiError(ChatError::Internal("could not get all chats".into()))
        })
}

/// Pagination for the history endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    /// Messages to skip, newest first.
    pub offset: Option<i64>,
    /// Page size, at most 50.
    pub limit: Option<i64>,
}

/// GET /api/v1/chats/{peer_id}
pub async fn chat_history(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(peer): Path<String>,
    Query(page): Query<HistoryQuery>,
) -> Result<Json<Vec<OutboundMessage>>, ApiError> {
    let peer: UserId = peer
        .parse()
        .map_err(|_| ApiError(ChatError::BadRequest("invalid receiver id".into())))?;
    if peer == user_id {
        return Err(ApiError(ChatError::BadRequest(
            "could not open a chat with yourself".into(),
        )));
    }

    let (offset, limit) = clamp_page(page.offset, page.limit);
    let messages = state
        .deps
        .store
        .list_history(&user_id, &peer, offset, limit)
        .await
        .map_err(|err| {
            error!(%user_id, peer_id = %peer, op = "list_history", error = %err, "error while getting chat history");
            ApiError(ChatError::Internal("could not get chat history".into()))
        })?;

    Ok(Json(
        messages
            .iter()
            .map(|message| message.to_outbound(&user_id, None))
            .collect(),
    ))
}
