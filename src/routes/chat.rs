use axum::{
    extract::{Path, State},
    Extension, Json,
};
use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    middleware::RequestId,
    models::{ChatRequest, ChatResponse, StoredMessage},
    routes::AppState,
};

/// Handler for one chat turn
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<ChatRequest>,
) -> AppResult<Json<ChatResponse>> {
    tracing::info!(
        request_id = %request_id,
        user_id = %request.user_id,
        conversation_id = ?request.conversation_id,
        "Processing chat message"
    );

    let response = state.chat.handle_turn(request).await?;

    tracing::info!(
        request_id = %request_id,
        conversation_id = response.conversation_id,
        movies = response.movies.len(),
        "Chat message answered"
    );

    Ok(Json(response))
}

/// Handler listing a conversation's messages, oldest first
pub async fn conversation_messages(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<i64>,
) -> AppResult<Json<Vec<StoredMessage>>> {
    if state
        .conversations
        .get_conversation(conversation_id)
        .await?
        .is_none()
    {
        return Err(AppError::NotFound(format!(
            "conversation {}",
            conversation_id
        )));
    }

    let messages = state.conversations.list_messages(conversation_id).await?;
    Ok(Json(messages))
}
