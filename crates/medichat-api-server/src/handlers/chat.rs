use crate::models::chat::{ChatRequest, ChatResponse};
use crate::services::ConversationManager;
use crate::utils::error::ApiError;
use axum::{extract::Extension, Json};
use std::sync::Arc;
use tracing::info;

pub async fn chat_handler(
    Extension(manager): Extension<Arc<ConversationManager>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let outcome = manager
        .handle_message(
            request.session_id.as_deref(),
            &request.message,
            request.location.as_deref(),
        )
        .await?;

    info!(
        "Chat completed: session={}, type={}",
        outcome.session_id,
        outcome.query_type.as_str()
    );

    Ok(Json(ChatResponse {
        session_id: outcome.session_id,
        response: outcome.response,
        data: outcome.data,
        query_type: outcome.query_type,
    }))
}
