use crate::models::chat::SessionResponse;
use crate::services::ConversationManager;
use crate::utils::error::ApiError;
use axum::{extract::Extension, Json};
use std::sync::Arc;

pub async fn create_session_handler(
    Extension(manager): Extension<Arc<ConversationManager>>,
) -> Result<Json<SessionResponse>, ApiError> {
    let state = manager.create_session()?;

    Ok(Json(SessionResponse {
        session_id: state.session_id,
        message: "New session created".to_string(),
    }))
}
