use serde::Serialize;
use sqlx::FromRow;

/// One stored conversation exchange, as returned by similarity search.
/// `content` is the "User: ...\nResponse: ..." document, `metadata` carries
/// user_id, timestamp and query_type.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ConversationRow {
    pub content: String,
    pub metadata: serde_json::Value,
    pub similarity: f32,
}
