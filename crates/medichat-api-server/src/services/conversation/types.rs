use crate::models::chat::ChatMessage;
use crate::services::query_classifier::QueryCategory;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::{Duration, Instant};

/// Sessions idle longer than this are lazily expired by the cache.
pub const SESSION_TTL: Duration = Duration::from_secs(30 * 60);

/// Per-session conversation state. One instance per session id; the message
/// buffer is append-only and never visible to other sessions.
#[derive(Debug, Clone)]
pub struct ConversationState {
    pub session_id: String,
    /// Stable conversation owner, derived once at session creation.
    pub user_id: String,
    pub messages: Vec<ChatMessage>,
    pub created_at: Instant,
    pub last_active: Instant,
    pub total_exchanges: usize,
}

impl ConversationState {
    pub fn new(session_id: String, user_id: String) -> Self {
        let now = Instant::now();
        Self {
            session_id,
            user_id,
            messages: Vec::new(),
            created_at: now,
            last_active: now,
            total_exchanges: 0,
        }
    }

    pub fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    pub fn is_expired(&self) -> bool {
        self.last_active.elapsed() > SESSION_TTL
    }
}

/// Output of one handler invocation: reply text plus a handler-specific
/// structured payload. Consumed by the response composer and the store,
/// never retained past the request.
#[derive(Debug, Clone)]
pub struct HandlerResult {
    pub response: String,
    pub data: serde_json::Value,
}

/// Metadata stored alongside every conversation document.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationMetadata {
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub query_type: QueryCategory,
}
