use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::database::ConversationRow;
use crate::models::chat::ChatMessage;
use crate::services::clinic_locator::ClinicLocator;
use crate::services::query_classifier::{classify, QueryCategory};
use crate::services::symptom_checker::SymptomChecker;
use crate::utils::error::ApiError;

use super::session::SessionCache;
use super::types::{ConversationMetadata, ConversationState, HandlerResult};

/// Trait for the embedding service
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Trait for the generation service
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Trait for the conversation document store (write + similarity search)
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ConversationStore: Send + Sync {
    async fn search(
        &self,
        user_id: &str,
        embedding: &[f32],
        limit: i64,
    ) -> Result<Vec<ConversationRow>>;

    async fn insert(
        &self,
        content: &str,
        metadata: ConversationMetadata,
        embedding: &[f32],
    ) -> Result<()>;
}

/// Trait for the encyclopedic knowledge lookup
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait KnowledgeProvider: Send + Sync {
    /// Ok(None) on a clean miss; Err only on transport failure.
    async fn lookup(&self, key: &str) -> Result<Option<String>>;
}

/// Resolved coordinate pair in (lat, lon) order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Raw point-of-interest candidate as returned by the map backend.
#[derive(Debug, Clone)]
pub struct FacilityCandidate {
    pub name: Option<String>,
    pub category: Option<String>,
    pub lat: f64,
    pub lon: f64,
    pub housenumber: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
}

/// Trait for geocoding + medical facility search
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait GeoProvider: Send + Sync {
    /// Ok(None) when the free-text location resolves to nothing.
    async fn geocode(&self, query: &str) -> Result<Option<GeoPoint>>;

    async fn search_facilities(
        &self,
        origin: GeoPoint,
        radius_meters: u32,
    ) -> Result<Vec<FacilityCandidate>>;
}

/// Final composed reply for one chat exchange.
#[derive(Debug)]
pub struct ChatOutcome {
    pub session_id: String,
    pub response: String,
    pub data: serde_json::Value,
    pub query_type: QueryCategory,
}

/// Orchestrates one chat exchange: session resolution, context retrieval,
/// classification, handler dispatch, memory update and best-effort
/// persistence.
pub struct ConversationManager {
    sessions: SessionCache,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    llm_provider: Arc<dyn LlmProvider>,
    store: Arc<dyn ConversationStore>,
    symptom_checker: SymptomChecker,
    clinic_locator: ClinicLocator,
    retrieval_top_k: i64,
}

impl ConversationManager {
    pub fn new(
        embedding_provider: Arc<dyn EmbeddingProvider>,
        llm_provider: Arc<dyn LlmProvider>,
        store: Arc<dyn ConversationStore>,
        symptom_checker: SymptomChecker,
        clinic_locator: ClinicLocator,
        retrieval_top_k: i64,
    ) -> Self {
        Self {
            sessions: SessionCache::new(),
            embedding_provider,
            llm_provider,
            store,
            symptom_checker,
            clinic_locator,
            retrieval_top_k,
        }
    }

    /// Issue a new session (used by POST /api/sessions).
    pub fn create_session(&self) -> Result<ConversationState, ApiError> {
        if !self.sessions.can_create_new_session() {
            return Err(ApiError::InternalError(
                "Memory limit reached, cannot create new session".to_string(),
            ));
        }
        Ok(self.sessions.create())
    }

    /// Resolve an optional session id, issuing a fresh session when the id is
    /// absent or unknown (matches the HTTP boundary contract).
    fn get_or_create_session(
        &self,
        session_id: Option<&str>,
    ) -> Result<ConversationState, ApiError> {
        if let Some(id) = session_id {
            if let Some(state) = self.sessions.get(id) {
                return Ok(state);
            }
            debug!("Unknown or expired session {}, issuing a new one", id);
        }
        self.create_session()
    }

    pub async fn handle_message(
        &self,
        session_id: Option<&str>,
        message: &str,
        location: Option<&str>,
    ) -> Result<ChatOutcome, ApiError> {
        // Reject before any session or provider work
        if message.trim().is_empty() {
            return Err(ApiError::BadRequest("No message provided".to_string()));
        }

        let mut state = self.get_or_create_session(session_id)?;

        info!(
            "Chat request: user={}, session={}, message_len={}",
            state.user_id,
            state.session_id,
            message.len()
        );

        // Prior context first, so the user turn below cannot match itself
        let context = self.retrieve_context(&state.user_id, message).await;

        state.messages.push(ChatMessage::user(message));

        let query_type = classify(message);
        debug!("Query classified as {:?}", query_type);

        let result: HandlerResult = match query_type {
            QueryCategory::Symptom => self.symptom_checker.analyze(message).await?,
            QueryCategory::Location => self.clinic_locator.locate(location).await,
            QueryCategory::General => self.handle_general(message, &context).await?,
        };

        state.messages.push(ChatMessage::assistant(&result.response));
        state.total_exchanges += 1;
        state.touch();
        self.sessions.set(state.session_id.clone(), state.clone());

        // Best-effort: losing one history entry only degrades future context
        self.persist_exchange(&state.user_id, message, &result, query_type)
            .await;

        Ok(ChatOutcome {
            session_id: state.session_id,
            response: result.response,
            data: result.data,
            query_type,
        })
    }

    /// Fetch up to `retrieval_top_k` prior conversation excerpts for this
    /// user. Degrades to an empty list on any failure; retrieval problems
    /// must never fail the request.
    async fn retrieve_context(&self, user_id: &str, query: &str) -> Vec<String> {
        let embedding = match self.embedding_provider.embed(query).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!("Context embedding failed, continuing without context: {}", e);
                return Vec::new();
            }
        };

        match self
            .store
            .search(user_id, &embedding, self.retrieval_top_k)
            .await
        {
            Ok(rows) => {
                debug!("Retrieved {} prior conversations for user {}", rows.len(), user_id);
                rows.into_iter().map(|row| row.content).collect()
            }
            Err(e) => {
                warn!("Context retrieval failed, continuing without context: {}", e);
                Vec::new()
            }
        }
    }

    /// Open-ended medical Q&A grounded on retrieved context. Single LLM call,
    /// no retry; generation failure is fatal to the request.
    async fn handle_general(
        &self,
        query: &str,
        context: &[String],
    ) -> Result<HandlerResult, ApiError> {
        let context_str = if context.is_empty() {
            "No prior context.".to_string()
        } else {
            context.join("\n")
        };

        let messages = vec![
            ChatMessage::system(
                "You are a helpful medical information assistant. Be empathetic \
                 but clear about medical facts, answer accurately, and recommend \
                 seeking professional medical advice when appropriate.",
            ),
            ChatMessage::user(format!(
                "Previous conversation context:\n{}\n\nCurrent query: {}",
                context_str, query
            )),
        ];

        let response = self
            .llm_provider
            .generate(&messages)
            .await
            .map_err(|e| ApiError::LlmError(e.to_string()))?;

        let data = serde_json::json!({ "response": response });
        Ok(HandlerResult { response, data })
    }

    /// Persist the exchange as one immutable conversation document.
    /// Failures are logged and absorbed; the response is already composed.
    async fn persist_exchange(
        &self,
        user_id: &str,
        query: &str,
        result: &HandlerResult,
        query_type: QueryCategory,
    ) {
        let content = format!("User: {}\nResponse: {}", query, result.data);

        let embedding = match self.embedding_provider.embed(&content).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!("Skipping conversation persistence, embedding failed: {}", e);
                return;
            }
        };

        let metadata = ConversationMetadata {
            user_id: user_id.to_string(),
            timestamp: chrono::Utc::now(),
            query_type,
        };

        if let Err(e) = self.store.insert(&content, metadata, &embedding).await {
            warn!("Failed to store conversation for user {}: {}", user_id, e);
        } else {
            debug!("Stored conversation for user {}", user_id);
        }
    }

    pub fn session_stats(&self) -> super::session::SessionStats {
        self.sessions.stats()
    }

    pub fn cleanup_expired_sessions(&self) -> usize {
        self.sessions.cleanup_expired()
    }
}
