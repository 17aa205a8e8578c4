use crate::models::chat::ChatMessage;
use crate::services::conversation::manager::{KnowledgeProvider, LlmProvider};
use crate::services::conversation::types::HandlerResult;
use crate::utils::error::ApiError;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Grounding context used when the knowledge lookup yields nothing.
/// Generation still proceeds with partial grounding.
const NO_INFORMATION: &str = "No information found.";

#[derive(Debug, Serialize)]
struct SymptomReport {
    symptoms: String,
    analysis: String,
    timestamp: chrono::DateTime<chrono::Utc>,
}

/// Symptom handler: grounds an LLM analysis on an encyclopedic snippet for
/// the reported symptoms. The symptom text is used as the lookup key as-is.
pub struct SymptomChecker {
    knowledge_provider: Arc<dyn KnowledgeProvider>,
    llm_provider: Arc<dyn LlmProvider>,
}

impl SymptomChecker {
    pub fn new(
        knowledge_provider: Arc<dyn KnowledgeProvider>,
        llm_provider: Arc<dyn LlmProvider>,
    ) -> Self {
        Self {
            knowledge_provider,
            llm_provider,
        }
    }

    /// A lookup miss is absorbed into placeholder grounding; a generation
    /// failure is surfaced so the caller can report a service failure rather
    /// than "no medical info found".
    pub async fn analyze(&self, symptoms: &str) -> Result<HandlerResult, ApiError> {
        let info = match self.knowledge_provider.lookup(symptoms).await {
            Ok(Some(extract)) => extract,
            Ok(None) => {
                debug!("No knowledge entry for '{}', using placeholder", symptoms);
                NO_INFORMATION.to_string()
            }
            Err(e) => {
                warn!("Knowledge lookup failed, proceeding without grounding: {}", e);
                NO_INFORMATION.to_string()
            }
        };

        let messages = vec![
            ChatMessage::system("You are a medical assistant analyzing reported symptoms."),
            ChatMessage::user(format!(
                "Symptoms: {}\nMedical information: {}\n\n\
                 Please provide:\n\
                 1. Possible causes of these symptoms\n\
                 2. Severity assessment (mild, moderate, severe)\n\
                 3. When to seek professional care\n\
                 4. Home care recommendations\n\n\
                 Format your response in a clear, helpful way.",
                symptoms, info
            )),
        ];

        let analysis = self
            .llm_provider
            .generate(&messages)
            .await
            .map_err(|e| ApiError::LlmError(e.to_string()))?;

        let report = SymptomReport {
            symptoms: symptoms.to_string(),
            analysis: analysis.clone(),
            timestamp: chrono::Utc::now(),
        };

        let data = serde_json::to_value(&report)
            .map_err(|e| ApiError::InternalError(e.to_string()))?;

        Ok(HandlerResult {
            response: analysis,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::conversation::manager::{
        MockKnowledgeProvider, MockLlmProvider,
    };
    use mockall::predicate::*;

    #[tokio::test]
    async fn test_analysis_uses_knowledge_grounding() {
        let mut knowledge = MockKnowledgeProvider::new();
        knowledge
            .expect_lookup()
            .with(eq("fever"))
            .returning(|_| Ok(Some("Fever is an elevated body temperature.".to_string())));

        let mut llm = MockLlmProvider::new();
        llm.expect_generate()
            .withf(|messages| {
                messages[1]
                    .content
                    .contains("Fever is an elevated body temperature.")
            })
            .returning(|_| Ok("Likely viral. Severity: mild.".to_string()));

        let checker = SymptomChecker::new(Arc::new(knowledge), Arc::new(llm));
        let result = checker.analyze("fever").await.unwrap();

        assert_eq!(result.response, "Likely viral. Severity: mild.");
        assert_eq!(result.data["symptoms"], "fever");
    }

    #[tokio::test]
    async fn test_lookup_miss_falls_back_to_placeholder() {
        let mut knowledge = MockKnowledgeProvider::new();
        knowledge.expect_lookup().returning(|_| Ok(None));

        let mut llm = MockLlmProvider::new();
        llm.expect_generate()
            .withf(|messages| messages[1].content.contains("No information found."))
            .returning(|_| Ok("Causes unclear; monitor symptoms.".to_string()));

        let checker = SymptomChecker::new(Arc::new(knowledge), Arc::new(llm));
        let result = checker.analyze("glarbfoo pains").await.unwrap();

        assert!(!result.response.is_empty());
    }

    #[tokio::test]
    async fn test_lookup_error_is_absorbed() {
        let mut knowledge = MockKnowledgeProvider::new();
        knowledge
            .expect_lookup()
            .returning(|_| anyhow::bail!("wiki unreachable"));

        let mut llm = MockLlmProvider::new();
        llm.expect_generate()
            .withf(|messages| messages[1].content.contains("No information found."))
            .returning(|_| Ok("analysis".to_string()));

        let checker = SymptomChecker::new(Arc::new(knowledge), Arc::new(llm));
        assert!(checker.analyze("fever").await.is_ok());
    }

    #[tokio::test]
    async fn test_generation_failure_is_fatal() {
        let mut knowledge = MockKnowledgeProvider::new();
        knowledge.expect_lookup().returning(|_| Ok(None));

        let mut llm = MockLlmProvider::new();
        llm.expect_generate()
            .returning(|_| anyhow::bail!("model down"));

        let checker = SymptomChecker::new(Arc::new(knowledge), Arc::new(llm));
        let err = checker.analyze("fever").await.unwrap_err();

        assert!(matches!(err, ApiError::LlmError(_)));
    }
}
