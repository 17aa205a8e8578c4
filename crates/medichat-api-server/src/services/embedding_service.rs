use crate::config::EmbeddingConfig;
use crate::services::conversation::manager::EmbeddingProvider;
use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    content: String,
    // Some servers expect "input" instead; send both
    input: String,
}

#[derive(Clone)]
pub struct EmbeddingService {
    client: Client,
    base_url: String,
    dimension: usize,
}

impl EmbeddingService {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(config.timeout_seconds))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: config.base_url,
            dimension: config.dimension,
        }
    }

    async fn embed_internal(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Generating embedding for {} chars", text.len());

        let request = EmbeddingRequest {
            content: text.to_string(),
            input: text.to_string(),
        };

        let url = format!("{}/embedding", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to connect to embedding server")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Embedding API error ({}): {}", status, body);
        }

        let json_value: serde_json::Value = response
            .json()
            .await
            .context("Failed to parse embedding response as JSON")?;

        let embedding = Self::parse_embedding(&json_value)
            .with_context(|| format!("Unrecognized embedding response format: {}", json_value))?;

        if embedding.is_empty() {
            anyhow::bail!("Generated embedding is empty");
        }

        if embedding.len() != self.dimension {
            anyhow::bail!(
                "Embedding dimension mismatch: expected {}, got {}",
                self.dimension,
                embedding.len()
            );
        }

        Ok(embedding)
    }

    /// Accepts the llama.cpp shape {"embedding": [...]} and the OpenAI shape
    /// {"data": [{"embedding": [...]}]}.
    fn parse_embedding(value: &serde_json::Value) -> Option<Vec<f32>> {
        let array = if value["embedding"].is_array() {
            value["embedding"].as_array()?
        } else if value["data"].is_array() {
            value["data"].get(0)?["embedding"].as_array()?
        } else {
            return None;
        };

        Some(
            array
                .iter()
                .filter_map(|v| v.as_f64().map(|f| f as f32))
                .collect(),
        )
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for EmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_internal(text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_llama_cpp_shape() {
        let value = serde_json::json!({ "embedding": [0.1, 0.2, 0.3] });
        assert_eq!(
            EmbeddingService::parse_embedding(&value),
            Some(vec![0.1, 0.2, 0.3])
        );
    }

    #[test]
    fn test_parse_openai_shape() {
        let value = serde_json::json!({ "data": [{ "embedding": [1.0, 2.0] }] });
        assert_eq!(
            EmbeddingService::parse_embedding(&value),
            Some(vec![1.0, 2.0])
        );
    }

    #[test]
    fn test_parse_unknown_shape() {
        let value = serde_json::json!({ "vectors": [1.0] });
        assert_eq!(EmbeddingService::parse_embedding(&value), None);
    }
}
