use crate::config::KnowledgeConfig;
use crate::services::conversation::manager::KnowledgeProvider;
use anyhow::{Context, Result};
use reqwest::Client;
use tracing::debug;

/// Encyclopedic snippet lookup against a MediaWiki "extracts" endpoint.
/// The lookup key is passed through as the page title, unmodified.
#[derive(Clone)]
pub struct KnowledgeService {
    client: Client,
    base_url: String,
}

impl KnowledgeService {
    pub fn new(config: KnowledgeConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(config.timeout_seconds))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: config.base_url,
        }
    }

    async fn lookup_internal(&self, key: &str) -> Result<Option<String>> {
        debug!("Knowledge lookup for '{}'", key);

        let url = format!("{}/w/api.php", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("action", "query"),
                ("format", "json"),
                ("titles", key),
                ("prop", "extracts"),
                ("exintro", "true"),
                ("explaintext", "true"),
            ])
            .send()
            .await
            .context("Failed to connect to knowledge service")?;

        if !response.status().is_success() {
            anyhow::bail!("Knowledge API error: {}", response.status());
        }

        let body: serde_json::Value = response
            .json()
            .await
            .context("Failed to parse knowledge response")?;

        Ok(Self::parse_extract(&body))
    }

    /// The extracts API keys pages by internal page id ("-1" for a miss), so
    /// take the first page and read its intro extract if present.
    fn parse_extract(body: &serde_json::Value) -> Option<String> {
        let pages = body.get("query")?.get("pages")?.as_object()?;
        let page = pages.values().next()?;
        let extract = page.get("extract")?.as_str()?;

        if extract.trim().is_empty() {
            return None;
        }
        Some(extract.to_string())
    }
}

#[async_trait::async_trait]
impl KnowledgeProvider for KnowledgeService {
    async fn lookup(&self, key: &str) -> Result<Option<String>> {
        self.lookup_internal(key).await
    }
}
