use super::{ConversationRow, DbPool};
use crate::services::conversation::manager::ConversationStore;
use crate::services::conversation::types::ConversationMetadata;
use anyhow::Result;
use pgvector::Vector;
use tracing::{debug, info};

pub struct Repository {
    pub pool: DbPool,
}

impl Repository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create the conversation table and pgvector extension if missing.
    /// Embedding width is fixed at startup; changing it requires a migration.
    pub async fn ensure_schema(&self, embedding_dimension: usize) -> Result<()> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(self.pool.get_pool())
            .await?;

        let create_table = format!(
            r#"CREATE TABLE IF NOT EXISTS medical_conversations (
                id BIGSERIAL PRIMARY KEY,
                content TEXT NOT NULL,
                metadata JSONB NOT NULL,
                embedding VECTOR({})
            )"#,
            embedding_dimension
        );
        sqlx::query(&create_table)
            .execute(self.pool.get_pool())
            .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_medical_conversations_user \
             ON medical_conversations ((metadata->>'user_id'))",
        )
        .execute(self.pool.get_pool())
        .await?;

        info!("Conversation schema verified (dimension={})", embedding_dimension);
        Ok(())
    }

    /// Append one conversation exchange. Rows are immutable after insert.
    pub async fn insert_conversation(
        &self,
        content: &str,
        metadata: &serde_json::Value,
        embedding: Vector,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO medical_conversations (content, metadata, embedding) \
             VALUES ($1, $2, $3)",
        )
        .bind(content)
        .bind(metadata)
        .bind(embedding)
        .execute(self.pool.get_pool())
        .await?;

        debug!("Stored conversation document ({} chars)", content.len());
        Ok(())
    }

    /// Vector search over one user's conversation history, most similar first.
    pub async fn search_conversations(
        &self,
        user_id: &str,
        query_embedding: Vector,
        limit: i64,
    ) -> Result<Vec<ConversationRow>> {
        let rows = sqlx::query_as::<_, ConversationRow>(
            r#"SELECT
                content,
                metadata,
                (1 - (embedding <=> $2))::float4 AS similarity
               FROM medical_conversations
               WHERE metadata->>'user_id' = $1
               ORDER BY embedding <=> $2
               LIMIT $3"#,
        )
        .bind(user_id)
        .bind(query_embedding)
        .bind(limit)
        .persistent(false)
        .fetch_all(self.pool.get_pool())
        .await?;

        debug!("Found {} prior conversations for user {}", rows.len(), user_id);
        Ok(rows)
    }
}

#[async_trait::async_trait]
impl ConversationStore for Repository {
    async fn search(
        &self,
        user_id: &str,
        embedding: &[f32],
        limit: i64,
    ) -> Result<Vec<ConversationRow>> {
        self.search_conversations(user_id, Vector::from(embedding.to_vec()), limit)
            .await
    }

    async fn insert(
        &self,
        content: &str,
        metadata: ConversationMetadata,
        embedding: &[f32],
    ) -> Result<()> {
        let metadata = serde_json::to_value(&metadata)?;
        self.insert_conversation(content, &metadata, Vector::from(embedding.to_vec()))
            .await
    }
}
