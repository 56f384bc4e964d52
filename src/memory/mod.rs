//! Per-persona, per-project ad-hoc memory: a single reflected note a persona
//! keeps about a project, refreshed opportunistically after discussions.

use crate::error::Result;
use crate::llm::LlmClientDyn;
use anyhow::Context as _;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

pub struct MemoryStore {
    pool: SqlitePool,
}

impl MemoryStore {
    pub fn new(pool: SqlitePool) -> Arc<Self> {
        Arc::new(Self { pool })
    }

    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS persona_project_memory (
                persona_name TEXT NOT NULL,
                project_slug TEXT NOT NULL,
                content TEXT NOT NULL,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (persona_name, project_slug)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create persona_project_memory table")?;

        Ok(())
    }

    /// Read a persona's standing memory for a project. Reads never block
    /// reply posting — any storage failure is logged and yields `None`.
    pub async fn get_memory(&self, persona_name: &str, project_slug: &str) -> Option<String> {
        let result = sqlx::query(
            "SELECT content FROM persona_project_memory WHERE persona_name = ? AND project_slug = ?",
        )
        .bind(persona_name)
        .bind(project_slug)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(row) => row.and_then(|r| r.try_get::<String, _>("content").ok()),
            Err(error) => {
                tracing::warn!(%error, persona_name, project_slug, "failed to read persona memory");
                None
            }
        }
    }

    /// Best-effort reflection: ask the LLM to distill `reflection_context`
    /// into an updated memory note and persist it. Entirely swallowed on
    /// failure — this must never surface to the caller.
    pub async fn reflect(
        &self,
        persona_name: &str,
        project_slug: &str,
        reflection_context: &str,
        llm: &Arc<dyn LlmClientDyn>,
    ) {
        let existing = self.get_memory(persona_name, project_slug).await.unwrap_or_default();

        let system_prompt = format!(
            "You maintain a short standing memory note for {persona_name} about the project \"{project_slug}\". \
             Given the existing note and new context, produce an updated note under 500 characters. \
             Keep only durable facts and preferences, not transient discussion detail."
        );
        let user_prompt = format!("Existing note:\n{existing}\n\nNew context:\n{reflection_context}");

        let updated = match llm.complete(&system_prompt, &user_prompt, 300).await {
            Ok(text) => text,
            Err(error) => {
                tracing::warn!(%error, persona_name, project_slug, "memory reflection LLM call failed");
                return;
            }
        };

        if let Err(error) = self.upsert(persona_name, project_slug, updated.trim()).await {
            tracing::warn!(%error, persona_name, project_slug, "failed to persist reflected memory");
        }
    }

    async fn upsert(&self, persona_name: &str, project_slug: &str, content: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO persona_project_memory (persona_name, project_slug, content, updated_at)
            VALUES (?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(persona_name, project_slug)
            DO UPDATE SET content = excluded.content, updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(persona_name)
        .bind(project_slug)
        .bind(content)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmClient;
    use sqlx::sqlite::SqliteConnectOptions;
    use std::str::FromStr;

    struct FakeLlm {
        reply: &'static str,
    }

    impl LlmClient for FakeLlm {
        async fn complete(&self, _system_prompt: &str, _user_prompt: &str, _max_tokens: u32) -> Result<String> {
            Ok(self.reply.to_string())
        }

        async fn complete_with_tools(
            &self,
            system_prompt: &str,
            user_prompt: &str,
            _tools: &[crate::llm::ToolSpec],
            _registry: &crate::llm::ToolRegistry,
            max_tokens: u32,
        ) -> Result<String> {
            LlmClient::complete(self, system_prompt, user_prompt, max_tokens).await
        }
    }

    async fn test_store() -> Arc<MemoryStore> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").unwrap();
        let pool = SqlitePool::connect_with(options).await.unwrap();
        let store = MemoryStore::new(pool);
        store.initialize().await.unwrap();
        store
    }

    #[tokio::test]
    async fn get_memory_is_none_before_anything_is_stored() {
        let store = test_store().await;
        assert_eq!(store.get_memory("Maya", "widgets").await, None);
    }

    #[tokio::test]
    async fn reflect_persists_the_llm_distilled_note() {
        let store = test_store().await;
        let llm: Arc<dyn crate::llm::LlmClientDyn> = Arc::new(FakeLlm { reply: "  prefers small PRs  " });

        store.reflect("Maya", "widgets", "discussed PR size preferences", &llm).await;

        assert_eq!(store.get_memory("Maya", "widgets").await, Some("prefers small PRs".to_string()));
    }

    #[tokio::test]
    async fn reflect_upsert_overwrites_the_previous_note() {
        let store = test_store().await;
        let llm: Arc<dyn crate::llm::LlmClientDyn> = Arc::new(FakeLlm { reply: "first note" });
        store.reflect("Maya", "widgets", "ctx", &llm).await;

        let llm2: Arc<dyn crate::llm::LlmClientDyn> = Arc::new(FakeLlm { reply: "second note" });
        store.reflect("Maya", "widgets", "ctx", &llm2).await;

        assert_eq!(store.get_memory("Maya", "widgets").await, Some("second note".to_string()));
    }
}
