//! SQLite pool setup and schema migration.
//!
//! A single embedded database backs `agent_personas`, `slack_discussions`,
//! `project_registry`, and `schema_meta`, following the same
//! plain-`sqlx::query` CRUD style used throughout this crate's stores (no
//! ORM, explicit row-to-struct mapping at each call site).

use crate::error::Result;
use anyhow::Context as _;
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;
use std::str::FromStr;

/// Open (creating if absent) the SQLite database at `path` and run schema
/// migrations.
pub async fn connect(path: &std::path::Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))
        .with_context(|| format!("invalid sqlite path: {}", path.display()))?
        .create_if_missing(true);

    let pool = SqlitePool::connect_with(options)
        .await
        .with_context(|| format!("failed to connect to sqlite at {}", path.display()))?;

    migrate(&pool).await?;
    Ok(pool)
}

pub(crate) async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS agent_personas (
            id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            role TEXT NOT NULL,
            avatar_url TEXT,
            soul_json TEXT NOT NULL,
            style_json TEXT NOT NULL,
            skill_json TEXT NOT NULL,
            expertise_json TEXT NOT NULL DEFAULT '[]',
            interests_json TEXT NOT NULL DEFAULT '[]',
            model_config_json TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create agent_personas table")?;

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_agent_personas_name_ci
        ON agent_personas (display_name COLLATE NOCASE)
        WHERE is_active = 1
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create persona name uniqueness index")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS slack_discussions (
            id TEXT PRIMARY KEY,
            project_path TEXT NOT NULL,
            trigger_type TEXT NOT NULL,
            trigger_ref TEXT NOT NULL,
            context TEXT NOT NULL DEFAULT '',
            channel_id TEXT NOT NULL,
            thread_anchor TEXT NOT NULL,
            status TEXT NOT NULL,
            round INTEGER NOT NULL DEFAULT 1,
            replies_used INTEGER NOT NULL DEFAULT 0,
            participants_json TEXT NOT NULL,
            consensus_result TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create slack_discussions table")?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_discussions_trigger
        ON slack_discussions (project_path, trigger_type, trigger_ref, created_at DESC)
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create discussion trigger index")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS project_registry (
            slug TEXT PRIMARY KEY,
            path TEXT NOT NULL,
            channel_id TEXT
        )
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create project_registry table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create schema_meta table")?;

    Ok(())
}

/// Read a `schema_meta` value.
pub async fn meta_get(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM schema_meta WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(v,)| v))
}

/// Write (upsert) a `schema_meta` value.
pub async fn meta_set(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO schema_meta (key, value) VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

/// Well-known `schema_meta` keys referenced across the crate.
pub mod meta_keys {
    pub const AGENT_PERSONA_ENV_KEY: &str = "agent_persona_env_key";
    pub const AGENT_PERSONAS_SEEDED: &str = "agent_personas_seeded";
    pub const SLACK_PERSONA_INTROS_V4: &str = "slack_persona_intros_v4";
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_pool() -> SqlitePool {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").unwrap();
        let pool = SqlitePool::connect_with(options).await.unwrap();
        migrate(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn migrate_creates_the_expected_tables() {
        let pool = memory_pool().await;
        for table in ["agent_personas", "slack_discussions", "project_registry", "schema_meta"] {
            let row: (i64,) =
                sqlx::query_as("SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
                    .bind(table)
                    .fetch_one(&pool)
                    .await
                    .unwrap();
            assert_eq!(row.0, 1, "expected table {table} to exist");
        }
    }

    #[tokio::test]
    async fn meta_get_set_round_trips_and_upserts() {
        let pool = memory_pool().await;
        assert_eq!(meta_get(&pool, "k").await.unwrap(), None);

        meta_set(&pool, "k", "v1").await.unwrap();
        assert_eq!(meta_get(&pool, "k").await.unwrap(), Some("v1".to_string()));

        meta_set(&pool, "k", "v2").await.unwrap();
        assert_eq!(meta_get(&pool, "k").await.unwrap(), Some("v2".to_string()));
    }
}
