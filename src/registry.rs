//! SQLite-backed project registry: maps a working directory to a channel,
//! consulted by the router for project-hint resolution and by the
//! proactive loop to enumerate what to sweep.

use crate::error::Result;
use crate::{ChannelId, ProjectRegistration};
use sqlx::{Row, SqlitePool};

pub struct ProjectRegistry {
    pool: SqlitePool,
}

impl ProjectRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn all(&self) -> Result<Vec<ProjectRegistration>> {
        let rows = sqlx::query("SELECT slug, path, channel_id FROM project_registry ORDER BY slug ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_registration).collect()
    }

    pub async fn by_slug(&self, slug: &str) -> Result<Option<ProjectRegistration>> {
        let row = sqlx::query("SELECT slug, path, channel_id FROM project_registry WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_registration).transpose()
    }

    /// Resolve a project by a free-text hint: exact slug match, then a
    /// case-insensitive substring match against the path's final segment.
    pub async fn by_hint(&self, hint: &str) -> Result<Option<ProjectRegistration>> {
        if let Some(exact) = self.by_slug(hint).await? {
            return Ok(Some(exact));
        }

        let lower = hint.to_lowercase();
        let all = self.all().await?;
        Ok(all.into_iter().find(|p| p.slug.to_lowercase() == lower || p.path.to_lowercase().ends_with(&lower)))
    }

    pub async fn by_channel(&self, channel: &ChannelId) -> Result<Option<ProjectRegistration>> {
        let all = self.all().await?;
        Ok(all.into_iter().find(|p| p.channel_id.as_deref() == Some(channel.as_ref())))
    }

    pub async fn register(&self, slug: &str, path: &str, channel_id: Option<&ChannelId>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO project_registry (slug, path, channel_id) VALUES (?, ?, ?)
            ON CONFLICT(slug) DO UPDATE SET path = excluded.path, channel_id = excluded.channel_id
            "#,
        )
        .bind(slug)
        .bind(path)
        .bind(channel_id.map(|c| c.as_ref()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn row_to_registration(row: &sqlx::sqlite::SqliteRow) -> Result<ProjectRegistration> {
    let channel_id: Option<String> = row.try_get("channel_id")?;
    Ok(ProjectRegistration {
        slug: row.try_get("slug")?,
        path: row.try_get("path")?,
        channel_id: channel_id.map(Into::into),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqliteConnectOptions;
    use std::str::FromStr;

    async fn test_registry() -> ProjectRegistry {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").unwrap();
        let pool = SqlitePool::connect_with(options).await.unwrap();
        crate::db::migrate(&pool).await.unwrap();
        ProjectRegistry::new(pool)
    }

    #[tokio::test]
    async fn register_is_an_upsert_keyed_on_slug() {
        let registry = test_registry().await;
        let channel: ChannelId = "C1".into();
        registry.register("widgets", "/repos/widgets", Some(&channel)).await.unwrap();
        registry.register("widgets", "/repos/widgets-renamed", None).await.unwrap();

        let all = registry.all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].path, "/repos/widgets-renamed");
        assert_eq!(all[0].channel_id, None);
    }

    #[tokio::test]
    async fn by_hint_falls_back_to_a_case_insensitive_path_suffix_match() {
        let registry = test_registry().await;
        registry.register("widgets", "/repos/Widgets", None).await.unwrap();

        let found = registry.by_hint("widgets").await.unwrap().unwrap();
        assert_eq!(found.slug, "widgets");

        assert!(registry.by_hint("nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn by_channel_finds_the_project_bound_to_that_channel() {
        let registry = test_registry().await;
        let channel: ChannelId = "C1".into();
        registry.register("widgets", "/repos/widgets", Some(&channel)).await.unwrap();
        registry.register("gadgets", "/repos/gadgets", None).await.unwrap();

        let found = registry.by_channel(&channel).await.unwrap().unwrap();
        assert_eq!(found.slug, "widgets");
    }
}
