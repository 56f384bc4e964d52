//! SQLite-backed persona storage.

use crate::db::meta_keys::AGENT_PERSONAS_SEEDED;
use crate::error::{PersonaError, Result};
use crate::persona::types::{ENV_OVERRIDE_SENTINEL, Persona, PersonaModelConfig, PersonaPatch, Skill, Soul, Style};
use crate::secrets::EnvKey;
use anyhow::Context as _;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

/// CRUD access to `agent_personas`, transparently encrypting/decrypting
/// model-config env overrides at the storage boundary.
pub struct PersonaStore {
    pool: SqlitePool,
    env_key: EnvKey,
}

impl PersonaStore {
    pub fn new(pool: SqlitePool, env_key: EnvKey) -> Self {
        Self { pool, env_key }
    }

    /// Seed the four default personas on first run. Idempotent via the
    /// `agent_personas_seeded` schema_meta flag.
    pub async fn seed_defaults(&self) -> Result<()> {
        if crate::db::meta_get(&self.pool, AGENT_PERSONAS_SEEDED).await?.is_some() {
            return Ok(());
        }

        for (name, role, expertise, interests) in [
            ("Dev", "generalist engineer", vec!["code", "implementation", "bug", "refactor"], vec!["shipping", "tooling"]),
            ("Carlos", "tech lead", vec!["architecture", "review", "tradeoffs", "consensus"], vec!["roadmap", "mentoring"]),
            ("Maya", "security engineer", vec!["security", "auth", "secrets", "vulnerability"], vec!["threat modeling"]),
            ("Priya", "QA engineer", vec!["testing", "qa", "regression", "edge case"], vec!["coverage", "release quality"]),
        ] {
            let persona = Persona {
                id: uuid::Uuid::new_v4().to_string(),
                display_name: name.to_string(),
                role: role.to_string(),
                avatar_url: None,
                soul: Soul::default(),
                style: Style::default(),
                skill: Skill::default(),
                expertise: expertise.into_iter().map(str::to_string).collect(),
                interests: interests.into_iter().map(str::to_string).collect(),
                model_config: None,
                is_active: true,
                created_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
            };
            self.insert(&persona).await?;
        }

        crate::db::meta_set(&self.pool, AGENT_PERSONAS_SEEDED, "1").await?;
        Ok(())
    }

    async fn insert(&self, persona: &Persona) -> Result<()> {
        let model_config_json = self.encrypt_model_config_json(persona.model_config.as_ref())?;

        sqlx::query(
            r#"
            INSERT INTO agent_personas
                (id, display_name, role, avatar_url, soul_json, style_json, skill_json,
                 expertise_json, interests_json, model_config_json, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&persona.id)
        .bind(&persona.display_name)
        .bind(&persona.role)
        .bind(&persona.avatar_url)
        .bind(serde_json::to_string(&persona.soul).context("serialize soul")?)
        .bind(serde_json::to_string(&persona.style).context("serialize style")?)
        .bind(serde_json::to_string(&persona.skill).context("serialize skill")?)
        .bind(serde_json::to_string(&persona.expertise).context("serialize expertise")?)
        .bind(serde_json::to_string(&persona.interests).context("serialize interests")?)
        .bind(model_config_json)
        .bind(persona.is_active)
        .bind(persona.created_at)
        .bind(persona.updated_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to insert persona {}", persona.id))?;

        Ok(())
    }

    /// All active personas, ordered by creation time.
    pub async fn get_active(&self) -> Result<Vec<Persona>> {
        let rows = sqlx::query(
            "SELECT * FROM agent_personas WHERE is_active = 1 ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|row| self.row_to_persona(row)).collect()
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Persona> {
        let row = sqlx::query("SELECT * FROM agent_personas WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| PersonaError::NotFound { id: id.to_string() })?;

        self.row_to_persona(&row)
    }

    /// Apply a partial update, merging `"***"`-sentinel env override values
    /// against the existing decrypted config.
    pub async fn update(&self, id: &str, patch: PersonaPatch) -> Result<Persona> {
        let mut persona = self.get_by_id(id).await?;

        if let Some(name) = patch.display_name {
            persona.display_name = name;
        }
        if let Some(role) = patch.role {
            persona.role = role;
        }
        if let Some(avatar) = patch.avatar_url {
            persona.avatar_url = avatar;
        }
        if let Some(soul) = patch.soul {
            persona.soul = soul;
        }
        if let Some(style) = patch.style {
            persona.style = style;
        }
        if let Some(skill) = patch.skill {
            persona.skill = skill;
        }
        if let Some(expertise) = patch.expertise {
            persona.expertise = expertise;
        }
        if let Some(interests) = patch.interests {
            persona.interests = interests;
        }
        if let Some(is_active) = patch.is_active {
            if is_active && !persona.is_active {
                self.check_name_available(&persona.display_name, Some(id)).await?;
            }
            persona.is_active = is_active;
        }
        if let Some(new_config) = patch.model_config {
            persona.model_config = match (new_config, persona.model_config.take()) {
                (Some(mut incoming), Some(existing)) => {
                    for (key, value) in incoming.env_overrides.iter_mut() {
                        if value == ENV_OVERRIDE_SENTINEL
                            && let Some(existing_value) = existing.env_overrides.get(key)
                        {
                            *value = existing_value.clone();
                        }
                    }
                    Some(incoming)
                }
                (Some(incoming), None) => Some(incoming),
                (None, _) => None,
            };
        }

        persona.updated_at = chrono::Utc::now();

        let model_config_json = self.encrypt_model_config_json(persona.model_config.as_ref())?;

        sqlx::query(
            r#"
            UPDATE agent_personas
            SET display_name = ?, role = ?, avatar_url = ?, soul_json = ?, style_json = ?,
                skill_json = ?, expertise_json = ?, interests_json = ?, model_config_json = ?,
                is_active = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&persona.display_name)
        .bind(&persona.role)
        .bind(&persona.avatar_url)
        .bind(serde_json::to_string(&persona.soul).context("serialize soul")?)
        .bind(serde_json::to_string(&persona.style).context("serialize style")?)
        .bind(serde_json::to_string(&persona.skill).context("serialize skill")?)
        .bind(serde_json::to_string(&persona.expertise).context("serialize expertise")?)
        .bind(serde_json::to_string(&persona.interests).context("serialize interests")?)
        .bind(model_config_json)
        .bind(persona.is_active)
        .bind(persona.updated_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to update persona {id}"))?;

        Ok(persona)
    }

    async fn check_name_available(&self, name: &str, excluding_id: Option<&str>) -> Result<()> {
        let existing: Option<(String,)> = sqlx::query_as(
            "SELECT id FROM agent_personas WHERE is_active = 1 AND display_name = ? COLLATE NOCASE",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        if let Some((existing_id,)) = existing
            && Some(existing_id.as_str()) != excluding_id
        {
            return Err(PersonaError::DuplicateName { name: name.to_string() }.into());
        }
        Ok(())
    }

    fn encrypt_model_config_json(&self, config: Option<&PersonaModelConfig>) -> Result<Option<String>> {
        let Some(config) = config else { return Ok(None) };

        let mut encrypted = config.clone();
        for value in encrypted.env_overrides.values_mut() {
            if !EnvKey::is_encrypted(value) {
                *value = self.env_key.encrypt(value)?;
            }
        }

        Ok(Some(serde_json::to_string(&encrypted).context("serialize model config")?))
    }

    fn row_to_persona(&self, row: &SqliteRow) -> Result<Persona> {
        let soul_json: String = row.try_get("soul_json")?;
        let style_json: String = row.try_get("style_json")?;
        let skill_json: String = row.try_get("skill_json")?;
        let expertise_json: String = row.try_get("expertise_json")?;
        let interests_json: String = row.try_get("interests_json")?;
        let model_config_json: Option<String> = row.try_get("model_config_json")?;

        let mut model_config: Option<PersonaModelConfig> = model_config_json
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .context("deserialize model config")?;

        if let Some(config) = model_config.as_mut() {
            for value in config.env_overrides.values_mut() {
                *value = self.env_key.decrypt(value);
            }
        }

        Ok(Persona {
            id: row.try_get("id")?,
            display_name: row.try_get("display_name")?,
            role: row.try_get("role")?,
            avatar_url: row.try_get("avatar_url")?,
            soul: serde_json::from_str(&soul_json).context("deserialize soul")?,
            style: serde_json::from_str(&style_json).context("deserialize style")?,
            skill: serde_json::from_str(&skill_json).context("deserialize skill")?,
            expertise: serde_json::from_str(&expertise_json).context("deserialize expertise")?,
            interests: serde_json::from_str(&interests_json).context("deserialize interests")?,
            model_config,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqliteConnectOptions;
    use std::str::FromStr;

    async fn test_store() -> PersonaStore {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").unwrap();
        let pool = SqlitePool::connect_with(options).await.unwrap();
        crate::db::migrate(&pool).await.unwrap();
        let env_key = EnvKey::load_or_create(&pool).await.unwrap();
        PersonaStore::new(pool, env_key)
    }

    #[tokio::test]
    async fn seed_defaults_is_idempotent_and_populates_expertise() {
        let store = test_store().await;
        store.seed_defaults().await.unwrap();
        store.seed_defaults().await.unwrap();

        let active = store.get_active().await.unwrap();
        assert_eq!(active.len(), 4);

        let dev = active.iter().find(|p| p.display_name == "Dev").unwrap();
        assert!(dev.expertise.contains(&"code".to_string()));
        assert!(dev.interests.contains(&"shipping".to_string()));
    }

    #[tokio::test]
    async fn update_patches_expertise_and_interests() {
        let store = test_store().await;
        store.seed_defaults().await.unwrap();
        let dev = store.get_active().await.unwrap().into_iter().find(|p| p.display_name == "Dev").unwrap();

        let patch = PersonaPatch { expertise: Some(vec!["rust".to_string()]), ..Default::default() };
        let updated = store.update(&dev.id, patch).await.unwrap();

        assert_eq!(updated.expertise, vec!["rust".to_string()]);
        assert_eq!(updated.interests, dev.interests);
    }
}
