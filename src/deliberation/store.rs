//! SQLite-backed discussion storage.

use crate::config::DISCUSSION_REPLAY_GUARD_MINUTES;
use crate::deliberation::types::{ConsensusResult, Discussion, DiscussionStatus};
use crate::error::{DeliberationError, Result};
use crate::{ChannelId, DiscussionId, PersonaId, TriggerType};
use anyhow::Context as _;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use std::str::FromStr;

pub struct DiscussionStore {
    pool: SqlitePool,
}

impl DiscussionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        project_path: &str,
        trigger_type: TriggerType,
        trigger_ref: &str,
        context: &str,
        channel_id: &ChannelId,
        thread_anchor: &str,
        participants: Vec<PersonaId>,
    ) -> Result<Discussion> {
        let id = uuid::Uuid::new_v4();
        let now = chrono::Utc::now();
        let participants_json = serde_json::to_string(&participants).context("serialize participants")?;

        sqlx::query(
            r#"
            INSERT INTO slack_discussions
                (id, project_path, trigger_type, trigger_ref, context, channel_id, thread_anchor,
                 status, round, replies_used, participants_json, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, 'active', 1, 0, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(project_path)
        .bind(trigger_type.to_string())
        .bind(trigger_ref)
        .bind(context)
        .bind(channel_id.as_ref())
        .bind(thread_anchor)
        .bind(&participants_json)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("failed to insert discussion")?;

        Ok(Discussion {
            id,
            project_path: project_path.to_string(),
            trigger_type,
            trigger_ref: trigger_ref.to_string(),
            context: context.to_string(),
            channel_id: channel_id.clone(),
            thread_anchor: thread_anchor.to_string(),
            status: DiscussionStatus::Active,
            round: 1,
            replies_used: 0,
            participants,
            consensus_result: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// The latest discussion for `(project_path, trigger_type, trigger_ref)`,
    /// if any — active or terminal-but-within-the-replay-guard callers must
    /// check themselves via [`Discussion::status`] and `created_at`.
    pub async fn latest_for_trigger(
        &self,
        project_path: &str,
        trigger_type: TriggerType,
        trigger_ref: &str,
    ) -> Result<Option<Discussion>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM slack_discussions
            WHERE project_path = ? AND trigger_type = ? AND trigger_ref = ?
            ORDER BY created_at DESC LIMIT 1
            "#,
        )
        .bind(project_path)
        .bind(trigger_type.to_string())
        .bind(trigger_ref)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_discussion(&r)).transpose()
    }

    /// The active discussion anchored on `(channel, threadAnchor)`, if any —
    /// used by the router to decide whether a mention or human message
    /// continues a discussion or starts an ad-hoc reply.
    pub async fn active_for_thread(&self, channel_id: &ChannelId, thread_anchor: &str) -> Result<Option<Discussion>> {
        let row = sqlx::query(
            "SELECT * FROM slack_discussions WHERE channel_id = ? AND thread_anchor = ? AND status = 'active' ORDER BY created_at DESC LIMIT 1",
        )
        .bind(channel_id.as_ref())
        .bind(thread_anchor)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_discussion(&r)).transpose()
    }

    /// Whether a terminal discussion is still within the replay-guard window.
    pub fn within_replay_guard(discussion: &Discussion) -> bool {
        (chrono::Utc::now() - discussion.updated_at).num_minutes() < DISCUSSION_REPLAY_GUARD_MINUTES
    }

    pub async fn get(&self, id: DiscussionId) -> Result<Discussion> {
        let row = sqlx::query("SELECT * FROM slack_discussions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(DeliberationError::NotFound { id })?;

        row_to_discussion(&row)
    }

    pub async fn record_reply(&self, id: DiscussionId, persona_id: &PersonaId) -> Result<()> {
        let discussion = self.get(id).await?;
        let mut participants = discussion.participants;
        if !participants.contains(persona_id) {
            participants.push(persona_id.clone());
        }
        let participants_json = serde_json::to_string(&participants).context("serialize participants")?;

        sqlx::query(
            "UPDATE slack_discussions SET replies_used = replies_used + 1, participants_json = ?, updated_at = ? WHERE id = ?",
        )
        .bind(participants_json)
        .bind(chrono::Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn advance_round(&self, id: DiscussionId) -> Result<()> {
        sqlx::query("UPDATE slack_discussions SET round = round + 1, updated_at = ? WHERE id = ?")
            .bind(chrono::Utc::now())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_terminal(
        &self,
        id: DiscussionId,
        status: DiscussionStatus,
        result: ConsensusResult,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE slack_discussions SET status = ?, consensus_result = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status.to_string())
        .bind(result.to_string())
        .bind(chrono::Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn row_to_discussion(row: &SqliteRow) -> Result<Discussion> {
    let id: String = row.try_get("id")?;
    let trigger_type: String = row.try_get("trigger_type")?;
    let status: String = row.try_get("status")?;
    let channel_id: String = row.try_get("channel_id")?;
    let participants_json: String = row.try_get("participants_json")?;
    let consensus_result: Option<String> = row.try_get("consensus_result")?;

    Ok(Discussion {
        id: uuid::Uuid::parse_str(&id).context("parse discussion id")?,
        project_path: row.try_get("project_path")?,
        trigger_type: parse_trigger_type(&trigger_type)?,
        trigger_ref: row.try_get("trigger_ref")?,
        context: row.try_get("context")?,
        channel_id: channel_id.into(),
        thread_anchor: row.try_get("thread_anchor")?,
        status: DiscussionStatus::from_str(&status)?,
        round: row.try_get::<i64, _>("round")? as u32,
        replies_used: row.try_get::<i64, _>("replies_used")? as usize,
        participants: serde_json::from_str(&participants_json).context("deserialize participants")?,
        consensus_result: consensus_result.map(|s| ConsensusResult::from_str(&s)).transpose()?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn parse_trigger_type(s: &str) -> Result<TriggerType> {
    match s {
        "pr_review" => Ok(TriggerType::PrReview),
        "build_failure" => Ok(TriggerType::BuildFailure),
        "prd_kickoff" => Ok(TriggerType::PrdKickoff),
        "code_watch" => Ok(TriggerType::CodeWatch),
        "issue_review" => Ok(TriggerType::IssueReview),
        other => Err(DeliberationError::MalformedRef(other.to_string()).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqliteConnectOptions;
    use std::str::FromStr as _;

    async fn test_store() -> DiscussionStore {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").unwrap();
        let pool = SqlitePool::connect_with(options).await.unwrap();
        crate::db::migrate(&pool).await.unwrap();
        DiscussionStore::new(pool)
    }

    #[tokio::test]
    async fn create_round_trips_the_context_field() {
        let store = test_store().await;
        let channel: ChannelId = "C1".into();
        let discussion = store
            .create(
                "proj",
                TriggerType::CodeWatch,
                "trigger-1",
                "Signal: flaky test\nLocation: src/lib.rs",
                &channel,
                "t1",
                vec![],
            )
            .await
            .unwrap();

        assert_eq!(discussion.context, "Signal: flaky test\nLocation: src/lib.rs");

        let reloaded = store.get(discussion.id).await.unwrap();
        assert_eq!(reloaded.context, discussion.context);
    }

    #[tokio::test]
    async fn set_terminal_persists_status_and_result() {
        let store = test_store().await;
        let channel: ChannelId = "C1".into();
        let discussion = store
            .create("proj", TriggerType::PrReview, "42", "ctx", &channel, "t1", vec![])
            .await
            .unwrap();

        store
            .set_terminal(discussion.id, DiscussionStatus::Consensus, ConsensusResult::Approved)
            .await
            .unwrap();

        let reloaded = store.get(discussion.id).await.unwrap();
        assert_eq!(reloaded.status, DiscussionStatus::Consensus);
        assert_eq!(reloaded.consensus_result, Some(ConsensusResult::Approved));
    }
}
