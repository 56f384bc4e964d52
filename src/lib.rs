//! Spacebot core: the deliberation and scheduling layer for a persona-based
//! chat bot. Transport, LLM provider, persona/memory storage, and issue-board
//! provider are pluggable collaborators; this crate owns who speaks, when,
//! and in what order.

pub mod app;
pub mod board;
pub mod chat;
pub mod config;
pub mod db;
pub mod deliberation;
pub mod error;
pub mod hotreload;
pub mod humanizer;
pub mod jobs;
pub mod llm;
pub mod memory;
pub mod parser;
pub mod persona;
pub mod proactive;
pub mod registry;
pub mod reply;
pub mod roadmap;
pub mod router;
pub mod secrets;
pub mod state;

pub use error::{Error, Result};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Stable persona identifier (e.g. "dev", "carlos", "maya", "priya").
pub type PersonaId = Arc<str>;

/// Chat-platform channel identifier.
pub type ChannelId = Arc<str>;

/// Discussion identifier.
pub type DiscussionId = uuid::Uuid;

/// The kind of external event that seeded a [`deliberation::Discussion`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    PrReview,
    BuildFailure,
    PrdKickoff,
    CodeWatch,
    IssueReview,
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TriggerType::PrReview => "pr_review",
            TriggerType::BuildFailure => "build_failure",
            TriggerType::PrdKickoff => "prd_kickoff",
            TriggerType::CodeWatch => "code_watch",
            TriggerType::IssueReview => "issue_review",
        };
        write!(f, "{s}")
    }
}

/// Value object passed to `DeliberationEngine::start_discussion`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub trigger_type: TriggerType,
    pub project_path: String,
    pub trigger_ref: String,
    pub context: String,
    pub channel_id: Option<ChannelId>,
    pub thread_ts: Option<String>,
    pub opening_message: Option<String>,
}

impl Trigger {
    /// The coalescing key used for replay-guard and in-flight deduplication:
    /// `(project_path, trigger_type, trigger_ref)`.
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.project_path, self.trigger_type, self.trigger_ref)
    }
}

/// Kind of subprocess a [`jobs::JobSpawner`] can start.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Run,
    Review,
    Qa,
    Audit,
    Provider,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobKind::Run => "run",
            JobKind::Review => "review",
            JobKind::Qa => "qa",
            JobKind::Audit => "audit",
            JobKind::Provider => "provider",
        };
        write!(f, "{s}")
    }
}

/// Where a spawned job should report back to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAnchor {
    pub channel: ChannelId,
    pub thread_ts: Option<String>,
    pub persona_id: PersonaId,
}

/// Ephemeral descriptor for a spawned subprocess.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub kind: JobKind,
    pub target_project: String,
    pub anchor: JobAnchor,
    pub pr_number: Option<String>,
    pub issue_number: Option<String>,
    pub fix_conflicts: bool,
    /// Opaque prompt for `JobKind::Provider` jobs.
    pub prompt: Option<String>,
}

/// Normalized inbound chat event handed to the [`router::TriggerRouter`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    pub event_type: String,
    pub subtype: Option<String>,
    pub bot_sender_id: Option<String>,
    pub user_id: Option<String>,
    pub text: String,
    pub channel: Option<String>,
    pub ts: Option<String>,
    pub thread_ts: Option<String>,
}

/// A project registered with the bot (maps a working directory to a channel).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRegistration {
    pub slug: String,
    pub path: String,
    pub channel_id: Option<ChannelId>,
}

/// A platform user, as reported by [`chat::ChatTransport::list_users`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformUser {
    pub id: String,
    pub name: String,
}

/// A single historical thread message, as reported by
/// [`chat::ChatTransport::thread_replies`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub ts: String,
    pub text: String,
    pub author: Option<String>,
}

/// Tag describing what a router dispatch did, returned for logging/tests.
/// Side effects (job spawn, reply post, discussion contribution) already
/// happened by the time this is returned; it carries no further action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Dropped { reason: &'static str },
    IssueReviewScanned { urls: usize },
    ProviderInvoked,
    JobSpawned { kind: JobKind },
    IssuePickedUp,
    DiscussionContribution,
    Replied,
    AmbientEngaged { count: usize },
    ReactionOnly,
    Fallback,
    NoPersonasAvailable,
}

/// Serde helper: render a `HashMap<String, serde_json::Value>` default.
pub fn empty_metadata() -> HashMap<String, serde_json::Value> {
    HashMap::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_type_display_matches_the_snake_case_serde_rename() {
        assert_eq!(TriggerType::PrReview.to_string(), "pr_review");
        assert_eq!(TriggerType::BuildFailure.to_string(), "build_failure");
        assert_eq!(TriggerType::PrdKickoff.to_string(), "prd_kickoff");
        assert_eq!(TriggerType::CodeWatch.to_string(), "code_watch");
        assert_eq!(TriggerType::IssueReview.to_string(), "issue_review");
    }

    #[test]
    fn trigger_key_joins_project_trigger_type_and_ref() {
        let trigger = Trigger {
            trigger_type: TriggerType::PrReview,
            project_path: "/repos/widgets".to_string(),
            trigger_ref: "42".to_string(),
            context: String::new(),
            channel_id: None,
            thread_ts: None,
            opening_message: None,
        };
        assert_eq!(trigger.key(), "/repos/widgets:pr_review:42");
    }

    #[test]
    fn job_kind_display_matches_the_snake_case_serde_rename() {
        assert_eq!(JobKind::Run.to_string(), "run");
        assert_eq!(JobKind::Review.to_string(), "review");
        assert_eq!(JobKind::Qa.to_string(), "qa");
        assert_eq!(JobKind::Audit.to_string(), "audit");
        assert_eq!(JobKind::Provider.to_string(), "provider");
    }
}
