//! Explicit-DI application assembly: every collaborator is constructed and
//! wired here, once, with no global or thread-local state. `main.rs` calls
//! [`App::build`] at startup and holds the result for the process lifetime.

use crate::board::github::GitHubBoardProvider;
use crate::board::{BoardIntegration, BoardProviderDyn};
use crate::chat::{ChatManager, SlackTransport};
use crate::config::{Config, RuntimeConfig};
use crate::error::ConfigError;
use crate::deliberation::{DeliberationEngine, DiscussionStore};
use crate::error::Result;
use crate::jobs::{self, JobSpawner};
use crate::llm::{AnthropicClient, LlmClientDyn};
use crate::memory::MemoryStore;
use crate::persona::PersonaStore;
use crate::proactive::{AuditReportReader, FsAuditReportReader, ProactiveChannel, ProactiveLoop, RoadmapReaderDyn};
use crate::registry::ProjectRegistry;
use crate::reply::PersonaReplyHandler;
use crate::roadmap::MarkdownRoadmapReader;
use crate::router::TriggerRouter;
use crate::secrets::EnvKey;
use crate::state::ThreadStateManager;
use std::sync::Arc;

/// Every collaborator the running bot process needs, held for its lifetime.
pub struct App {
    pub config: Config,
    pub chat: ChatManager,
    pub personas: Arc<PersonaStore>,
    pub registry: Arc<ProjectRegistry>,
    pub state: Arc<ThreadStateManager>,
    pub deliberation: Arc<DeliberationEngine>,
    pub reply: Arc<PersonaReplyHandler>,
    pub jobs: Arc<JobSpawner>,
    pub board: Arc<BoardIntegration>,
    pub router: Arc<TriggerRouter>,
    pub proactive: Arc<ProactiveLoop>,
}

impl App {
    /// Construct every collaborator and wire them together. Fails closed:
    /// a missing required secret or an unreachable database aborts startup
    /// rather than running with a degraded collaborator.
    pub async fn build(config: Config) -> Result<Self> {
        let pool = crate::db::connect(&config.sqlite_path()).await?;

        let env_key = EnvKey::load_or_create(&pool).await?;
        let personas = Arc::new(PersonaStore::new(pool.clone(), env_key));
        personas.seed_defaults().await?;

        let memory = MemoryStore::new(pool.clone());
        memory.initialize().await?;

        let registry = Arc::new(ProjectRegistry::new(pool.clone()));

        let tunables_path = config.data_dir.join("config.toml");
        let runtime = RuntimeConfig::new(crate::config::load_tunables_file(&tunables_path)?);
        crate::hotreload::spawn_file_watcher(tunables_path, runtime.clone());

        let state = Arc::new(ThreadStateManager::with_runtime(runtime.clone()));

        let bot_token = required_env("SLACK_BOT_TOKEN")?;
        let transport = SlackTransport::new(bot_token, config.bot_user_id.clone())?;
        let chat = ChatManager::new(Arc::new(transport));

        let llm: Arc<dyn LlmClientDyn> = {
            let api_key = required_env("ANTHROPIC_API_KEY")?;
            let model = std::env::var("SPACEBOT_MODEL").unwrap_or_else(|_| "claude-sonnet-4-5-20250929".to_string());
            Arc::new(AnthropicClient::new(api_key, model)?)
        };

        let self_executable = jobs::resolve_self_executable(config.runtime_env)?;
        let board_provider = github_board_provider()?;
        let board = Arc::new(BoardIntegration::new(board_provider, self_executable));

        let jobs = JobSpawner::new(chat.clone(), Arc::clone(&state), config.runtime_env);

        let discussions = DiscussionStore::new(pool.clone());
        let deliberation = DeliberationEngine::new(
            discussions,
            Arc::clone(&personas),
            Arc::clone(&memory),
            chat.clone(),
            Arc::clone(&llm),
            Arc::clone(&board),
            Arc::clone(&jobs),
            Arc::clone(&state),
            runtime.clone(),
        );

        let reply = PersonaReplyHandler::new(
            chat.clone(),
            Arc::clone(&personas),
            Arc::clone(&memory),
            Arc::clone(&llm),
            Arc::clone(&state),
        );

        let router = TriggerRouter::new(
            chat.clone(),
            Arc::clone(&personas),
            Arc::clone(&registry),
            Arc::clone(&state),
            Arc::clone(&deliberation),
            Arc::clone(&reply),
            Arc::clone(&jobs),
            Arc::clone(&board),
        );

        let channels = proactive_channels(&registry).await?;
        let roadmap: Arc<dyn RoadmapReaderDyn> = Arc::new(MarkdownRoadmapReader);
        let audit_reports: Arc<dyn AuditReportReader> = Arc::new(FsAuditReportReader);
        let proactive = ProactiveLoop::new(
            Arc::clone(&registry),
            Arc::clone(&personas),
            Arc::clone(&state),
            Arc::clone(&deliberation),
            Arc::clone(&jobs),
            Arc::clone(&board),
            chat.clone(),
            roadmap,
            audit_reports,
            channels,
            runtime,
        );

        Ok(Self { config, chat, personas, registry, state, deliberation, reply, jobs, board, router, proactive })
    }

    /// Spawn the proactive sweep loop onto the current runtime. Detached —
    /// the returned handle is not tracked, matching [`ProactiveLoop::run`]'s
    /// contract of running forever until the process exits.
    pub fn spawn_proactive_loop(&self) {
        tokio::spawn(Arc::clone(&self.proactive).run());
    }
}

fn required_env(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| ConfigError::Invalid(format!("{key} is required")).into())
}

fn github_board_provider() -> Result<Option<Arc<dyn BoardProviderDyn>>> {
    let token = std::env::var("GITHUB_TOKEN").ok();
    let repo = std::env::var("GITHUB_BOARD_REPO").ok();
    let project_number = std::env::var("GITHUB_BOARD_PROJECT_NUMBER").ok().and_then(|s| s.parse::<u64>().ok());

    match (token, repo, project_number) {
        (Some(token), Some(repo), Some(project_number)) => {
            let provider = GitHubBoardProvider::new(token, repo, project_number)?;
            Ok(Some(Arc::new(provider)))
        }
        _ => {
            tracing::info!("no GitHub board credentials configured; board falls back to CLI only");
            Ok(None)
        }
    }
}

async fn proactive_channels(registry: &ProjectRegistry) -> Result<Vec<ProactiveChannel>> {
    let projects = registry.all().await?;
    Ok(projects
        .into_iter()
        .filter_map(|project| {
            let channel = project.channel_id?;
            Some(ProactiveChannel {
                channel,
                project_path: Some(project.path),
                project_slug: Some(project.slug),
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqliteConnectOptions;
    use std::str::FromStr;

    #[tokio::test]
    async fn proactive_channels_skips_projects_without_a_bound_channel() {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").unwrap();
        let pool = sqlx::SqlitePool::connect_with(options).await.unwrap();
        crate::db::migrate(&pool).await.unwrap();
        let registry = ProjectRegistry::new(pool);

        let bound: crate::ChannelId = "C1".into();
        registry.register("widgets", "/repos/widgets", Some(&bound)).await.unwrap();
        registry.register("gadgets", "/repos/gadgets", None).await.unwrap();

        let channels = proactive_channels(&registry).await.unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].project_slug.as_deref(), Some("widgets"));
    }
}
