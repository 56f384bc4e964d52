//! Configuration loading, validation, and hot-reloadable tunables.

use crate::error::{ConfigError, Result};
use anyhow::Context as _;
use arc_swap::ArcSwap;
use std::sync::Arc;

/// Maximum contribution rounds per discussion.
pub const MAX_ROUNDS: u32 = 2;

/// Maximum persona posts per contribution round.
pub const MAX_CONTRIBUTIONS_PER_ROUND: usize = 2;

/// Maximum total persona replies to a discussion thread.
pub const MAX_AGENT_THREAD_REPLIES: usize = 4;

/// Lower bound of the human-pause random delay.
pub const HUMAN_DELAY_MIN_SECS: u64 = 20;

/// Upper bound of the human-pause random delay.
pub const HUMAN_DELAY_MAX_SECS: u64 = 60;

/// Debounce window for the human-pause resume timer.
pub const DISCUSSION_RESUME_DELAY_SECS: u64 = 60;

/// Window within which an identical re-fired trigger is coalesced onto the
/// existing discussion row instead of starting a new one.
pub const DISCUSSION_REPLAY_GUARD_MINUTES: i64 = 30;

/// Minimum gap between two replies by the same persona to the same thread.
pub const PERSONA_REPLY_COOLDOWN_SECS: i64 = 45;

/// TTL for ad-hoc (discussion-free) thread persona memory.
pub const AD_HOC_MEMORY_TTL_SECS: i64 = 3600;

/// Capacity of the processed-message dedup LRU.
pub const DEDUP_LRU_CAPACITY: usize = 2000;

/// Interval on which the proactive sweep timer fires.
pub const PROACTIVE_SWEEP_INTERVAL_SECS: u64 = 60;

/// Minimum channel idle time before a proactive post is considered.
pub const PROACTIVE_IDLE_THRESHOLD_MINUTES: i64 = 20;

/// Minimum gap between two proactive posts in the same channel.
pub const PROACTIVE_POST_COOLDOWN_MINUTES: i64 = 90;

/// Minimum gap between code-watch audits for the same project.
pub const CODE_WATCH_INTERVAL_HOURS: i64 = 3;

/// Timeout applied to every subprocess invocation used for board side effects.
pub const BOARD_CLI_TIMEOUT_SECS: u64 = 15;

/// Probability that an ambient-sprinkle reaction fires for a given persona.
pub const AMBIENT_SPRINKLE_PROBABILITY: f64 = 0.25;

/// Probability that a piggyback second reply fires after a reply.
pub const PIGGYBACK_PROBABILITY: f64 = 0.4;

/// Minimum keyword-overlap score lead a non-remembered persona needs over
/// the remembered persona to trigger an ad-hoc handoff.
pub const HANDOFF_SCORE_MARGIN: usize = 2;

/// Static configuration loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: std::path::PathBuf,
    pub bot_user_id: String,
    pub runtime_env: RuntimeEnv,
}

/// Environment the host process runs in (affects how [`crate::jobs::JobSpawner`]
/// resolves the self-executable for spawned subprocesses).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeEnv {
    /// Running from a compiled release binary.
    Compiled,
    /// Running under a dev loader (`cargo run`): subprocess must be re-invoked
    /// through the same loader rather than by resolving `current_exe()`.
    DevLoader,
}

impl Config {
    /// Load configuration from the environment.
    pub fn load() -> Result<Self> {
        let data_dir = std::env::var("SPACEBOT_DATA_DIR")
            .map(std::path::PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::data_dir()
                    .map(|d| d.join("spacebot-core"))
                    .unwrap_or_else(|| std::path::PathBuf::from("./data"))
            });

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

        let bot_user_id = std::env::var("SPACEBOT_BOT_USER_ID")
            .map_err(|_| ConfigError::Invalid("SPACEBOT_BOT_USER_ID is required".into()))?;

        let runtime_env = if std::env::var("CARGO").is_ok() {
            RuntimeEnv::DevLoader
        } else {
            RuntimeEnv::Compiled
        };

        Ok(Self {
            data_dir,
            bot_user_id,
            runtime_env,
        })
    }

    pub fn sqlite_path(&self) -> std::path::PathBuf {
        self.data_dir.join("spacebot.db")
    }
}

/// Tunables that may be hot-reloaded without restarting the process, read
/// fresh on every router/deliberation/proactive pass via [`ArcSwap::load`].
#[derive(Debug, Clone, Copy)]
pub struct SchedulingTunables {
    pub max_rounds: u32,
    pub max_contributions_per_round: usize,
    pub max_agent_thread_replies: usize,
    pub persona_reply_cooldown_secs: i64,
    pub proactive_sweep_interval_secs: u64,
}

impl Default for SchedulingTunables {
    fn default() -> Self {
        Self {
            max_rounds: MAX_ROUNDS,
            max_contributions_per_round: MAX_CONTRIBUTIONS_PER_ROUND,
            max_agent_thread_replies: MAX_AGENT_THREAD_REPLIES,
            persona_reply_cooldown_secs: PERSONA_REPLY_COOLDOWN_SECS,
            proactive_sweep_interval_secs: PROACTIVE_SWEEP_INTERVAL_SECS,
        }
    }
}

/// Hot-reloadable runtime configuration, threaded explicitly into the
/// collaborators that need it (no ambient/global state).
#[derive(Clone)]
pub struct RuntimeConfig {
    pub tunables: Arc<ArcSwap<SchedulingTunables>>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tunables: Arc::new(ArcSwap::from_pointee(SchedulingTunables::default())),
        }
    }
}

impl RuntimeConfig {
    pub fn new(tunables: SchedulingTunables) -> Self {
        Self {
            tunables: Arc::new(ArcSwap::from_pointee(tunables)),
        }
    }

    pub fn reload(&self, tunables: SchedulingTunables) {
        self.tunables.store(Arc::new(tunables));
    }
}

/// Partial override of [`SchedulingTunables`], as found in an optional
/// `config.toml` file. Absent fields keep the built-in default.
#[derive(Debug, Clone, Default, serde::Deserialize)]
struct SchedulingTunablesFile {
    max_rounds: Option<u32>,
    max_contributions_per_round: Option<usize>,
    max_agent_thread_replies: Option<usize>,
    persona_reply_cooldown_secs: Option<i64>,
    proactive_sweep_interval_secs: Option<u64>,
}

impl SchedulingTunablesFile {
    fn apply(self, base: SchedulingTunables) -> SchedulingTunables {
        SchedulingTunables {
            max_rounds: self.max_rounds.unwrap_or(base.max_rounds),
            max_contributions_per_round: self.max_contributions_per_round.unwrap_or(base.max_contributions_per_round),
            max_agent_thread_replies: self.max_agent_thread_replies.unwrap_or(base.max_agent_thread_replies),
            persona_reply_cooldown_secs: self.persona_reply_cooldown_secs.unwrap_or(base.persona_reply_cooldown_secs),
            proactive_sweep_interval_secs: self
                .proactive_sweep_interval_secs
                .unwrap_or(base.proactive_sweep_interval_secs),
        }
    }
}

/// Read `path` as TOML and apply whatever tunables it sets on top of the
/// compiled-in defaults. A missing file is not an error: it just means no
/// overrides are active yet.
pub fn load_tunables_file(path: &std::path::Path) -> Result<SchedulingTunables> {
    let base = SchedulingTunables::default();
    if !path.exists() {
        return Ok(base);
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read tunables file: {}", path.display()))?;
    let parsed: SchedulingTunablesFile =
        toml::from_str(&contents).map_err(|source| ConfigError::Other(anyhow::anyhow!(source)))?;

    Ok(parsed.apply(base))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tunables_file_keeps_defaults() {
        let path = std::env::temp_dir().join("spacebot-core-test-missing-config.toml");
        let _ = std::fs::remove_file(&path);
        let tunables = load_tunables_file(&path).expect("missing file is not an error");
        assert_eq!(tunables.max_rounds, MAX_ROUNDS);
        assert_eq!(tunables.proactive_sweep_interval_secs, PROACTIVE_SWEEP_INTERVAL_SECS);
    }

    #[test]
    fn tunables_file_overrides_only_the_fields_it_sets() {
        let path = std::env::temp_dir().join("spacebot-core-test-partial-config.toml");
        std::fs::write(&path, "max_rounds = 5\n").unwrap();
        let tunables = load_tunables_file(&path).expect("valid toml parses");
        std::fs::remove_file(&path).ok();

        assert_eq!(tunables.max_rounds, 5);
        assert_eq!(tunables.max_contributions_per_round, MAX_CONTRIBUTIONS_PER_ROUND);
    }

    #[test]
    fn runtime_config_reload_is_visible_through_arc_swap() {
        let runtime = RuntimeConfig::default();
        assert_eq!(runtime.tunables.load().max_rounds, MAX_ROUNDS);

        let mut updated = *runtime.tunables.load_full();
        updated.max_rounds = 9;
        runtime.reload(updated);

        assert_eq!(runtime.tunables.load().max_rounds, 9);
    }
}
