//! Subprocess job spawning: delegates long-running work (review, qa, audit,
//! direct provider invocations) to the runtime binary itself or to external
//! provider CLIs, streaming output back into chat on completion.

use crate::chat::{ChatManager, PostAs};
use crate::config::RuntimeEnv;
use crate::error::{JobError, Result};
use crate::humanizer::{self, HumanizeOpts};
use crate::persona::Persona;
use crate::state::ThreadStateManager;
use crate::{Job, JobKind};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

const OUTPUT_BUFFER_CAP: usize = 12_000;

/// Spawns and supervises the subprocesses a job triggers. Every public spawn
/// method returns immediately; the watcher task runs detached.
pub struct JobSpawner {
    chat: ChatManager,
    state: Arc<ThreadStateManager>,
    runtime_env: RuntimeEnv,
}

impl JobSpawner {
    pub fn new(chat: ChatManager, state: Arc<ThreadStateManager>, runtime_env: RuntimeEnv) -> Arc<Self> {
        Arc::new(Self { chat, state, runtime_env })
    }

    fn resolve_self_executable(&self) -> Result<Vec<String>> {
        resolve_self_executable(self.runtime_env)
    }

    /// Invoke the runtime binary itself with `[kind]`, feeding it the
    /// job-specific environment the spec requires.
    pub fn spawn_night_watch_job(self: &Arc<Self>, job: Job, persona: Persona) {
        let spawner = Arc::clone(self);
        tokio::spawn(async move {
            let Ok(argv) = spawner.resolve_self_executable() else {
                spawner.post_completion(&job.anchor, &persona, "can't start right now.").await;
                return;
            };
            let Some((program, prefix)) = argv.split_first() else {
                spawner.post_completion(&job.anchor, &persona, "can't start right now.").await;
                return;
            };

            let mut command = Command::new(program);
            command.args(prefix).arg(job.kind.to_string());
            command.current_dir(&job.target_project);
            command.env("NW_EXECUTION_CONTEXT", "agent");
            if let Some(pr) = &job.pr_number {
                command.env("NW_TARGET_PR", pr);
            }
            if let Some(issue) = &job.issue_number {
                command.env("NW_TARGET_ISSUE", issue);
            }
            if job.fix_conflicts
                && let Ok(feedback) = serde_json::to_string(&slack_feedback_payload(job.pr_number.as_deref()))
            {
                command.env("NW_SLACK_FEEDBACK", feedback);
            }

            spawner.run_and_report(command, &job, &persona).await;
        });
    }

    /// Invoke the external `claude` or `codex` binary directly.
    pub fn spawn_direct_provider_request(self: &Arc<Self>, job: Job, persona: Persona) {
        let spawner = Arc::clone(self);
        tokio::spawn(async move {
            let prompt = job.prompt.clone().unwrap_or_default();
            let provider = job.target_project.clone();

            let mut command = match provider.as_str() {
                "claude" => {
                    let mut c = Command::new("claude");
                    c.arg("-p").arg(&prompt).arg("--dangerously-skip-permissions");
                    c
                }
                "codex" => {
                    let mut c = Command::new("codex");
                    c.arg("--quiet").arg("--yolo").arg("--prompt").arg(&prompt);
                    c
                }
                other => {
                    tracing::warn!(provider = other, "unknown direct provider");
                    spawner.post_completion(&job.anchor, &persona, "couldn't kick that off.").await;
                    return;
                }
            };
            command.env("NW_EXECUTION_CONTEXT", "agent");

            spawner.run_and_report(command, &job, &persona).await;
        });
    }

    async fn run_and_report(&self, mut command: Command, job: &Job, persona: &Persona) {
        command.stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(error) => {
                tracing::warn!(%error, "job spawn failed");
                self.post_completion(&job.anchor, persona, "couldn't kick off that job.").await;
                return;
            }
        };

        let mut buffer = String::new();
        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                append_capped(&mut buffer, &line);
            }
        }
        if let Some(stderr) = child.stderr.take() {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                append_capped(&mut buffer, &line);
            }
        }

        let status = child.wait().await;

        self.state.record_channel_activity(&job.anchor.channel).await;
        self.state.record_reply(&job.anchor.channel, job.anchor.thread_ts.as_deref().unwrap_or(""), &job.anchor.persona_id).await;

        match status {
            Ok(status) if status.success() => {
                self.post_completion(&job.anchor, persona, &completion_line(job.kind)).await;
            }
            Ok(_) => {
                tracing::warn!(tail = %tail(&buffer, 2000), kind = %job.kind, "job exited non-zero");
                self.post_completion(&job.anchor, persona, "that job failed. Taking a look.").await;
            }
            Err(error) => {
                tracing::warn!(%error, "failed to wait on job child process");
                self.post_completion(&job.anchor, persona, "lost track of that job.").await;
            }
        }
    }

    async fn post_completion(&self, anchor: &crate::JobAnchor, persona: &Persona, raw: &str) {
        let text = humanizer::humanize(raw, &HumanizeOpts::verdict());
        if text == "SKIP" {
            return;
        }
        let post_as = PostAs { display_name: persona.display_name.clone(), icon_url: persona.avatar_url.clone() };
        if let Err(error) = self
            .chat
            .transport()
            .post_as(&anchor.channel, &text, &post_as, anchor.thread_ts.as_deref())
            .await
        {
            tracing::warn!(%error, "failed to post job completion line");
        }
    }
}

/// Resolve the argv prefix used to re-invoke this binary as a child process,
/// for both [`JobSpawner`] subprocesses and the board CLI fallback.
/// Dev-loader runs must go back through `cargo run` since the compiled
/// artifact path is not stable between invocations.
pub fn resolve_self_executable(runtime_env: RuntimeEnv) -> Result<Vec<String>> {
    match runtime_env {
        RuntimeEnv::Compiled => {
            let exe = std::env::current_exe().map_err(|_| JobError::BinaryUnresolved)?;
            Ok(vec![exe.to_string_lossy().into_owned()])
        }
        RuntimeEnv::DevLoader => Ok(vec!["cargo".to_string(), "run".to_string(), "--".to_string()]),
    }
}

fn append_capped(buffer: &mut String, line: &str) {
    buffer.push_str(line);
    buffer.push('\n');
    if buffer.len() > OUTPUT_BUFFER_CAP {
        let excess = buffer.len() - OUTPUT_BUFFER_CAP;
        buffer.replace_range(0..excess, "");
    }
}

fn tail(buffer: &str, n: usize) -> String {
    let start = buffer.len().saturating_sub(n);
    buffer[start..].to_string()
}

fn completion_line(kind: JobKind) -> String {
    match kind {
        JobKind::Run => "Done. Ready for a look.".to_string(),
        JobKind::Review => "Review's in.".to_string(),
        JobKind::Qa => "QA pass complete.".to_string(),
        JobKind::Audit => "Audit finished.".to_string(),
        JobKind::Provider => "Finished up.".to_string(),
    }
}

/// The `NW_SLACK_FEEDBACK` payload handed to a re-invoked job binary when
/// it's being asked to resolve merge conflicts on an existing PR.
fn slack_feedback_payload(pr_number: Option<&str>) -> serde_json::Value {
    serde_json::json!({
        "source": "slack",
        "kind": "merge_conflict_resolution",
        "prNumber": pr_number,
        "changes": "Resolve merge conflicts and stabilize the PR for re-review.",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slack_feedback_payload_matches_expected_shape() {
        let payload = slack_feedback_payload(Some("42"));
        assert_eq!(payload["source"], "slack");
        assert_eq!(payload["kind"], "merge_conflict_resolution");
        assert_eq!(payload["prNumber"], "42");
        assert_eq!(payload["changes"], "Resolve merge conflicts and stabilize the PR for re-review.");
    }

    #[test]
    fn append_capped_trims_from_the_front_past_capacity() {
        let mut buffer = "a".repeat(OUTPUT_BUFFER_CAP);
        append_capped(&mut buffer, "overflow");
        assert!(buffer.len() <= OUTPUT_BUFFER_CAP + "overflow".len() + 1);
        assert!(buffer.ends_with("overflow\n"));
    }

    #[test]
    fn tail_returns_at_most_n_trailing_chars() {
        let buffer = "0123456789";
        assert_eq!(tail(buffer, 4), "6789");
        assert_eq!(tail(buffer, 100), buffer);
    }

    #[test]
    fn completion_line_is_kind_specific() {
        assert_eq!(completion_line(JobKind::Audit), "Audit finished.");
        assert_eq!(completion_line(JobKind::Review), "Review's in.");
    }

    #[test]
    fn dev_loader_resolves_to_cargo_run_prefix() {
        let argv = resolve_self_executable(RuntimeEnv::DevLoader).unwrap();
        assert_eq!(argv, vec!["cargo", "run", "--"]);
    }
}
