//! The proactive sweep: a single 60-second timer that fires code-watch
//! audits per project and unprompted persona chatter in idle channels.

use crate::board::{AuditTriageOutcome, BoardIntegration};
use crate::chat::{ChatManager, PostAs};
use crate::config::{
    CODE_WATCH_INTERVAL_HOURS, PROACTIVE_IDLE_THRESHOLD_MINUTES, PROACTIVE_POST_COOLDOWN_MINUTES, RuntimeConfig,
};
use crate::deliberation::DeliberationEngine;
use crate::humanizer::{self, HumanizeOpts};
use crate::jobs::JobSpawner;
use crate::persona::PersonaStore;
use crate::registry::ProjectRegistry;
use crate::state::ThreadStateManager;
use crate::{ChannelId, Job, JobAnchor, JobKind};
use rand::seq::IndexedRandom;
use std::sync::Arc;
use std::time::Duration;

/// One roadmap item, as reported by a [`RoadmapReader`].
#[derive(Debug, Clone)]
pub struct RoadmapItem {
    pub title: String,
    pub checked: bool,
    pub processed: bool,
}

/// Roadmap summary for a single project.
#[derive(Debug, Clone, Default)]
pub struct RoadmapSummary {
    pub found: bool,
    pub items: Vec<RoadmapItem>,
}

/// External collaborator the proactive loop asks for roadmap progress.
/// Pluggable so the core stays free of any particular roadmap file format.
pub trait RoadmapReader: Send + Sync + 'static {
    fn read(&self, project_path: &str) -> impl std::future::Future<Output = RoadmapSummary> + Send;
}

pub trait RoadmapReaderDyn: Send + Sync + 'static {
    fn read<'a>(&'a self, project_path: &'a str) -> std::pin::Pin<Box<dyn std::future::Future<Output = RoadmapSummary> + Send + 'a>>;
}

impl<T: RoadmapReader> RoadmapReaderDyn for T {
    fn read<'a>(&'a self, project_path: &'a str) -> std::pin::Pin<Box<dyn std::future::Future<Output = RoadmapSummary> + Send + 'a>> {
        Box::pin(RoadmapReader::read(self, project_path))
    }
}

/// A project channel the proactive loop considers for unprompted chatter.
#[derive(Debug, Clone)]
pub struct ProactiveChannel {
    pub channel: ChannelId,
    pub project_path: Option<String>,
    pub project_slug: Option<String>,
}

/// Reads a project's audit report from disk after an audit job exits,
/// requiring the file to post-date the spawn so stale reports are ignored.
pub trait AuditReportReader: Send + Sync + 'static {
    fn read_if_fresh(&self, project_path: &str, spawned_at: chrono::DateTime<chrono::Utc>) -> Option<String>;
}

/// Default reader: `logs/audit-report.md` under the project path.
pub struct FsAuditReportReader;

impl AuditReportReader for FsAuditReportReader {
    fn read_if_fresh(&self, project_path: &str, spawned_at: chrono::DateTime<chrono::Utc>) -> Option<String> {
        let path = std::path::Path::new(project_path).join("logs").join("audit-report.md");
        let metadata = std::fs::metadata(&path).ok()?;
        let modified: chrono::DateTime<chrono::Utc> = metadata.modified().ok()?.into();
        if modified < spawned_at {
            return None;
        }
        std::fs::read_to_string(&path).ok()
    }
}

/// Runs the code-watch-audit and idle-channel-chatter sweeps on a single
/// repeating timer.
pub struct ProactiveLoop {
    registry: Arc<ProjectRegistry>,
    personas: Arc<PersonaStore>,
    state: Arc<ThreadStateManager>,
    deliberation: Arc<DeliberationEngine>,
    jobs: Arc<JobSpawner>,
    board: Arc<BoardIntegration>,
    chat: ChatManager,
    roadmap: Arc<dyn RoadmapReaderDyn>,
    audit_reports: Arc<dyn AuditReportReader>,
    channels: Vec<ProactiveChannel>,
    runtime: RuntimeConfig,
}

impl ProactiveLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<ProjectRegistry>,
        personas: Arc<PersonaStore>,
        state: Arc<ThreadStateManager>,
        deliberation: Arc<DeliberationEngine>,
        jobs: Arc<JobSpawner>,
        board: Arc<BoardIntegration>,
        chat: ChatManager,
        roadmap: Arc<dyn RoadmapReaderDyn>,
        audit_reports: Arc<dyn AuditReportReader>,
        channels: Vec<ProactiveChannel>,
        runtime: RuntimeConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            personas,
            state,
            deliberation,
            jobs,
            board,
            chat,
            roadmap,
            audit_reports,
            channels,
            runtime,
        })
    }

    /// Run the sweep forever, re-reading the sweep interval from
    /// [`RuntimeConfig`] before every sleep so a hot-reloaded value takes
    /// effect on the next cycle. Intended to be handed to `tokio::spawn`
    /// once at startup.
    pub async fn run(self: Arc<Self>) {
        loop {
            let interval_secs = self.runtime.tunables.load().proactive_sweep_interval_secs;
            tokio::time::sleep(Duration::from_secs(interval_secs)).await;
            self.sweep_code_watch().await;
            self.sweep_idle_channels().await;
        }
    }

    async fn sweep_code_watch(&self) {
        let projects = match self.registry.all().await {
            Ok(p) => p,
            Err(error) => {
                tracing::warn!(%error, "failed to list registered projects for code-watch sweep");
                return;
            }
        };
        let Ok(active) = self.personas.get_active().await else { return };
        let Some(persona) = active.choose(&mut rand::rng()).cloned() else { return };

        for project in projects {
            if self.state.hours_since_code_watch_audit(&project.path).await < CODE_WATCH_INTERVAL_HOURS {
                continue;
            }

            let anchor_channel = project.channel_id.clone().unwrap_or_else(|| "".into());

            let spawned_at = chrono::Utc::now();
            self.state.record_code_watch_audit(&project.path).await;

            let job = Job {
                kind: JobKind::Audit,
                target_project: project.path.clone(),
                anchor: JobAnchor { channel: anchor_channel, thread_ts: None, persona_id: persona.id.clone().into() },
                pr_number: None,
                issue_number: None,
                fix_conflicts: false,
                prompt: None,
            };
            self.jobs.spawn_night_watch_job(job, persona.clone());

            let project_path = project.path.clone();
            let board = Arc::clone(&self.board);
            let audit_reports = Arc::clone(&self.audit_reports);
            let chat = self.chat.clone();
            let reporter = persona.clone();
            let post_channel = project.channel_id.clone().unwrap_or_else(|| "".into());
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
                let Some(report) = audit_reports.read_if_fresh(&project_path, spawned_at) else { return };
                let trimmed = report.trim();
                if trimmed.is_empty() || trimmed == "NO_ISSUES_FOUND" {
                    return;
                }

                let text = match board.handle_audit_report(trimmed).await {
                    Ok(AuditTriageOutcome::Filed(issue)) => format!("Filed #{}: {}", issue.number, issue.url),
                    Ok(AuditTriageOutcome::NoBoard(summary)) => humanizer::humanize(&summary, &HumanizeOpts::verdict()),
                    Err(error) => {
                        tracing::warn!(%error, project = %project_path, "failed to triage audit report");
                        return;
                    }
                };
                if text == "SKIP" {
                    return;
                }

                let post_as = PostAs { display_name: reporter.display_name.clone(), icon_url: reporter.avatar_url.clone() };
                if let Err(error) = chat.transport().post_as(&post_channel, &text, &post_as, None).await {
                    tracing::warn!(%error, project = %project_path, "failed to post audit triage result");
                }
            });
        }
    }

    async fn sweep_idle_channels(&self) {
        for proactive_channel in &self.channels {
            let idle = self.state.channel_idle_minutes(&proactive_channel.channel).await;
            let since_last_post = self.state.minutes_since_proactive_post(&proactive_channel.channel).await;

            if idle < PROACTIVE_IDLE_THRESHOLD_MINUTES || since_last_post < PROACTIVE_POST_COOLDOWN_MINUTES {
                continue;
            }

            self.state.record_proactive_post(&proactive_channel.channel).await;

            let Ok(active) = self.personas.get_active().await else { continue };
            let Some(persona) = active.choose(&mut rand::rng()) else { continue };

            let roadmap_context = match &proactive_channel.project_path {
                Some(path) => self.format_roadmap(path).await,
                None => String::new(),
            };
            let project_context = proactive_channel.project_path.clone().unwrap_or_default();

            if let Err(error) = self
                .deliberation
                .post_proactive_message(
                    &proactive_channel.channel,
                    persona,
                    &project_context,
                    &roadmap_context,
                    proactive_channel.project_slug.as_deref(),
                )
                .await
            {
                tracing::warn!(%error, channel = %proactive_channel.channel, "proactive post failed");
            }
        }
    }

    async fn format_roadmap(&self, project_path: &str) -> String {
        let summary = self.roadmap.read(project_path).await;
        format_roadmap_summary(project_path, &summary)
    }
}

fn format_roadmap_summary(project_path: &str, summary: &RoadmapSummary) -> String {
    if !summary.found {
        return String::new();
    }

    let total = summary.items.len();
    let done = summary.items.iter().filter(|i| i.checked).count();
    let next: Vec<&str> = summary.items.iter().filter(|i| !i.checked).take(3).map(|i| i.title.as_str()).collect();

    let name = std::path::Path::new(project_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| project_path.to_string());

    format!("{name}: {done}/{total} roadmap items done. Next up: {}", next.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreported_project_formats_to_empty_string() {
        let summary = RoadmapSummary::default();
        assert_eq!(format_roadmap_summary("/repos/widgets", &summary), "");
    }

    #[test]
    fn found_roadmap_formats_progress_and_next_items() {
        let summary = RoadmapSummary {
            found: true,
            items: vec![
                RoadmapItem { title: "Set up CI".into(), checked: true, processed: true },
                RoadmapItem { title: "Ship auth".into(), checked: false, processed: false },
                RoadmapItem { title: "Write docs".into(), checked: false, processed: false },
            ],
        };

        let text = format_roadmap_summary("/repos/widgets", &summary);
        assert_eq!(text, "widgets: 1/3 roadmap items done. Next up: Ship auth, Write docs");
    }
}
