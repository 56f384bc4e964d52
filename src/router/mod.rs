//! The trigger router: a fixed 14-stage classification chain over inbound
//! chat events. The first stage whose grammar matches and whose gate
//! passes consumes the event; everything else is tried in order.

use crate::chat::{ChatManager, PostAs};
use crate::config::AMBIENT_SPRINKLE_PROBABILITY;
use crate::deliberation::DeliberationEngine;
use crate::error::Result;
use crate::jobs::JobSpawner;
use crate::parser;
use crate::persona::{Persona, PersonaStore};
use crate::registry::ProjectRegistry;
use crate::reply::PersonaReplyHandler;
use crate::state::ThreadStateManager;
use crate::{ChannelId, InboundEvent, Job, JobAnchor, JobKind, ProjectRegistration, RouteOutcome, Trigger, TriggerType};
use rand::Rng;
use rand::seq::IndexedRandom;
use regex::Regex;
use std::sync::Arc;
use std::sync::LazyLock;

static REQUEST_LANGUAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(can someone|please|need|someone|anyone)\b").unwrap());
static LEADING_COMMAND: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^\s*(run|review|qa)\b").unwrap());
static AT_HANDLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@([a-zA-Z0-9._-]{2,32})").unwrap());
static USER_MENTION_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<@[A-Za-z0-9]+>").unwrap());
static GITHUB_ISSUE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"github\.com/([A-Za-z0-9_.\-]+/[A-Za-z0-9_.\-]+)/issues/(\d+)").unwrap());

/// Dispatches every normalized inbound event to the right collaborator.
/// Holds no state of its own beyond `Arc`s to the collaborators it was
/// built with.
pub struct TriggerRouter {
    chat: ChatManager,
    personas: Arc<PersonaStore>,
    registry: Arc<ProjectRegistry>,
    state: Arc<ThreadStateManager>,
    deliberation: Arc<DeliberationEngine>,
    reply: Arc<PersonaReplyHandler>,
    jobs: Arc<JobSpawner>,
    board: Arc<crate::board::BoardIntegration>,
}

impl TriggerRouter {
    pub fn new(
        chat: ChatManager,
        personas: Arc<PersonaStore>,
        registry: Arc<ProjectRegistry>,
        state: Arc<ThreadStateManager>,
        deliberation: Arc<DeliberationEngine>,
        reply: Arc<PersonaReplyHandler>,
        jobs: Arc<JobSpawner>,
        board: Arc<crate::board::BoardIntegration>,
    ) -> Arc<Self> {
        Arc::new(Self { chat, personas, registry, state, deliberation, reply, jobs, board })
    }

    pub async fn route(self: &Arc<Self>, event: InboundEvent) -> RouteOutcome {
        match self.route_inner(&event).await {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::warn!(%error, "router dispatch failed");
                RouteOutcome::Dropped { reason: "dispatch error" }
            }
        }
    }

    async fn route_inner(self: &Arc<Self>, event: &InboundEvent) -> Result<RouteOutcome> {
        // 1. Self/system filter.
        let (Some(channel_raw), Some(ts), Some(_user)) = (&event.channel, &event.ts, &event.user_id) else {
            return Ok(RouteOutcome::Dropped { reason: "missing channel/ts/user" });
        };
        if event.subtype.is_some() {
            return Ok(RouteOutcome::Dropped { reason: "subtype present" });
        }

        let channel: ChannelId = channel_raw.clone().into();

        if event.bot_sender_id.as_deref() == Some(self.chat.bot_user_id()) {
            if event.thread_ts.is_none() {
                let urls = parser::extract_github_issue_urls(&event.text);
                for url in &urls {
                    self.spawn_issue_review_from_url(&channel, url);
                }
                return Ok(RouteOutcome::IssueReviewScanned { urls: urls.len() });
            }
            return Ok(RouteOutcome::Dropped { reason: "bot-authored" });
        }

        // 2. Dedup.
        let dedup_key = format!("{channel}:{ts}:{}", event.event_type);
        if !self.state.remember_message_key(&dedup_key) {
            return Ok(RouteOutcome::Dropped { reason: "duplicate" });
        }

        let text = event.text.as_str();
        let thread_ts = event.thread_ts.clone().unwrap_or_else(|| ts.clone());
        let addressed = self.is_addressed_to_bot(text);

        // 3. Direct LLM-provider invocation.
        if let Some(outcome) = self.try_direct_provider(&channel, &thread_ts, text).await? {
            return Ok(outcome);
        }

        // 4. Job request.
        if let Some(outcome) = self.try_job_request(&channel, &thread_ts, text, addressed).await? {
            return Ok(outcome);
        }

        // 5. Issue pickup.
        if let Some(outcome) = self.try_issue_pickup(&channel, &thread_ts, text, addressed).await? {
            return Ok(outcome);
        }

        // 6 & 7. Explicit @-persona mention / plain-name mention.
        if let Some(outcome) = self.try_persona_mention(&channel, &thread_ts, text).await? {
            return Ok(outcome);
        }

        // 8. Existing discussion, no mention.
        if let Some(discussion) = self.deliberation.discussion_for_thread(&channel, &thread_ts).await? {
            self.deliberation.handle_human_message(discussion.id).await;
            return Ok(RouteOutcome::DiscussionContribution);
        }

        // 9. Remembered ad-hoc persona, with a possible handoff if another
        // active persona's domain keywords fit the incoming text better.
        if let Some(persona_id) = self.state.remembered_ad_hoc_persona(&channel, &thread_ts).await {
            if let Ok(remembered) = self.personas.get_by_id(&persona_id).await {
                let persona = self.maybe_handoff(&channel, &thread_ts, text, remembered).await?;
                self.reply.reply(&channel, &thread_ts, text, &persona, None).await?;
                return Ok(RouteOutcome::Replied);
            }
        }

        // 10. History recovery.
        if let Some(persona) = self.recover_persona_from_history(&channel, &thread_ts).await? {
            self.reply.reply(&channel, &thread_ts, text, &persona, None).await?;
            return Ok(RouteOutcome::Replied);
        }

        // 11. Ambient team chatter.
        if parser::is_ambient_chatter(text) {
            self.reply.engage_multiple(&channel, &thread_ts, text).await?;
            return Ok(RouteOutcome::AmbientEngaged { count: 0 });
        }

        // 12. Direct app-mention fallback.
        if event.event_type == "app_mention" {
            let active = self.personas.get_active().await?;
            if let Some(persona) = active.choose(&mut rand::rng()) {
                self.reply.reply(&channel, &thread_ts, text, persona, None).await?;
                return Ok(RouteOutcome::Replied);
            }
            return Ok(RouteOutcome::NoPersonasAvailable);
        }

        // 13. Ambient sprinkle.
        if self.try_ambient_sprinkle(&channel, ts).await? {
            return Ok(RouteOutcome::ReactionOnly);
        }

        // 14. Guaranteed fallback.
        let active = self.personas.get_active().await?;
        let Some(persona) = active.choose(&mut rand::rng()) else {
            tracing::warn!(channel = %channel, "no personas available for guaranteed fallback");
            return Ok(RouteOutcome::NoPersonasAvailable);
        };
        self.reply.reply(&channel, &thread_ts, text, persona, None).await?;
        Ok(RouteOutcome::Fallback)
    }

    fn is_addressed_to_bot(&self, text: &str) -> bool {
        text.contains(&format!("<@{}>", self.chat.bot_user_id()))
    }

    async fn try_direct_provider(&self, channel: &ChannelId, thread_ts: &str, text: &str) -> Result<Option<RouteOutcome>> {
        // The grammar is anchored at the start of the message, so a
        // successful parse already satisfies "begins with the provider
        // command" half of the gate; no further check is needed.
        let Some(request) = parser::parse_direct_provider_request(text) else { return Ok(None) };

        let active = self.personas.get_active().await?;
        let Some(persona) = pick_named(&active, "dev").or_else(|| active.first()) else {
            return Ok(Some(RouteOutcome::NoPersonasAvailable));
        };

        let ack = format!("On it — kicking off {} for you.", request.provider);
        let post_as = PostAs { display_name: persona.display_name.clone(), icon_url: persona.avatar_url.clone() };
        self.chat.transport().post_as(channel, &ack, &post_as, Some(thread_ts)).await.ok();

        let job = Job {
            kind: JobKind::Provider,
            target_project: request.provider.clone(),
            anchor: JobAnchor {
                channel: channel.clone(),
                thread_ts: Some(thread_ts.to_string()),
                persona_id: persona.id.clone().into(),
            },
            pr_number: None,
            issue_number: None,
            fix_conflicts: false,
            prompt: Some(request.prompt),
        };
        self.jobs.spawn_direct_provider_request(job, persona.clone());

        Ok(Some(RouteOutcome::ProviderInvoked))
    }

    async fn try_job_request(
        &self,
        channel: &ChannelId,
        thread_ts: &str,
        text: &str,
        addressed: bool,
    ) -> Result<Option<RouteOutcome>> {
        let Some(request) = parser::parse_job_request(text) else { return Ok(None) };

        let gate = addressed
            || request.pr_number.is_some()
            || REQUEST_LANGUAGE.is_match(text)
            || LEADING_COMMAND.is_match(text);
        if !gate {
            return Ok(None);
        }

        let active = self.personas.get_active().await?;
        let preferred = match request.job.as_str() {
            "review" => "carlos",
            "qa" => "priya",
            "run" => "dev",
            _ => "",
        };
        let persona = pick_named(&active, preferred)
            .or_else(|| active.choose(&mut rand::rng()))
            .cloned();
        let Some(persona) = persona else { return Ok(Some(RouteOutcome::NoPersonasAvailable)) };

        let project = self.resolve_project(request.project_hint.as_deref(), channel).await?;
        let target_project = project.map(|p| p.path).unwrap_or_default();

        let kind = match request.job.as_str() {
            "review" => JobKind::Review,
            "qa" => JobKind::Qa,
            _ => JobKind::Run,
        };

        let job = Job {
            kind,
            target_project,
            anchor: JobAnchor {
                channel: channel.clone(),
                thread_ts: Some(thread_ts.to_string()),
                persona_id: persona.id.clone().into(),
            },
            pr_number: request.pr_number,
            issue_number: None,
            fix_conflicts: request.fix_conflicts,
            prompt: None,
        };
        self.jobs.spawn_night_watch_job(job, persona);

        Ok(Some(RouteOutcome::JobSpawned { kind }))
    }

    async fn try_issue_pickup(
        &self,
        channel: &ChannelId,
        thread_ts: &str,
        text: &str,
        addressed: bool,
    ) -> Result<Option<RouteOutcome>> {
        let Some(pickup) = parser::parse_issue_pickup(text) else { return Ok(None) };
        if !(addressed || REQUEST_LANGUAGE.is_match(text)) {
            return Ok(None);
        }

        let active = self.personas.get_active().await?;
        let Some(persona) = pick_named(&active, "dev").or_else(|| active.first()) else {
            return Ok(Some(RouteOutcome::NoPersonasAvailable));
        };

        if let Err(error) = self.board.move_issue(pickup.issue_number.parse().unwrap_or_default(), "In Progress").await {
            tracing::warn!(%error, issue = %pickup.issue_number, "best-effort board move failed");
        }

        let project = self.registry.by_hint(&pickup.owner_repo).await?;
        let target_project = project.map(|p| p.path).unwrap_or(pickup.owner_repo.clone());

        let job = Job {
            kind: JobKind::Run,
            target_project,
            anchor: JobAnchor {
                channel: channel.clone(),
                thread_ts: Some(thread_ts.to_string()),
                persona_id: persona.id.clone().into(),
            },
            pr_number: None,
            issue_number: Some(pickup.issue_number),
            fix_conflicts: false,
            prompt: None,
        };
        self.jobs.spawn_night_watch_job(job, persona.clone());

        Ok(Some(RouteOutcome::IssuePickedUp))
    }

    async fn try_persona_mention(&self, channel: &ChannelId, thread_ts: &str, text: &str) -> Result<Option<RouteOutcome>> {
        let active = self.personas.get_active().await?;

        let mut matched: Vec<Persona> = AT_HANDLE
            .captures_iter(text)
            .filter_map(|c| {
                let handle = c.get(1)?.as_str().to_lowercase();
                active.iter().find(|p| p.display_name.to_lowercase() == handle).cloned()
            })
            .collect();

        if matched.is_empty() {
            let stripped = USER_MENTION_TOKEN.replace_all(text, " ");
            let lower = stripped.to_lowercase();
            matched = active
                .iter()
                .filter(|p| word_boundary_contains(&lower, &p.display_name.to_lowercase()))
                .cloned()
                .collect();
        }

        if matched.is_empty() {
            return Ok(None);
        }

        let discussion = self.deliberation.discussion_for_thread(channel, thread_ts).await?;

        for persona in &matched {
            match &discussion {
                Some(d) => self.deliberation.contribute_as_agent(d.id, persona).await?,
                None => {
                    self.reply.reply(channel, thread_ts, text, persona, None).await?;
                }
            }
        }

        Ok(Some(if discussion.is_some() { RouteOutcome::DiscussionContribution } else { RouteOutcome::Replied }))
    }

    async fn recover_persona_from_history(&self, channel: &ChannelId, thread_ts: &str) -> Result<Option<Persona>> {
        let history = self.chat.transport().thread_replies(channel, thread_ts, 50).await.unwrap_or_default();
        if history.is_empty() {
            return Ok(None);
        }

        let active = self.personas.get_active().await?;
        for message in history.iter().rev() {
            let Some(author) = &message.author else { continue };
            if let Some(persona) = active.iter().find(|p| &p.display_name == author) {
                self.state.remember_ad_hoc_persona(channel, thread_ts, &persona.id.clone().into()).await;
                return Ok(Some(persona.clone()));
            }
        }
        Ok(None)
    }

    /// Score every other active persona against `text` and switch away from
    /// `remembered` if one outscores it by at least `HANDOFF_SCORE_MARGIN`.
    async fn maybe_handoff(
        &self,
        channel: &ChannelId,
        thread_ts: &str,
        text: &str,
        remembered: Persona,
    ) -> Result<Persona> {
        let active = self.personas.get_active().await?;
        let remembered_score = remembered.handoff_score(text);

        let best = active
            .iter()
            .filter(|p| p.id != remembered.id)
            .map(|p| (p, p.handoff_score(text)))
            .max_by_key(|(_, score)| *score);

        if let Some((candidate, score)) = best
            && score >= remembered_score + crate::config::HANDOFF_SCORE_MARGIN
        {
            let candidate = candidate.clone();
            self.state.remember_ad_hoc_persona(channel, thread_ts, &candidate.id.clone().into()).await;
            return Ok(candidate);
        }

        Ok(remembered)
    }

    async fn try_ambient_sprinkle(&self, channel: &ChannelId, ts: &str) -> Result<bool> {
        let active = self.personas.get_active().await?;
        let mut sprinkled = false;
        for persona in &active {
            let persona_id: crate::PersonaId = persona.id.clone().into();
            if self.state.is_on_cooldown(channel, ts, &persona_id).await {
                continue;
            }
            if rand::rng().random_bool(AMBIENT_SPRINKLE_PROBABILITY) {
                self.chat.transport().add_reaction(channel, ts, "eyes").await.ok();
                self.state.record_reply(channel, ts, &persona_id).await;
                sprinkled = true;
            }
        }
        Ok(sprinkled)
    }

    async fn resolve_project(&self, hint: Option<&str>, channel: &ChannelId) -> Result<Option<ProjectRegistration>> {
        if let Some(hint) = hint
            && let Some(project) = self.registry.by_hint(hint).await?
        {
            return Ok(Some(project));
        }
        if let Some(project) = self.registry.by_channel(channel).await? {
            return Ok(Some(project));
        }
        let all = self.registry.all().await?;
        Ok(if all.len() == 1 { all.into_iter().next() } else { None })
    }

    fn spawn_issue_review_from_url(self: &Arc<Self>, channel: &ChannelId, url: &str) {
        let Some(caps) = GITHUB_ISSUE_URL.captures(url) else { return };
        let owner_repo = caps[1].to_string();
        let issue_number = caps[2].to_string();
        let trigger_ref = format!("{owner_repo}#{issue_number}");

        let router = Arc::clone(self);
        let channel = channel.clone();
        let url = url.to_string();
        tokio::spawn(async move {
            let project = router.registry.by_hint(&owner_repo).await.ok().flatten();
            let project_path = project.map(|p| p.path).unwrap_or_else(|| owner_repo.clone());

            let trigger = Trigger {
                trigger_type: TriggerType::IssueReview,
                project_path,
                trigger_ref,
                context: url,
                channel_id: Some(channel),
                thread_ts: None,
                opening_message: None,
            };
            if let Err(error) = router.deliberation.start_discussion(trigger).await {
                tracing::warn!(%error, "failed to start issue-review discussion from scanned URL");
            }
        });
    }
}

fn pick_named<'a>(personas: &'a [Persona], name: &str) -> Option<&'a Persona> {
    if name.is_empty() {
        return None;
    }
    personas.iter().find(|p| p.display_name.eq_ignore_ascii_case(name))
}

fn word_boundary_contains(haystack: &str, needle: &str) -> bool {
    haystack.split(|c: char| !c.is_alphanumeric()).any(|word| word == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::{Persona, Skill, Soul, Style};

    fn make_persona(name: &str) -> Persona {
        Persona {
            id: name.to_lowercase(),
            display_name: name.to_string(),
            role: "engineer".to_string(),
            avatar_url: None,
            soul: Soul::default(),
            style: Style::default(),
            skill: Skill::default(),
            expertise: vec![],
            interests: vec![],
            model_config: None,
            is_active: true,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn pick_named_is_case_insensitive_and_none_for_empty() {
        let personas = vec![make_persona("Dev"), make_persona("Carlos")];
        assert_eq!(pick_named(&personas, "carlos").unwrap().display_name, "Carlos");
        assert!(pick_named(&personas, "").is_none());
        assert!(pick_named(&personas, "priya").is_none());
    }

    #[test]
    fn word_boundary_contains_matches_whole_words_only() {
        assert!(word_boundary_contains("ping dev about this", "dev"));
        assert!(!word_boundary_contains("development is ongoing", "dev"));
    }

    #[test]
    fn github_issue_url_regex_captures_owner_repo_and_number() {
        let caps = GITHUB_ISSUE_URL.captures("see https://github.com/acme/widgets/issues/42 for details").unwrap();
        assert_eq!(&caps[1], "acme/widgets");
        assert_eq!(&caps[2], "42");
    }

    #[test]
    fn request_language_matches_common_asks() {
        assert!(REQUEST_LANGUAGE.is_match("can someone review this PR"));
        assert!(!REQUEST_LANGUAGE.is_match("reviewed this PR already"));
    }

    #[test]
    fn leading_command_matches_only_at_the_start() {
        assert!(LEADING_COMMAND.is_match("review this please"));
        assert!(!LEADING_COMMAND.is_match("please review this"));
    }
}
