//! The discussion state machine: opens discussions, runs contribution
//! rounds, and drives the single-threaded consensus loop.

use crate::board::BoardIntegration;
use crate::chat::{ChatManager, PostAs};
use crate::config::{HUMAN_DELAY_MAX_SECS, HUMAN_DELAY_MIN_SECS, RuntimeConfig};
use crate::deliberation::store::DiscussionStore;
use crate::deliberation::types::{ConsensusResult, Discussion, DiscussionStatus};
use crate::error::{DeliberationError, Result};
use crate::humanizer::{self, HumanizeOpts};
use crate::jobs::JobSpawner;
use crate::llm::LlmClientDyn;
use crate::memory::MemoryStore;
use crate::persona::{Persona, PersonaStore};
use crate::state::ThreadStateManager;
use crate::{ChannelId, DiscussionId, Job, JobAnchor, JobKind, Trigger};
use rand::Rng;
use rand::seq::IndexedRandom;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Wires the collaborators a discussion needs: persona/memory storage, chat
/// transport, LLM client, board integration, and shared in-memory state.
/// Built once at startup and handed to the router and proactive loop.
pub struct DeliberationEngine {
    discussions: DiscussionStore,
    personas: Arc<PersonaStore>,
    memory: Arc<MemoryStore>,
    chat: ChatManager,
    llm: Arc<dyn LlmClientDyn>,
    board: Arc<BoardIntegration>,
    jobs: Arc<JobSpawner>,
    state: Arc<ThreadStateManager>,
    runtime: RuntimeConfig,
    pause_timers: tokio::sync::Mutex<HashMap<DiscussionId, JoinHandle<()>>>,
}

impl DeliberationEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        discussions: DiscussionStore,
        personas: Arc<PersonaStore>,
        memory: Arc<MemoryStore>,
        chat: ChatManager,
        llm: Arc<dyn LlmClientDyn>,
        board: Arc<BoardIntegration>,
        jobs: Arc<JobSpawner>,
        state: Arc<ThreadStateManager>,
        runtime: RuntimeConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            discussions,
            personas,
            memory,
            chat,
            llm,
            board,
            jobs,
            state,
            runtime,
            pause_timers: tokio::sync::Mutex::new(HashMap::new()),
        })
    }

    /// Idempotent per `trigger.key()`: concurrent callers for the same
    /// trigger coalesce onto a single discussion, and an identical trigger
    /// fired again within the replay guard window reuses the existing row
    /// instead of opening a duplicate thread.
    pub async fn start_discussion(self: &Arc<Self>, trigger: Trigger) -> Result<DiscussionId> {
        let key = trigger.key();
        let semaphore = self.state.in_flight_guard(&key).await;
        let _permit = semaphore.acquire().await.expect("in-flight semaphore closed");

        if let Some(existing) = self.state.discussion_for_key(&key).await {
            return Ok(existing);
        }

        if let Some(existing) = self
            .discussions
            .latest_for_trigger(&trigger.project_path, trigger.trigger_type, &trigger.trigger_ref)
            .await?
            && (existing.status == DiscussionStatus::Active || DiscussionStore::within_replay_guard(&existing))
        {
            self.state.publish_discussion(&key, existing.id).await;
            return Ok(existing.id);
        }

        let channel = trigger
            .channel_id
            .clone()
            .ok_or_else(|| DeliberationError::NoChannel { project_path: trigger.project_path.clone() })?;

        let participants = self.select_participants(trigger.trigger_type).await?;
        let participant_ids: Vec<crate::PersonaId> = participants.iter().map(|p| p.id.clone().into()).collect();

        let opening = trigger
            .opening_message
            .clone()
            .unwrap_or_else(|| crate::parser::opening_message(trigger.trigger_type, &trigger.trigger_ref, &trigger.context));

        self.chat.transport().join_channel(&channel).await.ok();
        let posted = self.chat.transport().post_as_bot(&channel, &opening, trigger.thread_ts.as_deref()).await?;
        let thread_anchor = trigger.thread_ts.clone().unwrap_or(posted.ts);

        let discussion = self
            .discussions
            .create(
                &trigger.project_path,
                trigger.trigger_type,
                &trigger.trigger_ref,
                &trigger.context,
                &channel,
                &thread_anchor,
                participant_ids,
            )
            .await?;

        self.state.publish_discussion(&key, discussion.id).await;

        let engine = Arc::clone(self);
        let discussion_id = discussion.id;
        tokio::spawn(async move {
            if let Err(error) = engine.run_rounds(discussion_id).await {
                tracing::warn!(%error, discussion_id = %discussion_id, "discussion round loop failed");
            }
        });

        Ok(discussion.id)
    }

    /// Select the persona roster for a new discussion, keyed on trigger type:
    /// pr_review, code_watch, and issue_review pull in every active persona;
    /// build_failure and prd_kickoff are Dev-and-Carlos-only.
    async fn select_participants(&self, trigger_type: crate::TriggerType) -> Result<Vec<Persona>> {
        let active = self.personas.get_active().await?;
        if active.is_empty() {
            return Err(DeliberationError::NoParticipants { trigger_type: trigger_type.to_string() }.into());
        }

        let roster = filter_roster(active, trigger_type);

        if roster.is_empty() {
            return Err(DeliberationError::NoParticipants { trigger_type: trigger_type.to_string() }.into());
        }
        Ok(roster)
    }

    /// The active discussion anchored on `(channel, threadTs)`, if any.
    pub async fn discussion_for_thread(&self, channel: &ChannelId, thread_ts: &str) -> Result<Option<Discussion>> {
        self.discussions.active_for_thread(channel, thread_ts).await
    }

    /// Contribution rounds, then the consensus evaluator, up to
    /// `MAX_ROUNDS`. Forces a `human_needed` verdict if no round reaches
    /// consensus.
    async fn run_rounds(self: &Arc<Self>, discussion_id: DiscussionId) -> Result<()> {
        let all_personas = self.personas.get_active().await?;
        let tunables = self.runtime.tunables.load();

        for _round in 0..tunables.max_rounds {
            let discussion = self.discussions.get(discussion_id).await?;
            if discussion.status != DiscussionStatus::Active {
                return Ok(());
            }

            let participants: Vec<Persona> = all_personas
                .iter()
                .filter(|p| discussion.participants.iter().any(|id| id.as_ref() == p.id))
                .cloned()
                .collect();
            let round_contributors = contributors(&participants, discussion.round);

            let remaining_budget =
                tunables.max_agent_thread_replies.saturating_sub(discussion.replies_used).saturating_sub(1);
            let round_budget = tunables.max_contributions_per_round.min(remaining_budget);

            for persona in round_contributors.into_iter().take(round_budget) {
                if let Err(error) = self.contribute_as_agent(discussion_id, persona).await {
                    tracing::warn!(%error, persona_id = %persona.id, "contribution failed");
                }
            }

            let discussion = self.discussions.get(discussion_id).await?;
            if discussion.status != DiscussionStatus::Active {
                return Ok(());
            }

            let Some(lead) = lead_persona(&participants) else {
                self.discussions
                    .set_terminal(discussion_id, DiscussionStatus::Blocked, ConsensusResult::HumanNeeded)
                    .await?;
                return Ok(());
            };

            match self.evaluate_consensus(discussion_id, lead).await {
                Ok((status, result, message)) => {
                    self.post_persona_message(&discussion, lead, &message, HumanizeOpts::verdict()).await.ok();
                    if status == DiscussionStatus::Active {
                        self.discussions.advance_round(discussion_id).await?;
                    } else {
                        self.discussions.set_terminal(discussion_id, status, result).await?;
                        if result == ConsensusResult::Approved && discussion.trigger_type == crate::TriggerType::CodeWatch {
                            self.file_code_watch_issue(&discussion).await;
                        } else if result == ConsensusResult::ChangesRequested
                            && discussion.trigger_type == crate::TriggerType::PrReview
                        {
                            self.spawn_reviewer_refinement(&discussion, lead).await;
                        }
                        return Ok(());
                    }
                }
                Err(error) => {
                    tracing::warn!(%error, discussion_id = %discussion_id, "consensus evaluation failed");
                }
            }
        }

        self.discussions
            .set_terminal(discussion_id, DiscussionStatus::Blocked, ConsensusResult::HumanNeeded)
            .await?;
        Ok(())
    }

    /// One persona's contribution to the thread: build a prompt from its
    /// soul/style/skill plus standing project memory, humanize the
    /// response, and post it.
    pub async fn contribute_as_agent(&self, discussion_id: DiscussionId, persona: &Persona) -> Result<()> {
        let discussion = self.discussions.get(discussion_id).await?;
        let persona_id: crate::PersonaId = persona.id.clone().into();

        if self.state.is_on_cooldown(&discussion.channel_id, &discussion.thread_anchor, &persona_id).await {
            return Ok(());
        }

        let history = self
            .chat
            .transport()
            .thread_replies(&discussion.channel_id, &discussion.thread_anchor, 10)
            .await
            .unwrap_or_default();

        let memory_note = self.memory.get_memory(&persona.display_name, &discussion.project_path).await;
        let system_prompt = persona_system_prompt(persona, memory_note.as_deref());
        let user_prompt = render_thread_history(&history);

        let raw = self.llm.complete(&system_prompt, &user_prompt, 400).await?;
        if humanizer::is_skip_message(&raw) {
            return Ok(());
        }

        let opts = sampled_opts();
        self.post_persona_message(&discussion, persona, &raw, opts).await?;

        let engine_memory = Arc::clone(&self.memory);
        let llm = Arc::clone(&self.llm);
        let persona_name = persona.display_name.clone();
        let project = discussion.project_path.clone();
        let reflection_context = format!("{system_prompt}\n\n{raw}");
        tokio::spawn(async move {
            engine_memory.reflect(&persona_name, &project, &reflection_context, &llm).await;
        });

        Ok(())
    }

    async fn post_persona_message(&self, discussion: &Discussion, persona: &Persona, raw: &str, opts: HumanizeOpts) -> Result<()> {
        let text = humanizer::humanize(raw, &opts);
        if text == "SKIP" {
            return Ok(());
        }

        let dedup_key = format!("{}:{}:{}", discussion.channel_id, discussion.thread_anchor, text);
        if !self.state.remember_message_key(&dedup_key) {
            return Ok(());
        }

        let post_as = PostAs { display_name: persona.display_name.clone(), icon_url: persona.avatar_url.clone() };
        self.chat
            .transport()
            .post_as(&discussion.channel_id, &text, &post_as, Some(&discussion.thread_anchor))
            .await?;

        let persona_id: crate::PersonaId = persona.id.clone().into();
        self.state.record_reply(&discussion.channel_id, &discussion.thread_anchor, &persona_id).await;
        self.discussions.record_reply(discussion.id, &persona_id).await?;
        Ok(())
    }

    /// Ask the lead persona for a verdict and parse its required prefix.
    /// A `DiscussionStatus::Active` result means another round is requested
    /// rather than a terminal state; everything else — including a
    /// malformed, prefix-less verdict — is terminal.
    async fn evaluate_consensus(
        &self,
        discussion_id: DiscussionId,
        lead: &Persona,
    ) -> Result<(DiscussionStatus, ConsensusResult, String)> {
        let discussion = self.discussions.get(discussion_id).await?;
        let history = self
            .chat
            .transport()
            .thread_replies(&discussion.channel_id, &discussion.thread_anchor, 20)
            .await
            .unwrap_or_default();
        let user_prompt = render_thread_history(&history);

        if discussion.trigger_type == crate::TriggerType::IssueReview {
            let system_prompt = consensus_system_prompt(lead, &["READY:", "CLOSE:", "DRAFT:"]);
            let verdict = self.llm.complete(&system_prompt, &user_prompt, 300).await?;
            let trimmed = verdict.trim();

            if let Some(rest) = trimmed.strip_prefix("READY:") {
                return Ok((DiscussionStatus::Consensus, ConsensusResult::Approved, rest.trim().to_string()));
            }
            if let Some(rest) = trimmed.strip_prefix("CLOSE:") {
                return Ok((DiscussionStatus::Consensus, ConsensusResult::ChangesRequested, rest.trim().to_string()));
            }
            if let Some(rest) = trimmed.strip_prefix("DRAFT:") {
                return Ok((DiscussionStatus::Blocked, ConsensusResult::HumanNeeded, rest.trim().to_string()));
            }
            return Ok((DiscussionStatus::Blocked, ConsensusResult::HumanNeeded, trimmed.to_string()));
        }

        let system_prompt = consensus_system_prompt(lead, &["APPROVE:", "CHANGES:", "HUMAN:"]);
        let verdict = self.llm.complete(&system_prompt, &user_prompt, 300).await?;
        let trimmed = verdict.trim();

        if let Some(rest) = trimmed.strip_prefix("APPROVE:") {
            return Ok((DiscussionStatus::Consensus, ConsensusResult::Approved, rest.trim().to_string()));
        }
        if let Some(rest) = trimmed.strip_prefix("CHANGES:") {
            let message = rest.trim().to_string();
            let tunables = self.runtime.tunables.load();
            let replies_left = tunables.max_agent_thread_replies.saturating_sub(discussion.replies_used);
            if discussion.round < tunables.max_rounds && replies_left >= 3 {
                return Ok((DiscussionStatus::Active, ConsensusResult::ChangesRequested, message));
            }
            return Ok((DiscussionStatus::Consensus, ConsensusResult::ChangesRequested, message));
        }
        if let Some(rest) = trimmed.strip_prefix("HUMAN:") {
            return Ok((DiscussionStatus::Blocked, ConsensusResult::HumanNeeded, rest.trim().to_string()));
        }

        Ok((DiscussionStatus::Blocked, ConsensusResult::HumanNeeded, trimmed.to_string()))
    }

    /// Spawn a refinement job for the PR author once a pr_review discussion
    /// concludes with changes requested.
    async fn spawn_reviewer_refinement(&self, discussion: &Discussion, lead: &Persona) {
        let job = Job {
            kind: JobKind::Review,
            target_project: discussion.project_path.clone(),
            anchor: JobAnchor {
                channel: discussion.channel_id.clone(),
                thread_ts: Some(discussion.thread_anchor.clone()),
                persona_id: lead.id.clone().into(),
            },
            pr_number: Some(discussion.trigger_ref.clone()),
            issue_number: None,
            fix_conflicts: false,
            prompt: None,
        };
        self.jobs.spawn_night_watch_job(job, lead.clone());
    }

    /// File a tracking issue once a code-watch discussion reaches consensus.
    /// Best-effort: a board failure is logged, not propagated, since the
    /// discussion itself has already concluded successfully.
    async fn file_code_watch_issue(&self, discussion: &Discussion) {
        let history = self
            .chat
            .transport()
            .thread_replies(&discussion.channel_id, &discussion.thread_anchor, 30)
            .await
            .unwrap_or_default();
        let body = render_thread_history(&history);

        let signal = crate::parser::extract_labeled_line(&discussion.context, "Signal:")
            .unwrap_or_else(|| "an issue".to_string());
        let location = crate::parser::extract_labeled_line(&discussion.context, "Location:")
            .unwrap_or_else(|| "the codebase".to_string());

        if let Err(error) = self.board.open_issue_from_trigger(&signal, &location, &body).await {
            tracing::warn!(%error, discussion_id = %discussion.id, "failed to file code-watch issue");
        }
    }

    /// Compose a single unprompted 1-2 sentence message for an idle channel,
    /// reading memory first so the persona does not repeat a previously
    /// raised topic. After posting, 1-2 other random personas thread-reply
    /// at depth 1.
    pub async fn post_proactive_message(
        self: &Arc<Self>,
        channel: &ChannelId,
        persona: &Persona,
        project_context: &str,
        roadmap_context: &str,
        project_slug: Option<&str>,
    ) -> Result<()> {
        let memory_note = match project_slug {
            Some(slug) => self.memory.get_memory(&persona.display_name, slug).await,
            None => None,
        };

        let system_prompt = format!(
            "You are {name}, {role}, posting an unprompted observation into a quiet channel. \
             Standing memory: {memory}. Do not repeat a topic you have already raised. \
             Reply SKIP if there is nothing worth saying. Otherwise 1-2 sentences.",
            name = persona.display_name,
            role = persona.role,
            memory = memory_note.as_deref().unwrap_or("(none yet)"),
        );
        let user_prompt = format!("Project context:\n{project_context}\n\nRoadmap:\n{roadmap_context}");

        let raw = self.llm.complete(&system_prompt, &user_prompt, 200).await?;
        if humanizer::is_skip_message(&raw) {
            return Ok(());
        }

        let text = humanizer::humanize(&raw, &HumanizeOpts::default());
        if text == "SKIP" {
            return Ok(());
        }

        let dedup_key = format!("{channel}:proactive:{text}");
        if !self.state.remember_message_key(&dedup_key) {
            return Ok(());
        }

        let post_as = PostAs { display_name: persona.display_name.clone(), icon_url: persona.avatar_url.clone() };
        let posted = self.chat.transport().post_as(channel, &text, &post_as, None).await?;

        let engine = Arc::clone(self);
        let channel = channel.clone();
        let speaker_id = persona.id.clone();
        tokio::spawn(async move {
            if let Err(error) = engine.proactive_followups(channel, posted.ts, speaker_id).await {
                tracing::warn!(%error, "proactive follow-up fan-out failed");
            }
        });

        Ok(())
    }

    async fn proactive_followups(&self, channel: ChannelId, thread_ts: String, speaker_id: String) -> Result<()> {
        let available = self.personas.get_active().await?;
        let others: Vec<&Persona> = available.iter().filter(|p| p.id != speaker_id).collect();
        if others.is_empty() {
            return Ok(());
        }

        let chosen: Vec<&Persona> = {
            let mut rng = rand::rng();
            let followup_count = if others.len() == 1 { 1 } else { rng.random_range(1..=2) };
            others.choose_multiple(&mut rng, followup_count).copied().collect()
        };
        for persona in chosen {
            let history = self.chat.transport().thread_replies(&channel, &thread_ts, 5).await.unwrap_or_default();
            let memory_note = self.memory.get_memory(&persona.display_name, "").await;
            let system_prompt = persona_system_prompt(persona, memory_note.as_deref());
            let user_prompt = render_thread_history(&history);

            if let Ok(raw) = self.llm.complete(&system_prompt, &user_prompt, 200).await {
                let text = humanizer::humanize(&raw, &HumanizeOpts::default());
                if text == "SKIP" {
                    continue;
                }
                let dedup_key = format!("{channel}:{thread_ts}:{text}");
                if !self.state.remember_message_key(&dedup_key) {
                    continue;
                }
                let post_as = PostAs { display_name: persona.display_name.clone(), icon_url: persona.avatar_url.clone() };
                self.chat.transport().post_as(&channel, &text, &post_as, Some(&thread_ts)).await.ok();
                self.state.record_reply(&channel, &thread_ts, &persona.id.clone().into()).await;
            }
        }
        Ok(())
    }

    /// Debounced resume after a human posts in a discussion thread: cancels
    /// any pending resume timer and reschedules it `DISCUSSION_RESUME_DELAY_SECS`
    /// out, so a burst of human messages only triggers one resume.
    pub async fn handle_human_message(self: &Arc<Self>, discussion_id: DiscussionId) {
        let mut timers = self.pause_timers.lock().await;
        if let Some(existing) = timers.remove(&discussion_id) {
            existing.abort();
        }

        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(crate::config::DISCUSSION_RESUME_DELAY_SECS)).await;
            if let Err(error) = engine.run_rounds(discussion_id).await {
                tracing::warn!(%error, discussion_id = %discussion_id, "resumed round loop failed");
            }
        });
        timers.insert(discussion_id, handle);
    }
}

/// The persona roster for a new discussion, keyed on trigger type: pr_review,
/// code_watch, and issue_review pull in every active persona; build_failure
/// and prd_kickoff are Dev-and-Carlos-only.
fn filter_roster(active: Vec<Persona>, trigger_type: crate::TriggerType) -> Vec<Persona> {
    use crate::TriggerType::*;

    match trigger_type {
        PrReview | CodeWatch | IssueReview => active,
        BuildFailure | PrdKickoff => active
            .into_iter()
            .filter(|p| {
                let name = p.display_name.to_lowercase();
                name == "dev" || name == "carlos"
            })
            .collect(),
    }
}

fn lead_persona(participants: &[Persona]) -> Option<&Persona> {
    participants.iter().find(|p| p.display_name.eq_ignore_ascii_case("carlos"))
}

/// Contributors for a round: round 1 excludes Dev (who just posted the
/// opening message), and the lead is excluded from either round whenever
/// at least two other candidates remain.
fn contributors<'a>(participants: &'a [Persona], round: u32) -> Vec<&'a Persona> {
    let base: Vec<&Persona> = if round == 1 {
        let without_dev: Vec<&Persona> =
            participants.iter().filter(|p| !p.display_name.eq_ignore_ascii_case("dev")).collect();
        if without_dev.is_empty() { participants.iter().collect() } else { without_dev }
    } else {
        participants.iter().collect()
    };

    let lead = lead_persona(participants);
    let non_lead: Vec<&Persona> =
        base.iter().filter(|p| Some(p.id.as_str()) != lead.map(|l| l.id.as_str())).copied().collect();

    if non_lead.len() >= 2 { non_lead } else { base }
}

fn sampled_opts() -> HumanizeOpts {
    let mut rng = rand::rng();
    HumanizeOpts {
        max_sentences: humanizer::sample_max_sentences(&mut rng),
        max_chars: humanizer::sample_max_chars(&mut rng),
        allow_emoji: rng.random_bool(1.0 / 3.0),
        allow_non_facial: rng.random_bool(1.0 / 9.0),
    }
}

fn persona_system_prompt(persona: &Persona, memory_note: Option<&str>) -> String {
    let beliefs = persona.soul.beliefs.join("; ");
    let pet_peeves = persona.soul.pet_peeves.join("; ");
    let memory = memory_note.unwrap_or("(none yet)");

    format!(
        "You are {name}, {role}, contributing to a team chat thread.\n\
         Voice: {voice}\nEmoji rules: {emoji_rules}\nBeliefs: {beliefs}\nPet peeves: {pet_peeves}\n\
         Standing memory about this project: {memory}\n\
         Reply SKIP if you have nothing to add. Otherwise reply in 1-3 sentences, no markdown.",
        name = persona.display_name,
        role = persona.role,
        voice = persona.style.voice,
        emoji_rules = persona.style.emoji_rules,
    )
}

fn consensus_system_prompt(lead: &Persona, prefixes: &[&str]) -> String {
    format!(
        "You are {name}, {role}, the tech lead. Read the thread and decide whether the group has reached \
         consensus. Respond with exactly one of these prefixes followed by a one-sentence explanation: {prefixes}.",
        name = lead.display_name,
        role = lead.role,
        prefixes = prefixes.join(", "),
    )
}

fn render_thread_history(history: &[crate::ThreadMessage]) -> String {
    history
        .iter()
        .map(|m| format!("{}: {}", m.author.as_deref().unwrap_or("unknown"), m.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Jittered delay sampled from the human-pause window, used by callers that
/// want to wait before following up on a thread a human just posted in.
pub fn sample_human_delay(rng: &mut impl Rng) -> std::time::Duration {
    std::time::Duration::from_secs(rng.random_range(HUMAN_DELAY_MIN_SECS..=HUMAN_DELAY_MAX_SECS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TriggerType;
    use crate::persona::{Skill, Soul, Style};

    fn persona(name: &str) -> Persona {
        Persona {
            id: name.to_lowercase(),
            display_name: name.to_string(),
            role: format!("{name} role"),
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

    fn roster() -> Vec<Persona> {
        vec![persona("Dev"), persona("Carlos"), persona("Maya"), persona("Priya")]
    }

    #[test]
    fn filter_roster_keeps_everyone_for_pr_review_code_watch_and_issue_review() {
        for trigger in [TriggerType::PrReview, TriggerType::CodeWatch, TriggerType::IssueReview] {
            let filtered = filter_roster(roster(), trigger);
            assert_eq!(filtered.len(), 4, "expected full roster for {trigger:?}");
        }
    }

    #[test]
    fn filter_roster_narrows_to_dev_and_carlos_for_build_failure_and_prd_kickoff() {
        for trigger in [TriggerType::BuildFailure, TriggerType::PrdKickoff] {
            let filtered = filter_roster(roster(), trigger);
            let names: Vec<&str> = filtered.iter().map(|p| p.display_name.as_str()).collect();
            assert_eq!(names.len(), 2, "expected only Dev and Carlos for {trigger:?}");
            assert!(names.contains(&"Dev"));
            assert!(names.contains(&"Carlos"));
        }
    }

    #[test]
    fn lead_persona_finds_carlos_case_insensitively() {
        let participants = vec![persona("Dev"), persona("carlos"), persona("Maya")];
        let lead = lead_persona(&participants).unwrap();
        assert_eq!(lead.display_name, "carlos");
    }

    #[test]
    fn lead_persona_is_none_without_a_tech_lead() {
        let participants = vec![persona("Dev"), persona("Maya")];
        assert!(lead_persona(&participants).is_none());
    }

    #[test]
    fn contributors_round_one_excludes_dev() {
        let participants = roster();
        let round_one = contributors(&participants, 1);
        assert!(!round_one.iter().any(|p| p.display_name.eq_ignore_ascii_case("dev")));
    }

    #[test]
    fn contributors_round_one_falls_back_to_everyone_if_dev_is_the_only_participant() {
        let participants = vec![persona("Dev")];
        let round_one = contributors(&participants, 1);
        assert_eq!(round_one.len(), 1);
        assert_eq!(round_one[0].display_name, "Dev");
    }

    #[test]
    fn contributors_excludes_the_lead_when_enough_others_remain() {
        let participants = roster();
        let later_round = contributors(&participants, 2);
        assert!(!later_round.iter().any(|p| p.display_name.eq_ignore_ascii_case("carlos")));
        assert_eq!(later_round.len(), 3);
    }

    #[test]
    fn contributors_keeps_the_lead_when_too_few_others_remain() {
        let participants = vec![persona("Carlos"), persona("Maya")];
        let later_round = contributors(&participants, 2);
        assert!(later_round.iter().any(|p| p.display_name.eq_ignore_ascii_case("carlos")));
    }

    #[test]
    fn render_thread_history_formats_author_and_text_per_line() {
        let history = vec![
            crate::ThreadMessage { author: Some("Dev".to_string()), text: "shipped it".to_string(), ts: "1".to_string() },
            crate::ThreadMessage { author: None, text: "no author".to_string(), ts: "2".to_string() },
        ];
        let rendered = render_thread_history(&history);
        assert_eq!(rendered, "Dev: shipped it\nunknown: no author");
    }
}
