//! Discussion-free conversational replies: cadence counters, follow-mention
//! fan-out, piggyback, and ad-hoc persona handoff.

use crate::chat::{ChatManager, PostAs};
use crate::config::PIGGYBACK_PROBABILITY;
use crate::humanizer::{self, HumanizeOpts};
use crate::llm::LlmClientDyn;
use crate::memory::MemoryStore;
use crate::persona::{Persona, PersonaStore};
use crate::state::ThreadStateManager;
use crate::{ChannelId, PersonaId};
use rand::Rng;
use rand::seq::IndexedRandom;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

const CASUAL_KEYWORDS: &[&str] = &["hey", "hi", "hello", "thanks", "lol", "lunch", "weekend", "how's it going"];
const ENGINEERING_KEYWORDS: &[&str] = &["bug", "deploy", "pr", "merge", "test", "error", "api", "database", "build"];

/// Per-`(channel, thread, persona)` post counter, used to gate emoji cadence.
#[derive(Default)]
struct CadenceCounters {
    counts: HashMap<(ChannelId, String, PersonaId), u32>,
}

impl CadenceCounters {
    fn bump(&mut self, channel: &ChannelId, thread_ts: &str, persona_id: &PersonaId) -> u32 {
        let key = (channel.clone(), thread_ts.to_string(), persona_id.clone());
        let counter = self.counts.entry(key).or_insert(0);
        *counter += 1;
        *counter
    }
}

/// Drives ad-hoc (discussion-free) persona replies: the router's fallback
/// path for mentions, remembered-persona continuations, and ambient
/// chatter engagement.
pub struct PersonaReplyHandler {
    chat: ChatManager,
    personas: Arc<PersonaStore>,
    memory: Arc<MemoryStore>,
    llm: Arc<dyn LlmClientDyn>,
    state: Arc<ThreadStateManager>,
    cadence: Mutex<CadenceCounters>,
}

impl PersonaReplyHandler {
    pub fn new(
        chat: ChatManager,
        personas: Arc<PersonaStore>,
        memory: Arc<MemoryStore>,
        llm: Arc<dyn LlmClientDyn>,
        state: Arc<ThreadStateManager>,
    ) -> Arc<Self> {
        Arc::new(Self { chat, personas, memory, llm, state, cadence: Mutex::new(CadenceCounters::default()) })
    }

    /// Reply as `persona` to `incoming_text`, discussion-free. Returns the
    /// posted text so the caller can drive follow-mention fan-out.
    pub async fn reply(
        self: &Arc<Self>,
        channel: &ChannelId,
        thread_ts: &str,
        incoming_text: &str,
        persona: &Persona,
        project_context: Option<&str>,
    ) -> crate::error::Result<Option<String>> {
        if self.state.is_on_cooldown(channel, thread_ts, &persona.id.clone().into()).await {
            return Ok(None);
        }

        let history = self.chat.transport().thread_replies(channel, thread_ts, 10).await.unwrap_or_default();
        let memory_note = match project_context {
            Some(project) => self.memory.get_memory(&persona.display_name, project).await,
            None => None,
        };

        let casual = is_casual(incoming_text);
        let system_prompt = format!(
            "You are {name}, {role}. Voice: {voice}. {register} Standing memory: {memory}. \
             Reply SKIP if nothing to add, otherwise 1-2 sentences.",
            name = persona.display_name,
            role = persona.role,
            voice = persona.style.voice,
            register = if casual { "Keep this casual and brief." } else { "Be precise and technical." },
            memory = memory_note.as_deref().unwrap_or("(none yet)"),
        );
        let user_prompt = history
            .iter()
            .map(|m| format!("{}: {}", m.author.as_deref().unwrap_or("unknown"), m.text))
            .chain(std::iter::once(incoming_text.to_string()))
            .collect::<Vec<_>>()
            .join("\n");

        let raw = self.llm.complete(&system_prompt, &user_prompt, 300).await?;
        if humanizer::is_skip_message(&raw) {
            return Ok(None);
        }

        let persona_id: PersonaId = persona.id.clone().into();
        let count = self.cadence.lock().await.bump(channel, thread_ts, &persona_id);
        let opts = cadence_opts(count);
        let text = humanizer::humanize(&raw, &opts);
        if text == "SKIP" {
            return Ok(None);
        }

        let dedup_key = format!("{channel}:{thread_ts}:{text}");
        if !self.state.remember_message_key(&dedup_key) {
            return Ok(None);
        }

        let post_as = PostAs { display_name: persona.display_name.clone(), icon_url: persona.avatar_url.clone() };
        self.chat.transport().post_as(channel, &text, &post_as, Some(thread_ts)).await?;
        self.state.record_reply(channel, thread_ts, &persona_id).await;
        self.state.remember_ad_hoc_persona(channel, thread_ts, &persona_id).await;

        self.fan_out(channel, thread_ts, &text, persona).await;

        Ok(Some(text))
    }

    /// Follow-agent-mentions (depth 1) and the probabilistic piggyback
    /// second reply. Fire-and-forget, not awaited by the router.
    fn fan_out<'a>(
        self: &'a Arc<Self>,
        channel: &'a ChannelId,
        thread_ts: &'a str,
        posted_text: &'a str,
        speaker: &'a Persona,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
        let Ok(available) = self.personas.get_active().await else { return };
        let mentioned = mentioned_persona_names(posted_text, &available, &speaker.display_name);

        for name in mentioned {
            let Some(persona) = available.iter().find(|p| p.display_name == name).cloned() else { continue };
            let handler = Arc::clone(self);
            let channel = channel.clone();
            let thread_ts = thread_ts.to_string();
            let text = posted_text.to_string();
            tokio::spawn(async move {
                let delay_ms = rand::rng().random_range(1400..=10_000);
                tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                handler.reply(&channel, &thread_ts, &text, &persona, None).await.ok();
            });
        }

        if rand::rng().random_bool(PIGGYBACK_PROBABILITY) {
            let candidates: Vec<Persona> =
                available.into_iter().filter(|p| p.display_name != speaker.display_name).collect();
            if let Some(second) = candidates.choose(&mut rand::rng()).cloned() {
                let handler = Arc::clone(self);
                let channel = channel.clone();
                let thread_ts = thread_ts.to_string();
                let text = posted_text.to_string();
                tokio::spawn(async move {
                    let delay_ms = rand::rng().random_range(4_000..=15_000);
                    tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                    handler.reply(&channel, &thread_ts, &text, &second, None).await.ok();
                });
            }
        }
        })
    }

    /// Ambient chatter: 2-3 shuffled off-cooldown personas reply in turn,
    /// the first on normal timing and the rest on piggyback-style delays.
    pub async fn engage_multiple(
        self: &Arc<Self>,
        channel: &ChannelId,
        thread_ts: &str,
        incoming_text: &str,
    ) -> crate::error::Result<()> {
        let mut available = self.personas.get_active().await?;
        if available.is_empty() {
            return Ok(());
        }
        {
            use rand::seq::SliceRandom;
            available.shuffle(&mut rand::rng());
        }

        let max_take = 3.min(available.len());
        let min_take = 2.min(max_take);
        let take = if min_take == max_take { max_take } else { rand::rng().random_range(min_take..=max_take) };

        for (i, persona) in available.into_iter().take(take).enumerate() {
            if i > 0 {
                let delay_ms = rand::rng().random_range(4_000..=15_000);
                tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
            }
            self.reply(channel, thread_ts, incoming_text, &persona, None).await.ok();
        }
        Ok(())
    }
}

fn is_casual(text: &str) -> bool {
    let lower = text.to_lowercase();
    let has_greeting = CASUAL_KEYWORDS.iter().any(|kw| lower.contains(kw));
    let has_engineering = ENGINEERING_KEYWORDS.iter().any(|kw| lower.contains(kw));
    has_greeting && !has_engineering
}

fn mentioned_persona_names(text: &str, available: &[Persona], speaker_name: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    available
        .iter()
        .filter(|p| p.display_name != speaker_name)
        .filter(|p| lower.contains(&p.display_name.to_lowercase()))
        .map(|p| p.display_name.clone())
        .collect()
}

fn cadence_opts(count: u32) -> HumanizeOpts {
    let mut rng = rand::rng();
    HumanizeOpts {
        max_sentences: humanizer::sample_max_sentences(&mut rng),
        max_chars: humanizer::sample_max_chars(&mut rng),
        allow_emoji: count % 3 == 0,
        allow_non_facial: count % 9 == 0,
    }
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
    fn casual_greeting_without_engineering_terms_is_casual() {
        assert!(is_casual("hey, how's it going this weekend?"));
    }

    #[test]
    fn greeting_mixed_with_engineering_terms_is_not_casual() {
        assert!(!is_casual("hey can you look at this bug in the deploy"));
    }

    #[test]
    fn plain_engineering_text_is_not_casual() {
        assert!(!is_casual("the build failed because of a flaky test"));
    }

    #[test]
    fn mentioned_persona_names_excludes_the_speaker() {
        let available = vec![make_persona("Dev"), make_persona("Carlos")];
        let mentioned = mentioned_persona_names("ping carlos and dev about this", &available, "Dev");
        assert_eq!(mentioned, vec!["Carlos".to_string()]);
    }

    #[test]
    fn mentioned_persona_names_is_empty_when_nobody_is_named() {
        let available = vec![make_persona("Dev"), make_persona("Carlos")];
        assert!(mentioned_persona_names("just some ambient chatter", &available, "Dev").is_empty());
    }

    #[test]
    fn cadence_opts_gates_emoji_and_non_facial_on_post_count() {
        assert!(cadence_opts(3).allow_emoji);
        assert!(!cadence_opts(1).allow_emoji);
        assert!(cadence_opts(9).allow_non_facial);
        assert!(!cadence_opts(3).allow_non_facial);
    }
}
