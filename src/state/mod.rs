//! In-memory thread/channel state: the only shared mutable process state,
//! per §4.4. Each map is independently locked; no cross-map atomicity is
//! required. Callers always go through [`ThreadStateManager`] rather than
//! touching a map directly.

use crate::config::{AD_HOC_MEMORY_TTL_SECS, DEDUP_LRU_CAPACITY, RuntimeConfig};
use crate::{ChannelId, DiscussionId, PersonaId};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use tokio::sync::{Mutex as AsyncMutex, RwLock};

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct ThreadPersonaKey {
    channel: ChannelId,
    thread_ts: String,
    persona_id: PersonaId,
}

struct AdHocMemoryEntry {
    persona_id: PersonaId,
    recorded_at: chrono::DateTime<chrono::Utc>,
}

/// Insertion-order LRU over processed-message keys. Check-then-insert is a
/// single critical section, guaranteeing exactly-once handling under
/// concurrent delivery of the same key.
struct DedupLru {
    capacity: usize,
    order: VecDeque<String>,
    members: HashSet<String>,
}

impl DedupLru {
    fn new(capacity: usize) -> Self {
        Self { capacity, order: VecDeque::new(), members: HashSet::new() }
    }

    /// Returns `true` if `key` was newly inserted (i.e. not a duplicate).
    fn insert_if_absent(&mut self, key: String) -> bool {
        if self.members.contains(&key) {
            return false;
        }

        if self.order.len() >= self.capacity
            && let Some(oldest) = self.order.pop_front()
        {
            self.members.remove(&oldest);
        }

        self.members.insert(key.clone());
        self.order.push_back(key);
        true
    }
}

/// Thread-safe, fine-grained-locked shared state for routing, cooldowns, and
/// discussion idempotency.
pub struct ThreadStateManager {
    dedup: Mutex<DedupLru>,
    reply_cooldowns: RwLock<HashMap<ThreadPersonaKey, chrono::DateTime<chrono::Utc>>>,
    ad_hoc_memory: RwLock<HashMap<(ChannelId, String), AdHocMemoryEntry>>,
    channel_activity: RwLock<HashMap<ChannelId, chrono::DateTime<chrono::Utc>>>,
    proactive_posts: RwLock<HashMap<ChannelId, chrono::DateTime<chrono::Utc>>>,
    code_watch_audits: RwLock<HashMap<String, chrono::DateTime<chrono::Utc>>>,
    in_flight_discussions: AsyncMutex<HashMap<String, std::sync::Arc<tokio::sync::Semaphore>>>,
    discussion_by_key: RwLock<HashMap<String, DiscussionId>>,
    runtime: RuntimeConfig,
}

impl Default for ThreadStateManager {
    fn default() -> Self {
        Self {
            dedup: Mutex::new(DedupLru::new(DEDUP_LRU_CAPACITY)),
            reply_cooldowns: RwLock::new(HashMap::new()),
            ad_hoc_memory: RwLock::new(HashMap::new()),
            channel_activity: RwLock::new(HashMap::new()),
            proactive_posts: RwLock::new(HashMap::new()),
            code_watch_audits: RwLock::new(HashMap::new()),
            in_flight_discussions: AsyncMutex::new(HashMap::new()),
            discussion_by_key: RwLock::new(HashMap::new()),
            runtime: RuntimeConfig::default(),
        }
    }
}

impl ThreadStateManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build with a [`RuntimeConfig`] shared with the rest of the process,
    /// so hot-reloaded tunables (e.g. the reply cooldown) take effect here
    /// without a restart.
    pub fn with_runtime(runtime: RuntimeConfig) -> Self {
        Self { runtime, ..Self::default() }
    }

    /// Atomic check-then-insert dedup. Returns `true` if this is the first
    /// delivery of `key` (the caller should proceed); `false` if it is a
    /// duplicate (the caller should drop the event).
    pub fn remember_message_key(&self, key: &str) -> bool {
        let mut dedup = self.dedup.lock().expect("dedup lru mutex poisoned");
        dedup.insert_if_absent(key.to_string())
    }

    pub async fn is_on_cooldown(&self, channel: &ChannelId, thread_ts: &str, persona_id: &PersonaId) -> bool {
        let key = ThreadPersonaKey {
            channel: channel.clone(),
            thread_ts: thread_ts.to_string(),
            persona_id: persona_id.clone(),
        };
        let cooldowns = self.reply_cooldowns.read().await;
        match cooldowns.get(&key) {
            Some(last) => {
                (chrono::Utc::now() - *last).num_seconds() < self.runtime.tunables.load().persona_reply_cooldown_secs
            }
            None => false,
        }
    }

    pub async fn record_reply(&self, channel: &ChannelId, thread_ts: &str, persona_id: &PersonaId) {
        let key = ThreadPersonaKey {
            channel: channel.clone(),
            thread_ts: thread_ts.to_string(),
            persona_id: persona_id.clone(),
        };
        self.reply_cooldowns.write().await.insert(key, chrono::Utc::now());
        self.record_channel_activity(channel).await;
    }

    /// Remember which persona is continuing a discussion-free ad-hoc thread.
    pub async fn remember_ad_hoc_persona(&self, channel: &ChannelId, thread_ts: &str, persona_id: &PersonaId) {
        self.ad_hoc_memory.write().await.insert(
            (channel.clone(), thread_ts.to_string()),
            AdHocMemoryEntry { persona_id: persona_id.clone(), recorded_at: chrono::Utc::now() },
        );
    }

    /// Look up the remembered ad-hoc persona, lazily expiring entries older
    /// than [`AD_HOC_MEMORY_TTL_SECS`].
    pub async fn remembered_ad_hoc_persona(&self, channel: &ChannelId, thread_ts: &str) -> Option<PersonaId> {
        let map_key = (channel.clone(), thread_ts.to_string());

        {
            let map = self.ad_hoc_memory.read().await;
            let entry = map.get(&map_key)?;
            if (chrono::Utc::now() - entry.recorded_at).num_seconds() < AD_HOC_MEMORY_TTL_SECS {
                return Some(entry.persona_id.clone());
            }
        }

        self.ad_hoc_memory.write().await.remove(&map_key);
        None
    }

    pub async fn record_channel_activity(&self, channel: &ChannelId) {
        self.channel_activity.write().await.insert(channel.clone(), chrono::Utc::now());
    }

    pub async fn channel_idle_minutes(&self, channel: &ChannelId) -> i64 {
        let activity = self.channel_activity.read().await;
        match activity.get(channel) {
            Some(last) => (chrono::Utc::now() - *last).num_minutes(),
            None => i64::MAX,
        }
    }

    pub async fn record_proactive_post(&self, channel: &ChannelId) {
        self.proactive_posts.write().await.insert(channel.clone(), chrono::Utc::now());
    }

    pub async fn minutes_since_proactive_post(&self, channel: &ChannelId) -> i64 {
        let posts = self.proactive_posts.read().await;
        match posts.get(channel) {
            Some(last) => (chrono::Utc::now() - *last).num_minutes(),
            None => i64::MAX,
        }
    }

    pub async fn record_code_watch_audit(&self, project_path: &str) {
        self.code_watch_audits.write().await.insert(project_path.to_string(), chrono::Utc::now());
    }

    pub async fn hours_since_code_watch_audit(&self, project_path: &str) -> i64 {
        let audits = self.code_watch_audits.read().await;
        match audits.get(project_path) {
            Some(last) => (chrono::Utc::now() - *last).num_hours(),
            None => i64::MAX,
        }
    }

    /// Acquire the in-flight slot for `trigger_key`, coalescing concurrent
    /// `startDiscussion` callers onto the same underlying work.
    ///
    /// Returns a guard; the first caller for a given key runs the discussion
    /// lookup/creation while holding it, later concurrent callers wait on
    /// the same semaphore and then read the now-published discussion id via
    /// [`Self::discussion_for_key`].
    pub async fn in_flight_guard(&self, trigger_key: &str) -> std::sync::Arc<tokio::sync::Semaphore> {
        let mut map = self.in_flight_discussions.lock().await;
        map.entry(trigger_key.to_string())
            .or_insert_with(|| std::sync::Arc::new(tokio::sync::Semaphore::new(1)))
            .clone()
    }

    pub async fn publish_discussion(&self, trigger_key: &str, discussion_id: DiscussionId) {
        self.discussion_by_key.write().await.insert(trigger_key.to_string(), discussion_id);
    }

    pub async fn discussion_for_key(&self, trigger_key: &str) -> Option<DiscussionId> {
        self.discussion_by_key.read().await.get(trigger_key).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_is_first_delivery_only() {
        let state = ThreadStateManager::new();
        assert!(state.remember_message_key("C1:100:message"));
        assert!(!state.remember_message_key("C1:100:message"));
    }

    #[test]
    fn dedup_lru_evicts_oldest_past_capacity() {
        let mut lru = DedupLru::new(2);
        assert!(lru.insert_if_absent("a".into()));
        assert!(lru.insert_if_absent("b".into()));
        assert!(lru.insert_if_absent("c".into()));
        assert!(lru.insert_if_absent("a".into()));
        assert!(!lru.insert_if_absent("c".into()));
    }

    #[tokio::test]
    async fn cooldown_reports_true_within_window_then_false() {
        let state = ThreadStateManager::new();
        let channel: ChannelId = "C1".into();
        let persona: PersonaId = "dev".into();
        assert!(!state.is_on_cooldown(&channel, "t1", &persona).await);
        state.record_reply(&channel, "t1", &persona).await;
        assert!(state.is_on_cooldown(&channel, "t1", &persona).await);
    }

    #[tokio::test]
    async fn ad_hoc_memory_round_trips() {
        let state = ThreadStateManager::new();
        let channel: ChannelId = "C1".into();
        let persona: PersonaId = "maya".into();
        state.remember_ad_hoc_persona(&channel, "t1", &persona).await;
        assert_eq!(state.remembered_ad_hoc_persona(&channel, "t1").await, Some(persona));
    }
}
