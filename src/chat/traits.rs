//! The pluggable chat transport contract.
//!
//! Split into a static trait (for type-safe implementations) and a
//! companion object-safe trait (for `Arc<dyn ChatTransportDyn>` storage),
//! with a blanket impl bridging the two — the same pattern used for
//! `Messaging`/`MessagingDyn` in the teacher codebase this crate is modeled
//! on, since `impl Trait` return types in traits are not yet object-safe.

use crate::error::Result;
use crate::{ChannelId, PlatformUser, ThreadMessage};
use std::pin::Pin;

/// A persona's displayed identity when posting (name + optional avatar).
#[derive(Debug, Clone)]
pub struct PostAs {
    pub display_name: String,
    pub icon_url: Option<String>,
}

/// Result of a successful post: the platform timestamp/id and channel.
#[derive(Debug, Clone)]
pub struct PostResult {
    pub ts: String,
    pub channel: ChannelId,
}

/// Static trait for transport adapters. Messages passed to `post_as` /
/// `post_as_bot` are already humanized; the transport must not re-escape
/// markdown beyond what the platform requires.
pub trait ChatTransport: Send + Sync + 'static {
    /// The bot's own user id, for self-message filtering.
    fn bot_user_id(&self) -> &str;

    /// Post as a persona (display name + icon).
    fn post_as(
        &self,
        channel: &ChannelId,
        text: &str,
        persona: &PostAs,
        thread_ts: Option<&str>,
    ) -> impl std::future::Future<Output = Result<PostResult>> + Send;

    /// Post as the bot itself (no persona identity).
    fn post_as_bot(
        &self,
        channel: &ChannelId,
        text: &str,
        thread_ts: Option<&str>,
    ) -> impl std::future::Future<Output = Result<PostResult>> + Send;

    /// Add a reaction emoji to a message.
    fn add_reaction(
        &self,
        channel: &ChannelId,
        ts: &str,
        emoji: &str,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Join a channel (best-effort; not all platforms require this).
    fn join_channel(
        &self,
        channel: &ChannelId,
    ) -> impl std::future::Future<Output = Result<()>> + Send {
        async { Ok(()) }
    }

    /// Fetch up to `limit` prior replies in a thread, most recent last.
    fn thread_replies(
        &self,
        channel: &ChannelId,
        ts: &str,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<ThreadMessage>>> + Send;

    /// List known platform users.
    fn list_users(&self) -> impl std::future::Future<Output = Result<Vec<PlatformUser>>> + Send;
}

/// Object-safe companion trait for `Arc<dyn ChatTransportDyn>` storage.
pub trait ChatTransportDyn: Send + Sync + 'static {
    fn bot_user_id(&self) -> &str;

    fn post_as<'a>(
        &'a self,
        channel: &'a ChannelId,
        text: &'a str,
        persona: &'a PostAs,
        thread_ts: Option<&'a str>,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<PostResult>> + Send + 'a>>;

    fn post_as_bot<'a>(
        &'a self,
        channel: &'a ChannelId,
        text: &'a str,
        thread_ts: Option<&'a str>,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<PostResult>> + Send + 'a>>;

    fn add_reaction<'a>(
        &'a self,
        channel: &'a ChannelId,
        ts: &'a str,
        emoji: &'a str,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>>;

    fn join_channel<'a>(
        &'a self,
        channel: &'a ChannelId,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>>;

    fn thread_replies<'a>(
        &'a self,
        channel: &'a ChannelId,
        ts: &'a str,
        limit: usize,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<Vec<ThreadMessage>>> + Send + 'a>>;

    fn list_users<'a>(
        &'a self,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<Vec<PlatformUser>>> + Send + 'a>>;
}

impl<T: ChatTransport> ChatTransportDyn for T {
    fn bot_user_id(&self) -> &str {
        ChatTransport::bot_user_id(self)
    }

    fn post_as<'a>(
        &'a self,
        channel: &'a ChannelId,
        text: &'a str,
        persona: &'a PostAs,
        thread_ts: Option<&'a str>,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<PostResult>> + Send + 'a>> {
        Box::pin(ChatTransport::post_as(self, channel, text, persona, thread_ts))
    }

    fn post_as_bot<'a>(
        &'a self,
        channel: &'a ChannelId,
        text: &'a str,
        thread_ts: Option<&'a str>,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<PostResult>> + Send + 'a>> {
        Box::pin(ChatTransport::post_as_bot(self, channel, text, thread_ts))
    }

    fn add_reaction<'a>(
        &'a self,
        channel: &'a ChannelId,
        ts: &'a str,
        emoji: &'a str,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(ChatTransport::add_reaction(self, channel, ts, emoji))
    }

    fn join_channel<'a>(
        &'a self,
        channel: &'a ChannelId,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(ChatTransport::join_channel(self, channel))
    }

    fn thread_replies<'a>(
        &'a self,
        channel: &'a ChannelId,
        ts: &'a str,
        limit: usize,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<Vec<ThreadMessage>>> + Send + 'a>> {
        Box::pin(ChatTransport::thread_replies(self, channel, ts, limit))
    }

    fn list_users<'a>(
        &'a self,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<Vec<PlatformUser>>> + Send + 'a>> {
        Box::pin(ChatTransport::list_users(self))
    }
}
