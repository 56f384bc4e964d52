//! Reference `ChatTransport` implementation on `slack-morphism`.
//!
//! Covers posting (as persona or as bot), reactions, thread history, and
//! user listing — the operations this crate's collaborators actually call.
//! Inbound event delivery (websocket/socket-mode listening) is outside the
//! core's contract per spec §6; the router is fed already-normalized
//! [`crate::InboundEvent`]s by whatever process owns that connection.

use crate::ChannelId;
use crate::chat::traits::{ChatTransport, PostAs, PostResult};
use crate::error::{ChatError, Result};
use crate::{PlatformUser, ThreadMessage};
use anyhow::Context as _;
use slack_morphism::prelude::*;
use std::sync::Arc;

pub struct SlackTransport {
    bot_user_id: String,
    client: Arc<SlackHyperClient>,
    token: SlackApiToken,
}

impl SlackTransport {
    pub fn new(bot_token: impl Into<String>, bot_user_id: impl Into<String>) -> anyhow::Result<Self> {
        let client = Arc::new(SlackClient::new(
            SlackClientHyperConnector::new().context("failed to create slack HTTP connector")?,
        ));
        let token = SlackApiToken::new(SlackApiTokenValue(bot_token.into()));
        Ok(Self {
            bot_user_id: bot_user_id.into(),
            client,
            token,
        })
    }

    fn session(&self) -> SlackClientSession<'_, SlackClientHyperHttpsConnector> {
        self.client.open_session(&self.token)
    }
}

impl ChatTransport for SlackTransport {
    fn bot_user_id(&self) -> &str {
        &self.bot_user_id
    }

    async fn post_as(
        &self,
        channel: &ChannelId,
        text: &str,
        persona: &PostAs,
        thread_ts: Option<&str>,
    ) -> Result<PostResult> {
        let session = self.session();
        let mut request = SlackApiChatPostMessageRequest::new(
            SlackChannelId(channel.to_string()),
            SlackMessageContent::new().with_text(text.to_string()),
        )
        .with_username(persona.display_name.clone());
        if let Some(icon) = &persona.icon_url {
            request = request.with_icon_url(icon.clone());
        }
        if let Some(ts) = thread_ts {
            request = request.with_thread_ts(SlackTs(ts.to_string()));
        }

        let response = session
            .chat_post_message(&request)
            .await
            .map_err(|e| ChatError::PostFailed(e.to_string()))?;

        Ok(PostResult {
            ts: response.ts.0,
            channel: channel.clone(),
        })
    }

    async fn post_as_bot(
        &self,
        channel: &ChannelId,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<PostResult> {
        let session = self.session();
        let mut request = SlackApiChatPostMessageRequest::new(
            SlackChannelId(channel.to_string()),
            SlackMessageContent::new().with_text(text.to_string()),
        );
        if let Some(ts) = thread_ts {
            request = request.with_thread_ts(SlackTs(ts.to_string()));
        }

        let response = session
            .chat_post_message(&request)
            .await
            .map_err(|e| ChatError::PostFailed(e.to_string()))?;

        Ok(PostResult {
            ts: response.ts.0,
            channel: channel.clone(),
        })
    }

    async fn add_reaction(&self, channel: &ChannelId, ts: &str, emoji: &str) -> Result<()> {
        let session = self.session();
        let request = SlackApiReactionsAddRequest::new(
            SlackChannelId(channel.to_string()),
            SlackReactionName(emoji.to_string()),
            SlackTs(ts.to_string()),
        );
        session
            .reactions_add(&request)
            .await
            .map_err(|e| ChatError::PostFailed(e.to_string()))?;
        Ok(())
    }

    async fn join_channel(&self, channel: &ChannelId) -> Result<()> {
        let session = self.session();
        let request = SlackApiConversationsJoinRequest::new(SlackChannelId(channel.to_string()));
        session
            .conversations_join(&request)
            .await
            .map_err(|e| ChatError::PostFailed(e.to_string()))?;
        Ok(())
    }

    async fn thread_replies(
        &self,
        channel: &ChannelId,
        ts: &str,
        limit: usize,
    ) -> Result<Vec<ThreadMessage>> {
        let session = self.session();
        let request = SlackApiConversationsRepliesRequest::new(
            SlackChannelId(channel.to_string()),
            SlackTs(ts.to_string()),
        )
        .with_limit(limit as u16);

        let response = session
            .conversations_replies(&request)
            .await
            .map_err(|e| ChatError::PostFailed(e.to_string()))?;

        Ok(response
            .messages
            .into_iter()
            .map(|m| ThreadMessage {
                ts: m.origin.ts.0,
                text: m.content.text.unwrap_or_default(),
                author: m.sender.username,
            })
            .collect())
    }

    async fn list_users(&self) -> Result<Vec<PlatformUser>> {
        let session = self.session();
        let request = SlackApiUsersListRequest::new();
        let response = session
            .users_list(&request)
            .await
            .map_err(|e| ChatError::PostFailed(e.to_string()))?;

        Ok(response
            .members
            .into_iter()
            .map(|u| PlatformUser {
                id: u.id.0,
                name: u.name.unwrap_or_default(),
            })
            .collect())
    }
}
