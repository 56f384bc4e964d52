//! Reference `LlmClient` implementation calling the Anthropic Messages API
//! directly over `reqwest`, with the retry/backoff shape this crate's
//! provider routing is modeled on.

use crate::error::{LlmError, Result};
use crate::llm::traits::{LlmClient, ToolRegistry, ToolSpec};
use anyhow::Context as _;
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_RETRIES: usize = 3;
const RETRY_BASE_DELAY_MS: u64 = 500;
const MAX_TOOL_TURNS: usize = 8;

pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("failed to build anthropic HTTP client")?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: "https://api.anthropic.com".to_string(),
            model: model.into(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url.trim_end_matches('/'))
    }

    async fn send(&self, body: &serde_json::Value) -> Result<serde_json::Value> {
        let mut last_error = None;
        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = RETRY_BASE_DELAY_MS * 2u64.pow((attempt - 1) as u32);
                tracing::debug!(attempt = attempt + 1, delay_ms = delay, "retrying anthropic call");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let response = self
                .http
                .post(self.messages_url())
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(body)
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    return resp
                        .json::<serde_json::Value>()
                        .await
                        .map_err(|e| LlmError::ProviderRequest(e.to_string()).into());
                }
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    let retriable = status.as_u16() == 429 || status.is_server_error();
                    tracing::warn!(%status, attempt = attempt + 1, "anthropic request failed");
                    last_error = Some(format!("{status}: {text}"));
                    if !retriable {
                        break;
                    }
                }
                Err(error) => {
                    tracing::warn!(%error, attempt = attempt + 1, "anthropic request error");
                    last_error = Some(error.to_string());
                }
            }
        }

        Err(LlmError::ProviderRequest(last_error.unwrap_or_default()).into())
    }

    fn text_from_response(body: &serde_json::Value) -> Result<String> {
        let blocks = body
            .get("content")
            .and_then(|c| c.as_array())
            .ok_or_else(|| LlmError::EmptyResponse)?;

        let text: String = blocks
            .iter()
            .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
            .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            Err(LlmError::EmptyResponse.into())
        } else {
            Ok(text)
        }
    }
}

impl LlmClient for AnthropicClient {
    fn supports_tools(&self) -> bool {
        true
    }

    async fn complete(&self, system_prompt: &str, user_prompt: &str, max_tokens: u32) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "system": system_prompt,
            "messages": [{"role": "user", "content": user_prompt}],
        });

        let response = self.send(&body).await?;
        Self::text_from_response(&response)
    }

    async fn complete_with_tools(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        tools: &[ToolSpec],
        registry: &ToolRegistry,
        max_tokens: u32,
    ) -> Result<String> {
        if tools.is_empty() {
            return self.complete(system_prompt, user_prompt, max_tokens).await;
        }

        let mut messages = vec![serde_json::json!({"role": "user", "content": user_prompt})];
        let tool_defs: Vec<serde_json::Value> = tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.input_schema,
                })
            })
            .collect();

        for _ in 0..MAX_TOOL_TURNS {
            let body = serde_json::json!({
                "model": self.model,
                "max_tokens": max_tokens,
                "system": system_prompt,
                "messages": messages,
                "tools": tool_defs,
            });

            let response = self.send(&body).await?;
            let blocks = response
                .get("content")
                .and_then(|c| c.as_array())
                .cloned()
                .unwrap_or_default();

            let tool_uses: Vec<&serde_json::Value> = blocks
                .iter()
                .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("tool_use"))
                .collect();

            if tool_uses.is_empty() {
                return Self::text_from_response(&response);
            }

            messages.push(serde_json::json!({"role": "assistant", "content": blocks}));

            let mut tool_results = Vec::new();
            for call in &tool_uses {
                let name = call.get("name").and_then(|n| n.as_str()).unwrap_or_default();
                let id = call.get("id").and_then(|n| n.as_str()).unwrap_or_default();
                let input = call.get("input").cloned().unwrap_or(serde_json::Value::Null);

                let output = match registry.get(name) {
                    Some(handler) => handler(input).await,
                    None => format!("unknown tool: {name}"),
                };

                tool_results.push(serde_json::json!({
                    "type": "tool_result",
                    "tool_use_id": id,
                    "content": output,
                }));
            }

            messages.push(serde_json::json!({"role": "user", "content": tool_results}));
        }

        tracing::warn!("anthropic tool-use loop exhausted max turns without a final answer");
        Err(LlmError::ProviderRequest("tool-use loop exceeded max turns".into()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_from_response_joins_text_blocks_and_skips_others() {
        let body = serde_json::json!({
            "content": [
                {"type": "text", "text": "hello "},
                {"type": "tool_use", "name": "lookup"},
                {"type": "text", "text": "world"},
            ]
        });
        assert_eq!(AnthropicClient::text_from_response(&body).unwrap(), "hello world");
    }

    #[test]
    fn text_from_response_errors_on_missing_content() {
        let body = serde_json::json!({});
        assert!(AnthropicClient::text_from_response(&body).is_err());
    }

    #[test]
    fn text_from_response_errors_on_blank_text() {
        let body = serde_json::json!({"content": [{"type": "text", "text": "   "}]});
        assert!(AnthropicClient::text_from_response(&body).is_err());
    }

    #[test]
    fn messages_url_trims_a_trailing_slash_on_the_base_url() {
        let client = AnthropicClient::new("key", "model").unwrap().with_base_url("https://example.com/");
        assert_eq!(client.messages_url(), "https://example.com/v1/messages");
    }
}
