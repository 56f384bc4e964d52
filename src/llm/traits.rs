//! The pluggable LLM provider contract.
//!
//! Same static/dyn split as [`crate::chat::traits`]. Tool-capable mode is
//! optional: a client that does not support tool-use declines
//! `complete_with_tools` and callers fall back to plain `complete`.

use crate::error::Result;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A single tool exposed to the model: name, description, and JSON-schema
/// input shape.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// An async tool handler: receives the tool's JSON arguments, returns the
/// string result that gets fed back to the model as the tool result.
pub type ToolHandler =
    Arc<dyn Fn(serde_json::Value) -> Pin<Box<dyn Future<Output = String> + Send>> + Send + Sync>;

/// Maps tool name to handler. The client drives the multi-turn tool-call
/// loop internally and must terminate (bounded turns), returning only the
/// model's final text answer.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    handlers: HashMap<String, ToolHandler>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, handler: ToolHandler) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn get(&self, name: &str) -> Option<&ToolHandler> {
        self.handlers.get(name)
    }
}

/// Static trait for LLM provider adapters.
pub trait LlmClient: Send + Sync + 'static {
    /// True if this client can drive `complete_with_tools`'s tool-call loop.
    fn supports_tools(&self) -> bool {
        false
    }

    fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
    ) -> impl Future<Output = Result<String>> + Send;

    /// Multi-turn tool-use completion. Implementations that return
    /// `supports_tools() == false` may implement this as a thin wrapper
    /// around `complete` that ignores `tools`/`registry`.
    fn complete_with_tools(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        tools: &[ToolSpec],
        registry: &ToolRegistry,
        max_tokens: u32,
    ) -> impl Future<Output = Result<String>> + Send;
}

/// Object-safe companion trait for `Arc<dyn LlmClientDyn>` storage.
pub trait LlmClientDyn: Send + Sync + 'static {
    fn supports_tools(&self) -> bool;

    fn complete<'a>(
        &'a self,
        system_prompt: &'a str,
        user_prompt: &'a str,
        max_tokens: u32,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

    fn complete_with_tools<'a>(
        &'a self,
        system_prompt: &'a str,
        user_prompt: &'a str,
        tools: &'a [ToolSpec],
        registry: &'a ToolRegistry,
        max_tokens: u32,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;
}

impl<T: LlmClient> LlmClientDyn for T {
    fn supports_tools(&self) -> bool {
        LlmClient::supports_tools(self)
    }

    fn complete<'a>(
        &'a self,
        system_prompt: &'a str,
        user_prompt: &'a str,
        max_tokens: u32,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(LlmClient::complete(self, system_prompt, user_prompt, max_tokens))
    }

    fn complete_with_tools<'a>(
        &'a self,
        system_prompt: &'a str,
        user_prompt: &'a str,
        tools: &'a [ToolSpec],
        registry: &'a ToolRegistry,
        max_tokens: u32,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(LlmClient::complete_with_tools(
            self,
            system_prompt,
            user_prompt,
            tools,
            registry,
            max_tokens,
        ))
    }
}
