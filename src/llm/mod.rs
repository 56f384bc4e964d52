//! LLM provider abstraction and a reference Anthropic adapter.

pub mod anthropic;
pub mod traits;

pub use anthropic::AnthropicClient;
pub use traits::{LlmClient, LlmClientDyn, ToolHandler, ToolRegistry, ToolSpec};
