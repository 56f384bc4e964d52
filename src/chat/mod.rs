//! Chat transport abstraction and a reference Slack adapter.

pub mod slack;
pub mod traits;

pub use slack::SlackTransport;
pub use traits::{ChatTransport, ChatTransportDyn, PostAs, PostResult};

use std::sync::Arc;

/// Thin registry around a single active transport, mirroring the
/// multi-platform `Messaging` manager this crate is modeled on but scoped
/// down to the single workspace connection this core expects per process.
#[derive(Clone)]
pub struct ChatManager {
    transport: Arc<dyn ChatTransportDyn>,
}

impl ChatManager {
    pub fn new(transport: Arc<dyn ChatTransportDyn>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Arc<dyn ChatTransportDyn> {
        &self.transport
    }

    pub fn bot_user_id(&self) -> &str {
        self.transport.bot_user_id()
    }
}
