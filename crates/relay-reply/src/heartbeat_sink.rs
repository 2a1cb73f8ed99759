//! Wires the heartbeat scheduler's generic `HeartbeatSink` to the concrete
//! reply engine, config, session store, and command queue. This is the one
//! piece of glue the engine itself doesn't need to know about.

use std::sync::Arc;

use async_trait::async_trait;
use relay_agent::CommandQueue;
use relay_core::config::RelayConfig;
use relay_heartbeat::HeartbeatSink;
use relay_session::SessionStore;

use crate::engine::probe_heartbeat;

pub struct ReplyHeartbeatSink {
    config: Arc<RelayConfig>,
    store: Arc<SessionStore>,
    queue: Arc<CommandQueue>,
}

impl ReplyHeartbeatSink {
    pub fn new(config: Arc<RelayConfig>, store: Arc<SessionStore>, queue: Arc<CommandQueue>) -> Self {
        ReplyHeartbeatSink { config, store, queue }
    }
}

#[async_trait]
impl HeartbeatSink for ReplyHeartbeatSink {
    fn is_busy(&self) -> bool {
        self.queue.ahead_count() > 0
    }

    async fn probe(&self, session_key: &str, body: &str) -> Option<String> {
        probe_heartbeat(session_key, &self.config, &self.store, &self.queue, body).await
    }
}
