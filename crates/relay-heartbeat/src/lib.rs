//! Periodic idle-session probe. Ticks at `heartbeat_minutes` granularity,
//! feeds a synthetic body through the same reply path real messages take,
//! and suppresses the outbound payload when the agent answers with the
//! fixed echo `HEARTBEAT_OK`. The main loop races `interval.tick()` against
//! a shutdown signal via `tokio::select!`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use relay_session::SessionStore;

/// Synthetic body sent on every heartbeat tick.
pub const HEARTBEAT_BODY: &str = "HEARTBEAT /think:high";

/// Exact agent reply (after trimming) that suppresses outbound dispatch.
pub const HEARTBEAT_OK: &str = "HEARTBEAT_OK";

#[derive(Debug, Clone, Copy)]
pub struct HeartbeatConfig {
    pub heartbeat_minutes: i64,
    pub heartbeat_idle_minutes: Option<i64>,
    pub idle_minutes: i64,
}

impl HeartbeatConfig {
    fn idle_threshold(&self) -> i64 {
        self.heartbeat_idle_minutes.unwrap_or(self.idle_minutes)
    }
}

/// Abstracts "run a body through the reply pipeline for this session key,
/// respecting command-queue backpressure". Implemented by the crate that
/// owns the command queue and agent registry; the heartbeat scheduler
/// itself has no knowledge of argv construction or process spawning.
#[async_trait]
pub trait HeartbeatSink: Send + Sync {
    /// Returns `true` if another caller is already ahead in the command
    /// queue — the scheduler skips this session's tick rather than wait.
    fn is_busy(&self) -> bool;

    /// Runs `body` for `session_key` and returns the agent's parsed,
    /// trimmed reply text, or `None` if the run produced no text (the
    /// heartbeat emits nothing outbound in that case either).
    async fn probe(&self, session_key: &str, body: &str) -> Option<String>;
}

pub struct HeartbeatScheduler<S: HeartbeatSink> {
    store: Arc<SessionStore>,
    sink: Arc<S>,
    config: HeartbeatConfig,
}

impl<S: HeartbeatSink> HeartbeatScheduler<S> {
    pub fn new(store: Arc<SessionStore>, sink: Arc<S>, config: HeartbeatConfig) -> Self {
        HeartbeatScheduler { store, sink, config }
    }

    /// Main loop. Runs until `shutdown` broadcasts `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("heartbeat scheduler started");
        let period = Duration::from_secs((self.config.heartbeat_minutes.max(1) as u64) * 60);
        let mut interval = tokio::time::interval(period);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("heartbeat scheduler shutting down");
                        break;
                    }
                }
            }
        }
    }

    #[instrument(skip(self))]
    async fn tick(&self) {
        let keys = match self.store.active_keys() {
            Ok(keys) => keys,
            Err(err) => {
                error!(error = %err, "failed to list sessions for heartbeat sweep");
                return;
            }
        };

        for key in keys {
            if self.sink.is_busy() {
                debug!(session = %key, "skipping heartbeat tick, command queue busy");
                continue;
            }
            self.probe_one(&key).await;
        }
    }

    async fn probe_one(&self, key: &str) {
        let session = match self.store.peek(key) {
            Ok(Some(session)) => session,
            Ok(None) => return,
            Err(err) => {
                error!(session = %key, error = %err, "failed to read session for heartbeat");
                return;
            }
        };

        let threshold = self.config.idle_threshold();
        if !session.is_expired(Utc::now(), threshold) {
            return;
        }

        let reply = self.sink.probe(key, HEARTBEAT_BODY).await;
        match reply {
            None => {}
            Some(text) if text.trim() == HEARTBEAT_OK => {
                info!(session = %key, "heartbeat ok, suppressing outbound dispatch");
            }
            Some(_) => {
                warn!(session = %key, "heartbeat produced a non-suppressed reply");
            }
        }
        // Heartbeat runs never touch `updatedAt` regardless of outcome.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    struct FakeSink {
        busy: AtomicBool,
        calls: AtomicU64,
        reply: Option<String>,
    }

    #[async_trait]
    impl HeartbeatSink for FakeSink {
        fn is_busy(&self) -> bool {
            self.busy.load(Ordering::SeqCst)
        }

        async fn probe(&self, _session_key: &str, _body: &str) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone()
        }
    }

    fn config() -> HeartbeatConfig {
        HeartbeatConfig {
            heartbeat_minutes: 1,
            heartbeat_idle_minutes: Some(0),
            idle_minutes: 30,
        }
    }

    #[tokio::test]
    async fn probes_an_idle_session_and_ignores_ok_reply() {
        let store = Arc::new(SessionStore::open_in_memory().unwrap());
        store.get("a", false, 30).unwrap();
        let sink = Arc::new(FakeSink {
            busy: AtomicBool::new(false),
            calls: AtomicU64::new(0),
            reply: Some("HEARTBEAT_OK".to_string()),
        });
        let scheduler = HeartbeatScheduler::new(store.clone(), sink.clone(), config());

        tokio::time::sleep(Duration::from_millis(5)).await;
        scheduler.tick().await;

        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
        let session = store.peek("a").unwrap().unwrap();
        let before = session.updated_at;
        scheduler.tick().await;
        let after = store.peek("a").unwrap().unwrap().updated_at;
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn skips_sessions_while_command_queue_is_busy() {
        let store = Arc::new(SessionStore::open_in_memory().unwrap());
        store.get("a", false, 30).unwrap();
        let sink = Arc::new(FakeSink {
            busy: AtomicBool::new(true),
            calls: AtomicU64::new(0),
            reply: None,
        });
        let scheduler = HeartbeatScheduler::new(store, sink.clone(), config());
        scheduler.tick().await;
        assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn does_not_probe_a_fresh_session() {
        let store = Arc::new(SessionStore::open_in_memory().unwrap());
        store.get("a", false, 30).unwrap();
        let sink = Arc::new(FakeSink {
            busy: AtomicBool::new(false),
            calls: AtomicU64::new(0),
            reply: None,
        });
        let mut cfg = config();
        cfg.heartbeat_idle_minutes = Some(30);
        let scheduler = HeartbeatScheduler::new(store, sink.clone(), cfg);
        scheduler.tick().await;
        assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
    }
}
