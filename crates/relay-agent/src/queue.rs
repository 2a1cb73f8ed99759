//! Global single-flight command queue. At most one agent process runs at a
//! time across the whole relay; everyone else waits in FIFO order.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::instrument;

/// Serializes agent invocations. Cloning shares the same underlying lock and
/// counters — every clone contends for the same single flight.
#[derive(Clone)]
pub struct CommandQueue {
    gate: Arc<Mutex<()>>,
    waiting: Arc<AtomicU64>,
}

impl Default for CommandQueue {
    fn default() -> Self {
        CommandQueue {
            gate: Arc::new(Mutex::new(())),
            waiting: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `run_fn` once this call reaches the head of the queue. If other
    /// callers were already ahead, `on_wait(wait_ms, ahead)` fires exactly
    /// once, right before acquisition, with `ahead` the number of callers
    /// that were queued in front of this one.
    #[instrument(skip_all)]
    pub async fn enqueue<F, Fut, T, W>(&self, run_fn: F, on_wait: W) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
        W: FnOnce(u64, u64),
    {
        let ahead = self.waiting.fetch_add(1, Ordering::SeqCst);
        let started_waiting = Instant::now();

        let permit = self.gate.lock().await;

        let waited = started_waiting.elapsed();
        if ahead > 0 {
            on_wait(waited.as_millis() as u64, ahead);
        }

        let result = run_fn().await;
        drop(permit);
        self.waiting.fetch_sub(1, Ordering::SeqCst);
        result
    }

    /// Number of callers currently ahead in the queue, including one
    /// presently executing (0 only once the queue is fully idle).
    pub fn ahead_count(&self) -> u64 {
        self.waiting.load(Ordering::SeqCst)
    }
}
