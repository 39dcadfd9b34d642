use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cs_core::DebounceMode;
use thiserror::Error;
use tokio::sync::{oneshot, Mutex};
use tokio::task::AbortHandle;
use tokio::time::{sleep, Duration};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("superseded by a later schedule for the same key")]
pub struct Superseded;

/// Result of a scheduled action, available once its timer fires.
pub struct Scheduled<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> Scheduled<T> {
    /// Wait for the action. Fails if a later schedule for the same key (or a
    /// teardown) cancelled it before it fired.
    pub async fn outcome(self) -> Result<T, Superseded> {
        self.rx.await.map_err(|_| Superseded)
    }
}

struct PendingTimer {
    generation: u64,
    handle: AbortHandle,
}

/// Per-key delay and coalescing of bursts.
///
/// At most one live timer exists per key. Rescheduling a key aborts the
/// previous timer, so only the latest action fires, exactly once, after the
/// delay elapses with no further reschedule. Once a timer has fired its
/// action is no longer cancellable.
pub struct DebounceCoalescer {
    mode: DebounceMode,
    timers: Arc<Mutex<HashMap<String, PendingTimer>>>,
    next_generation: AtomicU64,
}

impl DebounceCoalescer {
    pub fn new(mode: DebounceMode) -> Self {
        Self {
            mode,
            timers: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
        }
    }

    pub fn mode(&self) -> DebounceMode {
        self.mode
    }

    pub async fn schedule<F, T>(&self, key: &str, delay: Duration, action: F) -> Scheduled<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();

        if self.mode == DebounceMode::Immediate {
            let _ = tx.send(action.await);
            return Scheduled { rx };
        }

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let timers = Arc::clone(&self.timers);
        let key_owned = key.to_string();

        let mut timers_guard = self.timers.lock().await;
        if let Some(existing) = timers_guard.remove(key) {
            existing.handle.abort();
            debug!(key, "debounce timer superseded");
        }

        let handle = tokio::spawn(async move {
            sleep(delay).await;
            {
                let mut timers_guard = timers.lock().await;
                if timers_guard
                    .get(&key_owned)
                    .is_some_and(|timer| timer.generation == generation)
                {
                    timers_guard.remove(&key_owned);
                }
            }
            let _ = tx.send(action.await);
        });

        timers_guard.insert(
            key.to_string(),
            PendingTimer {
                generation,
                handle: handle.abort_handle(),
            },
        );
        debug!(key, delay_ms = delay.as_millis() as u64, "debounce timer started");

        Scheduled { rx }
    }

    pub async fn pending_count(&self) -> usize {
        self.timers.lock().await.len()
    }

    /// Abort every timer that has not fired yet.
    pub async fn cancel_all(&self) {
        let mut timers_guard = self.timers.lock().await;
        for (_, timer) in timers_guard.drain() {
            timer.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::{advance, Instant};

    fn counting_action(
        counter: &Arc<AtomicUsize>,
        label: &'static str,
    ) -> impl Future<Output = &'static str> + Send + 'static {
        let counter = Arc::clone(counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            label
        }
    }

    #[tokio::test]
    async fn rapid_reschedules_fire_latest_once() {
        tokio::time::pause();
        let debouncer = DebounceCoalescer::new(DebounceMode::Coalesce);
        let counter = Arc::new(AtomicUsize::new(0));
        let delay = Duration::from_millis(500);

        let first = debouncer
            .schedule("fp", delay, counting_action(&counter, "first"))
            .await;
        advance(Duration::from_millis(100)).await;
        let second = debouncer
            .schedule("fp", delay, counting_action(&counter, "second"))
            .await;
        advance(Duration::from_millis(100)).await;
        let started_last = Instant::now();
        let third = debouncer
            .schedule("fp", delay, counting_action(&counter, "third"))
            .await;

        assert_eq!(third.outcome().await, Ok("third"));
        assert!(Instant::now() - started_last >= delay);
        assert_eq!(first.outcome().await, Err(Superseded));
        assert_eq!(second.outcome().await, Err(Superseded));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(debouncer.pending_count().await, 0);
    }

    #[tokio::test]
    async fn different_keys_do_not_coalesce() {
        tokio::time::pause();
        let debouncer = DebounceCoalescer::new(DebounceMode::Coalesce);
        let counter = Arc::new(AtomicUsize::new(0));
        let delay = Duration::from_millis(50);

        let a = debouncer
            .schedule("a", delay, counting_action(&counter, "a"))
            .await;
        let b = debouncer
            .schedule("b", delay, counting_action(&counter, "b"))
            .await;

        assert_eq!(a.outcome().await, Ok("a"));
        assert_eq!(b.outcome().await, Ok("b"));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn immediate_mode_runs_inline() {
        let debouncer = DebounceCoalescer::new(DebounceMode::Immediate);
        let counter = Arc::new(AtomicUsize::new(0));

        let a = debouncer
            .schedule("fp", Duration::from_secs(60), counting_action(&counter, "a"))
            .await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let b = debouncer
            .schedule("fp", Duration::from_secs(60), counting_action(&counter, "b"))
            .await;

        assert_eq!(a.outcome().await, Ok("a"));
        assert_eq!(b.outcome().await, Ok("b"));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(debouncer.pending_count().await, 0);
    }

    #[tokio::test]
    async fn cancel_all_aborts_pending_timers() {
        tokio::time::pause();
        let debouncer = DebounceCoalescer::new(DebounceMode::Coalesce);
        let counter = Arc::new(AtomicUsize::new(0));

        let scheduled = debouncer
            .schedule("fp", Duration::from_millis(500), counting_action(&counter, "x"))
            .await;
        debouncer.cancel_all().await;
        advance(Duration::from_secs(1)).await;

        assert_eq!(scheduled.outcome().await, Err(Superseded));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
