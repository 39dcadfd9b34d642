//! Explicitly owned engine state.
//!
//! Everything that would otherwise be module-level mutable state (rate-limit
//! counters, debounce timers, the recent-upload set, the push subscription
//! handle, the session epoch) lives here, owned by the lifecycle supervisor
//! and torn down through [`SyncContext::teardown`].

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use cs_core::ids::ItemId;
use cs_core::ports::{ClockPort, SubscriptionHandle};
use cs_core::SyncConfig;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::sync::{lock, DebounceCoalescer, RateLimiter, RecentUploadGuard, SequenceGate};

/// The single live push subscription and the task draining it.
pub struct ActiveSubscription {
    pub handle: Box<dyn SubscriptionHandle>,
    pub consumer: JoinHandle<()>,
}

impl ActiveSubscription {
    pub async fn close(self) {
        self.consumer.abort();
        self.handle.unsubscribe().await;
    }
}

pub struct SyncContext {
    pub rate_limiter: RateLimiter,
    pub debouncer: DebounceCoalescer,
    pub recent_uploads: RecentUploadGuard,
    pub sequences: SequenceGate,
    subscription: tokio::sync::Mutex<Option<ActiveSubscription>>,
    subscription_active: AtomicBool,
    session_epoch: AtomicU64,
    in_flight_pending: Mutex<HashSet<ItemId>>,
}

impl SyncContext {
    pub fn new(config: &SyncConfig, clock: Arc<dyn ClockPort>) -> Self {
        Self {
            rate_limiter: RateLimiter::new(
                Arc::clone(&clock),
                config.rate_limit_max_requests,
                config.rate_limit_window(),
            ),
            debouncer: DebounceCoalescer::new(config.debounce_mode),
            recent_uploads: RecentUploadGuard::new(clock, config.recent_upload_ttl()),
            sequences: SequenceGate::new(),
            subscription: tokio::sync::Mutex::new(None),
            subscription_active: AtomicBool::new(false),
            session_epoch: AtomicU64::new(0),
            in_flight_pending: Mutex::new(HashSet::new()),
        }
    }

    // === Session epoch ===

    pub fn epoch(&self) -> u64 {
        self.session_epoch.load(Ordering::SeqCst)
    }

    /// Invalidate results issued under the previous session.
    pub fn advance_epoch(&self) -> u64 {
        self.session_epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_epoch_current(&self, epoch: u64) -> bool {
        self.epoch() == epoch
    }

    // === Push subscription ===

    pub fn is_subscription_active(&self) -> bool {
        self.subscription_active.load(Ordering::SeqCst)
    }

    pub(crate) fn set_subscription_active(&self, active: bool) {
        self.subscription_active.store(active, Ordering::SeqCst);
    }

    pub(crate) fn subscription_slot(
        &self,
    ) -> &tokio::sync::Mutex<Option<ActiveSubscription>> {
        &self.subscription
    }

    /// Tear down the subscription. The slot is emptied before the old handle
    /// is closed.
    pub async fn close_subscription(&self) {
        let active = self.subscription.lock().await.take();
        self.set_subscription_active(false);
        if let Some(active) = active {
            active.close().await;
            debug!("push subscription closed");
        }
    }

    // === Pending flush bookkeeping ===

    /// Returns false if the item is already being flushed.
    pub fn mark_in_flight(&self, id: &ItemId) -> bool {
        lock(&self.in_flight_pending).insert(id.clone())
    }

    pub fn clear_in_flight(&self, id: &ItemId) {
        lock(&self.in_flight_pending).remove(id);
    }

    pub fn in_flight_count(&self) -> usize {
        lock(&self.in_flight_pending).len()
    }

    /// Session loss: drop the subscription and any per-session bookkeeping.
    pub async fn reset_session_state(&self) {
        self.close_subscription().await;
        lock(&self.in_flight_pending).clear();
    }

    /// Full teardown, used on shutdown.
    pub async fn teardown(&self) {
        self.reset_session_state().await;
        self.debouncer.cancel_all().await;
        self.recent_uploads.clear();
        self.rate_limiter.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct FixedClock;

    impl ClockPort for FixedClock {
        fn now_ms(&self) -> i64 {
            0
        }
    }

    struct CountingHandle(Arc<AtomicUsize>);

    #[async_trait::async_trait]
    impl SubscriptionHandle for CountingHandle {
        async fn unsubscribe(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn context() -> SyncContext {
        SyncContext::new(&SyncConfig::default(), Arc::new(FixedClock))
    }

    #[test]
    fn epoch_advances_monotonically() {
        let ctx = context();
        let first = ctx.epoch();
        let second = ctx.advance_epoch();
        assert!(second > first);
        assert!(!ctx.is_epoch_current(first));
        assert!(ctx.is_epoch_current(second));
    }

    #[test]
    fn in_flight_marks_are_exclusive() {
        let ctx = context();
        let id = ItemId::from("pending-1");
        assert!(ctx.mark_in_flight(&id));
        assert!(!ctx.mark_in_flight(&id));
        ctx.clear_in_flight(&id);
        assert!(ctx.mark_in_flight(&id));
    }

    #[tokio::test]
    async fn teardown_closes_subscription_and_clears_state() {
        let ctx = context();
        let unsubscribed = Arc::new(AtomicUsize::new(0));

        *ctx.subscription_slot().lock().await = Some(ActiveSubscription {
            handle: Box::new(CountingHandle(unsubscribed.clone())),
            consumer: tokio::spawn(std::future::pending::<()>()),
        });
        ctx.set_subscription_active(true);
        ctx.mark_in_flight(&ItemId::from("pending-1"));
        ctx.recent_uploads.insert("fp");

        ctx.teardown().await;

        assert!(!ctx.is_subscription_active());
        assert!(ctx.subscription_slot().lock().await.is_none());
        assert_eq!(unsubscribed.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.in_flight_count(), 0);
        assert!(ctx.recent_uploads.is_empty());
    }

    #[tokio::test]
    async fn session_reset_keeps_capture_tickets() {
        let ctx = context();
        let ticket = ctx.sequences.begin("fp");

        ctx.reset_session_state().await;

        assert!(ctx.sequences.is_current("fp", ticket));
        assert_eq!(ctx.sequences.outstanding("fp"), 1);
    }
}
