use std::sync::{Arc, Mutex};
use std::time::Duration;

use cs_core::ports::ClockPort;
use tracing::debug;

use super::lock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitWindow {
    pub request_count: u32,
    pub window_start_ms: i64,
}

/// A slot held in the current window.
#[derive(Debug)]
#[must_use = "a reservation is either kept or released"]
pub struct Reservation {
    window_start_ms: i64,
}

/// Sliding-window admission control over outbound uploads.
///
/// `admit` only asks. `try_reserve` takes a slot before the network call and
/// `release` hands it back when the upload does not complete. At most
/// `max_requests` slots are held in one window.
pub struct RateLimiter {
    clock: Arc<dyn ClockPort>,
    max_requests: u32,
    window_ms: i64,
    window: Mutex<RateLimitWindow>,
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn ClockPort>, max_requests: u32, window: Duration) -> Self {
        let window_start_ms = clock.now_ms();
        Self {
            clock,
            max_requests,
            window_ms: i64::try_from(window.as_millis()).unwrap_or(i64::MAX),
            window: Mutex::new(RateLimitWindow {
                request_count: 0,
                window_start_ms,
            }),
        }
    }

    pub fn admit(&self) -> bool {
        let mut window = lock(&self.window);
        self.roll(&mut window);
        let admitted = window.request_count < self.max_requests;
        if !admitted {
            debug!(
                request_count = window.request_count,
                max_requests = self.max_requests,
                "rate limit reached"
            );
        }
        admitted
    }

    /// Count one request unconditionally.
    pub fn record(&self) {
        let mut window = lock(&self.window);
        self.roll(&mut window);
        window.request_count = window.request_count.saturating_add(1);
    }

    /// Check and count in one step.
    pub fn try_reserve(&self) -> Option<Reservation> {
        let mut window = lock(&self.window);
        self.roll(&mut window);
        if window.request_count >= self.max_requests {
            debug!(
                request_count = window.request_count,
                max_requests = self.max_requests,
                "rate limit reached at reservation"
            );
            return None;
        }
        window.request_count += 1;
        Some(Reservation {
            window_start_ms: window.window_start_ms,
        })
    }

    /// Give back a slot for an upload that did not complete. A slot taken in
    /// a window that has since rolled over is already gone.
    pub fn release(&self, reservation: Reservation) {
        let mut window = lock(&self.window);
        if window.window_start_ms == reservation.window_start_ms {
            window.request_count = window.request_count.saturating_sub(1);
        }
    }

    pub fn snapshot(&self) -> RateLimitWindow {
        *lock(&self.window)
    }

    pub fn reset(&self) {
        let mut window = lock(&self.window);
        window.request_count = 0;
        window.window_start_ms = self.clock.now_ms();
    }

    fn roll(&self, window: &mut RateLimitWindow) {
        let now = self.clock.now_ms();
        if now - window.window_start_ms > self.window_ms {
            window.request_count = 0;
            window.window_start_ms = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    struct ManualClock(AtomicI64);

    impl ManualClock {
        fn advance(&self, ms: i64) {
            self.0.fetch_add(ms, Ordering::SeqCst);
        }
    }

    impl ClockPort for ManualClock {
        fn now_ms(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn limiter(max: u32) -> (Arc<ManualClock>, RateLimiter) {
        let clock = Arc::new(ManualClock(AtomicI64::new(1_000)));
        let limiter = RateLimiter::new(clock.clone(), max, Duration::from_millis(60_000));
        (clock, limiter)
    }

    #[test]
    fn denies_after_n_reservations_in_window() {
        let (_clock, limiter) = limiter(3);

        for _ in 0..3 {
            assert!(limiter.admit());
            assert!(limiter.try_reserve().is_some());
        }

        assert!(!limiter.admit());
        assert!(limiter.try_reserve().is_none());
        assert_eq!(limiter.snapshot().request_count, 3);
    }

    #[test]
    fn admits_again_after_window_rolls_over() {
        let (clock, limiter) = limiter(2);
        let _first = limiter.try_reserve();
        let _second = limiter.try_reserve();
        assert!(!limiter.admit());

        clock.advance(60_000);
        assert!(!limiter.admit(), "boundary itself is still inside the window");

        clock.advance(1);
        assert!(limiter.admit());
        assert_eq!(limiter.snapshot().request_count, 0);
    }

    #[test]
    fn admit_does_not_consume_capacity() {
        let (_clock, limiter) = limiter(1);
        for _ in 0..10 {
            assert!(limiter.admit());
        }
        let _slot = limiter.try_reserve();
        assert!(!limiter.admit());
    }

    #[test]
    fn recorded_requests_fill_the_window() {
        let (_clock, limiter) = limiter(2);
        limiter.record();
        limiter.record();

        assert!(!limiter.admit());
        assert!(limiter.try_reserve().is_none());
    }

    #[test]
    fn released_slot_can_be_taken_again() {
        let (_clock, limiter) = limiter(1);
        let slot = limiter.try_reserve().expect("first slot");
        assert!(limiter.try_reserve().is_none());

        limiter.release(slot);
        assert!(limiter.try_reserve().is_some());
    }

    #[test]
    fn release_after_rollover_leaves_new_window_alone() {
        let (clock, limiter) = limiter(2);
        let old = limiter.try_reserve().expect("slot");

        clock.advance(60_001);
        let _fresh = limiter.try_reserve().expect("slot in new window");
        limiter.release(old);

        assert_eq!(limiter.snapshot().request_count, 1);
    }

    #[test]
    fn reset_clears_count() {
        let (_clock, limiter) = limiter(1);
        let _slot = limiter.try_reserve();
        limiter.reset();
        assert!(limiter.admit());
    }
}
