use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cs_core::ports::ClockPort;

use super::lock;

/// Fingerprints confirmed uploaded moments ago.
///
/// Swallows the echo of our own clipboard writes coming back as copy events.
/// Entries expire after a fixed TTL.
pub struct RecentUploadGuard {
    clock: Arc<dyn ClockPort>,
    ttl_ms: i64,
    entries: Mutex<HashMap<String, i64>>,
}

impl RecentUploadGuard {
    pub fn new(clock: Arc<dyn ClockPort>, ttl: Duration) -> Self {
        Self {
            clock,
            ttl_ms: i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, fingerprint: &str) {
        let expires_at = self.clock.now_ms().saturating_add(self.ttl_ms);
        lock(&self.entries).insert(fingerprint.to_string(), expires_at);
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        let now = self.clock.now_ms();
        let mut entries = lock(&self.entries);
        entries.retain(|_, expires_at| *expires_at > now);
        entries.contains_key(fingerprint)
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    struct ManualClock(AtomicI64);

    impl ClockPort for ManualClock {
        fn now_ms(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn entries_expire_after_ttl() {
        let clock = Arc::new(ManualClock(AtomicI64::new(0)));
        let guard = RecentUploadGuard::new(clock.clone(), Duration::from_millis(5_000));

        guard.insert("abc");
        assert!(guard.contains("abc"));
        assert!(!guard.contains("def"));

        clock.0.store(4_999, Ordering::SeqCst);
        assert!(guard.contains("abc"));

        clock.0.store(5_000, Ordering::SeqCst);
        assert!(!guard.contains("abc"));
        assert!(guard.is_empty());
    }

    #[test]
    fn reinsert_extends_ttl() {
        let clock = Arc::new(ManualClock(AtomicI64::new(0)));
        let guard = RecentUploadGuard::new(clock.clone(), Duration::from_millis(100));

        guard.insert("abc");
        clock.0.store(90, Ordering::SeqCst);
        guard.insert("abc");
        clock.0.store(150, Ordering::SeqCst);
        assert!(guard.contains("abc"));
    }
}
