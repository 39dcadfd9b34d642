use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use super::lock;

/// Monotonic per-fingerprint sequence numbers for detached capture tasks.
///
/// A task takes a ticket when it starts and only applies its fallback result
/// if no newer task for the same fingerprint has started since. An entry lives
/// as long as any ticket for its fingerprint is outstanding.
#[derive(Default)]
pub struct SequenceGate {
    counter: AtomicU64,
    latest: Mutex<HashMap<String, Tickets>>,
}

#[derive(Debug, Clone, Copy)]
struct Tickets {
    newest: u64,
    outstanding: usize,
}

impl SequenceGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, fingerprint: &str) -> u64 {
        let next = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let mut latest = lock(&self.latest);
        let tickets = latest.entry(fingerprint.to_string()).or_insert(Tickets {
            newest: next,
            outstanding: 0,
        });
        tickets.newest = next;
        tickets.outstanding += 1;
        next
    }

    /// True unless a newer ticket for `fingerprint` has been issued.
    pub fn is_current(&self, fingerprint: &str, sequence: u64) -> bool {
        lock(&self.latest)
            .get(fingerprint)
            .map_or(true, |tickets| tickets.newest <= sequence)
    }

    /// Return a ticket; the entry goes away with the last outstanding one.
    pub fn finish(&self, fingerprint: &str, _sequence: u64) {
        let mut latest = lock(&self.latest);
        if let Some(tickets) = latest.get_mut(fingerprint) {
            tickets.outstanding = tickets.outstanding.saturating_sub(1);
            if tickets.outstanding == 0 {
                latest.remove(fingerprint);
            }
        }
    }

    pub fn outstanding(&self, fingerprint: &str) -> usize {
        lock(&self.latest)
            .get(fingerprint)
            .map_or(0, |tickets| tickets.outstanding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_ticket_makes_older_stale() {
        let gate = SequenceGate::new();
        let first = gate.begin("fp");
        let second = gate.begin("fp");

        assert!(second > first);
        assert!(!gate.is_current("fp", first));
        assert!(gate.is_current("fp", second));
    }

    #[test]
    fn older_ticket_stays_stale_after_newer_finishes() {
        let gate = SequenceGate::new();
        let first = gate.begin("fp");
        let second = gate.begin("fp");

        gate.finish("fp", second);
        assert!(!gate.is_current("fp", first));
        assert_eq!(gate.outstanding("fp"), 1);

        gate.finish("fp", first);
        assert_eq!(gate.outstanding("fp"), 0);
    }

    #[test]
    fn lone_ticket_is_current_until_finished() {
        let gate = SequenceGate::new();
        let only = gate.begin("fp");
        assert!(gate.is_current("fp", only));

        gate.finish("fp", only);
        assert!(gate.is_current("fp", only));
        assert_eq!(gate.outstanding("fp"), 0);
    }

    #[test]
    fn tickets_are_never_reused_after_finish() {
        let gate = SequenceGate::new();
        let first = gate.begin("fp");
        let second = gate.begin("fp");
        gate.finish("fp", second);
        gate.finish("fp", first);

        let third = gate.begin("fp");
        assert!(third > second);
        assert!(!gate.is_current("fp", first));
    }

    #[test]
    fn fingerprints_are_independent() {
        let gate = SequenceGate::new();
        let a = gate.begin("a");
        gate.begin("b");
        assert!(gate.is_current("a", a));
    }
}
