use std::sync::Mutex;
use std::time::Duration;

use cs_core::ports::WakeTriggerPort;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

/// Wake signal from an in-process interval.
///
/// Suits a long-lived process. Ticks missed while the receiver is busy are
/// coalesced into one.
#[derive(Debug, Default)]
pub struct IntervalWakeTrigger;

impl WakeTriggerPort for IntervalWakeTrigger {
    fn arm(&self, period: Duration) -> mpsc::Receiver<()> {
        let (tx, rx) = mpsc::channel(1);
        let first_tick = Instant::now() + period;

        tokio::spawn(async move {
            let mut ticker = interval_at(first_tick, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tx.is_closed() {
                    break;
                }
                let _ = tx.try_send(());
            }
            debug!("wake trigger disarmed");
        });

        debug!(period_ms = period.as_millis() as u64, "wake trigger armed");
        rx
    }
}

/// Wake signal fired explicitly, e.g. by a host scheduler callback or a test.
#[derive(Debug, Default)]
pub struct ManualWakeTrigger {
    senders: Mutex<Vec<mpsc::Sender<()>>>,
}

impl ManualWakeTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal every armed receiver. Returns how many were signalled.
    pub fn fire(&self) -> usize {
        let mut senders = self
            .senders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        senders.retain(|tx| !tx.is_closed());
        senders.iter().filter(|tx| tx.try_send(()).is_ok()).count()
    }
}

impl WakeTriggerPort for ManualWakeTrigger {
    fn arm(&self, _period: Duration) -> mpsc::Receiver<()> {
        let (tx, rx) = mpsc::channel(1);
        self.senders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(tx);
        rx
    }
}
