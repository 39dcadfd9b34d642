use std::time::Duration;

use tokio::sync::mpsc;

/// Periodic wake signal from the host's durable scheduler.
///
/// In-process timers are not assumed to survive suspension; the host decides
/// how the signal is produced.
pub trait WakeTriggerPort: Send + Sync {
    fn arm(&self, period: Duration) -> mpsc::Receiver<()>;
}
