mod clock;
mod wake;

pub use clock::{ManualClock, SystemClock};
pub use wake::{IntervalWakeTrigger, ManualWakeTrigger};
