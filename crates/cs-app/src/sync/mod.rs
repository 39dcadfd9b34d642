//! Local, best-effort gates in front of the remote store.
//!
//! None of these survive a process restart, and none need to: they only
//! gate optimizations and loop prevention, never the durable record.

mod debounce;
mod rate_limiter;
mod recent_guard;
mod retry;
mod sequence;

pub use debounce::{DebounceCoalescer, Scheduled, Superseded};
pub use rate_limiter::{RateLimitWindow, RateLimiter, Reservation};
pub use recent_guard::RecentUploadGuard;
pub use retry::{retry_with_backoff, RetryClassify, RetryPolicy};
pub use sequence::SequenceGate;

use std::sync::{Mutex, MutexGuard};

/// Lock a std mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
