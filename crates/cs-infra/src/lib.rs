//! Adapters implementing the `cs-core` ports: clock and wake trigger,
//! durable key-value storage, the presentation notifier and an in-memory
//! cloud backend.

pub mod fs;
pub mod notify;
pub mod remote;
pub mod storage;
pub mod time;

pub use notify::ChannelNotifier;
pub use remote::InMemoryCloud;
pub use storage::{FileKeyValueStore, InMemoryKeyValueStore};
pub use time::{IntervalWakeTrigger, ManualClock, ManualWakeTrigger, SystemClock};
