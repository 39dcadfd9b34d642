//! Durable key-value storage adapters.

mod file;
mod memory;

pub use file::FileKeyValueStore;
pub use memory::InMemoryKeyValueStore;

use cs_core::ports::StorageChange;
use tokio::sync::broadcast;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

fn change_channel() -> broadcast::Sender<StorageChange> {
    broadcast::channel(CHANGE_CHANNEL_CAPACITY).0
}

/// Publish a change; nobody listening is fine.
fn publish(changes: &broadcast::Sender<StorageChange>, key: &str, new_value: Option<serde_json::Value>) {
    let _ = changes.send(StorageChange {
        key: key.to_string(),
        new_value,
    });
}
