use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use cs_core::ports::{KeyValueStorePort, StorageChange};
use serde_json::Value;
use tokio::sync::broadcast;

use super::{change_channel, publish};

/// Process-local storage. Contents are lost on restart.
pub struct InMemoryKeyValueStore {
    entries: Mutex<HashMap<String, Value>>,
    changes: broadcast::Sender<StorageChange>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            changes: change_channel(),
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Value>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for InMemoryKeyValueStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStorePort for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.entries().insert(key.to_string(), value.clone());
        publish(&self.changes, key, Some(value));
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        if self.entries().remove(key).is_some() {
            publish(&self.changes, key, None);
        }
        Ok(())
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }
}
