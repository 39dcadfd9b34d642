use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use cs_core::ports::{KeyValueStorePort, StorageChange};
use serde_json::Value;
use tokio::fs;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

use super::{change_channel, publish};

/// Key-value storage persisted as one JSON object on disk.
///
/// The file is read lazily on first access and rewritten atomically
/// (temp file + rename) on every change, so a crash leaves either the old or
/// the new contents.
pub struct FileKeyValueStore {
    path: PathBuf,
    entries: Mutex<Option<HashMap<String, Value>>>,
    changes: broadcast::Sender<StorageChange>,
}

impl FileKeyValueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Mutex::new(None),
            changes: change_channel(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_file(&self) -> Result<HashMap<String, Value>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "storage file missing, starting empty");
                return Ok(HashMap::new());
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("read storage failed: {}", self.path.display()))
            }
        };

        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&content)
            .with_context(|| format!("parse storage failed: {}", self.path.display()))
    }

    async fn atomic_write(&self, entries: &HashMap<String, Value>) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("create storage dir failed: {}", dir.display()))?;
        }

        let content = serde_json::to_string_pretty(entries).context("serialize storage failed")?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, content)
            .await
            .with_context(|| format!("write temp storage failed: {}", tmp_path.display()))?;

        fs::rename(&tmp_path, &self.path).await.with_context(|| {
            format!(
                "rename temp storage to target failed: {} -> {}",
                tmp_path.display(),
                self.path.display()
            )
        })?;
        Ok(())
    }

    /// Apply `change` to the loaded map and persist it. The in-memory copy is
    /// only updated once the write succeeded.
    async fn update<F>(&self, change: F) -> Result<bool>
    where
        F: FnOnce(&mut HashMap<String, Value>) -> bool,
    {
        let mut guard = self.entries.lock().await;
        let mut entries = match guard.take() {
            Some(entries) => entries,
            None => self.read_file().await?,
        };
        let snapshot = entries.clone();

        if !change(&mut entries) {
            *guard = Some(entries);
            return Ok(false);
        }

        if let Err(err) = self.atomic_write(&entries).await {
            warn!(error = %err, "storage write failed");
            *guard = Some(snapshot);
            return Err(err);
        }
        *guard = Some(entries);
        Ok(true)
    }
}

#[async_trait]
impl KeyValueStorePort for FileKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let mut guard = self.entries.lock().await;
        if guard.is_none() {
            *guard = Some(self.read_file().await?);
        }
        Ok(guard.as_ref().and_then(|entries| entries.get(key).cloned()))
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let stored = value.clone();
        self.update(|entries| {
            entries.insert(key.to_string(), stored);
            true
        })
        .await?;
        publish(&self.changes, key, Some(value));
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        if self.update(|entries| entries.remove(key).is_some()).await? {
            publish(&self.changes, key, None);
        }
        Ok(())
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }
}
