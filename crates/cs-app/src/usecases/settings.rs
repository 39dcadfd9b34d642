use std::sync::Arc;

use anyhow::{Context, Result};
use cs_core::ports::{load_json, save_json, KeyValueStorePort};
use cs_core::settings::{Settings, SETTINGS_KEY};
use tracing::info;

/// Persisted user settings backed by durable local storage.
pub struct SettingsService {
    store: Arc<dyn KeyValueStorePort>,
}

impl SettingsService {
    pub fn new(store: Arc<dyn KeyValueStorePort>) -> Self {
        Self { store }
    }

    /// Write default settings if none are stored yet.
    pub async fn ensure_defaults(&self) -> Result<Settings> {
        if let Some(settings) = load_json::<Settings>(self.store.as_ref(), SETTINGS_KEY).await? {
            return Ok(settings);
        }

        let settings = Settings::default();
        save_json(self.store.as_ref(), SETTINGS_KEY, &settings)
            .await
            .context("write default settings failed")?;
        info!("default settings written");
        Ok(settings)
    }

    pub async fn load(&self) -> Result<Settings> {
        Ok(load_json(self.store.as_ref(), SETTINGS_KEY)
            .await?
            .unwrap_or_default())
    }

    pub async fn set_capture_enabled(&self, enabled: bool) -> Result<Settings> {
        let mut settings = self.load().await?;
        settings.capture_enabled = enabled;
        save_json(self.store.as_ref(), SETTINGS_KEY, &settings)
            .await
            .context("save settings failed")?;
        info!(enabled, "capture toggled");
        Ok(settings)
    }
}
