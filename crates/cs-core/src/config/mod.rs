//! # Sync configuration
//!
//! Tunables for the synchronization engine. Every field has a default so a
//! partial (or missing) TOML file still yields a complete configuration.
//!
//! ```toml
//! [sync]
//! max_items = 100
//! debounce_ms = 500
//!
//! [device]
//! name = "Work Laptop"
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How capture bursts are coalesced before they become upload attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebounceMode {
    /// Delay and coalesce repeated captures of the same fingerprint.
    #[default]
    Coalesce,
    /// Run immediately. For hosts where timers may not survive suspension.
    Immediate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Cap on the visible, cached item list.
    pub max_items: usize,
    /// Content longer than this (in chars) is truncated before upload.
    pub max_content_length: usize,
    pub rate_limit_max_requests: u32,
    pub rate_limit_window_ms: u64,
    pub debounce_ms: u64,
    pub debounce_mode: DebounceMode,
    pub recent_upload_ttl_ms: u64,
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub init_session_timeout_ms: u64,
    pub wake_interval_ms: u64,
    /// Display name for this device; hostname is used when absent.
    pub device_name: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_items: 100,
            max_content_length: 50_000,
            rate_limit_max_requests: 30,
            rate_limit_window_ms: 60_000,
            debounce_ms: 500,
            debounce_mode: DebounceMode::Coalesce,
            recent_upload_ttl_ms: 5_000,
            retry_max_attempts: 3,
            retry_base_delay_ms: 1_000,
            init_session_timeout_ms: 10_000,
            wake_interval_ms: 60_000,
            device_name: None,
        }
    }
}

/// On-disk layout: `[sync]` holds the tunables, `[device]` the display name.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    sync: SyncConfig,
    #[serde(default)]
    device: DeviceSection,
}

#[derive(Debug, Default, Deserialize)]
struct DeviceSection {
    name: Option<String>,
}

impl SyncConfig {
    /// Parse a TOML document. Missing sections and keys keep their defaults.
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let file: ConfigFile = toml::from_str(content)?;
        let mut config = file.sync;
        if let Some(name) = file.device.name.filter(|n| !n.trim().is_empty()) {
            config.device_name = Some(name);
        }
        Ok(config)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window_ms)
    }

    pub fn debounce_delay(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn recent_upload_ttl(&self) -> Duration {
        Duration::from_millis(self.recent_upload_ttl_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn init_session_timeout(&self) -> Duration {
        Duration::from_millis(self.init_session_timeout_ms)
    }

    pub fn wake_interval(&self) -> Duration {
        Duration::from_millis(self.wake_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = SyncConfig::from_toml_str("").unwrap();
        assert_eq!(config, SyncConfig::default());
    }

    #[test]
    fn partial_sync_section_overrides_only_given_keys() {
        let config = SyncConfig::from_toml_str(
            r#"
            [sync]
            max_items = 20
            debounce_mode = "immediate"
            "#,
        )
        .unwrap();

        assert_eq!(config.max_items, 20);
        assert_eq!(config.debounce_mode, DebounceMode::Immediate);
        assert_eq!(config.retry_max_attempts, 3);
    }

    #[test]
    fn device_section_sets_name_unless_blank() {
        let config = SyncConfig::from_toml_str("[device]\nname = \"Desk\"").unwrap();
        assert_eq!(config.device_name.as_deref(), Some("Desk"));

        let config = SyncConfig::from_toml_str("[device]\nname = \"  \"").unwrap();
        assert_eq!(config.device_name, None);
    }

    #[test]
    fn invalid_toml_is_an_error() {
        assert!(SyncConfig::from_toml_str("[sync\nmax_items = ").is_err());
    }
}
