//! # Configuration Loader
//!
//! Reads `config.toml` and maps it onto [`SyncConfig`]. Defaults for absent
//! keys live on `SyncConfig` itself; this module only does I/O and parsing.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use cs_core::SyncConfig;
use tracing::info;

/// Load configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not valid TOML.
pub fn load_config(config_path: &Path) -> anyhow::Result<SyncConfig> {
    let content = std::fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;
    SyncConfig::from_toml_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", config_path.display()))
}

/// Pick the configuration source.
///
/// An explicit path must exist. Without one, the default location is used
/// when present and built-in defaults otherwise.
pub fn resolve_config(
    explicit: Option<PathBuf>,
    default_path: Option<PathBuf>,
) -> anyhow::Result<SyncConfig> {
    if let Some(path) = explicit {
        if !path.exists() {
            bail!("Config file not found: {}", path.display());
        }
        return load_config(&path);
    }

    match default_path {
        Some(path) if path.exists() => load_config(&path),
        _ => {
            info!("no config file found, using defaults");
            Ok(SyncConfig::default())
        }
    }
}
