use anyhow::{Context, Result};
use std::path::PathBuf;

const APP_DIR_NAME: &str = "ClipSync";

/// Get the ClipSync application data root directory.
///
/// # Platform-specific Paths
/// - macOS: ~/Library/Application Support/ClipSync
/// - Windows: %APPDATA%\ClipSync
/// - Linux: $XDG_DATA_HOME/ClipSync or ~/.local/share/ClipSync
///
/// The directory is not created here; the caller decides when to create it.
pub fn app_data_dir() -> Result<PathBuf> {
    let base_dir = platform_data_dir().context("Failed to get platform-specific data directory")?;

    Ok(base_dir.join(APP_DIR_NAME))
}

/// Durable key-value store file.
pub fn storage_file() -> Result<PathBuf> {
    Ok(app_data_dir()?.join("storage.json"))
}

pub fn logs_dir() -> Result<PathBuf> {
    Ok(app_data_dir()?.join("logs"))
}

/// Default location of `config.toml`.
pub fn default_config_file() -> Result<PathBuf> {
    let base = dirs::config_dir().context("Unable to get config directory")?;
    Ok(base.join(APP_DIR_NAME).join("config.toml"))
}

fn platform_data_dir() -> Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        if let Some(xdg_data_home) = std::env::var_os("XDG_DATA_HOME") {
            return Ok(PathBuf::from(xdg_data_home));
        }
    }

    dirs::data_dir().ok_or_else(|| anyhow::anyhow!("Unable to get data directory"))
}
