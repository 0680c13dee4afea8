//! Application configuration.
//!
//! Stored as JSON under the platform config directory
//! (`~/.config/sealmail/config.json` on Linux).

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{Error, Result};

/// Directory name used under the platform config and data directories.
const APP_DIR: &str = "sealmail";

/// File name of the configuration file.
const CONFIG_FILE: &str = "config.json";

/// Default size in bits for newly generated asymmetric keys.
pub const DEFAULT_ASYM_KEY_SIZE: u32 = 2048;

/// Database version this build migrates to.
pub const DB_VERSION: u32 = 3;

/// Default public key server.
pub const DEFAULT_KEYSERVER_URL: &str = "https://keys.whiteout.io";

/// Application settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Key size handed to the email transport for key generation.
    pub asym_key_size: u32,
    /// Target version for the update handler.
    pub db_version: u32,
    /// Directory holding the databases. `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,
    /// Base URL of the public key server.
    pub keyserver_url: String,
    /// Upper bound in seconds for each collaborator call. `None` waits forever.
    pub step_timeout: Option<u64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            asym_key_size: DEFAULT_ASYM_KEY_SIZE,
            db_version: DB_VERSION,
            data_dir: default_data_dir(),
            keyserver_url: DEFAULT_KEYSERVER_URL.to_string(),
            step_timeout: None,
        }
    }
}

impl AppConfig {
    /// Configuration that keeps all storage in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            data_dir: None,
            ..Self::default()
        }
    }

    /// The per-call timeout, if configured.
    #[must_use]
    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout.map(Duration::from_secs)
    }
}

fn default_data_dir() -> Option<PathBuf> {
    Some(
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR),
    )
}

/// Path of the configuration file.
#[must_use]
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join(CONFIG_FILE)
}

/// Load the configuration, falling back to defaults when no file exists.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub async fn load() -> Result<AppConfig> {
    let path = config_path();
    if !path.exists() {
        return Ok(AppConfig::default());
    }

    let contents = tokio::fs::read_to_string(&path).await?;
    serde_json::from_str(&contents).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
}

/// Save the configuration.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be written.
pub async fn save(config: &AppConfig) -> Result<()> {
    let path = config_path();
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }

    let contents =
        serde_json::to_string_pretty(config).map_err(|e| Error::Config(e.to_string()))?;
    tokio::fs::write(&path, contents).await?;

    info!("Configuration saved to {:?}", path);
    Ok(())
}
