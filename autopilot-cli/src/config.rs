//! Configuration loading.
//!
//! The TOML file deserialises straight into [`EngineConfig`]; every key
//! is optional and falls back to the engine defaults. Without an
//! explicit `--config`, `./autopilot.toml` is used when present.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use autopilot_core::EngineConfig;
use autopilot_storage_sql::SqlStorageConfig;

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "autopilot.toml";

/// Load configuration from a file, or defaults when none is given and
/// the default file does not exist.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let path = match path {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            default.exists().then_some(default)
        }
    };

    let config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config {}", path.display()))?;
            toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?
        }
        None => EngineConfig::default(),
    };

    config.validate()?;
    Ok(config)
}

/// Storage settings derived from the engine configuration.
#[must_use]
pub fn storage_config(config: &EngineConfig) -> SqlStorageConfig {
    SqlStorageConfig {
        db_url: config.db_url.clone(),
        db_path: config.db_path.clone(),
        query_timeout: Duration::from_secs(30),
        ..Default::default()
    }
}
