//! Configuration loading and parsing

use anyhow::{Context, Result};
use host_bridge_core::BridgeConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from a TOML file)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub plugins: PluginsConfig,
}

/// Shared library supplying callbacks, and the symbols to register from it
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PluginsConfig {
    pub library: Option<PathBuf>,
    /// Constraint subroutine symbols, registered in this order
    #[serde(default)]
    pub constraints: Vec<String>,
    /// Potential callback symbols, registered in this order
    #[serde(default)]
    pub potentials: Vec<String>,
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    if config.plugins.library.is_none()
        && !(config.plugins.constraints.is_empty() && config.plugins.potentials.is_empty())
    {
        anyhow::bail!("{:?}: [plugins] lists symbols but no library", path);
    }

    Ok(config)
}
