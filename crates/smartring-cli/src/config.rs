//! Configuration file management.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use smartring_core::RingConfig;

/// Default config location: `<config dir>/smartring/config.toml`.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("smartring")
        .join("config.toml")
}

/// Resolve the config file to use.
pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
    explicit.map(Path::to_path_buf).unwrap_or_else(default_path)
}

/// Load the configuration.
///
/// An explicit path must exist. The default path is optional and falls back
/// to built-in defaults when absent.
pub fn load(explicit: Option<&Path>) -> Result<RingConfig> {
    let path = resolve_path(explicit);
    if explicit.is_none() && !path.exists() {
        tracing::debug!("No config at {}, using defaults", path.display());
        return Ok(RingConfig::default());
    }
    RingConfig::load(&path).with_context(|| format!("Failed to load config: {}", path.display()))
}

/// Write a default configuration file.
pub fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "Config already exists: {} (use --force to overwrite)",
            path.display()
        );
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
    }
    let content = RingConfig::default()
        .to_toml_string()
        .context("Failed to serialize config")?;
    fs::write(path, content).with_context(|| format!("Failed to write config: {}", path.display()))?;
    Ok(())
}
