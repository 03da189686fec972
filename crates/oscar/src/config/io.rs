//! Loading the configuration file
//!
//! Settings are layered: built-in defaults, then the file, then `OSCAR_*`
//! environment overrides. The result is validated before it is returned.

use super::paths::find_config_file;
use super::schema::OscarConfig;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Load configuration from `path`, or from the default locations when `None`.
///
/// An explicit path must exist. Without one, a missing file just means
/// defaults plus environment.
pub fn load_config(path: Option<&Path>) -> Result<OscarConfig> {
    let path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => find_config_file(&std::env::current_dir()?),
    };

    let mut config = match &path {
        Some(path) => parse_config_file(path)?,
        None => OscarConfig::default(),
    };
    config.apply_env();

    if let Err(errors) = config.validate() {
        let source = path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "environment".to_string());
        anyhow::bail!(
            "Config validation failed in {}:\n  {}",
            source,
            errors.join("\n  ")
        );
    }

    Ok(config)
}

/// Parse one file without environment overrides or validation.
pub fn parse_config_file(path: &Path) -> Result<OscarConfig> {
    let content =
        fs::read_to_string(path).context(format!("Failed to read config: {}", path.display()))?;

    toml::from_str(&content).context(format!("Failed to parse config: {}", path.display()))
}
