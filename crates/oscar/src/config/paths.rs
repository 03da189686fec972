//! Default locations for oscar's files.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "oscar.toml";

/// Per-user config file (~/.config/oscar/oscar.toml)
pub fn get_user_config_path() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .context("Failed to get config directory")?
        .join("oscar")
        .join(CONFIG_FILE_NAME))
}

/// Log directory under the platform data dir (~/.local/share/oscar/logs)
pub fn get_log_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .context("Failed to determine data directory (XDG_DATA_HOME or platform equivalent)")?;

    Ok(data_dir.join("oscar").join("logs"))
}

/// The first config file that exists: `./oscar.toml`, then the per-user one.
pub fn find_config_file(cwd: &Path) -> Option<PathBuf> {
    let local = cwd.join(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }
    get_user_config_path().ok().filter(|p| p.is_file())
}
