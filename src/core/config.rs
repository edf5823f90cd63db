//! Project configuration loaded from `tidelog.toml` at the project root.

use crate::core::error::TidelogError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const CONFIG_FILE_NAME: &str = "tidelog.toml";

/// Trend comparisons look this many snapshots back by default.
pub const DEFAULT_TREND_WINDOW: usize = 7;

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Snapshot window for trend computation (most-recent-first index + 1).
    pub trend_window: usize,
    /// Actor label recorded on broker events.
    pub actor: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            trend_window: DEFAULT_TREND_WINDOW,
            actor: "tidelog".to_string(),
        }
    }
}

/// Load configuration from `<project_root>/tidelog.toml`.
///
/// A missing file yields defaults; a malformed or out-of-range file is an
/// error rather than a silent fallback.
pub fn load_config(project_root: &Path) -> Result<Config, TidelogError> {
    let path = project_root.join(CONFIG_FILE_NAME);
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = fs::read_to_string(&path).map_err(TidelogError::IoError)?;
    let config: Config = toml::from_str(&raw)
        .map_err(|e| TidelogError::ConfigError(format!("{}: {}", path.display(), e)))?;
    if config.trend_window == 0 {
        return Err(TidelogError::ConfigError(
            "trend_window must be at least 1".to_string(),
        ));
    }
    Ok(config)
}
