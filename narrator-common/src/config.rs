//! Configuration file discovery and TOML loading
//!
//! Config file resolution follows this priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Per-user config directory (`<config_dir>/narrator/config.toml`)
//! 4. System config (`/etc/narrator/config.toml`, Linux only)
//!
//! A missing config file is not an error: callers fall back to built-in
//! defaults. A config file that was explicitly requested but cannot be read
//! or parsed is an error.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Directory name used under the platform config directory
pub const APP_DIR_NAME: &str = "narrator";

/// Config file name
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Logging configuration shared by all binaries
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error or a full
    /// `tracing_subscriber::EnvFilter` directive)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Locate the config file to load, if any.
///
/// Returns the first candidate that was explicitly given (CLI, env) even if
/// it does not exist, so that `load_toml` can report it. Implicit locations
/// are only returned when they exist.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Per-user config directory
    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            return Some(user_config);
        }
    }

    // Priority 4: System-wide config
    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc")
            .join(APP_DIR_NAME)
            .join(CONFIG_FILE_NAME);
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Per-user config file location for the current platform
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Load a TOML config file into `T`.
///
/// `None` yields `T::default()` (no config file found).
pub fn load_toml<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        warn!("No config file found, using built-in defaults");
        return Ok(T::default());
    };

    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;

    let parsed = toml::from_str::<T>(&content).map_err(|source| Error::Toml {
        path: path.to_path_buf(),
        source,
    })?;

    info!("Loaded configuration from {}", path.display());
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Sample {
        #[serde(default)]
        port: u16,
        #[serde(default)]
        logging: LoggingConfig,
    }

    #[test]
    fn test_cli_path_wins() {
        let path = PathBuf::from("/tmp/does-not-matter.toml");
        let resolved = resolve_config_path(Some(&path), "NARRATOR_TEST_UNSET_VAR");
        assert_eq!(resolved, Some(path));
    }

    #[test]
    fn test_load_none_uses_default() {
        let sample: Sample = load_toml(None).unwrap();
        assert_eq!(sample, Sample::default());
        assert_eq!(sample.logging.level, "info");
    }

    #[test]
    fn test_logging_default_level() {
        assert_eq!(LoggingConfig::default().level, "info");
    }
}
