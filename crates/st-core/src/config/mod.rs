//! Configuration management for subterm

mod launch;
pub mod serde_utils;
mod window;

pub use launch::LaunchConfig;
pub use window::{SubtermConfig, WindowConfig};

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("subterm")
}

/// Get the default configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Get the default host log file path
pub fn default_log_path() -> PathBuf {
    default_config_dir().join("host.log")
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to a file
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Invalid(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, content)
        .map_err(|e| ConfigError::Invalid(format!("Failed to write config: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_config_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.toml");
        match load_config::<SubtermConfig>(&path) {
            Err(ConfigError::NotFound(p)) => assert_eq!(p, path),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = SubtermConfig::default();
        config.window.tps = 60;
        config.window.launcher = vec!["xterm".into(), "-e".into()];
        save_config(&path, &config).unwrap();

        let loaded: SubtermConfig = load_config(&path).unwrap();
        assert_eq!(loaded.window.tps, 60);
        assert_eq!(loaded.window.launcher, config.window.launcher);
    }

    #[test]
    fn test_default_paths_share_dir() {
        assert_eq!(default_config_path().parent(), Some(default_config_dir().as_path()));
        assert!(default_log_path().ends_with("host.log"));
    }
}
