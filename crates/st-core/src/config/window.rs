//! Remote window configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::{duration_micros, duration_secs};

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtermConfig {
    /// Remote window settings
    pub window: WindowConfig,
}

/// How remote windows are launched and driven
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Render ticks per second of the host loop
    pub tps: u32,

    /// Initial terminal width in cells
    pub width: u16,

    /// Initial terminal height in cells
    pub height: u16,

    /// Path to the `subterm-host` binary.
    ///
    /// Defaults to the binary next to the current executable, then `PATH`.
    pub host_binary: Option<PathBuf>,

    /// Command prefix that opens a new console on Unix,
    /// e.g. `["x-terminal-emulator", "-e"]`. Empty runs the host directly.
    pub launcher: Vec<String>,

    /// How long to wait for the host's ready byte
    #[serde(with = "duration_secs")]
    pub handshake_timeout: Duration,

    /// How long `close()` waits for the final reply and for the host to exit
    #[serde(with = "duration_secs")]
    pub close_timeout: Duration,

    /// Resolver thread poll interval
    #[serde(with = "duration_micros")]
    pub poll_interval: Duration,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            tps: 30,
            width: 80,
            height: 24,
            host_binary: None,
            launcher: vec![],
            handshake_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_micros(100),
        }
    }
}

impl WindowConfig {
    /// Duration of one host tick
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(1) / self.tps.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: SubtermConfig = toml::from_str("[window]\ntps = 10\n").unwrap();
        assert_eq!(config.window.tps, 10);
        assert_eq!(config.window.width, 80);
        assert_eq!(config.window.handshake_timeout, Duration::from_secs(10));
        assert!(config.window.launcher.is_empty());
    }

    #[test]
    fn test_tick_interval() {
        let mut config = WindowConfig::default();
        config.tps = 50;
        assert_eq!(config.tick_interval(), Duration::from_millis(20));
        config.tps = 0;
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
    }
}
