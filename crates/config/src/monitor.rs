//! Monitor endpoint configuration
//!
//! Controls the Unix socket that monitor clients connect to and the per-session
//! relay buffer.

use serde::Deserialize;

/// Default socket path
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/logmon.sock";

/// Default number of frames buffered per monitor session
pub const DEFAULT_BUFFER_CAPACITY: usize = 512;

/// Where the relay reports its own drop warnings
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticsTarget {
    /// Through the host's log output, never relayed to clients (default)
    #[default]
    Log,
    /// Straight to stderr
    Stderr,
    /// Discarded
    Off,
}

/// Monitor configuration
///
/// # Example
///
/// ```toml
/// [monitor]
/// socket_path = "/run/logmon.sock"
/// buffer_capacity = 1024
/// heartbeat_interval_secs = 0
/// diagnostics = "stderr"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Whether the monitor socket is served
    /// Default: true
    pub enabled: bool,

    /// Path to the Unix socket
    /// Default: /tmp/logmon.sock
    pub socket_path: String,

    /// Frames buffered per session before new records are dropped
    /// Default: 512
    pub buffer_capacity: usize,

    /// Interval of the host's heartbeat log record in seconds (0 = disabled)
    /// Default: 10
    pub heartbeat_interval_secs: u64,

    /// Target of drop warnings (log, stderr, off)
    /// Default: log
    pub diagnostics: DiagnosticsTarget,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            socket_path: DEFAULT_SOCKET_PATH.into(),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            heartbeat_interval_secs: 10,
            diagnostics: DiagnosticsTarget::Log,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MonitorConfig::default();
        assert!(config.enabled);
        assert_eq!(config.socket_path, DEFAULT_SOCKET_PATH);
        assert_eq!(config.buffer_capacity, 512);
        assert_eq!(config.heartbeat_interval_secs, 10);
        assert_eq!(config.diagnostics, DiagnosticsTarget::Log);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: MonitorConfig = toml::from_str("buffer_capacity = 64").unwrap();
        assert_eq!(config.buffer_capacity, 64);
        assert_eq!(config.socket_path, DEFAULT_SOCKET_PATH);
    }

    #[test]
    fn test_deserialize_diagnostics() {
        for (s, expected) in [
            ("log", DiagnosticsTarget::Log),
            ("stderr", DiagnosticsTarget::Stderr),
            ("off", DiagnosticsTarget::Off),
        ] {
            let toml = format!("diagnostics = \"{s}\"");
            let config: MonitorConfig = toml::from_str(&toml).unwrap();
            assert_eq!(config.diagnostics, expected);
        }
    }
}
