//! Configuration validation
//!
//! Validates config consistency:
//! - The monitor buffer can hold at least one frame
//! - The monitor socket path is set when the monitor is enabled
//! - A file log output names a file

use crate::Config;
use crate::error::{ConfigError, Result};
use crate::logging::LogOutput;

/// Validate the entire configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_log(config)?;
    validate_monitor(config)?;
    Ok(())
}

fn validate_log(config: &Config) -> Result<()> {
    if let LogOutput::File(ref path) = config.log.output
        && path.trim().is_empty()
    {
        return Err(ConfigError::invalid_value(
            "log",
            "file output",
            "output",
            "file path must not be empty",
        ));
    }
    Ok(())
}

fn validate_monitor(config: &Config) -> Result<()> {
    let monitor = &config.monitor;

    if monitor.buffer_capacity == 0 {
        return Err(ConfigError::invalid_value(
            "monitor",
            monitor.socket_path.clone(),
            "buffer_capacity",
            "must be greater than 0",
        ));
    }

    if monitor.enabled && monitor.socket_path.trim().is_empty() {
        return Err(ConfigError::invalid_value(
            "monitor",
            "endpoint",
            "socket_path",
            "must not be empty when the monitor is enabled",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_zero_buffer_capacity_rejected() {
        let result = Config::from_str("[monitor]\nbuffer_capacity = 0");
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue {
                field: "buffer_capacity",
                ..
            })
        ));
    }

    #[test]
    fn test_empty_socket_path_rejected() {
        let result = Config::from_str("[monitor]\nsocket_path = \"\"");
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue {
                field: "socket_path",
                ..
            })
        ));
    }

    #[test]
    fn test_error_names_the_offending_monitor() {
        let err = Config::from_str("[monitor]\nbuffer_capacity = 0").unwrap_err();
        assert_eq!(
            err.to_string(),
            "monitor '/tmp/logmon.sock' has invalid buffer_capacity: must be greater than 0"
        );

        let err = Config::from_str("[monitor]\nsocket_path = \"\"").unwrap_err();
        assert_eq!(
            err.to_string(),
            "monitor 'endpoint' has invalid socket_path: must not be empty when the monitor is enabled"
        );
    }

    #[test]
    fn test_empty_socket_path_allowed_when_disabled() {
        let result = Config::from_str("[monitor]\nenabled = false\nsocket_path = \"\"");
        assert!(result.is_ok());
    }

    #[test]
    fn test_empty_log_file_rejected() {
        let result = Config::from_str("[log]\noutput = \" \"");
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field: "output", .. })
        ));
        assert_eq!(
            result.unwrap_err().to_string(),
            "log 'file output' has invalid output: file path must not be empty"
        );
    }
}
