//! logmon - live log monitor
//!
//! # Usage
//!
//! ```bash
//! # Run a host process exposing its logs on the monitor socket
//! logmon serve
//! logmon serve --config configs/logmon.toml --log-level debug
//!
//! # Follow the logs of a running host
//! logmon monitor
//! logmon monitor --level debug --json
//! ```

mod cmd;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use logmon_config::{Config, LogConfig, LogFormat, LogOutput};
use logmon_monitor::{RelayLayer, SinkRegistry};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

/// logmon - live log monitor
#[derive(Parser, Debug)]
#[command(name = "logmon")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (error if specified but not found)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Overrides config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a host process whose logs can be monitored
    Serve(cmd::serve::ServeArgs),

    /// Stream live logs from a running host (Unix only)
    #[cfg(unix)]
    Monitor(cmd::monitor::MonitorArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => {
            let config = cmd::serve::load_config(cli.config.as_deref())?;
            let log_level = resolve_log_level(cli.log_level.as_deref(), &config);
            let registry = Arc::new(SinkRegistry::new());
            init_logging(&config.log, &log_level, RelayLayer::new(Arc::clone(&registry)))?;
            cmd::serve::run(args, config, registry).await
        }
        #[cfg(unix)]
        Command::Monitor(args) => {
            // Monitor initializes its own logging
            cmd::monitor::run(args).await
        }
    }
}

/// Resolve log level: CLI flag > config file
fn resolve_log_level(cli_level: Option<&str>, config: &Config) -> String {
    match cli_level {
        Some(level) => level.to_string(),
        None => config.log.level.as_str().to_string(),
    }
}

/// Initialize the tracing subscriber
///
/// The level filter applies to the host's own output only. The relay layer
/// sees every event; each monitor session filters by its requested level.
fn init_logging(log: &LogConfig, level: &str, relay: RelayLayer) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    let writer = make_writer(&log.output)?;
    let host = match log.format {
        LogFormat::Console => fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_writer(writer)
            .boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(writer).boxed(),
    };

    tracing_subscriber::registry()
        .with(host.with_filter(filter))
        .with(relay)
        .init();

    Ok(())
}

fn make_writer(output: &LogOutput) -> Result<BoxMakeWriter> {
    Ok(match output {
        LogOutput::Stdout => BoxMakeWriter::new(std::io::stdout),
        LogOutput::Stderr => BoxMakeWriter::new(std::io::stderr),
        LogOutput::File(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(Path::new(path))
                .with_context(|| format!("failed to open log file {path}"))?;
            BoxMakeWriter::new(std::sync::Mutex::new(file))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_cli_level_overrides_config() {
        let config = Config::from_str("[log]\nlevel = \"warn\"").unwrap();
        assert_eq!(resolve_log_level(Some("trace"), &config), "trace");
        assert_eq!(resolve_log_level(None, &config), "warn");
    }

    #[test]
    fn test_parse_serve_args() {
        let cli = Cli::try_parse_from(["logmon", "serve", "--config", "x.toml", "-l", "debug"])
            .unwrap();
        assert!(matches!(cli.command, Command::Serve(_)));
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[cfg(unix)]
    #[test]
    fn test_parse_monitor_args() {
        let cli = Cli::try_parse_from(["logmon", "monitor", "--level", "debug", "--json"]).unwrap();
        let Command::Monitor(args) = cli.command else {
            panic!("expected monitor command");
        };
        assert_eq!(args.level, "debug");
        assert!(args.json);
    }

    #[test]
    fn test_file_writer_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host.log");
        make_writer(&LogOutput::File(path.display().to_string())).unwrap();
        assert!(path.exists());
    }
}
