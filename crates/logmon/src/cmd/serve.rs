//! Serve command - run a host process exposing its logs on the monitor socket
//!
//! The host logs through `tracing` as usual. Every record also reaches the
//! relay layer, so monitor clients connected to the socket see it live. A
//! periodic heartbeat record keeps an otherwise idle host visible.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Args;
use logmon_config::Config;
use logmon_monitor::SinkRegistry;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[cfg(unix)]
use logmon_monitor::{MonitorServer, MonitorServerConfig};

/// Time allowed for the monitor server to stop after a shutdown signal
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Serve command arguments
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Override the monitor socket path from the config file
    #[arg(short, long)]
    pub socket: Option<PathBuf>,
}

/// Load configuration: an explicit path must exist, otherwise try the
/// default paths and fall back to defaults
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    if let Some(path) = path {
        if !path.exists() {
            return Err(anyhow::anyhow!("config file not found: {}", path.display()));
        }
        return Config::from_file(path).context("failed to load configuration");
    }

    let default_paths = [
        PathBuf::from("configs/logmon.toml"),
        PathBuf::from("logmon.toml"),
    ];
    for path in &default_paths {
        if path.exists() {
            return Config::from_file(path).context("failed to load configuration");
        }
    }

    Ok(Config::default())
}

/// Run the serve command
pub async fn run(args: ServeArgs, mut config: Config, registry: Arc<SinkRegistry>) -> Result<()> {
    if let Some(socket) = args.socket {
        config.monitor.socket_path = socket.display().to_string();
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        platform = std::env::consts::OS,
        socket = %config.monitor.socket_path,
        "logmon starting"
    );

    if let Err(e) = run_host(config, registry).await {
        error!(error = %e, "host error");
        return Err(e);
    }

    info!("logmon shutdown complete");
    Ok(())
}

/// Host run loop
async fn run_host(config: Config, registry: Arc<SinkRegistry>) -> Result<()> {
    let cancel = CancellationToken::new();

    let heartbeat = spawn_heartbeat(
        config.monitor.heartbeat_interval_secs,
        Arc::clone(&registry),
        cancel.clone(),
    );

    let server = start_monitor_server(&config, registry, cancel.clone());

    match server {
        Some(mut server) => {
            tokio::select! {
                result = wait_for_shutdown() => {
                    result?;
                    info!("shutdown signal received, stopping host...");
                }
                result = &mut server => {
                    // Server ended on its own, which only happens on error
                    cancel.cancel();
                    result
                        .context("monitor server task panicked")?
                        .context("monitor server failed")?;
                    return Ok(());
                }
            }

            cancel.cancel();
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, server).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => warn!(error = %e, "monitor server stopped with error"),
                Ok(Err(e)) => warn!(error = %e, "monitor server task panicked during shutdown"),
                Err(_) => warn!("monitor server did not stop within timeout"),
            }
        }
        None => {
            wait_for_shutdown().await?;
            info!("shutdown signal received, stopping host...");
            cancel.cancel();
        }
    }

    if let Some(heartbeat) = heartbeat {
        let _ = heartbeat.await;
    }

    Ok(())
}

#[cfg(unix)]
fn start_monitor_server(
    config: &Config,
    registry: Arc<SinkRegistry>,
    cancel: CancellationToken,
) -> Option<JoinHandle<logmon_monitor::Result<()>>> {
    if !config.monitor.enabled {
        info!("monitor socket disabled");
        return None;
    }

    let server = MonitorServer::new(registry, MonitorServerConfig::from(&config.monitor));
    Some(server.spawn(cancel))
}

#[cfg(not(unix))]
fn start_monitor_server(
    config: &Config,
    _registry: Arc<SinkRegistry>,
    _cancel: CancellationToken,
) -> Option<JoinHandle<logmon_monitor::Result<()>>> {
    if config.monitor.enabled {
        warn!("monitor socket requires a Unix platform, not serving");
    }
    None
}

/// Log a heartbeat record every `interval_secs` (0 = disabled)
fn spawn_heartbeat(
    interval_secs: u64,
    registry: Arc<SinkRegistry>,
    cancel: CancellationToken,
) -> Option<JoinHandle<()>> {
    if interval_secs == 0 {
        return None;
    }

    let started = Instant::now();

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    info!(
                        uptime_secs = started.elapsed().as_secs(),
                        monitors = registry.count(),
                        "heartbeat"
                    );
                }
            }
        }
    }))
}

/// Wait for SIGINT or SIGTERM
async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("failed to install signal handler")?;
        tokio::select! {
            result = signal::ctrl_c() => result.context("failed to install Ctrl+C handler")?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    signal::ctrl_c()
        .await
        .context("failed to install Ctrl+C handler")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_missing_config_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_config(Some(&dir.path().join("missing.toml")));
        assert!(result.unwrap_err().to_string().contains("config file not found"));
    }

    #[test]
    fn test_explicit_config_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logmon.toml");
        std::fs::write(&path, "[monitor]\nbuffer_capacity = 7\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.monitor.buffer_capacity, 7);
    }

    #[test]
    fn test_invalid_config_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logmon.toml");
        std::fs::write(&path, "[monitor]\nbuffer_capacity = 0\n").unwrap();

        assert!(load_config(Some(&path)).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let handle = spawn_heartbeat(1, Arc::new(SinkRegistry::new()), cancel.clone()).unwrap();

        tokio::time::sleep(Duration::from_secs(3)).await;
        cancel.cancel();
        handle.await.unwrap();
    }

    #[test]
    fn test_heartbeat_disabled() {
        let handle = spawn_heartbeat(0, Arc::new(SinkRegistry::new()), CancellationToken::new());
        assert!(handle.is_none());
    }
}
