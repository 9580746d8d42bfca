//! Monitor command - follow the live logs of a running host
//!
//! Connects to the host's monitor socket, asks for records at the requested
//! level and prints each one to stdout as it arrives.

use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use logmon_config::{DEFAULT_SOCKET_PATH, LogLevel};
use logmon_monitor::{MonitorClient, MonitorError, MonitorRequest};
use tokio::io::{AsyncWriteExt, Stdout};
use tracing_subscriber::EnvFilter;

/// Monitor command arguments
#[derive(Args, Debug)]
pub struct MonitorArgs {
    /// Socket path to connect to
    #[arg(short, long, default_value = DEFAULT_SOCKET_PATH)]
    pub socket: PathBuf,

    /// Most verbose level to stream: trace, debug, info, warn, error
    #[arg(long, default_value = "info")]
    pub level: String,

    /// Receive records rendered as JSON lines
    #[arg(long)]
    pub json: bool,

    /// Verbose output (show debug info)
    #[arg(short, long)]
    pub verbose: bool,

    /// Quiet mode (suppress connection messages)
    #[arg(short, long)]
    pub quiet: bool,
}

/// Run the monitor command
pub async fn run(args: MonitorArgs) -> Result<()> {
    // Connection messages go to stderr so stdout carries records only
    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else if args.quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();

    // Reject a bad level before bothering the server
    let level: LogLevel = args.level.parse().context("invalid --level")?;
    let request = MonitorRequest::new(level.as_str()).with_json(args.json);

    tracing::info!(socket = %args.socket.display(), "connecting to host");

    let mut client = MonitorClient::connect(&args.socket)
        .await
        .with_context(|| format!("failed to connect to {}", args.socket.display()))?;
    client
        .request(&request)
        .await
        .context("failed to send monitor request")?;

    tracing::info!(level = level.as_str(), "streaming logs (Ctrl+C to stop)");

    let mut stdout = tokio::io::stdout();
    let mut received = 0u64;

    loop {
        tokio::select! {
            frame = client.next_frame() => match frame {
                Ok(Some(frame)) => {
                    write_frame(&mut stdout, frame.as_bytes()).await?;
                    received += 1;
                }
                Ok(None) => {
                    tracing::info!(received, "host closed the connection");
                    break;
                }
                Err(MonitorError::Remote { code, message }) => {
                    tracing::error!(?code, error = %message, "host ended the stream");
                    return Err(anyhow::anyhow!("host error: {message}"));
                }
                Err(e) => return Err(e).context("failed to read from socket"),
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(received, "interrupted, disconnecting");
                break;
            }
        }
    }

    Ok(())
}

async fn write_frame(stdout: &mut Stdout, bytes: &[u8]) -> Result<()> {
    stdout
        .write_all(bytes)
        .await
        .context("failed to write to stdout")?;
    if !bytes.ends_with(b"\n") {
        stdout.write_all(b"\n").await?;
    }
    stdout.flush().await?;
    Ok(())
}
