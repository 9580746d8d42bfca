//! Unix socket server for monitor connections
//!
//! `MonitorServer` listens on a Unix socket. Each client sends one
//! `MonitorRequest` and then receives envelopes until it disconnects, the
//! server shuts down, or streaming fails.
//!
//! # Protocol
//!
//! Client → Server:
//! - `Request` - level and format of the stream
//!
//! Server → Client:
//! - `Envelope` with a payload - one log record
//! - `Envelope` with an error - terminal; 400 for a bad request, 500 when
//!   streaming fails

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use logmon_config::{DEFAULT_BUFFER_CAPACITY, DEFAULT_SOCKET_PATH, LogLevel, MonitorConfig};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::diagnostics::{DiagnosticOutput, LoggerOptions};
use crate::error::{MonitorError, Result};
use crate::protocol::{
    EnvelopeEncoder, MessageReader, MonitorMessage, MonitorRequest, STATUS_BAD_REQUEST,
    StreamEnvelope,
};
use crate::relay::BufferedRelay;
use crate::session::SessionSummary;
use crate::sink::LogSink;

/// How long a client may take to send its request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Server configuration
#[derive(Debug, Clone)]
pub struct MonitorServerConfig {
    /// Path to the Unix socket
    pub socket_path: PathBuf,
    /// Frames buffered per session
    pub buffer_capacity: usize,
    /// Target of each relay's drop warnings
    pub diagnostics: DiagnosticOutput,
}

impl Default for MonitorServerConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            diagnostics: DiagnosticOutput::Tracing,
        }
    }
}

impl MonitorServerConfig {
    /// Create config with custom socket path
    pub fn with_socket_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.socket_path = path.as_ref().to_path_buf();
        self
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: DiagnosticOutput) -> Self {
        self.diagnostics = diagnostics;
        self
    }
}

impl From<&MonitorConfig> for MonitorServerConfig {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            socket_path: PathBuf::from(&config.socket_path),
            buffer_capacity: config.buffer_capacity,
            diagnostics: config.diagnostics.into(),
        }
    }
}

/// Unix socket server for monitor connections
pub struct MonitorServer {
    config: MonitorServerConfig,
    sink: Arc<dyn LogSink>,
}

impl MonitorServer {
    pub fn new(sink: Arc<dyn LogSink>, config: MonitorServerConfig) -> Self {
        Self { config, sink }
    }

    pub fn socket_path(&self) -> &Path {
        &self.config.socket_path
    }

    /// Run the server until `shutdown` fires
    ///
    /// Every session is handed a child of `shutdown`, so shutting down also
    /// ends the sessions still streaming.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let path = &self.config.socket_path;

        // Remove a socket left behind by an earlier run
        if path.exists() {
            std::fs::remove_file(path)?;
        }

        let listener = UnixListener::bind(path)?;
        info!(path = %path.display(), "monitor server listening");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,

                accepted = listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        let sink = Arc::clone(&self.sink);
                        let config = self.config.clone();
                        let cancel = shutdown.child_token();

                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, sink, config, cancel).await {
                                debug!(error = %e, "monitor connection ended");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "failed to accept monitor connection");
                    }
                },
            }
        }

        drop(listener);
        if let Err(e) = std::fs::remove_file(path) {
            debug!(error = %e, path = %path.display(), "failed to remove monitor socket");
        }
        info!("monitor server stopped");

        Ok(())
    }

    /// Start the server in a background task
    pub fn spawn(self, shutdown: CancellationToken) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run(shutdown).await })
    }
}

/// Serve one client: read its request, then stream until the session ends
async fn handle_connection(
    mut stream: UnixStream,
    sink: Arc<dyn LogSink>,
    config: MonitorServerConfig,
    cancel: CancellationToken,
) -> Result<SessionSummary> {
    debug!("new monitor client connected");

    let request = match tokio::time::timeout(REQUEST_TIMEOUT, read_request(&mut stream)).await {
        Ok(request) => request?,
        Err(_) => return Err(MonitorError::Protocol("timed out waiting for request".into())),
    };

    let options = match request_options(&request, &config) {
        Ok(options) => options,
        Err(e) => {
            let envelope = StreamEnvelope::error(e.to_string(), STATUS_BAD_REQUEST);
            let _ = EnvelopeEncoder::new(&mut stream).encode(&envelope).await;
            return Err(e);
        }
    };

    let relay = BufferedRelay::new(config.buffer_capacity, sink, options)?;

    info!(
        level = %request.log_level,
        json = request.log_json,
        "monitor client subscribed"
    );

    let summary = relay.monitor(cancel, stream).await;

    info!(
        frames_sent = summary.frames_sent,
        outcome = ?summary.outcome,
        "monitor client disconnected"
    );

    Ok(summary)
}

/// Read the opening request of a connection
async fn read_request(stream: &mut UnixStream) -> Result<MonitorRequest> {
    let mut reader = MessageReader::new(stream);
    match reader.next().await? {
        Some(MonitorMessage::Request(request)) => Ok(request),
        Some(_) => Err(MonitorError::Protocol("expected Request message".into())),
        None => Err(MonitorError::Protocol(
            "connection closed before request".into(),
        )),
    }
}

/// Logger options of the relay serving `request`
fn request_options(
    request: &MonitorRequest,
    config: &MonitorServerConfig,
) -> Result<LoggerOptions> {
    let level: LogLevel = request
        .log_level
        .parse()
        .map_err(|_| MonitorError::UnknownLevel {
            level: request.log_level.clone(),
        })?;

    Ok(LoggerOptions::new()
        .with_log_level(level)
        .with_json(request.log_json)
        .with_diagnostics(config.diagnostics.clone()))
}

#[cfg(test)]
#[path = "server_test.rs"]
mod tests;
