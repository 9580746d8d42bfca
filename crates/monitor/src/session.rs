//! Stream session - one monitor connection from registration to teardown
//!
//! A session owns a [`BufferedRelay`], a cancellation token and the
//! connection. While it streams, two tasks cooperate through the token:
//!
//! ```text
//!            ┌──────────────────┐   EOF / error   ┌─────────────────────┐
//!  conn.rd ─►│  closer detector │───── cancel ───►│  CancellationToken  │
//!            └──────────────────┘                 └──────────┬──────────┘
//!                                                            │
//!  queue ───────────────────────────────┐                    ▼
//!                                       ▼          ┌───────────────────┐
//!                                 frame available ─►    encode loop    ├─► conn.wr
//!                                                  └───────────────────┘
//! ```
//!
//! # Lifecycle
//!
//! ```text
//! Init ──► Streaming ──┬─► ClosedClean  (cancelled: caller, remote close)
//!                      └─► ClosedError  (encode failed or timed out)
//!                                │
//!          benign? ── yes ──► nothing more written
//!          timeout? ─ yes ──► nothing more written
//!                  └─ no ───► one best-effort error envelope (code 500)
//!                                │
//!                                ▼
//!                           Terminated  (sink deregistered on every path)
//! ```
//!
//! Cancellation is observed between envelopes: an envelope that has started
//! going out is always finished, so a cancelled stream ends on a frame
//! boundary.
//!
//! The token is fired by the closer detector when the peer goes away, so a
//! caller sharing a token across sessions should hand each session a
//! `child_token()`.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadHalf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::MonitorError;
use crate::protocol::{EnvelopeEncoder, STATUS_INTERNAL_ERROR, StreamEnvelope};
use crate::relay::BufferedRelay;
use crate::sink::{LogSink, SinkHandler};

/// Upper bound on the best-effort error report
const REPORT_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on writing one envelope to a stalled peer
const WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Scratch size for the closer detector's reads
const DETECT_BUFFER_SIZE: usize = 512;

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    /// Constructed, not yet registered
    Init,
    /// Registered and encoding frames
    Streaming,
    /// Loop ended by cancellation
    ClosedClean,
    /// Loop ended by an encode failure
    ClosedError,
    /// Resources released, sink deregistered
    Terminated,
}

/// How a session ended
#[derive(Debug)]
pub enum SessionOutcome {
    /// Cancelled by the caller, a shutdown, or the peer closing
    Cancelled,
    /// Write failed because the connection was already gone
    Disconnected(MonitorError),
    /// Write failed otherwise; `reported` is whether the error envelope went out
    Failed { error: MonitorError, reported: bool },
}

impl SessionOutcome {
    /// Ended without an encode failure
    pub fn is_clean(&self) -> bool {
        matches!(self, SessionOutcome::Cancelled)
    }
}

/// Result of a finished session
#[derive(Debug)]
pub struct SessionSummary {
    pub outcome: SessionOutcome,
    /// Envelopes written before the session ended
    pub frames_sent: u64,
}

/// Keeps a handler registered for as long as it lives
struct Registration {
    sink: Arc<dyn LogSink>,
    handler: Arc<dyn SinkHandler>,
}

impl Registration {
    fn new(sink: Arc<dyn LogSink>, handler: Arc<dyn SinkHandler>) -> Self {
        sink.register_sink(Arc::clone(&handler));
        Self { sink, handler }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.sink.deregister_sink(&self.handler);
    }
}

/// One monitor connection
pub struct StreamSession<C> {
    relay: BufferedRelay,
    cancel: CancellationToken,
    conn: C,
    state: SessionState,
}

impl<C> StreamSession<C>
where
    C: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(relay: BufferedRelay, cancel: CancellationToken, conn: C) -> Self {
        Self {
            relay,
            cancel,
            conn,
            state: SessionState::Init,
        }
    }

    /// Stream until cancelled or the connection fails
    ///
    /// Never returns an error: every failure ends only this session and is
    /// described by the returned summary.
    pub async fn run(self) -> SessionSummary {
        let StreamSession {
            relay,
            cancel,
            conn,
            mut state,
        } = self;

        let (writer, mut frames, sink) = relay.into_parts();
        let registration = Registration::new(sink, writer);
        transition(&mut state, SessionState::Streaming);

        let (read_half, write_half) = tokio::io::split(conn);
        let detector_stop = cancel.child_token();
        let detector = tokio::spawn(detect_close(
            read_half,
            cancel.clone(),
            detector_stop.clone(),
        ));

        let mut encoder = EnvelopeEncoder::new(write_half);
        let mut frames_sent = 0u64;

        let stream_err = loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break None,

                frame = frames.recv() => {
                    let Some(frame) = frame else {
                        // Every producer handle is gone
                        break None;
                    };
                    // An envelope in flight is always finished; cancellation is
                    // only observed between envelopes
                    let envelope = StreamEnvelope::payload(frame);
                    match tokio::time::timeout(WRITE_TIMEOUT, encoder.encode(&envelope)).await {
                        Ok(Ok(())) => frames_sent += 1,
                        Ok(Err(e)) => break Some(e),
                        Err(_) => break Some(MonitorError::Io(io::Error::new(
                            io::ErrorKind::TimedOut,
                            "timed out writing envelope",
                        ))),
                    }
                }
            }
        };

        let outcome = match stream_err {
            None => {
                transition(&mut state, SessionState::ClosedClean);
                SessionOutcome::Cancelled
            }
            Some(error) => {
                transition(&mut state, SessionState::ClosedError);
                if error.is_benign() {
                    // Nothing to do as the connection is gone
                    SessionOutcome::Disconnected(error)
                } else if is_write_timeout(&error) {
                    // A partial envelope is on the wire; nothing after it
                    // could be decoded
                    SessionOutcome::Failed {
                        error,
                        reported: false,
                    }
                } else {
                    let reported = report_error(&mut encoder, &error).await;
                    SessionOutcome::Failed { error, reported }
                }
            }
        };

        detector_stop.cancel();
        let _ = detector.await;
        drop(frames);
        drop(registration);
        transition(&mut state, SessionState::Terminated);

        debug!(frames_sent, outcome = ?outcome, "monitor session ended");

        SessionSummary {
            outcome,
            frames_sent,
        }
    }
}

/// Write one terminal error envelope, best effort
///
/// Returns whether the envelope was written. Failures are swallowed: the
/// transport is already failing and nothing further can be done.
pub async fn report_error<W>(encoder: &mut EnvelopeEncoder<W>, error: &MonitorError) -> bool
where
    W: AsyncWrite + Unpin,
{
    let envelope = StreamEnvelope::error(error.to_string(), STATUS_INTERNAL_ERROR);
    match tokio::time::timeout(REPORT_TIMEOUT, encoder.encode(&envelope)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!(error = %e, "failed to report stream error to client");
            false
        }
        Err(_) => {
            debug!("timed out reporting stream error to client");
            false
        }
    }
}

/// Watch the read half; fire `cancel` once the peer closes or errors
///
/// Inbound bytes are discarded. Exits without firing when `stop` fires.
async fn detect_close<R>(mut reader: ReadHalf<R>, cancel: CancellationToken, stop: CancellationToken)
where
    R: AsyncRead,
{
    let mut buf = [0u8; DETECT_BUFFER_SIZE];
    loop {
        tokio::select! {
            _ = stop.cancelled() => return,
            result = reader.read(&mut buf) => match result {
                Ok(0) => {
                    trace!("monitor peer closed the connection");
                    cancel.cancel();
                    return;
                }
                Ok(n) => trace!(bytes = n, "ignoring inbound bytes on monitor connection"),
                Err(e) => {
                    trace!(error = %e, "monitor connection read failed");
                    cancel.cancel();
                    return;
                }
            },
        }
    }
}

fn is_write_timeout(error: &MonitorError) -> bool {
    matches!(error, MonitorError::Io(e) if e.kind() == io::ErrorKind::TimedOut)
}

#[inline]
fn transition(state: &mut SessionState, next: SessionState) {
    trace!(from = ?*state, to = ?next, "monitor session state");
    *state = next;
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
