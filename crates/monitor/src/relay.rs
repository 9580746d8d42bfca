//! Buffered relay - bounded queue with accept-or-drop admission
//!
//! The producer side (`RelayWriter`) is what gets registered with a
//! [`LogSink`]. It is called on whatever thread emitted the record and never
//! blocks: a record either fits in the queue or is dropped. Drops are counted
//! and reported in batches through the relay's [`DiagnosticLogger`], one
//! warning per `DROP_WARNING_THRESHOLD + 1` drops.
//!
//! ```text
//! producers ──► RelayWriter::accept ──► [ bounded queue ] ──► encode loop
//!                    │ full
//!                    ▼
//!               drop counter ──(> threshold)──► DiagnosticLogger::warn
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use logmon_config::LogFormat;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::Level;

use crate::diagnostics::{DiagnosticLogger, LoggerOptions};
use crate::error::{MonitorError, Result};
use crate::frame::LogFrame;
use crate::session::{SessionSummary, StreamSession};
use crate::sink::{LogSink, SinkHandler};

/// Drops tolerated before a warning is emitted
pub const DROP_WARNING_THRESHOLD: u64 = 10;

/// Queue admission state, guarded as one unit
#[derive(Debug)]
struct Admission {
    queue: mpsc::Sender<LogFrame>,
    /// Drops since the last warning
    drop_count: u64,
}

/// Producer side of a relay
#[derive(Debug)]
pub struct RelayWriter {
    admission: Mutex<Admission>,
    level: Level,
    format: LogFormat,
    diagnostics: DiagnosticLogger,
    /// Frames admitted to the queue
    accepted: AtomicU64,
    /// Frames dropped over the relay's lifetime
    dropped: AtomicU64,
}

impl RelayWriter {
    /// Offer a frame to the queue without blocking
    pub fn accept(&self, frame: LogFrame) {
        let warn_count = {
            let mut admission = self.admission.lock();
            match admission.queue.try_send(frame) {
                Ok(()) => {
                    self.accepted.fetch_add(1, Ordering::Relaxed);
                    None
                }
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    admission.drop_count += 1;
                    if admission.drop_count > DROP_WARNING_THRESHOLD {
                        Some(std::mem::take(&mut admission.drop_count))
                    } else {
                        None
                    }
                }
                // Session already ended; nobody is reading
                Err(TrySendError::Closed(_)) => None,
            }
        };

        // Warn outside the lock: a diagnostic sent through tracing must not
        // re-enter admission on this thread.
        if let Some(count) = warn_count {
            self.diagnostics.warn(&format!(
                "monitor dropped {count} logs during monitor request"
            ));
        }
    }

    /// Drops since the last warning
    pub fn pending_drops(&self) -> u64 {
        self.admission.lock().drop_count
    }
}

impl SinkHandler for RelayWriter {
    #[inline]
    fn accept(&self, frame: LogFrame) {
        RelayWriter::accept(self, frame);
    }

    fn level(&self) -> Level {
        self.level
    }

    fn format(&self) -> LogFormat {
        self.format
    }
}

/// Counters of a relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    /// Frames admitted to the queue
    pub accepted: u64,
    /// Frames dropped over the relay's lifetime
    pub dropped: u64,
    /// Drops since the last warning
    pub pending_drops: u64,
    /// Frames currently waiting in the queue
    pub queued: usize,
}

/// A bounded relay between a `LogSink` and one monitor connection
pub struct BufferedRelay {
    writer: Arc<RelayWriter>,
    frames: mpsc::Receiver<LogFrame>,
    sink: Arc<dyn LogSink>,
    capacity: usize,
}

impl BufferedRelay {
    /// Create a relay holding at most `capacity` frames
    ///
    /// Nothing is registered and no task is started until the relay streams.
    pub fn new(capacity: usize, sink: Arc<dyn LogSink>, options: LoggerOptions) -> Result<Self> {
        if capacity == 0 {
            return Err(MonitorError::InvalidCapacity { capacity });
        }

        let (queue, frames) = mpsc::channel(capacity);
        let writer = Arc::new(RelayWriter {
            admission: Mutex::new(Admission {
                queue,
                drop_count: 0,
            }),
            level: options.level,
            format: options.format,
            diagnostics: DiagnosticLogger::new(&options),
            accepted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        });

        Ok(Self {
            writer,
            frames,
            sink,
            capacity,
        })
    }

    /// Offer a frame to the queue without blocking
    #[inline]
    pub fn accept(&self, frame: LogFrame) {
        self.writer.accept(frame);
    }

    /// Producer handle, the one registered with the sink
    pub fn writer(&self) -> Arc<RelayWriter> {
        Arc::clone(&self.writer)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            accepted: self.writer.accepted.load(Ordering::Relaxed),
            dropped: self.writer.dropped.load(Ordering::Relaxed),
            pending_drops: self.writer.pending_drops(),
            queued: self.frames.len(),
        }
    }

    /// Stream queued frames to `conn` until `cancel` fires or the connection
    /// goes away
    pub async fn monitor<C>(self, cancel: CancellationToken, conn: C) -> SessionSummary
    where
        C: AsyncRead + AsyncWrite + Send + 'static,
    {
        StreamSession::new(self, cancel, conn).run().await
    }

    pub(crate) fn into_parts(
        self,
    ) -> (Arc<RelayWriter>, mpsc::Receiver<LogFrame>, Arc<dyn LogSink>) {
        (self.writer, self.frames, self.sink)
    }
}

impl std::fmt::Debug for BufferedRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedRelay")
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
#[path = "relay_test.rs"]
mod tests;
