//! Log sink registry
//!
//! A `LogSink` keeps a set of write-capable handlers that receive every log
//! record emitted while they are registered. `SinkRegistry` is the in-process
//! implementation fed by [`RelayLayer`](crate::RelayLayer).
//!
//! Handlers are compared by identity (the `Arc` allocation), so the handle
//! used to register is the handle used to deregister.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use logmon_config::LogFormat;
use parking_lot::RwLock;
use tracing::Level;

use crate::frame::LogFrame;

/// A handler that receives formatted log records
///
/// `accept` is called on the thread that emitted the record and must never
/// block.
pub trait SinkHandler: Send + Sync {
    /// Take one formatted record
    fn accept(&self, frame: LogFrame);

    /// Most verbose level this handler wants (default: everything)
    fn level(&self) -> Level {
        Level::TRACE
    }

    /// Rendering of records handed to this handler (default: console)
    fn format(&self) -> LogFormat {
        LogFormat::Console
    }
}

/// Registry of log-consuming handlers
pub trait LogSink: Send + Sync {
    /// Start delivering records to `handler`
    fn register_sink(&self, handler: Arc<dyn SinkHandler>);

    /// Stop delivering records to `handler`
    ///
    /// Idempotent, and a no-op for a handler that was never registered.
    fn deregister_sink(&self, handler: &Arc<dyn SinkHandler>);
}

/// In-process `LogSink`
#[derive(Default)]
pub struct SinkRegistry {
    handlers: RwLock<Vec<Arc<dyn SinkHandler>>>,
    /// Quick check flag for the logging hot path
    active: AtomicBool,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if any handler is registered
    #[inline]
    pub fn has_sinks(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    /// Number of registered handlers
    pub fn count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Snapshot of the registered handlers
    ///
    /// Callers deliver outside the lock, so a handler that logs while
    /// accepting cannot deadlock against a concurrent registration.
    pub fn handlers(&self) -> Vec<Arc<dyn SinkHandler>> {
        if !self.has_sinks() {
            return Vec::new();
        }
        self.handlers.read().clone()
    }

    /// Deliver one frame to every handler, ignoring level hints
    ///
    /// Returns the number of handlers the frame was handed to.
    pub fn dispatch(&self, frame: &LogFrame) -> usize {
        let handlers = self.handlers();
        for handler in &handlers {
            handler.accept(frame.clone());
        }
        handlers.len()
    }
}

impl LogSink for SinkRegistry {
    fn register_sink(&self, handler: Arc<dyn SinkHandler>) {
        let mut handlers = self.handlers.write();
        if handlers.iter().any(|h| same_handler(h, &handler)) {
            return;
        }
        handlers.push(handler);
        self.active.store(true, Ordering::Relaxed);
    }

    fn deregister_sink(&self, handler: &Arc<dyn SinkHandler>) {
        let mut handlers = self.handlers.write();
        handlers.retain(|h| !same_handler(h, handler));
        if handlers.is_empty() {
            self.active.store(false, Ordering::Relaxed);
        }
    }
}

impl std::fmt::Debug for SinkRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkRegistry")
            .field("handlers", &self.count())
            .finish()
    }
}

#[inline]
fn same_handler(a: &Arc<dyn SinkHandler>, b: &Arc<dyn SinkHandler>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

#[cfg(test)]
#[path = "sink_test.rs"]
mod tests;
