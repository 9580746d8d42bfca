//! logmon monitor - live log relay to remote monitor clients
//!
//! A process that logs through `tracing` can stream its records, as they are
//! emitted, to any number of clients connected over a Unix socket. Logging is
//! never slowed down by a client: each connection gets a bounded queue, and a
//! record that does not fit is dropped and counted.
//!
//! # Architecture
//!
//! ```text
//! tracing event
//!     │
//!     ├──→ fmt layer (host output)
//!     │
//!     └──→ RelayLayer ──→ SinkRegistry
//!                             │
//!                     ┌───────┴───────┐
//!                     ▼               ▼
//!               RelayWriter     RelayWriter      ◄── accept or drop
//!                     │               │
//!               [ queue ]        [ queue ]
//!                     │               │
//!               StreamSession  StreamSession     ◄── encode loop + closer detector
//!                     │               │
//!               MonitorServer (Unix socket)
//!                     │
//!                     └──→ MonitorClient
//! ```
//!
//! The relay itself reports drops through a [`DiagnosticLogger`] whose events
//! are never relayed.
//!
//! **Note:** the socket server and client only compile on Unix platforms.

pub mod diagnostics;
mod error;
pub mod frame;
pub mod layer;
pub mod protocol;
pub mod relay;
pub mod session;
pub mod sink;

#[cfg(unix)]
pub mod client;
#[cfg(unix)]
pub mod server;

pub use diagnostics::{
    DIAGNOSTIC_TARGET, DiagnosticLogger, DiagnosticOutput, DiagnosticWriter, LoggerOptions,
};
pub use error::{MonitorError, Result};
pub use frame::LogFrame;
pub use layer::RelayLayer;
pub use protocol::{MonitorMessage, MonitorRequest, RpcError, StreamEnvelope};
pub use relay::{BufferedRelay, DROP_WARNING_THRESHOLD, RelayStats, RelayWriter};
pub use session::{SessionOutcome, SessionSummary, StreamSession, report_error};
pub use sink::{LogSink, SinkHandler, SinkRegistry};

#[cfg(unix)]
pub use client::MonitorClient;
#[cfg(unix)]
pub use server::{MonitorServer, MonitorServerConfig};
