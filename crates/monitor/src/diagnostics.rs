//! Relay logger options and the non-relayed diagnostic logger
//!
//! Each relay is built from `LoggerOptions`: the level and format decide which
//! records it receives and how they are rendered, and `diagnostics` decides
//! where the relay's own warnings go. Diagnostics never reach a `LogSink`, so
//! a relay that is dropping records cannot feed its warnings back into the
//! stream it is failing to keep up with.

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use logmon_config::{LogFormat, LogLevel};
use parking_lot::Mutex;
use tracing::{Dispatch, Level};
use tracing_subscriber::fmt::MakeWriter;

/// Target of diagnostic events; [`RelayLayer`](crate::RelayLayer) never relays it
pub const DIAGNOSTIC_TARGET: &str = "logmon::diagnostic";

/// Default logger name
const DEFAULT_NAME: &str = "monitor";

/// Map a configured level onto a tracing level
pub fn tracing_level(level: LogLevel) -> Level {
    match level {
        LogLevel::Trace => Level::TRACE,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Info => Level::INFO,
        LogLevel::Warn => Level::WARN,
        LogLevel::Error => Level::ERROR,
    }
}

/// Shared byte writer for diagnostic output
#[derive(Clone)]
pub struct DiagnosticWriter(Arc<Mutex<Box<dyn Write + Send>>>);

impl DiagnosticWriter {
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        Self(Arc::new(Mutex::new(Box::new(writer))))
    }
}

impl Write for DiagnosticWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.lock().flush()
    }
}

impl fmt::Debug for DiagnosticWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DiagnosticWriter")
    }
}

/// Where diagnostic warnings are written
#[derive(Debug, Clone, Default)]
pub enum DiagnosticOutput {
    /// Host's tracing subscriber under [`DIAGNOSTIC_TARGET`] (default)
    #[default]
    Tracing,
    /// Formatted lines on stderr
    Stderr,
    /// Dropped
    Discard,
    /// Formatted lines on a caller-supplied writer
    Writer(DiagnosticWriter),
}

impl From<logmon_config::DiagnosticsTarget> for DiagnosticOutput {
    fn from(target: logmon_config::DiagnosticsTarget) -> Self {
        match target {
            logmon_config::DiagnosticsTarget::Log => Self::Tracing,
            logmon_config::DiagnosticsTarget::Stderr => Self::Stderr,
            logmon_config::DiagnosticsTarget::Off => Self::Discard,
        }
    }
}

/// Options for a relay's logger
#[derive(Debug, Clone)]
pub struct LoggerOptions {
    /// Name shown on diagnostic lines
    pub name: String,
    /// Most verbose level relayed
    pub level: Level,
    /// Rendering of relayed records
    pub format: LogFormat,
    /// Target of the relay's own warnings
    pub diagnostics: DiagnosticOutput,
}

impl Default for LoggerOptions {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.into(),
            level: Level::INFO,
            format: LogFormat::Console,
            diagnostics: DiagnosticOutput::Tracing,
        }
    }
}

impl LoggerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Set the level from a configured level
    pub fn with_log_level(self, level: LogLevel) -> Self {
        self.with_level(tracing_level(level))
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_json(self, json: bool) -> Self {
        self.with_format(if json {
            LogFormat::Json
        } else {
            LogFormat::Console
        })
    }

    pub fn with_diagnostics(mut self, diagnostics: DiagnosticOutput) -> Self {
        self.diagnostics = diagnostics;
        self
    }
}

/// Logger for the relay's own warnings
///
/// Stderr and writer outputs get a private fmt subscriber, so those warnings
/// bypass the host's subscriber and every layer installed on it.
#[derive(Debug, Clone)]
pub struct DiagnosticLogger {
    name: String,
    route: Route,
}

#[derive(Debug, Clone)]
enum Route {
    Host,
    Discard,
    Dedicated(Dispatch),
}

impl DiagnosticLogger {
    pub fn new(options: &LoggerOptions) -> Self {
        let route = match &options.diagnostics {
            DiagnosticOutput::Tracing => Route::Host,
            DiagnosticOutput::Discard => Route::Discard,
            DiagnosticOutput::Stderr => Route::Dedicated(dedicated_dispatch(io::stderr)),
            DiagnosticOutput::Writer(writer) => {
                let writer = writer.clone();
                Route::Dedicated(dedicated_dispatch(move || writer.clone()))
            }
        };
        Self {
            name: options.name.clone(),
            route,
        }
    }

    /// Emit one warning
    pub fn warn(&self, message: &str) {
        match &self.route {
            Route::Host => self.emit(message),
            Route::Discard => {}
            Route::Dedicated(dispatch) => {
                tracing::dispatcher::with_default(dispatch, || self.emit(message));
            }
        }
    }

    fn emit(&self, message: &str) {
        tracing::warn!(target: DIAGNOSTIC_TARGET, logger = %self.name, "{message}");
    }
}

fn dedicated_dispatch<W>(make_writer: W) -> Dispatch
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let subscriber = tracing_subscriber::fmt()
        .with_writer(make_writer)
        .with_ansi(false)
        .with_target(false)
        .with_max_level(Level::WARN)
        .finish();
    Dispatch::new(subscriber)
}
