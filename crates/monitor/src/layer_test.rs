//! Tests for the relay layer

use super::*;
use crate::sink::{LogSink, SinkHandler};
use parking_lot::Mutex;
use tracing_subscriber::layer::SubscriberExt;

/// Handler that keeps every frame it receives
struct Collect {
    level: Level,
    format: LogFormat,
    frames: Mutex<Vec<LogFrame>>,
}

impl Collect {
    fn new(level: Level, format: LogFormat) -> Arc<Self> {
        Arc::new(Self {
            level,
            format,
            frames: Mutex::new(Vec::new()),
        })
    }

    fn lines(&self) -> Vec<String> {
        self.frames
            .lock()
            .iter()
            .map(|f| String::from_utf8(f.as_bytes().to_vec()).unwrap())
            .collect()
    }
}

impl SinkHandler for Collect {
    fn accept(&self, frame: LogFrame) {
        self.frames.lock().push(frame);
    }

    fn level(&self) -> Level {
        self.level
    }

    fn format(&self) -> LogFormat {
        self.format
    }
}

/// Run `f` with a subscriber that only has the relay layer
fn with_layer(registry: &Arc<SinkRegistry>, f: impl FnOnce()) {
    let subscriber = tracing_subscriber::registry().with(RelayLayer::new(Arc::clone(registry)));
    tracing::subscriber::with_default(subscriber, f);
}

#[test]
fn test_console_record() {
    let registry = Arc::new(SinkRegistry::new());
    let handler = Collect::new(Level::TRACE, LogFormat::Console);
    registry.register_sink(handler.clone());

    with_layer(&registry, || {
        tracing::info!(target: "app", port = 8080, "listening");
    });

    let lines = handler.lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains(" INFO app: listening port=8080"));
    assert!(lines[0].ends_with('\n'));
}

#[test]
fn test_json_record() {
    let registry = Arc::new(SinkRegistry::new());
    let handler = Collect::new(Level::TRACE, LogFormat::Json);
    registry.register_sink(handler.clone());

    with_layer(&registry, || {
        tracing::warn!(target: "app", path = "/tmp/x", retry = true, "slow write");
    });

    let lines = handler.lines();
    assert_eq!(lines.len(), 1);
    let value: Value = serde_json::from_str(lines[0].trim_end()).unwrap();
    assert_eq!(value["level"], "WARN");
    assert_eq!(value["target"], "app");
    assert_eq!(value["message"], "slow write");
    assert_eq!(value["fields"]["path"], "/tmp/x");
    assert_eq!(value["fields"]["retry"], true);
    assert!(value["timestamp"].is_string());
}

#[test]
fn test_handler_level_filters_records() {
    let registry = Arc::new(SinkRegistry::new());
    let verbose = Collect::new(Level::DEBUG, LogFormat::Console);
    let quiet = Collect::new(Level::WARN, LogFormat::Console);
    registry.register_sink(verbose.clone());
    registry.register_sink(quiet.clone());

    with_layer(&registry, || {
        tracing::trace!("too chatty");
        tracing::debug!("details");
        tracing::info!("progress");
        tracing::error!("broken");
    });

    assert_eq!(verbose.lines().len(), 3);
    let quiet_lines = quiet.lines();
    assert_eq!(quiet_lines.len(), 1);
    assert!(quiet_lines[0].contains("broken"));
}

#[test]
fn test_same_format_shares_rendering() {
    let registry = Arc::new(SinkRegistry::new());
    let a = Collect::new(Level::TRACE, LogFormat::Console);
    let b = Collect::new(Level::TRACE, LogFormat::Console);
    registry.register_sink(a.clone());
    registry.register_sink(b.clone());

    with_layer(&registry, || tracing::info!("shared"));

    // One rendering, one allocation: both handlers hold the same bytes
    let first = a.frames.lock()[0].as_bytes().as_ptr();
    let second = b.frames.lock()[0].as_bytes().as_ptr();
    assert_eq!(first, second);
}

#[test]
fn test_diagnostic_target_never_relayed() {
    let registry = Arc::new(SinkRegistry::new());
    let handler = Collect::new(Level::TRACE, LogFormat::Console);
    registry.register_sink(handler.clone());

    with_layer(&registry, || {
        tracing::warn!(target: DIAGNOSTIC_TARGET, "monitor dropped 11 logs during monitor request");
        tracing::info!("regular");
    });

    let lines = handler.lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("regular"));
}

#[test]
fn test_deregistered_handler_receives_nothing() {
    let registry = Arc::new(SinkRegistry::new());
    let handler = Collect::new(Level::TRACE, LogFormat::Console);
    let as_dyn: Arc<dyn SinkHandler> = handler.clone();
    registry.register_sink(as_dyn.clone());
    registry.deregister_sink(&as_dyn);

    with_layer(&registry, || tracing::info!("nobody listening"));

    assert!(handler.lines().is_empty());
}
