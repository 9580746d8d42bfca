//! Tracing layer feeding the sink registry
//!
//! `RelayLayer` sits next to the host's own `fmt` layer. Each event becomes a
//! record, rendered at most once per format, and is handed to every
//! registered handler whose level admits it. Nothing is formatted while no
//! handler is registered.

use std::fmt;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use logmon_config::LogFormat;
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

use crate::diagnostics::DIAGNOSTIC_TARGET;
use crate::frame::LogFrame;
use crate::sink::SinkRegistry;

/// Layer relaying `tracing` events to registered sinks
#[derive(Debug, Clone)]
pub struct RelayLayer {
    registry: Arc<SinkRegistry>,
}

impl RelayLayer {
    pub fn new(registry: Arc<SinkRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SinkRegistry> {
        &self.registry
    }
}

impl<S: Subscriber> Layer<S> for RelayLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if !self.registry.has_sinks() {
            return;
        }

        let metadata = event.metadata();
        if metadata.target() == DIAGNOSTIC_TARGET {
            return;
        }

        let handlers = self.registry.handlers();
        let level = *metadata.level();
        let mut record: Option<Record> = None;
        let mut console: Option<LogFrame> = None;
        let mut json: Option<LogFrame> = None;

        for handler in handlers {
            if level > handler.level() {
                continue;
            }

            let captured = record.get_or_insert_with(|| Record::from_event(event));
            let frame = match handler.format() {
                LogFormat::Console => console.get_or_insert_with(|| captured.to_console()),
                LogFormat::Json => json.get_or_insert_with(|| captured.to_json()),
            };
            handler.accept(frame.clone());
        }
    }
}

/// One event, captured for rendering
#[derive(Debug)]
struct Record {
    timestamp: chrono::DateTime<Utc>,
    level: Level,
    target: String,
    message: String,
    fields: Map<String, Value>,
}

impl Record {
    fn from_event(event: &Event<'_>) -> Self {
        let metadata = event.metadata();
        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);

        Self {
            timestamp: Utc::now(),
            level: *metadata.level(),
            target: metadata.target().to_string(),
            message: visitor.message,
            fields: visitor.fields,
        }
    }

    /// `2026-01-01T00:00:00.000Z  INFO target: message key=value`
    fn to_console(&self) -> LogFrame {
        let mut line = format!(
            "{} {:>5} {}: {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.level.as_str(),
            self.target,
            self.message
        );
        for (key, value) in &self.fields {
            line.push(' ');
            line.push_str(key);
            line.push('=');
            match value {
                Value::String(s) => line.push_str(s),
                other => line.push_str(&other.to_string()),
            }
        }
        line.push('\n');
        LogFrame::from(line)
    }

    fn to_json(&self) -> LogFrame {
        let mut object = Map::new();
        object.insert(
            "timestamp".into(),
            Value::String(self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        object.insert("level".into(), Value::String(self.level.as_str().into()));
        object.insert("target".into(), Value::String(self.target.clone()));
        object.insert("message".into(), Value::String(self.message.clone()));
        if !self.fields.is_empty() {
            object.insert("fields".into(), Value::Object(self.fields.clone()));
        }

        let mut line = Value::Object(object).to_string();
        line.push('\n');
        LogFrame::from(line)
    }
}

/// Collects the message and structured fields of an event
#[derive(Default)]
struct RecordVisitor {
    message: String,
    fields: Map<String, Value>,
}

impl RecordVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for RecordVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, Value::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::from(value));
    }
}

#[cfg(test)]
#[path = "layer_test.rs"]
mod tests;
