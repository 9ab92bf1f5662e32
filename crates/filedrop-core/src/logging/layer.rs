//! `tracing` layer feeding the journal.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Number, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use super::entry::JournalEntry;
use super::writer::JournalWriter;

/// Writes every event it sees to the run's journal file.
///
/// Cloning shares the underlying file.
#[derive(Clone)]
pub struct JournalLayer {
    writer: Arc<JournalWriter>,
}

impl JournalLayer {
    pub fn new(log_dir: impl AsRef<Path>, run: impl Into<String>) -> std::io::Result<Self> {
        Ok(Self {
            writer: Arc::new(JournalWriter::new(log_dir, run)?),
        })
    }

    pub fn path(&self) -> &Path {
        self.writer.path()
    }

    pub fn run(&self) -> &str {
        self.writer.run()
    }
}

impl<S> Layer<S> for JournalLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let mut entry = JournalEntry::new(
            metadata.level().as_str().to_lowercase(),
            self.writer.run(),
            metadata.target(),
            visitor.message.unwrap_or_default(),
        );
        if !visitor.fields.is_empty() {
            entry = entry.with_fields(Value::Object(visitor.fields));
        }
        if let Some(scope) = ctx.event_scope(event) {
            let spans: Vec<&str> = scope.from_root().map(|span| span.name()).collect();
            if !spans.is_empty() {
                entry = entry.with_span(spans.join(" > "));
            }
        }

        // Never let logging take the process down
        let _ = self.writer.write(&entry);
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Map<String, Value>,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        self.fields.insert(field.name().to_string(), value);
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let mut buf = String::new();
        let _ = write!(buf, "{:?}", value);
        if field.name() == "message" {
            self.message = Some(buf);
        } else {
            self.insert(field, Value::String(buf));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.insert(field, Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::Number(value.into()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::Number(value.into()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::Bool(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        if let Some(n) = Number::from_f64(value) {
            self.insert(field, Value::Number(n));
        }
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, Value::String(value.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::read_run;
    use tempfile::TempDir;
    use tracing_subscriber::prelude::*;

    #[test]
    fn test_layer_records_events_with_fields() {
        let temp = TempDir::new().unwrap();
        let layer = JournalLayer::new(temp.path(), "run7").unwrap();
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("select");
            let _guard = span.enter();
            tracing::info!(files = 3u64, "Selection accepted");
            tracing::warn!(retry = false, "Upload failed");
        });

        let entries = read_run(temp.path(), "run7").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].msg, "Selection accepted");
        assert_eq!(entries[0].field("files"), Some(&serde_json::json!(3)));
        assert_eq!(entries[0].span.as_deref(), Some("select"));
        assert_eq!(entries[1].level, "warn");
        assert_eq!(entries[1].field("retry"), Some(&Value::Bool(false)));
    }
}
