//! Journal line format.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Module whose events describe the upload workflow itself.
const ORCHESTRATOR_TARGET: &str = "filedrop_core::orchestrator";

/// One line of the journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// RFC 3339 timestamp with milliseconds
    pub ts: String,

    /// trace, debug, info, warn or error
    pub level: String,

    /// Identifier of the run that wrote the line
    pub run: String,

    pub target: String,

    pub msg: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Value>,

    /// Enclosing spans, outermost first, joined with " > "
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<String>,
}

impl JournalEntry {
    pub fn new(
        level: impl Into<String>,
        run: impl Into<String>,
        target: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self {
            ts: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            level: level.into(),
            run: run.into(),
            target: target.into(),
            msg: msg.into(),
            fields: None,
            span: None,
        }
    }

    pub fn with_fields(mut self, fields: Value) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn with_span(mut self, span: impl Into<String>) -> Self {
        self.span = Some(span.into());
        self
    }

    /// A structured field by name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.as_ref()?.get(name)
    }

    /// True for state transitions logged by the upload orchestrator.
    pub fn is_upload_event(&self) -> bool {
        self.target.starts_with(ORCHESTRATOR_TARGET)
    }

    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_line_format() {
        let entry = JournalEntry::new(
            "info",
            "01JA3M4K8Y",
            "filedrop_core::orchestrator",
            "File uploaded",
        )
        .with_fields(serde_json::json!({ "index": 0, "url": "https://b.s3.amazonaws.com/x" }));

        let json = entry.to_json_line().unwrap();
        assert!(json.contains("\"run\":\"01JA3M4K8Y\""));
        assert!(json.contains("\"msg\":\"File uploaded\""));
        assert!(!json.contains("\"span\""));

        let parsed = JournalEntry::from_json_line(&json).unwrap();
        assert_eq!(parsed, entry);
        assert!(parsed.is_upload_event());
        assert_eq!(parsed.field("index"), Some(&serde_json::json!(0)));
    }

    #[test]
    fn test_other_targets_are_not_upload_events() {
        let entry = JournalEntry::new("debug", "r", "filedrop_core::store::memory", "Stored object");
        assert!(!entry.is_upload_event());
        assert!(entry.field("anything").is_none());
    }
}
