use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use serde::Serialize;

use crate::Result;

/// Longest string value persisted per event field; longer payloads are cut
/// so a pasted wall of text cannot bloat the log.
const EVENT_MAX_TEXT: usize = 500;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

#[derive(Clone, Debug, Serialize)]
struct EventRecord<'a> {
    timestamp: String,
    level: EventLevel,
    event: &'a str,
    data: serde_json::Value,
}

/// Append-only JSON-lines event log for ticket lifecycle transitions.
///
/// Every write is also mirrored to `tracing` so operator consoles see the
/// same stream without tailing the file.
#[derive(Clone, Debug)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self, event: &str, data: serde_json::Value) {
        self.write(EventLevel::Info, event, data);
    }

    pub fn warn(&self, event: &str, data: serde_json::Value) {
        self.write(EventLevel::Warn, event, data);
    }

    pub fn error(&self, event: &str, data: serde_json::Value) {
        self.write(EventLevel::Error, event, data);
    }

    /// Logging never propagates failure into the calling flow; a broken log
    /// file only produces a tracing warning.
    pub fn write(&self, level: EventLevel, event: &str, data: serde_json::Value) {
        let record = EventRecord {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level,
            event,
            data: truncate_json_strings(&data, EVENT_MAX_TEXT),
        };

        match level {
            EventLevel::Info => tracing::info!(event, data = %record.data),
            EventLevel::Warn => tracing::warn!(event, data = %record.data),
            EventLevel::Error => tracing::error!(event, data = %record.data),
        }

        if let Err(err) = self.append(&record) {
            tracing::warn!(event, error = %err, "failed to append event log entry");
        }
    }

    fn append(&self, record: &EventRecord<'_>) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(record)?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

fn truncate_text(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max).collect();
    format!("{cut}...")
}

fn truncate_json_strings(v: &serde_json::Value, max_str_len: usize) -> serde_json::Value {
    match v {
        serde_json::Value::String(s) => serde_json::Value::String(truncate_text(s, max_str_len)),
        serde_json::Value::Array(items) => serde_json::Value::Array(
            items
                .iter()
                .map(|i| truncate_json_strings(i, max_str_len))
                .collect(),
        ),
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), truncate_json_strings(v, max_str_len)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tmp_file(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        PathBuf::from(format!("/tmp/{prefix}-{}-{ts}.log", std::process::id()))
    }

    #[test]
    fn events_append_as_json_lines() {
        let log = EventLog::new(tmp_file("stb-events"));
        log.info("ticket_created", json!({"ticket_id": "ab12cd34", "user_id": 5}));
        log.warn("spam_prevention", json!({"user_id": 5, "action": "message"}));

        let written = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "ticket_created");
        assert_eq!(first["level"], "info");
        assert_eq!(first["data"]["ticket_id"], "ab12cd34");

        let _ = std::fs::remove_file(log.path());
    }

    #[test]
    fn long_payloads_are_truncated() {
        let log = EventLog::new(tmp_file("stb-events-trunc"));
        let content = "x".repeat(EVENT_MAX_TEXT + 100);
        log.info("message", json!({ "content": content }));

        let written = std::fs::read_to_string(log.path()).unwrap();
        assert!(written.contains("..."));
        assert!(!written.contains(&"x".repeat(EVENT_MAX_TEXT + 100)));

        let _ = std::fs::remove_file(log.path());
    }
}
