/// Session log entries
///
/// Entries are what the user sees in the log view, separate from the
/// diagnostic `log` output which goes to a file.
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter};

/// Kind of log entry; the snake_case name doubles as the style class.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LogCategory {
    Incoming,
    Outgoing,
    Info,
    Error,
}

/// A log entry with timestamp and message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub text: String,
    pub category: LogCategory,
}

impl LogEntry {
    /// Create a new log entry with the current timestamp
    pub fn new(text: impl Into<String>, category: LogCategory) -> Self {
        Self {
            timestamp: Local::now(),
            text: text.into(),
            category,
        }
    }

    pub fn incoming(text: impl Into<String>) -> Self {
        Self::new(text, LogCategory::Incoming)
    }

    pub fn outgoing(text: impl Into<String>) -> Self {
        Self::new(text, LogCategory::Outgoing)
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(text, LogCategory::Info)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(text, LogCategory::Error)
    }

    /// `> HH:MM:SS: text`
    pub fn line(&self) -> String {
        format!("> {}: {}", self.timestamp.format("%H:%M:%S"), self.text)
    }
}

/// Append-only list of entries. Nothing is ever evicted.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer {
    entries: Vec<LogEntry>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count(&self, category: LogCategory) -> usize {
        self.entries.iter().filter(|e| e.category == category).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn line_uses_wall_clock_prefix() {
        let mut entry = LogEntry::info("Подключено к порту");
        entry.timestamp = Local
            .with_ymd_and_hms(2024, 3, 1, 7, 5, 9)
            .single()
            .expect("valid local time");
        assert_eq!(entry.line(), "> 07:05:09: Подключено к порту");
    }

    #[test]
    fn category_names_are_style_classes() {
        assert_eq!(LogCategory::Incoming.as_ref(), "incoming");
        assert_eq!(LogCategory::Outgoing.to_string(), "outgoing");
    }

    #[test]
    fn buffer_keeps_everything_in_order() {
        let mut buffer = LogBuffer::new();
        for i in 0..2000 {
            buffer.push(LogEntry::incoming(i.to_string()));
        }
        buffer.push(LogEntry::error("boom"));
        assert_eq!(buffer.len(), 2001);
        assert_eq!(buffer.entries()[0].text, "0");
        assert_eq!(buffer.count(LogCategory::Error), 1);
    }
}
