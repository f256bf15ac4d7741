//! In-memory log capture for owner diagnostics.
//!
//! A tracing layer copies every event into a bounded ring buffer that the
//! `recentlogs` command reads back.

use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Longest message body Discord accepts
const DISCORD_MESSAGE_LIMIT: usize = 2000;

/// A single captured log event
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub level: Level,
    pub target: String,
    pub message: String,
}

impl LogEntry {
    pub fn format(&self) -> String {
        format!(
            "{} {:>5} [{}] {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.level,
            self.target,
            self.message
        )
    }
}

/// Bounded buffer of recent log entries
pub struct LogBuffer {
    recent: parking_lot::RwLock<VecDeque<LogEntry>>,
    max_entries: usize,
}

impl LogBuffer {
    pub fn new(max_entries: usize) -> Self {
        Self {
            recent: parking_lot::RwLock::new(VecDeque::with_capacity(max_entries)),
            max_entries,
        }
    }

    pub fn push(&self, entry: LogEntry) {
        let mut recent = self.recent.write();
        if recent.len() >= self.max_entries {
            recent.pop_front();
        }
        recent.push_back(entry);
    }

    /// The last `count` entries at or above `min_level`, oldest first
    pub fn get_recent(&self, count: usize, min_level: Level) -> Vec<LogEntry> {
        let recent = self.recent.read();
        let mut entries: Vec<LogEntry> = recent
            .iter()
            .rev()
            // tracing orders levels by verbosity: ERROR < WARN < INFO
            .filter(|entry| entry.level <= min_level)
            .take(count)
            .cloned()
            .collect();
        entries.reverse();
        entries
    }
}

/// Render entries as a code block that fits in one Discord message
///
/// The oldest lines are dropped first when the block would be too long.
pub fn format_for_discord(entries: &[LogEntry]) -> String {
    const FENCE_OVERHEAD: usize = "```\n```".len();

    let mut lines: VecDeque<String> = entries.iter().map(LogEntry::format).collect();
    let mut length: usize = lines.iter().map(|l| l.chars().count() + 1).sum();
    while length + FENCE_OVERHEAD > DISCORD_MESSAGE_LIMIT {
        match lines.pop_front() {
            Some(line) => length -= line.chars().count() + 1,
            None => break,
        }
    }

    if lines.is_empty() {
        return "No log entries captured.".to_string();
    }

    let mut block = String::from("```\n");
    for line in lines {
        block.push_str(&line);
        block.push('\n');
    }
    block.push_str("```");
    block
}

/// Shared log buffer type
pub type SharedLogBuffer = Arc<LogBuffer>;

pub fn create_log_buffer(max_entries: usize) -> SharedLogBuffer {
    Arc::new(LogBuffer::new(max_entries))
}

/// Tracing layer that captures logs to the buffer
pub struct LogCaptureLayer {
    buffer: SharedLogBuffer,
}

impl LogCaptureLayer {
    pub fn new(buffer: SharedLogBuffer) -> Self {
        Self { buffer }
    }
}

impl<S> Layer<S> for LogCaptureLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        self.buffer.push(LogEntry {
            timestamp: chrono::Utc::now(),
            level: *event.metadata().level(),
            target: event.metadata().target().to_string(),
            message: visitor.message,
        });
    }
}

/// Extracts the message field, falling back to the other fields
#[derive(Default)]
struct MessageVisitor {
    message: String,
    has_message: bool,
}

impl MessageVisitor {
    fn record_value(&mut self, field: &tracing::field::Field, value: String) {
        if field.name() == "message" {
            self.message = value;
            self.has_message = true;
        } else if !self.has_message {
            if !self.message.is_empty() {
                self.message.push_str(", ");
            }
            self.message.push_str(&format!("{}={}", field.name(), value));
        }
    }
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.record_value(field, format!("{:?}", value));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.record_value(field, value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(level: Level, message: &str) -> LogEntry {
        LogEntry {
            timestamp: chrono::Utc::now(),
            level,
            target: "ticketdesk".to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn test_log_buffer_overflow() {
        let buffer = create_log_buffer(2);
        for i in 1..=5 {
            buffer.push(entry(Level::INFO, &format!("Message {}", i)));
        }

        let recent = buffer.get_recent(10, Level::TRACE);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "Message 4");
        assert_eq!(recent[1].message, "Message 5");
    }

    #[test]
    fn test_recent_filters_by_level() {
        let buffer = create_log_buffer(10);
        buffer.push(entry(Level::WARN, "disk slow"));
        buffer.push(entry(Level::DEBUG, "lookup"));
        buffer.push(entry(Level::ERROR, "handler failed"));
        buffer.push(entry(Level::INFO, "ticket created"));

        let warnings: Vec<String> = buffer
            .get_recent(10, Level::WARN)
            .into_iter()
            .map(|e| e.message)
            .collect();
        assert_eq!(warnings, vec!["disk slow", "handler failed"]);

        let last: Vec<String> = buffer
            .get_recent(1, Level::INFO)
            .into_iter()
            .map(|e| e.message)
            .collect();
        assert_eq!(last, vec!["ticket created"]);
    }

    #[test]
    fn test_format_for_discord_drops_oldest() {
        let entries: Vec<LogEntry> = (0..100)
            .map(|i| entry(Level::INFO, &format!("{:03} {}", i, "x".repeat(40))))
            .collect();

        let block = format_for_discord(&entries);
        assert!(block.chars().count() <= DISCORD_MESSAGE_LIMIT);
        assert!(block.starts_with("```\n"));
        assert!(block.ends_with("```"));
        assert!(block.contains("099 "));
        assert!(!block.contains("000 "));

        assert_eq!(format_for_discord(&[]), "No log entries captured.");
    }
}
