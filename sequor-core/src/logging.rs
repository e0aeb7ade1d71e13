//! Structured run logging.
//!
//! Provides log events with correlation ids (run id, node id) collected
//! into an in-process sink. A [`LogCollector`] handle is the `logger` the
//! engine injects into user functions; the default [`BufferedCollector`]
//! keeps a bounded ring of recent events that the embedding application
//! can drain after (or during) a run. Events are mirrored to `tracing`
//! so a subscriber set up by the host sees them too.

use crate::types::{NodeId, RunId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Log severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Debugging information.
    Debug,
    /// Informational messages.
    #[default]
    Info,
    /// Warning messages.
    Warn,
    /// Error messages.
    Error,
}

impl LogLevel {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A structured log event with correlation ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    /// Timestamp in nanoseconds since the UNIX epoch.
    pub timestamp_ns: u64,
    /// Log severity level.
    pub level: LogLevel,
    /// Associated run id (if any).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    /// Associated node id (if any).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    /// Human-readable message.
    pub message: String,
}

impl LogEvent {
    /// Create a new log event with the current timestamp.
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp_ns: current_timestamp_ns(),
            level,
            run_id: None,
            node_id: None,
            message: message.into(),
        }
    }

    /// Create an info-level event.
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    /// Create a debug-level event.
    pub fn debug(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Debug, message)
    }

    /// Create a warn-level event.
    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warn, message)
    }

    /// Create an error-level event.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }

    /// Attach a run id.
    #[must_use]
    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }

    /// Attach a node id.
    #[must_use]
    pub fn with_node_id(mut self, node_id: NodeId) -> Self {
        self.node_id = Some(node_id);
        self
    }
}

fn current_timestamp_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// A sink for log events.
pub trait LogCollector: Send + Sync {
    /// Collect a single event.
    fn collect(&self, event: LogEvent);
}

/// A bounded in-memory collector keeping the most recent events.
#[derive(Debug)]
pub struct BufferedCollector {
    capacity: usize,
    buffer: Mutex<VecDeque<LogEvent>>,
}

impl BufferedCollector {
    /// Default ring capacity.
    pub const DEFAULT_CAPACITY: usize = 4096;

    /// Create a collector with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            buffer: Mutex::new(VecDeque::with_capacity(capacity.max(1).min(1024))),
        }
    }

    /// Create a collector with the default capacity.
    pub fn with_default_capacity() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }

    /// Number of buffered events.
    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Check whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }

    /// Drain all buffered events, oldest first.
    pub fn drain(&self) -> Vec<LogEvent> {
        self.buffer.lock().drain(..).collect()
    }

    /// Snapshot the buffered events without draining them.
    pub fn events(&self) -> Vec<LogEvent> {
        self.buffer.lock().iter().cloned().collect()
    }
}

impl Default for BufferedCollector {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

impl LogCollector for BufferedCollector {
    fn collect(&self, event: LogEvent) {
        match event.level {
            LogLevel::Debug => tracing::debug!(target: "sequor", "{}", event.message),
            LogLevel::Info => tracing::info!(target: "sequor", "{}", event.message),
            LogLevel::Warn => tracing::warn!(target: "sequor", "{}", event.message),
            LogLevel::Error => tracing::error!(target: "sequor", "{}", event.message),
        }
        let mut buffer = self.buffer.lock();
        if buffer.len() == self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_buffered_in_order() {
        let collector = BufferedCollector::new(8);
        collector.collect(LogEvent::info("first"));
        collector.collect(LogEvent::warn("second"));
        let events = collector.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].message, "first");
        assert_eq!(events[1].message, "second");
        assert!(collector.is_empty());
    }

    #[test]
    fn ring_drops_oldest() {
        let collector = BufferedCollector::new(2);
        collector.collect(LogEvent::info("a"));
        collector.collect(LogEvent::info("b"));
        collector.collect(LogEvent::info("c"));
        let events = collector.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].message, "b");
        assert_eq!(events[1].message, "c");
    }

    #[test]
    fn correlation_ids_attach() {
        let event = LogEvent::error("boom")
            .with_run_id(RunId::new())
            .with_node_id(NodeId::new(3));
        assert!(event.run_id.is_some());
        assert_eq!(event.node_id, Some(NodeId::new(3)));
    }

    #[test]
    fn level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Warn < LogLevel::Error);
    }
}
