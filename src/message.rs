//! Message sink for profiling diagnostics.
//!
//! Configuration problems never abort a profiling session. They are reported
//! through a [`MessageSink`] instead, which by default forwards to the `log`
//! crate. Tests swap in a [`RecordingSink`] to inspect what was reported.

use std::fmt;
use std::sync::Mutex;

/// Severity of a profiling message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Debug => write!(f, "DEBUG"),
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// Destination for profiling messages.
pub trait MessageSink: Send + Sync + fmt::Debug {
    /// Deliver one message.
    fn send(&self, severity: Severity, message: &str);

    fn debug(&self, message: &str) {
        self.send(Severity::Debug, message);
    }

    fn info(&self, message: &str) {
        self.send(Severity::Info, message);
    }

    fn warning(&self, message: &str) {
        self.send(Severity::Warning, message);
    }

    fn error(&self, message: &str) {
        self.send(Severity::Error, message);
    }
}

/// Sink that forwards every message to the `log` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl MessageSink for LogSink {
    fn send(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Debug => log::debug!("{}", message),
            Severity::Info => log::info!("{}", message),
            Severity::Warning => log::warn!("{}", message),
            Severity::Error => log::error!("{}", message),
        }
    }
}

/// Sink that keeps every message in memory.
///
/// Messages are also forwarded to `log` so test output stays readable with
/// `RUST_LOG` set.
#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<(Severity, String)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded messages in arrival order.
    pub fn messages(&self) -> Vec<(Severity, String)> {
        self.lock().clone()
    }

    /// Messages of a single severity.
    pub fn with_severity(&self, severity: Severity) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|(s, _)| *s == severity)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.with_severity(Severity::Warning)
    }

    /// Number of messages of `severity` containing `needle`.
    pub fn count_containing(&self, severity: Severity, needle: &str) -> usize {
        self.lock()
            .iter()
            .filter(|(s, m)| *s == severity && m.contains(needle))
            .count()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(Severity, String)>> {
        self.messages.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl MessageSink for RecordingSink {
    fn send(&self, severity: Severity, message: &str) {
        LogSink.send(severity, message);
        self.lock().push((severity, message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_filters_by_severity() {
        let sink = RecordingSink::new();
        sink.info("loaded");
        sink.warning("bad tile");
        sink.warning("bad metric");
        sink.debug("detail");

        assert_eq!(sink.messages().len(), 4);
        assert_eq!(sink.warnings(), vec!["bad tile", "bad metric"]);
        assert_eq!(sink.count_containing(Severity::Warning, "metric"), 1);

        sink.clear();
        assert!(sink.messages().is_empty());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Debug < Severity::Info);
        assert!(Severity::Warning < Severity::Error);
        assert_eq!(Severity::Warning.to_string(), "WARNING");
    }
}
