//! The leveled log sink the engine reports through.
//!
//! The engine's log lines are part of its contract: the consistency checks
//! announce what they found and what they deleted, and callers (and tests)
//! match on the rendered text. Messages are interpolated eagerly with
//! `format!` before they reach the sink, so every implementation receives
//! the final string.
//!
//! Ambient diagnostics from the lower crates still go through `tracing`;
//! this trait only carries the contractual messages.

use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

pub trait Logger: Send + Sync {
    fn log(&self, level: Level, message: String);
}

pub type LoggerHandle = Arc<dyn Logger + Send + Sync>;

/// Forwards every message to the `tracing` subscriber of the surrounding
/// application. The default choice outside tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: Level, message: String) {
        match level {
            Level::Debug => tracing::debug!("{message}"),
            Level::Info => tracing::info!("{message}"),
            Level::Warning => tracing::warn!("{message}"),
            Level::Error => tracing::error!("{message}"),
        }
    }
}

/// Collects rendered messages in memory so tests can assert on exact lines
/// and their order.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    entries: Mutex<Vec<(Level, String)>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything logged so far, in order.
    pub fn entries(&self) -> Vec<(Level, String)> {
        self.entries.lock().map(|entries| entries.clone()).unwrap_or_default()
    }

    /// Whether an exact `(level, message)` pair was logged.
    pub fn contains(&self, level: Level, message: &str) -> bool {
        self.entries().iter().any(|(l, m)| *l == level && m == message)
    }

    /// Whether any message at any level contains the given fragment.
    pub fn mentions(&self, fragment: &str) -> bool {
        self.entries().iter().any(|(_, m)| m.contains(fragment))
    }

    /// Index of the first exact `(level, message)` pair, for order checks.
    pub fn position(&self, level: Level, message: &str) -> Option<usize> {
        self.entries().iter().position(|(l, m)| *l == level && m == message)
    }
}

impl Logger for MemoryLogger {
    fn log(&self, level: Level, message: String) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((level, message));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_logger_records_in_order() {
        let logger = MemoryLogger::new();
        logger.log(Level::Warning, "first".to_owned());
        logger.log(Level::Info, "second".to_owned());
        assert!(logger.contains(Level::Warning, "first"));
        assert!(!logger.contains(Level::Info, "first"));
        assert!(logger.mentions("seco"));
        assert!(logger.position(Level::Warning, "first") < logger.position(Level::Info, "second"));
    }

    #[test]
    fn test_level_display() {
        assert_eq!(Level::Warning.to_string(), "warning");
        assert_eq!(Level::Error.to_string(), "error");
    }
}
