//! Bounded in-memory log of orchestration events for diagnostic display.
//!
//! Every entry is also emitted through `tracing`.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

pub const DEFAULT_CAPACITY: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub generation: u64,
    pub level: LogLevel,
    pub message: String,
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let level = match self.level {
            LogLevel::Info => "INFO ",
            LogLevel::Warn => "WARN ",
            LogLevel::Error => "ERROR",
        };
        write!(
            f,
            "{} {} #{} {}",
            self.at.format("%H:%M:%S%.3f"),
            level,
            self.generation,
            self.message
        )
    }
}

#[derive(Debug)]
pub struct SearchLog {
    capacity: usize,
    entries: Mutex<VecDeque<LogEntry>>,
}

impl SearchLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn push(&self, generation: u64, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info => tracing::info!(generation, "{}", message),
            LogLevel::Warn => tracing::warn!(generation, "{}", message),
            LogLevel::Error => tracing::error!(generation, "{}", message),
        }

        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(LogEntry {
            at: Utc::now(),
            generation,
            level,
            message,
        });
    }

    pub fn info(&self, generation: u64, message: impl Into<String>) {
        self.push(generation, LogLevel::Info, message);
    }

    pub fn warn(&self, generation: u64, message: impl Into<String>) {
        self.push(generation, LogLevel::Warn, message);
    }

    pub fn error(&self, generation: u64, message: impl Into<String>) {
        self.push(generation, LogLevel::Error, message);
    }

    /// Oldest first
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().iter().cloned().collect()
    }
}

impl Default for SearchLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
