//! Log record type

use crate::LogLevel;
use chrono::{DateTime, Utc};

/// A single log entry. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    timestamp: DateTime<Utc>,
    level: LogLevel,
    caller: String,
    message: String,
}

impl LogRecord {
    pub fn new(
        timestamp: DateTime<Utc>,
        level: LogLevel,
        caller: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            level,
            caller: caller.into(),
            message: message.into(),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    /// `"file:line module()"` of the call site
    pub fn caller(&self) -> &str {
        &self.caller
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
