//! Diagnostic channel for the appender itself.
//!
//! Configuration problems, transport construction failures and stop
//! failures are recorded here instead of being raised to the logging call
//! site. Each entry is also mirrored to the `log` facade under
//! [`STATUS_TARGET`]; the `log` bridge ignores that target so statuses never
//! loop back into the appender.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// `log` target used when mirroring statuses.
pub const STATUS_TARGET: &str = "femtogelf::status";

/// Maximum number of statuses retained in memory.
pub const DEFAULT_STATUS_CAPACITY: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum StatusLevel {
    Info,
    Warn,
    Error,
}

/// A single diagnostic entry.
#[derive(Clone, Debug)]
pub struct Status {
    pub level: StatusLevel,
    pub message: String,
    pub cause: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{}: {}", self.message, cause),
            None => f.write_str(&self.message),
        }
    }
}

/// Bounded, thread-safe list of statuses.
pub struct StatusManager {
    entries: Mutex<VecDeque<Status>>,
    capacity: usize,
}

impl Default for StatusManager {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_STATUS_CAPACITY)
    }
}

impl StatusManager {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            capacity: capacity.max(1),
        }
    }

    pub fn add_info(&self, message: impl Into<String>) {
        self.add(StatusLevel::Info, message.into(), None);
    }

    pub fn add_warn(&self, message: impl Into<String>) {
        self.add(StatusLevel::Warn, message.into(), None);
    }

    pub fn add_error(&self, message: impl Into<String>) {
        self.add(StatusLevel::Error, message.into(), None);
    }

    /// Record an error together with the error that caused it.
    pub fn add_error_with_cause(&self, message: impl Into<String>, cause: &dyn std::error::Error) {
        self.add(StatusLevel::Error, message.into(), Some(cause.to_string()));
    }

    fn add(&self, level: StatusLevel, message: String, cause: Option<String>) {
        let status = Status {
            level,
            message,
            cause,
            timestamp: Utc::now(),
        };
        match level {
            StatusLevel::Info => log::info!(target: STATUS_TARGET, "{status}"),
            StatusLevel::Warn => log::warn!(target: STATUS_TARGET, "{status}"),
            StatusLevel::Error => log::error!(target: STATUS_TARGET, "{status}"),
        }
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(status);
    }

    /// Copy of all retained statuses, oldest first.
    pub fn statuses(&self) -> Vec<Status> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Number of retained statuses at `level` or above.
    pub fn count_at_least(&self, level: StatusLevel) -> usize {
        self.entries.lock().iter().filter(|s| s.level >= level).count()
    }

    pub fn has_errors(&self) -> bool {
        self.count_at_least(StatusLevel::Error) > 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl fmt::Debug for StatusManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusManager")
            .field("len", &self.entries.lock().len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
