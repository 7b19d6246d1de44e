//! Log events handed to the appender by the host logging framework.
//!
//! `LogEvent` captures the rendered message together with the contextual
//! metadata the encoder may attach as extra fields: caller location, logger
//! name, thread name, marker and the context (MDC) map.

use std::collections::BTreeMap;
use std::fmt;
use std::thread;

use chrono::{DateTime, Utc};

use crate::level::EventLevel;

/// Source location of the logging call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallerLocation {
    pub file: String,
    pub line: u32,
}

/// A single event produced by the host logging framework.
#[derive(Clone, Debug)]
pub struct LogEvent {
    pub level: EventLevel,
    pub timestamp: DateTime<Utc>,
    /// Rendered message text.
    pub message: String,
    pub logger_name: String,
    pub thread_name: Option<String>,
    pub marker: Option<String>,
    pub caller: Option<CallerLocation>,
    /// Context map (MDC) attached by the host framework.
    pub context: BTreeMap<String, String>,
    /// Rendered backtrace or error chain, if the event carries one.
    pub backtrace: Option<String>,
}

impl LogEvent {
    /// Create an event stamped with the current time and thread name.
    pub fn new(logger_name: &str, level: EventLevel, message: &str) -> Self {
        Self {
            level,
            timestamp: Utc::now(),
            message: message.to_owned(),
            logger_name: logger_name.to_owned(),
            thread_name: thread::current().name().map(ToString::to_string),
            marker: None,
            caller: None,
            context: BTreeMap::new(),
            backtrace: None,
        }
    }

    pub fn with_caller(mut self, file: impl Into<String>, line: u32) -> Self {
        self.caller = Some(CallerLocation {
            file: file.into(),
            line,
        });
        self
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = Some(marker.into());
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = Some(name.into());
        self
    }

    /// Add a single context (MDC) entry.
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_backtrace(mut self, backtrace: impl Into<String>) -> Self {
        self.backtrace = Some(backtrace.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.logger_name, self.level, self.message)
    }
}
