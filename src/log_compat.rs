//! Compatibility bridge for the Rust `log` crate.
//!
//! [`GelfLogBridge`] implements `log::Log` by turning each record into a
//! [`LogEvent`] and appending it to a shared [`GelfAppender`]. Records
//! emitted by this crate itself (targets starting with `femtogelf`) are
//! ignored so the appender's own diagnostics never loop back into it.

use std::borrow::Cow;
use std::sync::Arc;
use std::thread;

use log::{LevelFilter, Metadata, Record, SetLoggerError};

use crate::appender::GelfAppender;
use crate::event::LogEvent;
use crate::level::EventLevel;

const INTERNAL_TARGET_PREFIX: &str = "femtogelf";

/// Adapter implementing the Rust `log::Log` trait on top of an appender.
#[derive(Clone, Debug)]
pub struct GelfLogBridge {
    appender: Arc<GelfAppender>,
}

impl GelfLogBridge {
    pub fn new(appender: Arc<GelfAppender>) -> Self {
        Self { appender }
    }

    pub fn appender(&self) -> &Arc<GelfAppender> {
        &self.appender
    }

    /// Convert a `log` record into the event handed to the appender.
    pub fn to_event(record: &Record<'_>) -> LogEvent {
        let logger = normalise_target(record.target());
        let mut event = LogEvent::new(
            logger.as_ref(),
            EventLevel::from(record.level()),
            &record.args().to_string(),
        );
        if let (Some(file), Some(line)) = (record.file(), record.line()) {
            event = event.with_caller(file, line);
        }
        if let Some(name) = thread::current().name() {
            event = event.with_thread_name(name);
        }
        event
    }
}

fn normalise_target(target: &str) -> Cow<'_, str> {
    if target.contains("::") {
        Cow::Owned(target.replace("::", "."))
    } else {
        Cow::Borrowed(target)
    }
}

fn is_internal(target: &str) -> bool {
    target.starts_with(INTERNAL_TARGET_PREFIX)
}

fn is_enabled_by_global_max(level: log::Level) -> bool {
    log::max_level() >= level.to_level_filter()
}

impl log::Log for GelfLogBridge {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        is_enabled_by_global_max(metadata.level()) && !is_internal(metadata.target())
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        self.appender.append(&Self::to_event(record));
    }

    fn flush(&self) {}
}

/// Install `bridge` as the global `log` logger.
///
/// Fails when another logger was installed first; `log` permits only one
/// per process.
pub fn install(bridge: GelfLogBridge, max_level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_boxed_logger(Box::new(bridge))?;
    log::set_max_level(max_level);
    Ok(())
}
