//! Message layouts rendering the short and full text of a GELF message.
//!
//! Provides the [`MessageLayout`] trait alongside [`SharedLayout`], a cheap
//! clonable trait object used by encoders that are shared between threads.

use std::{fmt, sync::Arc};

use crate::event::LogEvent;

/// Renders the human-readable parts of a GELF message.
///
/// Implementors must be thread-safe (`Send + Sync`) because encoders run on
/// every producer thread.
pub trait MessageLayout: Send + Sync {
    /// Short message: the event text without any backtrace.
    fn short_message(&self, event: &LogEvent) -> String;

    /// Full message: the event text followed by any backtrace. An empty
    /// string means the message carries no full text.
    fn full_message(&self, event: &LogEvent) -> String;
}

/// Shared layout trait object.
#[derive(Clone)]
pub struct SharedLayout {
    inner: Arc<dyn MessageLayout>,
}

impl SharedLayout {
    pub fn new<L>(layout: L) -> Self
    where
        L: MessageLayout + 'static,
    {
        Self {
            inner: Arc::new(layout),
        }
    }

    pub fn short_message(&self, event: &LogEvent) -> String {
        self.inner.short_message(event)
    }

    pub fn full_message(&self, event: &LogEvent) -> String {
        self.inner.full_message(event)
    }
}

impl Default for SharedLayout {
    fn default() -> Self {
        Self::new(DefaultLayout)
    }
}

impl fmt::Debug for SharedLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedLayout(<dyn MessageLayout>)")
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct DefaultLayout;

impl MessageLayout for DefaultLayout {
    fn short_message(&self, event: &LogEvent) -> String {
        event.message.clone()
    }

    fn full_message(&self, event: &LogEvent) -> String {
        match &event.backtrace {
            Some(backtrace) => format!("{}\n{}", event.message, backtrace),
            None => event.message.clone(),
        }
    }
}
