//! Test helpers shared by unit and integration tests.
//!
//! Compiled for unit tests and behind the `test-util` feature so the
//! integration tests under `tests/` can drive the appender against fake
//! transports instead of real sockets.

mod fake_transport;
mod recording;

pub use fake_transport::{EnqueueMode, FakeTransport};
pub use recording::{CountingEncoder, RecordingFactory};

use crate::{level::Severity, message::GelfMessage};

/// Build a message with the given severity and short text.
pub fn message(severity: Severity, text: &str) -> GelfMessage {
    GelfMessage::builder(text, "test-host")
        .severity(severity)
        .build()
}
