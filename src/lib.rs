//! GELF log appender with bounded queues and severity-aware backpressure.
//!
//! Events are encoded into [`GelfMessage`]s and handed to a TCP (or UDP)
//! transport through a bounded queue. When that queue is full, messages at
//! or above the blocking threshold wait for space while less severe ones are
//! dropped or degraded to a secondary UDP transport.

pub mod appender;
pub mod config;
pub mod encoder;
pub mod event;
pub mod file_config;
pub mod layout;
pub mod level;
#[cfg(feature = "log-compat")]
pub mod log_compat;
pub mod message;
pub mod policy;
mod rate_limited_warner;
pub mod status;
pub mod transport;

#[cfg(any(test, feature = "test-util"))]
pub mod test_utils;

pub use appender::{AppenderState, GelfAppender, GelfAppenderBuilder};
pub use config::{AppenderConfig, ConfigError, ValidatedConfig, parse_additional_field};
pub use encoder::{
    DefaultEncoder, EncoderSettings, ExtraField, ExtraFieldFlags, ExtraFieldSelector,
    MessageEncoder,
};
pub use event::{CallerLocation, LogEvent};
pub use file_config::{load_ini, load_ini_str};
pub use layout::{DefaultLayout, MessageLayout, SharedLayout};
pub use level::{EventLevel, Severity};
#[cfg(feature = "log-compat")]
pub use log_compat::{GelfLogBridge, install};
pub use message::{FieldValue, GelfMessage, GelfMessageBuilder};
pub use policy::{Delivery, DeliveryPolicy, DeliveryStatsSnapshot, OverflowStrategy};
pub use status::{STATUS_TARGET, Status, StatusLevel, StatusManager};
pub use transport::{
    DefaultTransportFactory, Protocol, Stopped, TcpTransport, Transport, TransportConfig,
    TransportError, TransportFactory, TryEnqueueError, UdpTransport,
};
