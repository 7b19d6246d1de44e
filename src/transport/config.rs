//! Connection parameters for a single transport instance.
//!
//! The appender builds one [`TransportConfig`] per transport from its
//! validated configuration and hands it over to the transport, which owns it
//! for its whole lifetime.

use std::time::Duration;

use super::{Protocol, TransportError};

/// Default GELF TCP port of the collector.
pub const DEFAULT_PORT: u16 = 12201;
/// Port of the secondary (UDP) input used for failover.
pub const DEFAULT_SECONDARY_PORT: u16 = 12202;
/// Default bounded queue capacity.
pub const DEFAULT_QUEUE_SIZE: usize = 2048;
/// Default upper bound between buffered-write flushes.
pub const DEFAULT_QUEUE_DRAIN_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(30_000);
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(500);
/// Default number of messages written but not yet flushed.
pub const DEFAULT_MAX_INFLIGHT_SENDS: usize = 1024;
pub const DEFAULT_THREADS: usize = 1;
/// Largest datagram written by the UDP transport before chunking.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 8192;
/// How long `stop` waits for workers to drain their queue.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Smallest datagram able to carry a chunk header plus payload.
const MIN_CHUNK_SIZE: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportConfig {
    pub host: String,
    pub port: u16,
    pub protocol: Protocol,
    pub queue_capacity: usize,
    pub queue_drain_interval: Duration,
    pub connect_timeout: Duration,
    pub reconnect_delay: Duration,
    pub tls_enabled: bool,
    pub tls_cert_verification: bool,
    pub tcp_no_delay: bool,
    pub tcp_keep_alive: bool,
    /// Kernel send buffer (`SO_SNDBUF`); `None` keeps the system default.
    pub send_buffer_size: Option<usize>,
    pub max_inflight_sends: usize,
    pub threads: usize,
    pub max_chunk_size: usize,
    pub shutdown_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: DEFAULT_PORT,
            protocol: Protocol::Tcp,
            queue_capacity: DEFAULT_QUEUE_SIZE,
            queue_drain_interval: DEFAULT_QUEUE_DRAIN_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            tls_enabled: false,
            tls_cert_verification: false,
            tcp_no_delay: false,
            tcp_keep_alive: false,
            send_buffer_size: None,
            max_inflight_sends: DEFAULT_MAX_INFLIGHT_SENDS,
            threads: DEFAULT_THREADS,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl TransportConfig {
    /// Derive the configuration of a sibling transport using another
    /// protocol and port. Queue capacity and tuning are copied, not shared.
    pub fn for_protocol(&self, protocol: Protocol, port: u16) -> Self {
        Self {
            protocol,
            port,
            ..self.clone()
        }
    }

    pub(crate) fn check(&self) -> Result<(), TransportError> {
        let invalid = |msg: &str| Err(TransportError::InvalidConfig(msg.into()));
        if self.host.trim().is_empty() {
            return invalid("host must not be empty");
        }
        if self.queue_capacity == 0 {
            return invalid("queue capacity must be greater than zero");
        }
        if self.threads == 0 {
            return invalid("threads must be greater than zero");
        }
        if self.max_inflight_sends == 0 {
            return invalid("max in-flight sends must be greater than zero");
        }
        if self.max_chunk_size < MIN_CHUNK_SIZE {
            return Err(TransportError::InvalidConfig(format!(
                "max chunk size must be at least {MIN_CHUNK_SIZE} bytes"
            )));
        }
        Ok(())
    }
}
