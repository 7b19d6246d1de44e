//! Transports delivering GELF messages to the collector.
//!
//! A transport owns a bounded queue drained by its own worker threads. The
//! delivery policy only ever talks to the [`Transport`] trait: a
//! non-blocking [`try_enqueue`](Transport::try_enqueue), a blocking
//! [`enqueue`](Transport::enqueue) that waits for queue space or shutdown,
//! and an idempotent [`stop`](Transport::stop).
//!
//! Two implementations are provided: [`TcpTransport`], a reliable stream
//! with optional TLS that retries until the collector accepts the message,
//! and [`UdpTransport`], a lossy datagram transport that chunks large
//! payloads and never retries.

mod config;
mod queue;
pub(crate) mod serialise;
mod tcp;
mod udp;

#[cfg(test)]
mod tests;

use std::{fmt, io, str::FromStr, sync::Arc};

use thiserror::Error;

use crate::message::GelfMessage;

pub use config::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_CHUNK_SIZE, DEFAULT_MAX_INFLIGHT_SENDS, DEFAULT_PORT,
    DEFAULT_QUEUE_DRAIN_INTERVAL, DEFAULT_QUEUE_SIZE, DEFAULT_RECONNECT_DELAY,
    DEFAULT_SECONDARY_PORT, DEFAULT_SHUTDOWN_TIMEOUT, DEFAULT_THREADS, TransportConfig,
};
pub use serialise::{MAX_CHUNKS, chunk_datagram, encode_json, frame_tcp};
pub use tcp::TcpTransport;
pub use udp::UdpTransport;

/// Wire protocol of a transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    /// Names accepted in configuration.
    pub const NAMES: [&'static str; 2] = ["TCP", "UDP"];
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("TCP"),
            Protocol::Udp => f.write_str("UDP"),
        }
    }
}

impl FromStr for Protocol {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TCP" => Ok(Self::Tcp),
            "UDP" => Ok(Self::Udp),
            _ => Err(()),
        }
    }
}

/// Reason a non-blocking enqueue was refused. The message is handed back
/// so the caller can route it elsewhere.
#[derive(Debug, Error)]
pub enum TryEnqueueError {
    #[error("transport queue is full")]
    Full(GelfMessage),
    #[error("transport is stopped")]
    Stopped(GelfMessage),
}

impl TryEnqueueError {
    pub fn into_message(self) -> GelfMessage {
        match self {
            TryEnqueueError::Full(message) | TryEnqueueError::Stopped(message) => message,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, TryEnqueueError::Full(_))
    }
}

/// A blocking enqueue was abandoned because the transport stopped.
#[derive(Debug, Error)]
#[error("transport is stopped")]
pub struct Stopped(pub GelfMessage);

/// Failures raised while building or stopping a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid transport configuration: {0}")]
    InvalidConfig(String),
    #[error("unable to resolve {host}:{port}")]
    Resolve { host: String, port: u16 },
    #[error("tls setup failed: {0}")]
    Tls(String),
    #[error("{0} worker thread panicked")]
    WorkerPanicked(Protocol),
    #[error("{0} workers did not stop before the shutdown timeout")]
    StopTimedOut(Protocol),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Queue-backed delivery channel.
pub trait Transport: Send + Sync {
    fn protocol(&self) -> Protocol;

    /// Enqueue without blocking.
    fn try_enqueue(&self, message: GelfMessage) -> Result<(), TryEnqueueError>;

    /// Enqueue, waiting for space until the transport is stopped.
    fn enqueue(&self, message: GelfMessage) -> Result<(), Stopped>;

    /// Stop accepting messages, wake blocked producers and release the
    /// network resources. Calling `stop` again is a no-op.
    fn stop(&self) -> Result<(), TransportError>;
}

/// Builds transports from their configuration.
pub trait TransportFactory: Send + Sync {
    fn create(&self, config: TransportConfig) -> Result<Arc<dyn Transport>, TransportError>;
}

/// Factory building the real TCP and UDP transports.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultTransportFactory;

impl TransportFactory for DefaultTransportFactory {
    fn create(&self, config: TransportConfig) -> Result<Arc<dyn Transport>, TransportError> {
        match config.protocol {
            Protocol::Tcp => Ok(Arc::new(TcpTransport::new(config)?)),
            Protocol::Udp => Ok(Arc::new(UdpTransport::new(config)?)),
        }
    }
}
