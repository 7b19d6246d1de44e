//! Appender configuration and its validation.
//!
//! [`AppenderConfig`] holds the raw options as they arrive from code or an
//! INI file. [`AppenderConfig::validate`] turns them into the typed
//! [`ValidatedConfig`] used to build transports and the encoder; any error
//! leaves the appender inactive.

use std::collections::BTreeMap;
use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::{
    encoder::{EncoderSettings, ExtraFieldFlags},
    level::Severity,
    message::FieldValue,
    policy::OverflowStrategy,
    status::StatusLevel,
    transport::{
        DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_CHUNK_SIZE, DEFAULT_MAX_INFLIGHT_SENDS, DEFAULT_PORT,
        DEFAULT_QUEUE_DRAIN_INTERVAL, DEFAULT_QUEUE_SIZE, DEFAULT_RECONNECT_DELAY,
        DEFAULT_SECONDARY_PORT, DEFAULT_SHUTDOWN_TIMEOUT, DEFAULT_THREADS, Protocol,
        TransportConfig,
    },
};

/// Facility written to `_facility` unless configured otherwise.
pub const DEFAULT_FACILITY: &str = "femtogelf";

/// Errors raised while reading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("param 'host' is not set")]
    MissingHost,
    #[error("param 'protocol' is not correctly set: '{0}'; expected one of TCP, UDP")]
    UnknownProtocol(String),
    #[error(
        "param 'overflow_strategy' is not correctly set: '{0}'; expected one of DROP, FAILOVER"
    )]
    UnknownStrategy(String),
    #[error("additional field must be in the format key=value, but found [{0}]")]
    MalformedAdditionalField(String),
    #[error("param '{field}' is invalid: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),
    #[error("section [{0}] not found")]
    MissingSection(String),
    #[error("failed to read configuration file: {0}")]
    Ini(String),
}

/// Split `key=value` on the first `=`.
///
/// The value may itself contain `=`; a missing separator or an empty key is
/// malformed.
pub fn parse_additional_field(raw: &str) -> Result<(String, String), ConfigError> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_owned(), value.to_owned()))
        }
        _ => Err(ConfigError::MalformedAdditionalField(raw.to_owned())),
    }
}

/// Raw appender options with their documented defaults.
#[derive(Clone, Debug, PartialEq)]
pub struct AppenderConfig {
    pub host: String,
    pub port: u16,
    pub protocol: String,
    pub queue_size: usize,
    /// Idle poll and flush interval of the transport workers.
    pub queue_process_rate_ms: u64,
    pub tls_enabled: bool,
    pub tls_cert_verification: bool,
    pub reconnect_delay_ms: u64,
    pub connect_timeout_ms: u64,
    pub tcp_no_delay: bool,
    pub tcp_keep_alive: bool,
    /// Socket send buffer in bytes; zero or negative keeps the system default.
    pub send_buffer_size: i64,
    pub max_inflight_sends: usize,
    pub threads: usize,
    pub overflow_strategy: String,
    pub secondary_port: u16,
    /// Severity at or above which a full primary queue blocks the caller.
    pub blocking_threshold: Severity,
    /// Empty means "use the local hostname".
    pub origin_host: String,
    pub facility: String,
    pub additional_fields: BTreeMap<String, FieldValue>,
    pub extra_fields: ExtraFieldFlags,
    pub max_chunk_size: usize,
    pub shutdown_timeout_ms: u64,
}

impl Default for AppenderConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: DEFAULT_PORT,
            protocol: Protocol::Tcp.to_string(),
            queue_size: DEFAULT_QUEUE_SIZE,
            queue_process_rate_ms: DEFAULT_QUEUE_DRAIN_INTERVAL.as_millis() as u64,
            tls_enabled: false,
            tls_cert_verification: false,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY.as_millis() as u64,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT.as_millis() as u64,
            tcp_no_delay: false,
            tcp_keep_alive: false,
            send_buffer_size: -1,
            max_inflight_sends: DEFAULT_MAX_INFLIGHT_SENDS,
            threads: DEFAULT_THREADS,
            overflow_strategy: OverflowStrategy::Drop.to_string(),
            secondary_port: DEFAULT_SECONDARY_PORT,
            blocking_threshold: Severity::Warning,
            origin_host: String::new(),
            facility: DEFAULT_FACILITY.into(),
            additional_fields: BTreeMap::new(),
            extra_fields: ExtraFieldFlags::default(),
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT.as_millis() as u64,
        }
    }
}

/// Typed configuration ready to build transports and the encoder.
#[derive(Clone, Debug)]
pub struct ValidatedConfig {
    pub primary: TransportConfig,
    /// Present only for [`OverflowStrategy::Failover`].
    pub secondary: Option<TransportConfig>,
    pub strategy: OverflowStrategy,
    pub threshold: Severity,
    pub encoder: EncoderSettings,
    /// Non-fatal findings to record on the status channel.
    pub notices: Vec<(StatusLevel, String)>,
}

macro_rules! ensure_positive {
    ($value:expr, $field:expr) => {
        if $value == 0 {
            return Err(ConfigError::InvalidValue {
                field: $field,
                reason: "must be greater than zero".into(),
            });
        }
    };
}

impl AppenderConfig {
    /// Parse `key=value` and add it to the static additional fields.
    pub fn add_additional_field(&mut self, raw: &str) -> Result<(), ConfigError> {
        let (key, value) = parse_additional_field(raw)?;
        self.additional_fields.insert(key, FieldValue::from(value));
        Ok(())
    }

    /// Check every option and derive the transport and encoder settings.
    pub fn validate(&self) -> Result<ValidatedConfig, ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::MissingHost);
        }
        let protocol: Protocol = self
            .protocol
            .parse()
            .map_err(|()| ConfigError::UnknownProtocol(self.protocol.clone()))?;
        let strategy: OverflowStrategy = self
            .overflow_strategy
            .parse()
            .map_err(|()| ConfigError::UnknownStrategy(self.overflow_strategy.clone()))?;
        ensure_positive!(self.port, "port");
        ensure_positive!(self.queue_size, "queue_size");
        ensure_positive!(self.queue_process_rate_ms, "queue_process_rate");
        ensure_positive!(self.max_inflight_sends, "max_inflight_sends");
        ensure_positive!(self.threads, "threads");
        if strategy.needs_secondary() {
            ensure_positive!(self.secondary_port, "secondary_port");
        }
        if self.max_chunk_size < 64 {
            return Err(ConfigError::InvalidValue {
                field: "max_chunk_size",
                reason: "must be at least 64 bytes".into(),
            });
        }

        let mut notices = Vec::new();
        if self.tls_enabled && protocol == Protocol::Udp {
            notices.push((StatusLevel::Warn, "tls_enabled has no effect with UDP".into()));
        }
        let origin_host = if self.origin_host.trim().is_empty() {
            match local_hostname() {
                Ok(name) => name,
                Err(err) => {
                    notices.push((
                        StatusLevel::Error,
                        format!("couldn't resolve the local hostname: {err}"),
                    ));
                    String::new()
                }
            }
        } else {
            self.origin_host.clone()
        };

        let primary = TransportConfig {
            host: self.host.trim().to_owned(),
            port: self.port,
            protocol,
            queue_capacity: self.queue_size,
            queue_drain_interval: Duration::from_millis(self.queue_process_rate_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            tls_enabled: self.tls_enabled && protocol == Protocol::Tcp,
            tls_cert_verification: self.tls_cert_verification,
            tcp_no_delay: self.tcp_no_delay,
            tcp_keep_alive: self.tcp_keep_alive,
            send_buffer_size: usize::try_from(self.send_buffer_size)
                .ok()
                .filter(|size| *size > 0),
            max_inflight_sends: self.max_inflight_sends,
            threads: self.threads,
            max_chunk_size: self.max_chunk_size,
            shutdown_timeout: Duration::from_millis(self.shutdown_timeout_ms),
        };
        let secondary = strategy.needs_secondary().then(|| TransportConfig {
            tls_enabled: false,
            ..primary.for_protocol(Protocol::Udp, self.secondary_port)
        });

        Ok(ValidatedConfig {
            primary,
            secondary,
            strategy,
            threshold: self.blocking_threshold,
            encoder: EncoderSettings {
                origin_host,
                facility: self.facility.clone(),
                additional_fields: self.additional_fields.clone(),
                extra_fields: self.extra_fields,
            },
            notices,
        })
    }
}

fn local_hostname() -> io::Result<String> {
    hostname::get()?.into_string().map_err(|raw| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("hostname is not valid UTF-8: {raw:?}"),
        )
    })
}
