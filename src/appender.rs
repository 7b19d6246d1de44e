//! The GELF appender: configuration, lifecycle and the hot append path.
//!
//! [`GelfAppender::start`] validates the configuration and builds the
//! transports; [`GelfAppender::append`] encodes an event and hands it to the
//! [`DeliveryPolicy`]; [`GelfAppender::stop`] releases everything again.
//! Problems never surface to the logging call site. They are recorded on
//! the appender's [`StatusManager`] instead.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::{
    config::{AppenderConfig, ConfigError, ValidatedConfig},
    encoder::{DefaultEncoder, MessageEncoder},
    event::LogEvent,
    layout::SharedLayout,
    policy::{Delivery, DeliveryPolicy, DeliveryStatsSnapshot},
    status::{StatusLevel, StatusManager},
    transport::{DefaultTransportFactory, Transport, TransportFactory},
};

/// Lifecycle state of a [`GelfAppender`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppenderState {
    Inactive,
    Active,
}

/// Everything `append` needs once the appender is running.
struct ActiveAppender {
    encoder: Arc<dyn MessageEncoder>,
    policy: DeliveryPolicy,
}

impl ActiveAppender {
    fn transports(&self) -> impl Iterator<Item = &Arc<dyn Transport>> {
        std::iter::once(self.policy.primary()).chain(self.policy.secondary())
    }
}

/// Appender shipping log events to a GELF collector.
///
/// `append` may be called concurrently from any number of threads. The
/// running state is an `Arc` cloned out of a short read lock, so `stop`
/// never waits for a producer blocked on a full queue; stopping the
/// transports is what releases such producers.
pub struct GelfAppender {
    config: AppenderConfig,
    encoder: Option<Arc<dyn MessageEncoder>>,
    layout: SharedLayout,
    factory: Arc<dyn TransportFactory>,
    status: StatusManager,
    active: RwLock<Option<Arc<ActiveAppender>>>,
    lifecycle: Mutex<()>,
}

impl GelfAppender {
    /// Create an inactive appender using the real TCP and UDP transports.
    pub fn new(config: AppenderConfig) -> Self {
        Self {
            config,
            encoder: None,
            layout: SharedLayout::default(),
            factory: Arc::new(DefaultTransportFactory),
            status: StatusManager::default(),
            active: RwLock::new(None),
            lifecycle: Mutex::new(()),
        }
    }

    /// Start building an appender with fluent setters.
    pub fn builder() -> GelfAppenderBuilder {
        GelfAppenderBuilder::new()
    }

    /// Replace the factory used to build transports.
    pub fn with_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Use `encoder` instead of the [`DefaultEncoder`].
    pub fn with_encoder(mut self, encoder: Arc<dyn MessageEncoder>) -> Self {
        self.encoder = Some(encoder);
        self
    }

    /// Layout for the [`DefaultEncoder`]; ignored with a custom encoder.
    pub fn with_layout(mut self, layout: SharedLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn config(&self) -> &AppenderConfig {
        &self.config
    }

    pub fn status(&self) -> &StatusManager {
        &self.status
    }

    pub fn state(&self) -> AppenderState {
        match self.active.read().as_ref() {
            Some(_) => AppenderState::Active,
            None => AppenderState::Inactive,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state() == AppenderState::Active
    }

    /// Delivery counters of the running appender; zero when inactive.
    pub fn stats(&self) -> DeliveryStatsSnapshot {
        self.active
            .read()
            .as_ref()
            .map(|active| active.policy.stats())
            .unwrap_or_default()
    }

    /// Validate the configuration and build the transports.
    ///
    /// Returns `true` when the appender is active afterwards. Failures are
    /// recorded as error statuses and leave the appender inactive.
    pub fn start(&self) -> bool {
        let _lifecycle = self.lifecycle.lock();
        if self.active.read().is_some() {
            self.status.add_warn("GELF appender is already started");
            return true;
        }
        let validated = match self.config.validate() {
            Ok(validated) => validated,
            Err(err) => {
                self.status
                    .add_error_with_cause("invalid GELF appender configuration", &err);
                return false;
            }
        };
        for (level, message) in &validated.notices {
            match level {
                StatusLevel::Info => self.status.add_info(message.as_str()),
                StatusLevel::Warn => self.status.add_warn(message.as_str()),
                StatusLevel::Error => self.status.add_error(message.as_str()),
            }
        }
        let Some(active) = self.build_active(validated) else {
            return false;
        };
        let summary = format!(
            "GELF appender started: {} {}:{}, overflow strategy {}",
            self.config.protocol, self.config.host, self.config.port, active.policy.strategy()
        );
        *self.active.write() = Some(Arc::new(active));
        self.status.add_info(summary);
        true
    }

    fn build_active(&self, validated: ValidatedConfig) -> Option<ActiveAppender> {
        let ValidatedConfig {
            primary,
            secondary,
            strategy,
            threshold,
            encoder,
            ..
        } = validated;
        let primary = match self.factory.create(primary) {
            Ok(transport) => transport,
            Err(err) => {
                self.status
                    .add_error_with_cause("couldn't create the primary GELF transport", &err);
                return None;
            }
        };
        let secondary = match secondary.map(|config| self.factory.create(config)).transpose() {
            Ok(transport) => transport,
            Err(err) => {
                self.status
                    .add_error_with_cause("couldn't create the secondary GELF transport", &err);
                self.stop_transport(&primary);
                return None;
            }
        };
        let encoder = self.encoder.clone().unwrap_or_else(|| {
            Arc::new(DefaultEncoder::with_layout(encoder, self.layout.clone()))
        });
        Some(ActiveAppender {
            encoder,
            policy: DeliveryPolicy::new(strategy, threshold, primary, secondary),
        })
    }

    /// Encode and deliver `event`.
    ///
    /// Returns `None` when the appender is inactive or the event level is
    /// `Off`; the event is then ignored without being encoded.
    pub fn append(&self, event: &LogEvent) -> Option<Delivery> {
        if event.level.is_off() {
            return None;
        }
        let active = self.active.read().clone()?;
        let message = active.encoder.encode(event);
        Some(active.policy.deliver(message))
    }

    /// Stop both transports and return to the inactive state.
    ///
    /// Producers blocked on a full queue are released. Failures are recorded
    /// as warnings; calling `stop` on an inactive appender does nothing.
    pub fn stop(&self) {
        let _lifecycle = self.lifecycle.lock();
        let Some(active) = self.active.write().take() else {
            return;
        };
        for transport in active.transports() {
            self.stop_transport(transport);
        }
        self.status.add_info("GELF appender stopped");
    }

    fn stop_transport(&self, transport: &Arc<dyn Transport>) {
        if let Err(err) = transport.stop() {
            self.status.add_warn(format!(
                "couldn't stop the {} GELF transport: {err}",
                transport.protocol()
            ));
        }
    }
}

impl Drop for GelfAppender {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for GelfAppender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GelfAppender")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("protocol", &self.config.protocol)
            .field("state", &self.state())
            .finish()
    }
}

macro_rules! config_setter {
    ($(#[$meta:meta])* $fn_name:ident, $field:ident, $ty:ty) => {
        $(#[$meta])*
        pub fn $fn_name(mut self, value: $ty) -> Self {
            self.config.$field = value.into();
            self
        }
    };
}

/// Fluent builder for [`GelfAppender`].
///
/// Malformed `key=value` additional fields are skipped and reported on the
/// appender's status channel once it is built.
#[derive(Default)]
pub struct GelfAppenderBuilder {
    config: AppenderConfig,
    field_errors: Vec<ConfigError>,
    encoder: Option<Arc<dyn MessageEncoder>>,
    layout: Option<SharedLayout>,
    factory: Option<Arc<dyn TransportFactory>>,
}

impl GelfAppenderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    pub fn from_config(config: AppenderConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    config_setter!(host, host, impl Into<String>);
    config_setter!(port, port, u16);
    config_setter!(
        /// `"TCP"` or `"UDP"`.
        protocol,
        protocol,
        impl Into<String>
    );
    config_setter!(queue_size, queue_size, usize);
    config_setter!(queue_process_rate_ms, queue_process_rate_ms, u64);
    config_setter!(tls_enabled, tls_enabled, bool);
    config_setter!(tls_cert_verification, tls_cert_verification, bool);
    config_setter!(reconnect_delay_ms, reconnect_delay_ms, u64);
    config_setter!(connect_timeout_ms, connect_timeout_ms, u64);
    config_setter!(tcp_no_delay, tcp_no_delay, bool);
    config_setter!(tcp_keep_alive, tcp_keep_alive, bool);
    config_setter!(send_buffer_size, send_buffer_size, i64);
    config_setter!(max_inflight_sends, max_inflight_sends, usize);
    config_setter!(threads, threads, usize);
    config_setter!(
        /// `"DROP"`, `"FAILOVER"` or its alias `"UDP"`.
        overflow_strategy,
        overflow_strategy,
        impl Into<String>
    );
    config_setter!(secondary_port, secondary_port, u16);
    config_setter!(blocking_threshold, blocking_threshold, crate::level::Severity);
    config_setter!(origin_host, origin_host, impl Into<String>);
    config_setter!(facility, facility, impl Into<String>);
    config_setter!(max_chunk_size, max_chunk_size, usize);
    config_setter!(shutdown_timeout_ms, shutdown_timeout_ms, u64);

    pub fn include_location(mut self, enabled: bool) -> Self {
        self.config.extra_fields.location = enabled;
        self
    }

    pub fn include_logger(mut self, enabled: bool) -> Self {
        self.config.extra_fields.logger = enabled;
        self
    }

    pub fn include_thread(mut self, enabled: bool) -> Self {
        self.config.extra_fields.thread = enabled;
        self
    }

    pub fn include_marker(mut self, enabled: bool) -> Self {
        self.config.extra_fields.marker = enabled;
        self
    }

    pub fn include_context(mut self, enabled: bool) -> Self {
        self.config.extra_fields.context = enabled;
        self
    }

    /// Add a static field given as `key=value`.
    pub fn additional_field(mut self, raw: &str) -> Self {
        if let Err(err) = self.config.add_additional_field(raw) {
            self.field_errors.push(err);
        }
        self
    }

    pub fn encoder(mut self, encoder: Arc<dyn MessageEncoder>) -> Self {
        self.encoder = Some(encoder);
        self
    }

    pub fn layout(mut self, layout: SharedLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn config(&self) -> &AppenderConfig {
        &self.config
    }

    /// Build an inactive appender. Call [`GelfAppender::start`] to connect.
    pub fn build(self) -> GelfAppender {
        let mut appender = GelfAppender::new(self.config);
        if let Some(factory) = self.factory {
            appender = appender.with_factory(factory);
        }
        if let Some(encoder) = self.encoder {
            appender = appender.with_encoder(encoder);
        }
        if let Some(layout) = self.layout {
            appender = appender.with_layout(layout);
        }
        for err in &self.field_errors {
            appender
                .status
                .add_error_with_cause("skipping additional field", err);
        }
        appender
    }

    /// Build the appender and start it.
    pub fn start(self) -> GelfAppender {
        let appender = self.build();
        appender.start();
        appender
    }
}

#[cfg(test)]
mod tests;
