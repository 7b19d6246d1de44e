//! Factory and encoder doubles that count how often they are used.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::{
    encoder::MessageEncoder,
    event::LogEvent,
    level::Severity,
    message::GelfMessage,
    transport::{Protocol, Transport, TransportConfig, TransportError, TransportFactory},
};

use super::FakeTransport;

/// Transport factory handing out [`FakeTransport`]s.
///
/// Transports can be preset per protocol; otherwise a fresh, always
/// accepting fake is created. Every configuration passed to
/// [`create`](TransportFactory::create) is recorded.
#[derive(Default)]
pub struct RecordingFactory {
    presets: Mutex<HashMap<Protocol, Arc<FakeTransport>>>,
    failing: Mutex<Vec<Protocol>>,
    created: Mutex<Vec<(TransportConfig, Arc<FakeTransport>)>>,
}

impl RecordingFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out `transport` whenever a transport for `protocol` is built.
    pub fn with_transport(self, protocol: Protocol, transport: FakeTransport) -> Self {
        self.presets.lock().insert(protocol, Arc::new(transport));
        self
    }

    /// Fail construction of transports using `protocol`.
    pub fn failing_for(self, protocol: Protocol) -> Self {
        self.failing.lock().push(protocol);
        self
    }

    pub fn creation_count(&self) -> usize {
        self.created.lock().len()
    }

    pub fn configs(&self) -> Vec<TransportConfig> {
        self.created.lock().iter().map(|(c, _)| c.clone()).collect()
    }

    /// Most recently built transport for `protocol`.
    pub fn transport(&self, protocol: Protocol) -> Option<Arc<FakeTransport>> {
        self.created
            .lock()
            .iter()
            .rev()
            .find(|(config, _)| config.protocol == protocol)
            .map(|(_, t)| Arc::clone(t))
    }
}

impl TransportFactory for RecordingFactory {
    fn create(&self, config: TransportConfig) -> Result<Arc<dyn Transport>, TransportError> {
        if self.failing.lock().contains(&config.protocol) {
            return Err(TransportError::Resolve {
                host: config.host,
                port: config.port,
            });
        }
        let transport = self
            .presets
            .lock()
            .remove(&config.protocol)
            .unwrap_or_else(|| Arc::new(FakeTransport::new(config.protocol)));
        self.created.lock().push((config, Arc::clone(&transport)));
        Ok(transport)
    }
}

/// Encoder counting its invocations.
#[derive(Default)]
pub struct CountingEncoder {
    calls: AtomicUsize,
}

impl CountingEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MessageEncoder for CountingEncoder {
    fn encode(&self, event: &LogEvent) -> GelfMessage {
        self.calls.fetch_add(1, Ordering::SeqCst);
        GelfMessage::builder(event.message.as_str(), "test-host")
            .severity(event.level.severity().unwrap_or(Severity::Debug))
            .timestamp(event.timestamp)
            .build()
    }
}
