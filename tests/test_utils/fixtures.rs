//! Fixtures wiring appenders to recording factories so integration tests
//! can inspect transport interactions without touching the network.

use std::sync::Arc;

use femtogelf::test_utils::RecordingFactory;
use femtogelf::{GelfAppender, GelfAppenderBuilder, TransportFactory};
use rstest::fixture;

/// Fresh factory handing out always-accepting fake transports.
#[fixture]
pub fn factory() -> Arc<RecordingFactory> {
    Arc::new(RecordingFactory::new())
}

/// Builder pointing at a fixed collector host and using `factory`.
pub fn builder_with(factory: &Arc<RecordingFactory>) -> GelfAppenderBuilder {
    GelfAppender::builder()
        .host("graylog.internal")
        .origin_host("app-01")
        .transport_factory(Arc::clone(factory) as Arc<dyn TransportFactory>)
}
