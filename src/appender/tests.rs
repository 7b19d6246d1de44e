//! Lifecycle and append-path tests against fake transports.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rstest::{fixture, rstest};

use super::*;
use crate::event::LogEvent;
use crate::level::{EventLevel, Severity};
use crate::message::FieldValue;
use crate::status::StatusLevel;
use crate::test_utils::{CountingEncoder, FakeTransport, RecordingFactory};
use crate::transport::Protocol;

#[fixture]
fn factory() -> Arc<RecordingFactory> {
    Arc::new(RecordingFactory::new())
}

fn builder(factory: &Arc<RecordingFactory>) -> GelfAppenderBuilder {
    GelfAppender::builder()
        .host("graylog.internal")
        .origin_host("app-01")
        .transport_factory(Arc::clone(factory) as Arc<dyn TransportFactory>)
}

fn event(level: EventLevel, text: &str) -> LogEvent {
    LogEvent::new("app.core", level, text)
}

#[rstest]
#[case("")]
#[case("  ")]
fn empty_host_leaves_appender_inactive(factory: Arc<RecordingFactory>, #[case] host: &str) {
    let encoder = Arc::new(CountingEncoder::new());
    let appender = builder(&factory)
        .host(host)
        .encoder(Arc::clone(&encoder) as Arc<dyn MessageEncoder>)
        .build();

    assert!(!appender.start());
    assert_eq!(appender.state(), AppenderState::Inactive);
    assert!(appender.status().has_errors());
    assert_eq!(appender.append(&event(EventLevel::Error, "lost")), None);
    assert_eq!(factory.creation_count(), 0);
    assert_eq!(encoder.calls(), 0);
}

#[rstest]
fn drop_strategy_builds_only_primary(factory: Arc<RecordingFactory>) {
    let appender = builder(&factory).overflow_strategy("DROP").start();

    assert!(appender.is_active());
    assert_eq!(factory.creation_count(), 1);
    let configs = factory.configs();
    assert_eq!(configs[0].protocol, Protocol::Tcp);
    assert_eq!(configs[0].host, "graylog.internal");
    assert_eq!(configs[0].port, 12201);
}

#[rstest]
#[case("FAILOVER")]
#[case("UDP")]
fn failover_builds_udp_secondary(factory: Arc<RecordingFactory>, #[case] strategy: &str) {
    let appender = builder(&factory)
        .overflow_strategy(strategy)
        .secondary_port(12299)
        .start();

    assert!(appender.is_active());
    let configs = factory.configs();
    assert_eq!(configs.len(), 2);
    assert_eq!(configs[1].protocol, Protocol::Udp);
    assert_eq!(configs[1].port, 12299);
}

#[rstest]
fn off_events_are_never_encoded(factory: Arc<RecordingFactory>) {
    let encoder = Arc::new(CountingEncoder::new());
    let appender = Arc::new(
        builder(&factory)
            .encoder(Arc::clone(&encoder) as Arc<dyn MessageEncoder>)
            .start(),
    );

    let producers: Vec<_> = (0..4)
        .map(|_| {
            let appender = Arc::clone(&appender);
            thread::spawn(move || {
                (0..100)
                    .map(|i| appender.append(&event(EventLevel::Off, &format!("silenced {i}"))))
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    for producer in producers {
        let results = producer.join().expect("producer");
        assert!(results.iter().all(Option::is_none));
    }

    assert!(appender.is_active());
    assert_eq!(encoder.calls(), 0);
    assert_eq!(appender.stats().primary, 0);
    let primary = factory.transport(Protocol::Tcp).expect("primary");
    assert_eq!(primary.interactions(), 0);
}

#[rstest]
fn append_encodes_and_delivers(factory: Arc<RecordingFactory>) {
    let appender = builder(&factory)
        .additional_field("env=prod")
        .include_logger(true)
        .start();

    assert_eq!(
        appender.append(&event(EventLevel::Warn, "disk almost full")),
        Some(Delivery::Primary)
    );

    let primary = factory.transport(Protocol::Tcp).expect("primary");
    let accepted = primary.accepted();
    let message = &accepted[0].1;
    assert_eq!(message.short_message(), "disk almost full");
    assert_eq!(message.host(), "app-01");
    assert_eq!(message.severity(), Severity::Warning);
    assert_eq!(message.field("env"), Some(&FieldValue::from("prod")));
    assert_eq!(message.field("facility"), Some(&FieldValue::from("femtogelf")));
    assert_eq!(message.field("logger"), Some(&FieldValue::from("app.core")));
    assert_eq!(appender.stats().primary, 1);
}

#[rstest]
fn malformed_additional_field_is_reported_and_skipped(factory: Arc<RecordingFactory>) {
    let appender = builder(&factory)
        .additional_field("novalue")
        .additional_field("query=a=b")
        .start();

    assert!(appender.is_active());
    assert_eq!(appender.status().count_at_least(StatusLevel::Error), 1);
    assert_eq!(
        appender.config().additional_fields.get("query"),
        Some(&FieldValue::from("a=b"))
    );
    assert_eq!(appender.config().additional_fields.len(), 1);
}

#[test]
fn primary_construction_failure_stays_inactive() {
    let factory = Arc::new(RecordingFactory::new().failing_for(Protocol::Tcp));
    let appender = builder(&factory).start();

    assert_eq!(appender.state(), AppenderState::Inactive);
    assert!(appender.status().has_errors());
    assert_eq!(factory.creation_count(), 0);
}

#[test]
fn secondary_failure_releases_primary() {
    let factory = Arc::new(RecordingFactory::new().failing_for(Protocol::Udp));
    let appender = builder(&factory).overflow_strategy("FAILOVER").start();

    assert_eq!(appender.state(), AppenderState::Inactive);
    assert!(appender.status().has_errors());
    let primary = factory.transport(Protocol::Tcp).expect("primary was built");
    assert!(primary.is_stopped());
}

#[rstest]
fn starting_twice_warns_and_keeps_transports(factory: Arc<RecordingFactory>) {
    let appender = builder(&factory).start();

    assert!(appender.start());
    assert_eq!(factory.creation_count(), 1);
    assert!(
        appender
            .status()
            .statuses()
            .iter()
            .any(|s| s.level == StatusLevel::Warn && s.message.contains("already started"))
    );
}

#[rstest]
fn stop_is_idempotent_and_releases_transports(factory: Arc<RecordingFactory>) {
    let appender = builder(&factory).overflow_strategy("FAILOVER").start();
    let primary = factory.transport(Protocol::Tcp).expect("primary");
    let secondary = factory.transport(Protocol::Udp).expect("secondary");

    appender.stop();
    appender.stop();

    assert_eq!(appender.state(), AppenderState::Inactive);
    assert_eq!(primary.stop_calls(), 1);
    assert_eq!(secondary.stop_calls(), 1);
    assert_eq!(appender.append(&event(EventLevel::Error, "late")), None);
}

#[test]
fn failing_stop_is_recorded_not_raised() {
    let factory = Arc::new(
        RecordingFactory::new()
            .with_transport(Protocol::Tcp, FakeTransport::new(Protocol::Tcp).failing_stop()),
    );
    let appender = builder(&factory).start();

    appender.stop();

    assert_eq!(appender.state(), AppenderState::Inactive);
    assert!(
        appender
            .status()
            .statuses()
            .iter()
            .any(|s| s.level == StatusLevel::Warn && s.message.contains("couldn't stop"))
    );
}

#[rstest]
fn restart_builds_fresh_transports(factory: Arc<RecordingFactory>) {
    let appender = builder(&factory).start();
    appender.stop();

    assert!(appender.start());
    assert_eq!(factory.creation_count(), 2);
}

#[test]
fn stop_releases_blocked_producer() {
    let factory = Arc::new(RecordingFactory::new().with_transport(
        Protocol::Tcp,
        FakeTransport::new(Protocol::Tcp)
            .always_full()
            .hold_until_stopped(),
    ));
    let appender = Arc::new(builder(&factory).start());
    let primary = factory.transport(Protocol::Tcp).expect("primary");

    let producer = {
        let appender = Arc::clone(&appender);
        thread::spawn(move || appender.append(&event(EventLevel::Error, "stuck")))
    };
    while primary.enqueue_calls() == 0 {
        thread::sleep(Duration::from_millis(1));
    }
    appender.stop();

    assert_eq!(producer.join().expect("producer"), Some(Delivery::Abandoned));
    assert_eq!(appender.state(), AppenderState::Inactive);
}

#[test]
fn dropping_appender_stops_transports() {
    let factory = Arc::new(RecordingFactory::new());
    {
        let _appender = builder(&factory).start();
    }
    let primary = factory.transport(Protocol::Tcp).expect("primary");
    assert!(primary.is_stopped());
}
