//! Appender statuses are mirrored to the `log` facade.

use femtogelf::{GelfAppender, STATUS_TARGET};
use logtest::Logger;

#[test]
fn configuration_errors_reach_the_log_facade() {
    let mut logger = Logger::start();
    let appender = GelfAppender::builder()
        .host("")
        .additional_field("novalue")
        .build();

    assert!(!appender.start());

    let records: Vec<_> = std::iter::from_fn(|| logger.pop()).collect();
    let errors: Vec<_> = records
        .iter()
        .filter(|r| r.target() == STATUS_TARGET && r.level() == log::Level::Error)
        .collect();
    assert_eq!(errors.len(), 2);
    assert!(errors[0].args().contains("novalue"));
    assert!(errors[1].args().contains("host"));
    assert_eq!(appender.status().statuses().len(), 2);
}
