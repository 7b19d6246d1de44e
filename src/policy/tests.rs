//! Tests for the delivery policy decision logic.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rstest::rstest;

use super::*;
use crate::test_utils::{EnqueueMode, FakeTransport, message};
use crate::transport::Protocol;

fn policy(
    strategy: OverflowStrategy,
    primary: &Arc<FakeTransport>,
    secondary: Option<&Arc<FakeTransport>>,
) -> DeliveryPolicy {
    DeliveryPolicy::new(
        strategy,
        Severity::Warning,
        Arc::clone(primary) as Arc<dyn Transport>,
        secondary.map(|s| Arc::clone(s) as Arc<dyn Transport>),
    )
}

#[rstest]
#[case(OverflowStrategy::Drop)]
#[case(OverflowStrategy::Failover)]
fn free_primary_accepts_without_blocking(#[case] strategy: OverflowStrategy) {
    let primary = Arc::new(FakeTransport::new(Protocol::Tcp));
    let secondary = Arc::new(FakeTransport::new(Protocol::Udp));
    let policy = policy(strategy, &primary, Some(&secondary));

    let outcome = policy.deliver(message(Severity::Debug, "routine"));

    assert_eq!(outcome, Delivery::Primary);
    assert_eq!(primary.enqueue_calls(), 0);
    assert_eq!(secondary.interactions(), 0);
}

#[rstest]
#[case(Severity::Warning)]
#[case(Severity::Error)]
#[case(Severity::Critical)]
#[case(Severity::Emergency)]
fn severe_messages_block_on_primary_until_space_frees(#[case] severity: Severity) {
    let primary = Arc::new(FakeTransport::new(Protocol::Tcp).full_for(5));
    let secondary = Arc::new(FakeTransport::new(Protocol::Udp));
    let policy = policy(OverflowStrategy::Failover, &primary, Some(&secondary));

    let outcome = policy.deliver(message(severity, "important"));

    assert_eq!(outcome, Delivery::PrimaryBlocking);
    assert_eq!(primary.try_calls(), 1);
    assert_eq!(primary.enqueue_calls(), 1);
    let accepted = primary.accepted();
    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0].0, EnqueueMode::Blocking);
    assert_eq!(secondary.interactions(), 0);
}

#[rstest]
#[case(Severity::Notice)]
#[case(Severity::Informational)]
#[case(Severity::Debug)]
fn drop_strategy_discards_less_severe_messages(#[case] severity: Severity) {
    let primary = Arc::new(FakeTransport::new(Protocol::Tcp).always_full());
    let secondary = Arc::new(FakeTransport::new(Protocol::Udp));
    let policy = policy(OverflowStrategy::Drop, &primary, Some(&secondary));

    let outcome = policy.deliver(message(severity, "chatty"));

    assert_eq!(outcome, Delivery::Dropped);
    assert!(primary.accepted().is_empty());
    assert_eq!(primary.enqueue_calls(), 0);
    assert_eq!(secondary.interactions(), 0);
    assert_eq!(policy.stats().dropped, 1);
}

#[test]
fn failover_prefers_non_blocking_secondary() {
    let primary = Arc::new(FakeTransport::new(Protocol::Tcp).always_full());
    let secondary = Arc::new(FakeTransport::new(Protocol::Udp));
    let policy = policy(OverflowStrategy::Failover, &primary, Some(&secondary));

    let outcome = policy.deliver(message(Severity::Informational, "degraded"));

    assert_eq!(outcome, Delivery::Secondary);
    assert_eq!(secondary.accepted_texts(), vec!["degraded"]);
    assert_eq!(secondary.enqueue_calls(), 0);
    assert_eq!(primary.enqueue_calls(), 0);
}

#[test]
fn failover_blocks_on_secondary_when_both_queues_are_full() {
    let primary = Arc::new(FakeTransport::new(Protocol::Tcp).always_full());
    let secondary = Arc::new(FakeTransport::new(Protocol::Udp).full_for(3));
    let policy = policy(OverflowStrategy::Failover, &primary, Some(&secondary));

    let outcome = policy.deliver(message(Severity::Debug, "eventually"));

    assert_eq!(outcome, Delivery::SecondaryBlocking);
    assert_eq!(secondary.try_calls(), 1);
    assert_eq!(secondary.enqueue_calls(), 1);
    assert_eq!(secondary.accepted()[0].0, EnqueueMode::Blocking);
    assert_eq!(primary.enqueue_calls(), 0, "must never escalate to primary");
}

#[test]
fn failover_without_secondary_drops() {
    let primary = Arc::new(FakeTransport::new(Protocol::Tcp).always_full());
    let policy = policy(OverflowStrategy::Failover, &primary, None);

    assert_eq!(
        policy.deliver(message(Severity::Debug, "nowhere")),
        Delivery::Dropped
    );
}

#[test]
fn stopped_primary_abandons_without_blocking() {
    let primary = Arc::new(FakeTransport::new(Protocol::Tcp));
    primary.stop().expect("fake stop");
    let policy = policy(OverflowStrategy::Drop, &primary, None);

    assert_eq!(
        policy.deliver(message(Severity::Error, "late")),
        Delivery::Abandoned
    );
    assert_eq!(primary.enqueue_calls(), 0);
}

#[test]
fn blocked_producer_is_released_by_stop() {
    let primary = Arc::new(
        FakeTransport::new(Protocol::Tcp)
            .always_full()
            .hold_until_stopped(),
    );
    let policy = Arc::new(policy(OverflowStrategy::Drop, &primary, None));

    let producer = {
        let policy = Arc::clone(&policy);
        thread::spawn(move || policy.deliver(message(Severity::Error, "stuck")))
    };
    while primary.enqueue_calls() == 0 {
        thread::sleep(Duration::from_millis(1));
    }
    primary.stop().expect("fake stop");

    assert_eq!(producer.join().expect("producer"), Delivery::Abandoned);
    assert_eq!(policy.stats().abandoned, 1);
}

#[test]
fn stats_count_each_outcome() {
    let primary = Arc::new(FakeTransport::new(Protocol::Tcp).full_for(2));
    let secondary = Arc::new(FakeTransport::new(Protocol::Udp));
    let policy = policy(OverflowStrategy::Failover, &primary, Some(&secondary));

    policy.deliver(message(Severity::Debug, "to secondary"));
    policy.deliver(message(Severity::Error, "blocking"));
    policy.deliver(message(Severity::Debug, "primary again"));

    let stats = policy.stats();
    assert_eq!(stats.secondary, 1);
    assert_eq!(stats.primary_blocking, 1);
    assert_eq!(stats.primary, 1);
}

#[rstest]
#[case("DROP", Ok(OverflowStrategy::Drop))]
#[case("FAILOVER", Ok(OverflowStrategy::Failover))]
#[case("UDP", Ok(OverflowStrategy::Failover))]
#[case("drop", Err(()))]
#[case("RETRY", Err(()))]
fn parses_strategy_names(#[case] input: &str, #[case] expected: Result<OverflowStrategy, ()>) {
    assert_eq!(input.parse::<OverflowStrategy>(), expected);
}
