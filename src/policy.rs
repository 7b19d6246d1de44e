//! Severity-aware delivery policy.
//!
//! Every message first gets a non-blocking enqueue on the primary
//! transport. When the primary queue is full, messages at or above the
//! blocking threshold wait for primary space; less severe messages are
//! either dropped or degraded to the secondary transport, depending on the
//! [`OverflowStrategy`]. Queue-full conditions are expected operating
//! conditions and are only counted, never logged per message.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{
    level::Severity,
    message::GelfMessage,
    transport::{Transport, TryEnqueueError},
};

/// What happens to less severe messages when the primary queue is full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OverflowStrategy {
    /// Discard the message.
    #[default]
    Drop,
    /// Route the message through the secondary transport.
    Failover,
}

impl OverflowStrategy {
    pub const NAMES: [&'static str; 2] = ["DROP", "FAILOVER"];

    pub fn needs_secondary(self) -> bool {
        self == OverflowStrategy::Failover
    }
}

impl fmt::Display for OverflowStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverflowStrategy::Drop => f.write_str("DROP"),
            OverflowStrategy::Failover => f.write_str("FAILOVER"),
        }
    }
}

impl FromStr for OverflowStrategy {
    type Err = ();

    /// `UDP` is accepted as an alias for `FAILOVER`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DROP" => Ok(Self::Drop),
            "FAILOVER" | "UDP" => Ok(Self::Failover),
            _ => Err(()),
        }
    }
}

/// Outcome of a single delivery decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Accepted by the primary without waiting.
    Primary,
    /// Accepted by the primary after waiting for queue space.
    PrimaryBlocking,
    /// Accepted by the secondary without waiting.
    Secondary,
    /// Accepted by the secondary after waiting for queue space.
    SecondaryBlocking,
    /// Discarded under the `Drop` strategy.
    Dropped,
    /// The target transport stopped before accepting the message.
    Abandoned,
}

/// Monotonic counters for each [`Delivery`] outcome.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    primary: AtomicU64,
    primary_blocking: AtomicU64,
    secondary: AtomicU64,
    secondary_blocking: AtomicU64,
    dropped: AtomicU64,
    abandoned: AtomicU64,
}

/// Point-in-time copy of [`DeliveryStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeliveryStatsSnapshot {
    pub primary: u64,
    pub primary_blocking: u64,
    pub secondary: u64,
    pub secondary_blocking: u64,
    pub dropped: u64,
    pub abandoned: u64,
}

impl DeliveryStats {
    fn record(&self, delivery: Delivery) {
        let counter = match delivery {
            Delivery::Primary => &self.primary,
            Delivery::PrimaryBlocking => &self.primary_blocking,
            Delivery::Secondary => &self.secondary,
            Delivery::SecondaryBlocking => &self.secondary_blocking,
            Delivery::Dropped => &self.dropped,
            Delivery::Abandoned => &self.abandoned,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DeliveryStatsSnapshot {
        DeliveryStatsSnapshot {
            primary: self.primary.load(Ordering::Relaxed),
            primary_blocking: self.primary_blocking.load(Ordering::Relaxed),
            secondary: self.secondary.load(Ordering::Relaxed),
            secondary_blocking: self.secondary_blocking.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }
}

/// Chooses transport and send mode for each message.
///
/// Holds only immutable configuration, the transports and atomic counters,
/// so [`deliver`](DeliveryPolicy::deliver) can run concurrently from any
/// number of producer threads.
pub struct DeliveryPolicy {
    strategy: OverflowStrategy,
    threshold: Severity,
    primary: Arc<dyn Transport>,
    secondary: Option<Arc<dyn Transport>>,
    stats: DeliveryStats,
}

impl DeliveryPolicy {
    /// Build a policy. `secondary` is only consulted under
    /// [`OverflowStrategy::Failover`]; without one, failover degrades to
    /// dropping.
    pub fn new(
        strategy: OverflowStrategy,
        threshold: Severity,
        primary: Arc<dyn Transport>,
        secondary: Option<Arc<dyn Transport>>,
    ) -> Self {
        Self {
            strategy,
            threshold,
            primary,
            secondary,
            stats: DeliveryStats::default(),
        }
    }

    pub fn strategy(&self) -> OverflowStrategy {
        self.strategy
    }

    pub fn threshold(&self) -> Severity {
        self.threshold
    }

    pub fn stats(&self) -> DeliveryStatsSnapshot {
        self.stats.snapshot()
    }

    pub(crate) fn primary(&self) -> &Arc<dyn Transport> {
        &self.primary
    }

    pub(crate) fn secondary(&self) -> Option<&Arc<dyn Transport>> {
        self.secondary.as_ref()
    }

    /// Route `message` and report what happened to it.
    pub fn deliver(&self, message: GelfMessage) -> Delivery {
        let delivery = self.route(message);
        self.stats.record(delivery);
        delivery
    }

    fn route(&self, message: GelfMessage) -> Delivery {
        let message = match self.primary.try_enqueue(message) {
            Ok(()) => return Delivery::Primary,
            Err(TryEnqueueError::Stopped(_)) => return Delivery::Abandoned,
            Err(TryEnqueueError::Full(message)) => message,
        };

        if message.severity().is_at_least(self.threshold) {
            return match self.primary.enqueue(message) {
                Ok(()) => Delivery::PrimaryBlocking,
                Err(_) => Delivery::Abandoned,
            };
        }

        match (self.strategy, &self.secondary) {
            (OverflowStrategy::Failover, Some(secondary)) => {
                let message = match secondary.try_enqueue(message) {
                    Ok(()) => return Delivery::Secondary,
                    Err(TryEnqueueError::Stopped(_)) => return Delivery::Abandoned,
                    Err(TryEnqueueError::Full(message)) => message,
                };
                match secondary.enqueue(message) {
                    Ok(()) => Delivery::SecondaryBlocking,
                    Err(_) => Delivery::Abandoned,
                }
            }
            _ => Delivery::Dropped,
        }
    }
}

impl fmt::Debug for DeliveryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryPolicy")
            .field("strategy", &self.strategy)
            .field("threshold", &self.threshold)
            .field("secondary", &self.secondary.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests;
