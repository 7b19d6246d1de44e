//! Scriptable in-memory transport.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded};
use parking_lot::Mutex;

use crate::{
    message::GelfMessage,
    transport::{Protocol, Stopped, Transport, TransportError, TryEnqueueError},
};

/// How a message reached the fake's queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnqueueMode {
    NonBlocking,
    Blocking,
}

/// Transport that records every message it accepts.
///
/// The queue can be scripted to report "full" for a number of attempts:
/// each `try_enqueue` consumes one attempt, and a blocking `enqueue` keeps
/// waiting, consuming attempts, until none remain.
pub struct FakeTransport {
    protocol: Protocol,
    full_attempts: AtomicUsize,
    try_always_full: bool,
    hold_until_stopped: bool,
    fail_stop: bool,
    stopped: AtomicBool,
    stop_tx: Mutex<Option<Sender<()>>>,
    stop_rx: Receiver<()>,
    try_calls: AtomicUsize,
    enqueue_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    accepted: Mutex<Vec<(EnqueueMode, GelfMessage)>>,
}

impl FakeTransport {
    pub fn new(protocol: Protocol) -> Self {
        let (stop_tx, stop_rx) = bounded(0);
        Self {
            protocol,
            full_attempts: AtomicUsize::new(0),
            try_always_full: false,
            hold_until_stopped: false,
            fail_stop: false,
            stopped: AtomicBool::new(false),
            stop_tx: Mutex::new(Some(stop_tx)),
            stop_rx,
            try_calls: AtomicUsize::new(0),
            enqueue_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            accepted: Mutex::new(Vec::new()),
        }
    }

    /// Report a full queue for the next `attempts` attempts.
    pub fn full_for(self, attempts: usize) -> Self {
        self.full_attempts.store(attempts, Ordering::SeqCst);
        self
    }

    /// Every `try_enqueue` reports a full queue.
    pub fn always_full(mut self) -> Self {
        self.try_always_full = true;
        self
    }

    /// Blocking `enqueue` waits until the transport is stopped.
    pub fn hold_until_stopped(mut self) -> Self {
        self.hold_until_stopped = true;
        self
    }

    /// `stop` reports a worker panic.
    pub fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    pub fn try_calls(&self) -> usize {
        self.try_calls.load(Ordering::SeqCst)
    }

    pub fn enqueue_calls(&self) -> usize {
        self.enqueue_calls.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    /// Total number of `try_enqueue` and `enqueue` calls.
    pub fn interactions(&self) -> usize {
        self.try_calls() + self.enqueue_calls()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn accepted(&self) -> Vec<(EnqueueMode, GelfMessage)> {
        self.accepted.lock().clone()
    }

    pub fn accepted_texts(&self) -> Vec<String> {
        self.accepted
            .lock()
            .iter()
            .map(|(_, m)| m.short_message().to_owned())
            .collect()
    }

    fn consume_full_attempt(&self) -> bool {
        self.full_attempts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn accept(&self, mode: EnqueueMode, message: GelfMessage) {
        self.accepted.lock().push((mode, message));
    }
}

impl Transport for FakeTransport {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    fn try_enqueue(&self, message: GelfMessage) -> Result<(), TryEnqueueError> {
        self.try_calls.fetch_add(1, Ordering::SeqCst);
        if self.is_stopped() {
            return Err(TryEnqueueError::Stopped(message));
        }
        if self.try_always_full || self.consume_full_attempt() {
            return Err(TryEnqueueError::Full(message));
        }
        self.accept(EnqueueMode::NonBlocking, message);
        Ok(())
    }

    fn enqueue(&self, message: GelfMessage) -> Result<(), Stopped> {
        self.enqueue_calls.fetch_add(1, Ordering::SeqCst);
        if self.hold_until_stopped {
            let _ = self.stop_rx.recv();
            return Err(Stopped(message));
        }
        while self.consume_full_attempt() {
            if self.is_stopped() {
                return Err(Stopped(message));
            }
            thread::sleep(Duration::from_millis(1));
        }
        if self.is_stopped() {
            return Err(Stopped(message));
        }
        self.accept(EnqueueMode::Blocking, message);
        Ok(())
    }

    fn stop(&self) -> Result<(), TransportError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.stopped.store(true, Ordering::SeqCst);
        self.stop_tx.lock().take();
        if self.fail_stop {
            return Err(TransportError::WorkerPanicked(self.protocol));
        }
        Ok(())
    }
}
