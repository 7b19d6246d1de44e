//! Bounded message queue and worker pool shared by both transports.
//!
//! Producers push into a bounded crossbeam channel. Shutdown is signalled
//! by dropping the only sender of a second channel: every receiver of that
//! channel, including producers blocked in [`MessageQueue::enqueue`] and
//! workers waiting for messages, observes the disconnect at once.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{
    Receiver, RecvTimeoutError, Select, Sender, TryRecvError, TrySendError, bounded,
};
use parking_lot::Mutex;

use crate::message::GelfMessage;

use super::{Protocol, Stopped, TransportError, TryEnqueueError};

pub(crate) struct MessageQueue {
    tx: Sender<GelfMessage>,
    rx: Receiver<GelfMessage>,
    shutdown_tx: Mutex<Option<Sender<()>>>,
    shutdown_rx: Receiver<()>,
    stopped: AtomicBool,
}

impl MessageQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        let (shutdown_tx, shutdown_rx) = bounded(0);
        Self {
            tx,
            rx,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            shutdown_rx,
            stopped: AtomicBool::new(false),
        }
    }

    /// Handle given to each worker thread.
    pub(crate) fn worker_end(&self) -> WorkerQueue {
        WorkerQueue {
            rx: self.rx.clone(),
            shutdown_rx: self.shutdown_rx.clone(),
        }
    }

    pub(crate) fn try_enqueue(&self, message: GelfMessage) -> Result<(), TryEnqueueError> {
        if self.is_stopped() {
            return Err(TryEnqueueError::Stopped(message));
        }
        match self.tx.try_send(message) {
            Ok(()) => self
                .reclaim_if_stopped()
                .map_err(|Stopped(message)| TryEnqueueError::Stopped(message)),
            Err(TrySendError::Full(message)) => Err(TryEnqueueError::Full(message)),
            Err(TrySendError::Disconnected(message)) => Err(TryEnqueueError::Stopped(message)),
        }
    }

    /// Wait for space unless the queue stops first. Shutdown takes priority
    /// over a send that becomes possible at the same moment.
    pub(crate) fn enqueue(&self, mut message: GelfMessage) -> Result<(), Stopped> {
        let mut select = Select::new();
        let send_index = select.send(&self.tx);
        select.recv(&self.shutdown_rx);
        loop {
            if self.is_stopped() {
                return Err(Stopped(message));
            }
            if select.ready() != send_index {
                continue;
            }
            match self.tx.try_send(message) {
                Ok(()) => return self.reclaim_if_stopped(),
                Err(TrySendError::Full(back)) => message = back,
                Err(TrySendError::Disconnected(back)) => return Err(Stopped(back)),
            }
        }
    }

    /// A push that raced with `stop` may land after the workers finished
    /// draining. Take one message back so it is reported as stopped rather
    /// than stranded; if a worker already took it, the push counts.
    fn reclaim_if_stopped(&self) -> Result<(), Stopped> {
        if !self.is_stopped() {
            return Ok(());
        }
        match self.rx.try_recv() {
            Ok(message) => Err(Stopped(message)),
            Err(_) => Ok(()),
        }
    }

    /// Signal shutdown. Returns `false` when already stopped.
    pub(crate) fn stop(&self) -> bool {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.shutdown_tx.lock().take();
        true
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.tx.len()
    }
}

/// Next step for a worker thread.
pub(crate) enum Next {
    Message(GelfMessage),
    /// The queue is idle for a whole drain interval.
    Idle,
    Shutdown,
}

/// Consumer side of a [`MessageQueue`].
#[derive(Clone)]
pub(crate) struct WorkerQueue {
    rx: Receiver<GelfMessage>,
    shutdown_rx: Receiver<()>,
}

impl WorkerQueue {
    /// Wait up to `idle` for the next message or for shutdown.
    pub(crate) fn next(&self, idle: Duration) -> Next {
        let mut select = Select::new();
        let msg_index = select.recv(&self.rx);
        select.recv(&self.shutdown_rx);
        match select.select_timeout(idle) {
            Err(_) => Next::Idle,
            Ok(oper) if oper.index() == msg_index => match oper.recv(&self.rx) {
                Ok(message) => Next::Message(message),
                Err(_) => Next::Shutdown,
            },
            Ok(oper) => {
                let _ = oper.recv(&self.shutdown_rx);
                Next::Shutdown
            }
        }
    }

    /// Pop a queued message without waiting; used while draining.
    pub(crate) fn try_next(&self) -> Option<GelfMessage> {
        match self.rx.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Sleep for `delay` unless shutdown is signalled first. Returns `true`
    /// when shutdown interrupted the sleep.
    pub(crate) fn sleep_or_shutdown(&self, delay: Duration) -> bool {
        matches!(
            self.shutdown_rx.recv_timeout(delay),
            Err(RecvTimeoutError::Disconnected) | Ok(())
        )
    }
}

/// Worker threads draining one transport's queue.
pub(crate) struct WorkerPool {
    protocol: Protocol,
    handles: Mutex<Vec<JoinHandle<()>>>,
    done_rx: Receiver<()>,
}

impl WorkerPool {
    /// Spawn `threads` workers. Each worker runs `run` until it returns.
    pub(crate) fn spawn<F>(protocol: Protocol, threads: usize, run: F) -> Result<Self, TransportError>
    where
        F: Fn(usize) + Send + Clone + 'static,
    {
        // Workers never send on this channel; the pool waits for every
        // clone of `done_tx` to be dropped.
        let (done_tx, done_rx) = bounded::<()>(0);
        let mut handles = Vec::with_capacity(threads);
        for index in 0..threads {
            let run = run.clone();
            let done_tx = done_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("femtogelf-{}-{index}", protocol.to_string().to_lowercase()))
                .spawn(move || {
                    let _done = done_tx;
                    run(index);
                })?;
            handles.push(handle);
        }
        Ok(Self {
            protocol,
            handles: Mutex::new(handles),
            done_rx,
        })
    }

    /// Wait for all workers to finish within `timeout`, then join them.
    pub(crate) fn join(&self, timeout: Duration) -> Result<(), TransportError> {
        let handles = std::mem::take(&mut *self.handles.lock());
        if handles.is_empty() {
            return Ok(());
        }
        let deadline = Instant::now() + timeout;
        loop {
            match self.done_rx.recv_deadline(deadline) {
                Ok(()) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(TransportError::StopTimedOut(self.protocol));
                }
            }
        }
        let mut panicked = false;
        for handle in handles {
            panicked |= handle.join().is_err();
        }
        if panicked {
            return Err(TransportError::WorkerPanicked(self.protocol));
        }
        Ok(())
    }
}
