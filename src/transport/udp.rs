//! Lossy datagram transport.
//!
//! Messages are written once; send failures and oversized payloads drop the
//! message. Payloads larger than the configured datagram size are split
//! into GELF chunks sharing a random message id.

use std::{
    io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket},
    sync::Arc,
    time::Duration,
};

use log::warn;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng, rngs::StdRng};
use socket2::SockRef;

use crate::{message::GelfMessage, rate_limited_warner::RateLimitedWarner};

use super::{
    Protocol, Stopped, Transport, TransportConfig, TransportError, TryEnqueueError,
    queue::{MessageQueue, Next, WorkerPool, WorkerQueue},
    serialise::{chunk_datagram, encode_json},
};

fn resolve(config: &TransportConfig) -> Result<SocketAddr, TransportError> {
    let unresolved = || TransportError::Resolve {
        host: config.host.clone(),
        port: config.port,
    };
    (config.host.as_str(), config.port)
        .to_socket_addrs()
        .map_err(|_| unresolved())?
        .next()
        .ok_or_else(unresolved)
}

pub(super) fn bind_for(
    target: SocketAddr,
    send_buffer_size: Option<usize>,
) -> io::Result<UdpSocket> {
    let local = if target.is_ipv4() {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
    } else {
        SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
    };
    let socket = UdpSocket::bind(local)?;
    if let Some(size) = send_buffer_size {
        SockRef::from(&socket).set_send_buffer_size(size)?;
    }
    socket.connect(target)?;
    Ok(socket)
}

struct UdpWorker {
    socket: UdpSocket,
    max_chunk_size: usize,
    queue: WorkerQueue,
    rng: StdRng,
    warner: RateLimitedWarner,
}

impl UdpWorker {
    fn run(mut self, idle: Duration) {
        loop {
            match self.queue.next(idle) {
                Next::Message(message) => self.send(&message),
                Next::Idle => {}
                Next::Shutdown => break,
            }
        }
        while let Some(message) = self.queue.try_next() {
            self.send(&message);
        }
        self.warner.flush(|count| {
            warn!("femtogelf UDP transport dropped {count} messages");
        });
    }

    fn send(&mut self, message: &GelfMessage) {
        if let Err(err) = self.try_send(message) {
            self.warner.record_failure();
            self.warner.warn_if_due(|count| {
                warn!("femtogelf UDP transport dropped {count} messages: {err}");
            });
        }
    }

    fn try_send(&mut self, message: &GelfMessage) -> io::Result<()> {
        let payload = encode_json(message)?;
        let message_id: [u8; 8] = self.rng.r#gen();
        let chunks = chunk_datagram(&payload, self.max_chunk_size, message_id).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("payload of {} bytes needs too many chunks", payload.len()),
            )
        })?;
        for chunk in chunks {
            self.socket.send(&chunk)?;
        }
        Ok(())
    }
}

/// GELF over UDP.
pub struct UdpTransport {
    queue: Arc<MessageQueue>,
    workers: WorkerPool,
    shutdown_timeout: Duration,
}

impl UdpTransport {
    /// Resolve the collector, bind one socket per worker and spawn the
    /// workers.
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        config.check()?;
        let target = resolve(&config)?;
        let sockets = (0..config.threads)
            .map(|_| bind_for(target, config.send_buffer_size))
            .collect::<io::Result<Vec<_>>>()?;
        let sockets = Arc::new(Mutex::new(
            sockets.into_iter().map(Some).collect::<Vec<_>>(),
        ));
        let queue = Arc::new(MessageQueue::new(config.queue_capacity));
        let worker_end = queue.worker_end();
        let max_chunk_size = config.max_chunk_size;
        let idle = config.queue_drain_interval;
        let workers = WorkerPool::spawn(Protocol::Udp, config.threads, move |index| {
            let Some(socket) = sockets.lock().get_mut(index).and_then(Option::take) else {
                return;
            };
            UdpWorker {
                socket,
                max_chunk_size,
                queue: worker_end.clone(),
                rng: StdRng::from_entropy(),
                warner: RateLimitedWarner::default(),
            }
            .run(idle);
        })?;
        Ok(Self {
            queue,
            workers,
            shutdown_timeout: config.shutdown_timeout,
        })
    }
}

impl Transport for UdpTransport {
    fn protocol(&self) -> Protocol {
        Protocol::Udp
    }

    fn try_enqueue(&self, message: GelfMessage) -> Result<(), TryEnqueueError> {
        self.queue.try_enqueue(message)
    }

    fn enqueue(&self, message: GelfMessage) -> Result<(), Stopped> {
        self.queue.enqueue(message)
    }

    fn stop(&self) -> Result<(), TransportError> {
        self.queue.stop();
        self.workers.join(self.shutdown_timeout)
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!("femtogelf UDP transport did not stop cleanly: {err}");
        }
    }
}

impl std::fmt::Debug for UdpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpTransport")
            .field("stopped", &self.queue.is_stopped())
            .finish()
    }
}
