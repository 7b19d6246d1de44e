//! Reliable stream transport with optional TLS.
//!
//! Each worker owns one connection. A message that cannot be written is
//! kept and retried after the reconnect delay until it is accepted or the
//! shutdown drain deadline passes, so a slow collector backs the queue up
//! instead of losing messages.

use std::{
    io::{self, BufWriter, Write},
    net::{SocketAddr, TcpStream, ToSocketAddrs},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use log::warn;
use native_tls::{TlsConnector, TlsStream};
use socket2::SockRef;

use crate::{message::GelfMessage, rate_limited_warner::RateLimitedWarner};

use super::{
    Protocol, Stopped, Transport, TransportConfig, TransportError, TryEnqueueError,
    queue::{MessageQueue, Next, WorkerPool, WorkerQueue},
    serialise::{encode_json, frame_tcp},
};

const WRITE_BUFFER: usize = 8 * 1024;

/// Active socket connection state.
enum ActiveConnection {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Write for ActiveConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            ActiveConnection::Plain(stream) => stream.write(buf),
            ActiveConnection::Tls(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            ActiveConnection::Plain(stream) => stream.flush(),
            ActiveConnection::Tls(stream) => stream.flush(),
        }
    }
}

fn build_connector(config: &TransportConfig) -> Result<Option<TlsConnector>, TransportError> {
    if !config.tls_enabled {
        return Ok(None);
    }
    let mut builder = TlsConnector::builder();
    if !config.tls_cert_verification {
        builder.danger_accept_invalid_certs(true);
        builder.danger_accept_invalid_hostnames(true);
    }
    builder
        .build()
        .map(Some)
        .map_err(|err| TransportError::Tls(err.to_string()))
}

fn socket_addrs(config: &TransportConfig) -> io::Result<Vec<SocketAddr>> {
    (config.host.as_str(), config.port)
        .to_socket_addrs()
        .map(|iter| iter.collect())
}

fn tune(stream: &TcpStream, config: &TransportConfig) -> io::Result<()> {
    stream.set_nodelay(config.tcp_no_delay)?;
    let socket = SockRef::from(stream);
    socket.set_keepalive(config.tcp_keep_alive)?;
    if let Some(size) = config.send_buffer_size {
        socket.set_send_buffer_size(size)?;
    }
    Ok(())
}

pub(super) fn connect_tcp(config: &TransportConfig) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in socket_addrs(config)? {
        match TcpStream::connect_timeout(&addr, config.connect_timeout) {
            Ok(stream) => {
                tune(&stream, config)?;
                return Ok(stream);
            }
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no addresses for {}:{}", config.host, config.port),
        )
    }))
}

fn connect(
    config: &TransportConfig,
    connector: Option<&TlsConnector>,
) -> io::Result<BufWriter<ActiveConnection>> {
    let stream = connect_tcp(config)?;
    let connection = match connector {
        Some(connector) => {
            stream.set_read_timeout(Some(config.connect_timeout))?;
            stream.set_write_timeout(Some(config.connect_timeout))?;
            let stream = connector
                .connect(&config.host, stream)
                .map_err(io::Error::other)?;
            stream.get_ref().set_read_timeout(None)?;
            ActiveConnection::Tls(Box::new(stream))
        }
        None => ActiveConnection::Plain(stream),
    };
    Ok(BufWriter::with_capacity(WRITE_BUFFER, connection))
}

struct TcpWorker {
    config: TransportConfig,
    connector: Option<TlsConnector>,
    queue: WorkerQueue,
    connection: Option<BufWriter<ActiveConnection>>,
    unflushed: usize,
    last_flush: Instant,
    drain_deadline: Option<Instant>,
    warner: RateLimitedWarner,
}

impl TcpWorker {
    fn new(config: TransportConfig, connector: Option<TlsConnector>, queue: WorkerQueue) -> Self {
        Self {
            config,
            connector,
            queue,
            connection: None,
            unflushed: 0,
            last_flush: Instant::now(),
            drain_deadline: None,
            warner: RateLimitedWarner::default(),
        }
    }

    fn run(mut self) {
        loop {
            match self.queue.next(self.config.queue_drain_interval) {
                Next::Message(message) => self.handle(message),
                Next::Idle => self.flush_if_due(true),
                Next::Shutdown => break,
            }
        }
        if self.drain_deadline.is_none() {
            self.drain_deadline = Some(Instant::now() + self.config.shutdown_timeout);
        }
        while let Some(message) = self.queue.try_next() {
            if self.deadline_passed() {
                break;
            }
            self.handle(message);
        }
        self.flush_if_due(true);
        self.warner.flush(|count| {
            warn!("femtogelf TCP transport failed to deliver {count} messages");
        });
    }

    fn deadline_passed(&self) -> bool {
        self.drain_deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    fn handle(&mut self, message: GelfMessage) {
        let frame = match encode_json(&message) {
            Ok(payload) => frame_tcp(payload),
            Err(err) => {
                warn!("femtogelf TCP transport serialisation error: {err}");
                return;
            }
        };
        loop {
            match self.write_frame(&frame) {
                Ok(()) => {
                    self.flush_if_due(self.queue.is_empty());
                    return;
                }
                Err(err) => {
                    self.connection = None;
                    self.unflushed = 0;
                    self.warner.record_failure();
                    self.warner.warn_if_due(|count| {
                        warn!(
                            "femtogelf TCP transport cannot reach {}:{}: {err}; {count} failed attempts",
                            self.config.host, self.config.port
                        );
                    });
                }
            }
            if !self.wait_before_retry() {
                return;
            }
        }
    }

    /// Sleep for the reconnect delay. Returns `false` when the message
    /// should be given up because the drain deadline has passed.
    fn wait_before_retry(&mut self) -> bool {
        match self.drain_deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return false;
                }
                thread::sleep(self.config.reconnect_delay.min(deadline - now));
                true
            }
            None => {
                if self.queue.sleep_or_shutdown(self.config.reconnect_delay) {
                    self.drain_deadline = Some(Instant::now() + self.config.shutdown_timeout);
                }
                true
            }
        }
    }

    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        if self.connection.is_none() {
            self.connection = Some(connect(&self.config, self.connector.as_ref())?);
            self.last_flush = Instant::now();
        }
        let Some(conn) = self.connection.as_mut() else {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "no connection"));
        };
        conn.write_all(frame)?;
        self.unflushed += 1;
        Ok(())
    }

    fn flush_if_due(&mut self, force: bool) {
        if self.unflushed == 0 {
            return;
        }
        let due = force
            || self.unflushed >= self.config.max_inflight_sends
            || self.last_flush.elapsed() >= self.config.queue_drain_interval;
        if !due {
            return;
        }
        if let Some(conn) = self.connection.as_mut()
            && let Err(err) = conn.flush()
        {
            warn!(
                "femtogelf TCP transport lost {} buffered messages: {err}",
                self.unflushed
            );
            self.connection = None;
        }
        self.unflushed = 0;
        self.last_flush = Instant::now();
    }
}

/// GELF over TCP, optionally wrapped in TLS.
pub struct TcpTransport {
    queue: Arc<MessageQueue>,
    workers: WorkerPool,
    shutdown_timeout: Duration,
}

impl TcpTransport {
    /// Validate `config`, prepare TLS and spawn the worker threads. The
    /// collector is contacted lazily by the workers.
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        config.check()?;
        let connector = build_connector(&config)?;
        let queue = Arc::new(MessageQueue::new(config.queue_capacity));
        let worker_end = queue.worker_end();
        let shutdown_timeout = config.shutdown_timeout;
        let threads = config.threads;
        let workers = WorkerPool::spawn(Protocol::Tcp, threads, move |_| {
            TcpWorker::new(config.clone(), connector.clone(), worker_end.clone()).run();
        })?;
        Ok(Self {
            queue,
            workers,
            shutdown_timeout,
        })
    }

    #[cfg(test)]
    pub(crate) fn queued(&self) -> usize {
        self.queue.len()
    }
}

impl Transport for TcpTransport {
    fn protocol(&self) -> Protocol {
        Protocol::Tcp
    }

    fn try_enqueue(&self, message: GelfMessage) -> Result<(), TryEnqueueError> {
        self.queue.try_enqueue(message)
    }

    fn enqueue(&self, message: GelfMessage) -> Result<(), Stopped> {
        self.queue.enqueue(message)
    }

    fn stop(&self) -> Result<(), TransportError> {
        self.queue.stop();
        self.workers.join(self.shutdown_timeout + Duration::from_millis(250))
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!("femtogelf TCP transport did not stop cleanly: {err}");
        }
    }
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("stopped", &self.queue.is_stopped())
            .finish()
    }
}
