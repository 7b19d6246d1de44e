//! Loopback GELF collectors used to observe what the transports send.

use std::io::Read;
use std::net::{TcpListener, UdpSocket};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde_json::Value;

/// TCP collector accepting a single connection and returning every
/// NUL-delimited frame once the sender closes it.
pub struct TcpCollector {
    port: u16,
    handle: JoinHandle<Vec<Value>>,
}

impl TcpCollector {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind tcp collector");
        let port = listener.local_addr().expect("collector addr").port();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept sender");
            stream
                .set_read_timeout(Some(Duration::from_secs(10)))
                .expect("read timeout");
            let mut received = Vec::new();
            stream.read_to_end(&mut received).expect("read frames");
            received
                .split(|b| *b == 0)
                .filter(|frame| !frame.is_empty())
                .map(|frame| serde_json::from_slice(frame).expect("json frame"))
                .collect()
        });
        Self { port, handle }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Wait for the sender to disconnect and return the decoded frames.
    pub fn frames(self) -> Vec<Value> {
        self.handle.join().expect("collector thread")
    }
}

/// UDP collector decoding unchunked datagrams.
pub struct UdpCollector {
    socket: UdpSocket,
}

impl UdpCollector {
    pub fn start() -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").expect("bind udp collector");
        socket
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("read timeout");
        Self { socket }
    }

    pub fn port(&self) -> u16 {
        self.socket.local_addr().expect("collector addr").port()
    }

    pub fn next(&self) -> Value {
        let mut buf = vec![0u8; 65_536];
        let len = self.socket.recv(&mut buf).expect("datagram");
        serde_json::from_slice(&buf[..len]).expect("json datagram")
    }
}
