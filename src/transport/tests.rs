//! Tests for GELF serialisation, queues and the socket transports.

use std::io::Read;
use std::net::{TcpListener, UdpSocket};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use rstest::rstest;
use serde_json::Value;
use socket2::SockRef;

use super::queue::MessageQueue;
use super::serialise::{CHUNK_HEADER_LEN, CHUNK_MAGIC};
use super::tcp::connect_tcp;
use super::udp::bind_for;
use super::*;
use crate::level::Severity;
use crate::test_utils::message;

fn sample() -> GelfMessage {
    GelfMessage::builder("disk almost full", "web-01")
        .severity(Severity::Warning)
        .timestamp(Utc.timestamp_millis_opt(1_700_000_000_250).unwrap())
        .full_message("disk almost full\n/dev/sda1 at 97%")
        .field("env", "prod")
        .field("_attempt", 3_i64)
        .field("id", "reserved")
        .build()
}

fn json(message: &GelfMessage) -> Value {
    serde_json::from_slice(&encode_json(message).expect("encode")).expect("valid json")
}

#[test]
fn json_carries_gelf_core_fields() {
    let value = json(&sample());
    assert_eq!(value["version"], "1.1");
    assert_eq!(value["host"], "web-01");
    assert_eq!(value["short_message"], "disk almost full");
    assert_eq!(value["full_message"], "disk almost full\n/dev/sda1 at 97%");
    assert_eq!(value["level"], 4);
    assert_eq!(value["timestamp"].as_f64(), Some(1_700_000_000.25));
}

#[test]
fn json_prefixes_additional_fields_and_skips_id() {
    let value = json(&sample());
    assert_eq!(value["_env"], "prod");
    assert_eq!(value["_attempt"], 3);
    assert!(value.get("_id").is_none());
    assert!(value.get("env").is_none());
}

#[test]
fn json_omits_absent_full_message() {
    let value = json(&message(Severity::Debug, "short"));
    assert!(value.get("full_message").is_none());
}

#[test]
fn tcp_frames_end_with_nul() {
    let frame = frame_tcp(b"{}".to_vec());
    assert_eq!(frame, b"{}\0");
}

#[test]
fn small_payload_is_sent_unchunked() {
    let chunks = chunk_datagram(b"hello", 64, [7; 8]).expect("fits");
    assert_eq!(chunks, vec![b"hello".to_vec()]);
}

#[test]
fn large_payload_is_split_into_numbered_chunks() {
    let payload: Vec<u8> = (0..200u8).collect();
    let id = [1, 2, 3, 4, 5, 6, 7, 8];
    let chunks = chunk_datagram(&payload, 64, id).expect("chunked");

    let body = 64 - CHUNK_HEADER_LEN;
    assert_eq!(chunks.len(), payload.len().div_ceil(body));
    for (seq, chunk) in chunks.iter().enumerate() {
        assert_eq!(&chunk[..2], &CHUNK_MAGIC);
        assert_eq!(&chunk[2..10], &id);
        assert_eq!(chunk[10] as usize, seq);
        assert_eq!(chunk[11] as usize, chunks.len());
        assert!(chunk.len() <= 64);
    }
    let rebuilt: Vec<u8> = chunks
        .iter()
        .flat_map(|c| c[CHUNK_HEADER_LEN..].to_vec())
        .collect();
    assert_eq!(rebuilt, payload);
}

#[test]
fn payload_needing_too_many_chunks_is_refused() {
    let body = 64 - CHUNK_HEADER_LEN;
    let payload = vec![b'x'; body * MAX_CHUNKS + 1];
    assert!(chunk_datagram(&payload, 64, [0; 8]).is_none());
}

#[test]
fn full_queue_hands_message_back() {
    let queue = MessageQueue::new(1);
    queue
        .try_enqueue(message(Severity::Debug, "first"))
        .expect("space");
    let err = queue
        .try_enqueue(message(Severity::Debug, "second"))
        .expect_err("full");
    assert!(err.is_full());
    assert_eq!(err.into_message().short_message(), "second");
    assert_eq!(queue.len(), 1);
}

#[test]
fn stop_wakes_blocked_producer() {
    let queue = Arc::new(MessageQueue::new(1));
    queue
        .try_enqueue(message(Severity::Debug, "occupies"))
        .expect("space");
    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || queue.enqueue(message(Severity::Error, "waiting")))
    };
    thread::sleep(Duration::from_millis(20));

    assert!(queue.stop());
    let result = producer.join().expect("producer");
    assert_eq!(result.expect_err("stopped").0.short_message(), "waiting");
}

#[test]
fn stop_wins_over_space_freed_while_draining() {
    let queue = Arc::new(MessageQueue::new(1));
    let worker = queue.worker_end();
    queue
        .try_enqueue(message(Severity::Debug, "occupies"))
        .expect("space");
    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || queue.enqueue(message(Severity::Error, "waiting")))
    };
    thread::sleep(Duration::from_millis(20));

    assert!(queue.stop());
    assert!(worker.try_next().is_some());
    let result = producer.join().expect("producer");
    assert_eq!(result.expect_err("stopped").0.short_message(), "waiting");
    assert!(worker.try_next().is_none());
}

#[test]
fn queue_stop_is_idempotent() {
    let queue = MessageQueue::new(4);
    assert!(queue.stop());
    assert!(!queue.stop());
    assert!(matches!(
        queue.try_enqueue(message(Severity::Debug, "late")),
        Err(TryEnqueueError::Stopped(_))
    ));
}

fn local_config(protocol: Protocol, port: u16) -> TransportConfig {
    TransportConfig {
        host: "127.0.0.1".into(),
        port,
        protocol,
        queue_drain_interval: Duration::from_millis(20),
        reconnect_delay: Duration::from_millis(20),
        connect_timeout: Duration::from_secs(2),
        shutdown_timeout: Duration::from_secs(2),
        ..TransportConfig::default()
    }
}

#[test]
fn tcp_socket_options_are_applied() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let config = TransportConfig {
        tcp_keep_alive: true,
        tcp_no_delay: true,
        send_buffer_size: Some(65_536),
        ..local_config(Protocol::Tcp, port)
    };

    let stream = connect_tcp(&config).expect("connect");
    let socket = SockRef::from(&stream);
    assert!(socket.keepalive().expect("keepalive"));
    assert!(stream.nodelay().expect("nodelay"));
    assert!(socket.send_buffer_size().expect("sndbuf") >= 65_536);
}

#[test]
fn tcp_keep_alive_stays_off_by_default() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();

    let stream = connect_tcp(&local_config(Protocol::Tcp, port)).expect("connect");
    assert!(!SockRef::from(&stream).keepalive().expect("keepalive"));
}

#[test]
fn udp_send_buffer_size_is_applied() {
    let receiver = UdpSocket::bind("127.0.0.1:0").expect("bind");
    let target = receiver.local_addr().expect("addr");

    let socket = bind_for(target, Some(65_536)).expect("socket");
    assert!(SockRef::from(&socket).send_buffer_size().expect("sndbuf") >= 65_536);
}

#[test]
fn tcp_transport_delivers_nul_framed_json() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let transport = TcpTransport::new(local_config(Protocol::Tcp, port)).expect("transport");

    transport
        .try_enqueue(message(Severity::Error, "one"))
        .expect("enqueue");
    transport
        .enqueue(message(Severity::Error, "two"))
        .expect("enqueue");

    let (mut stream, _) = listener.accept().expect("accept");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("timeout");
    transport.stop().expect("stop");
    let mut received = Vec::new();
    stream.read_to_end(&mut received).expect("read");

    let frames: Vec<Value> = received
        .split(|b| *b == 0)
        .filter(|f| !f.is_empty())
        .map(|f| serde_json::from_slice(f).expect("json frame"))
        .collect();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0]["short_message"], "one");
    assert_eq!(frames[1]["short_message"], "two");
    assert_eq!(transport.queued(), 0);
}

#[test]
fn udp_transport_delivers_datagram() {
    let receiver = UdpSocket::bind("127.0.0.1:0").expect("bind");
    receiver
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("timeout");
    let port = receiver.local_addr().expect("addr").port();
    let transport = UdpTransport::new(local_config(Protocol::Udp, port)).expect("transport");

    transport
        .try_enqueue(message(Severity::Informational, "datagram"))
        .expect("enqueue");

    let mut buf = [0u8; 8192];
    let len = receiver.recv(&mut buf).expect("datagram");
    let value: Value = serde_json::from_slice(&buf[..len]).expect("json");
    assert_eq!(value["short_message"], "datagram");
    assert_eq!(value["level"], 6);
    transport.stop().expect("stop");
}

#[rstest]
#[case(Protocol::Tcp)]
#[case(Protocol::Udp)]
fn transports_refuse_messages_after_stop(#[case] protocol: Protocol) {
    let receiver = UdpSocket::bind("127.0.0.1:0").expect("bind");
    let port = receiver.local_addr().expect("addr").port();
    let transport = DefaultTransportFactory
        .create(local_config(protocol, port))
        .expect("transport");

    transport.stop().expect("first stop");
    transport.stop().expect("second stop");
    assert!(matches!(
        transport.try_enqueue(message(Severity::Debug, "late")),
        Err(TryEnqueueError::Stopped(_))
    ));
    assert!(transport.enqueue(message(Severity::Error, "late")).is_err());
}

#[rstest]
#[case(TransportConfig { host: " ".into(), ..TransportConfig::default() })]
#[case(TransportConfig { queue_capacity: 0, ..TransportConfig::default() })]
#[case(TransportConfig { threads: 0, ..TransportConfig::default() })]
#[case(TransportConfig { max_inflight_sends: 0, ..TransportConfig::default() })]
#[case(TransportConfig { max_chunk_size: 16, ..TransportConfig::default() })]
fn invalid_configs_are_rejected(#[case] config: TransportConfig) {
    assert!(matches!(
        TcpTransport::new(config),
        Err(TransportError::InvalidConfig(_))
    ));
}

#[test]
fn udp_construction_fails_for_unresolvable_host() {
    let config = TransportConfig {
        host: "no-such-host.invalid".into(),
        ..local_config(Protocol::Udp, 12202)
    };
    assert!(matches!(
        UdpTransport::new(config),
        Err(TransportError::Resolve { .. })
    ));
}

#[rstest]
#[case("TCP", Ok(Protocol::Tcp))]
#[case("UDP", Ok(Protocol::Udp))]
#[case("tcp", Err(()))]
#[case("HTTP", Err(()))]
fn parses_protocol_names(#[case] input: &str, #[case] expected: Result<Protocol, ()>) {
    assert_eq!(input.parse::<Protocol>(), expected);
}
