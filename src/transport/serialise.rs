//! GELF 1.1 JSON encoding and transport framing.

use std::collections::BTreeMap;
use std::io;

use serde::Serialize;

use crate::message::{FieldValue, GelfMessage};

/// GELF chunk magic bytes.
pub const CHUNK_MAGIC: [u8; 2] = [0x1e, 0x0f];
/// Magic, 8-byte message id, sequence number and sequence count.
pub const CHUNK_HEADER_LEN: usize = 12;
/// Collectors discard messages split into more chunks than this.
pub const MAX_CHUNKS: usize = 128;

const GELF_VERSION: &str = "1.1";
/// Reserved by GELF; never sent as an additional field.
const RESERVED_ID_FIELD: &str = "_id";

#[derive(Serialize)]
struct GelfPayload<'a> {
    version: &'static str,
    host: &'a str,
    short_message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    full_message: Option<&'a str>,
    timestamp: f64,
    level: u8,
    #[serde(flatten)]
    fields: BTreeMap<&'a str, &'a FieldValue>,
}

impl<'a> From<&'a GelfMessage> for GelfPayload<'a> {
    fn from(message: &'a GelfMessage) -> Self {
        let fields = message
            .fields()
            .iter()
            .filter(|(key, _)| key.as_str() != RESERVED_ID_FIELD)
            .map(|(key, value)| (key.as_str(), value))
            .collect();
        Self {
            version: GELF_VERSION,
            host: message.host(),
            short_message: message.short_message(),
            full_message: message.full_message(),
            timestamp: message.timestamp().timestamp_millis() as f64 / 1000.0,
            level: message.severity().code(),
            fields,
        }
    }
}

/// Serialise a message into its GELF JSON payload.
pub fn encode_json(message: &GelfMessage) -> io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(256);
    serde_json::to_writer(&mut buf, &GelfPayload::from(message)).map_err(io::Error::other)?;
    Ok(buf)
}

/// Terminate a payload with the NUL delimiter used by GELF over TCP.
pub fn frame_tcp(mut payload: Vec<u8>) -> Vec<u8> {
    payload.push(0);
    payload
}

/// Split a payload into GELF UDP chunks.
///
/// Payloads that fit into `max_datagram` bytes are sent as a single
/// datagram without a chunk header. Returns `None` when the payload would
/// need more than [`MAX_CHUNKS`] chunks.
pub fn chunk_datagram(payload: &[u8], max_datagram: usize, message_id: [u8; 8]) -> Option<Vec<Vec<u8>>> {
    if payload.len() <= max_datagram {
        return Some(vec![payload.to_vec()]);
    }
    let body = max_datagram.checked_sub(CHUNK_HEADER_LEN).filter(|b| *b > 0)?;
    let count = payload.len().div_ceil(body);
    if count > MAX_CHUNKS {
        return None;
    }
    let chunks = payload
        .chunks(body)
        .enumerate()
        .map(|(seq, part)| {
            let mut chunk = Vec::with_capacity(CHUNK_HEADER_LEN + part.len());
            chunk.extend_from_slice(&CHUNK_MAGIC);
            chunk.extend_from_slice(&message_id);
            chunk.push(seq as u8);
            chunk.push(count as u8);
            chunk.extend_from_slice(part);
            chunk
        })
        .collect();
    Some(chunks)
}
