//! Fixed-layout binary codec for wire messages.
//!
//! Every message is a 1-byte kind code followed by a kind-specific body.
//! Integers are big-endian; strings and byte blobs carry a `u16` length
//! prefix. Decoding is total: truncated, over-length, or unknown input
//! yields a [`DecodeError`], never a partially-populated message and never
//! an out-of-bounds read. Length prefixes are checked against the remaining
//! input before any slice is taken, so a hostile length field cannot force
//! an allocation larger than the message that carried it.

use crate::protocol::message::{HandshakePayload, Message, Network};
use byteorder::{BigEndian, ByteOrder};
use thiserror::Error;

/// Kind code of the initiator's handshake message
pub const KIND_HELLO: u8 = 0x00;
/// Kind code of the responder's handshake reply
pub const KIND_WORLD: u8 = 0x01;
/// Kind code of a liveness probe
pub const KIND_PING: u8 = 0x02;
/// Kind code of a liveness reply
pub const KIND_PONG: u8 = 0x03;

/// Width of the frame length prefix used on stream transports
pub const FRAME_HEADER_WIDTH: usize = 4;

/// Ways a byte buffer can fail to decode into a message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("message truncated while reading {0}")]
    Truncated(&'static str),

    #[error("{0} trailing bytes after message body")]
    TrailingBytes(usize),

    #[error("unknown message kind {0:#04x}")]
    UnknownKind(u8),

    #[error("unknown network code {0:#04x}")]
    UnknownNetwork(u8),

    #[error("declared size {len} exceeds the {max} byte limit")]
    Oversized { len: usize, max: usize },

    #[error("string field {0} is not valid UTF-8")]
    InvalidUtf8(&'static str),
}

/// Serialize a message into its wire bytes.
pub fn encode(message: &Message) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);
    match message {
        Message::Hello(payload) => {
            buf.push(KIND_HELLO);
            write_payload(&mut buf, payload);
        }
        Message::World(payload) => {
            buf.push(KIND_WORLD);
            write_payload(&mut buf, payload);
        }
        Message::Ping => buf.push(KIND_PING),
        Message::Pong => buf.push(KIND_PONG),
    }
    buf
}

/// Deserialize a complete message from `bytes`.
///
/// `max_message_size` is re-checked here so the codec rejects oversized
/// input even when the caller skipped the framed-transport path.
pub fn decode(bytes: &[u8], max_message_size: usize) -> Result<Message, DecodeError> {
    if bytes.len() > max_message_size {
        return Err(DecodeError::Oversized {
            len: bytes.len(),
            max: max_message_size,
        });
    }

    let mut reader = Reader::new(bytes);
    let kind = reader.read_u8("kind")?;

    let message = match kind {
        KIND_HELLO => Message::Hello(read_payload(&mut reader)?),
        KIND_WORLD => Message::World(read_payload(&mut reader)?),
        KIND_PING => Message::Ping,
        KIND_PONG => Message::Pong,
        other => return Err(DecodeError::UnknownKind(other)),
    };

    match reader.remaining() {
        0 => Ok(message),
        extra => Err(DecodeError::TrailingBytes(extra)),
    }
}

/// The canonical byte encoding of every payload field except the signature,
/// in wire order. This is the exact byte string signatures are made over.
pub fn unsigned_bytes(payload: &HandshakePayload) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);
    write_unsigned_fields(&mut buf, payload);
    buf
}

fn write_payload(buf: &mut Vec<u8>, payload: &HandshakePayload) {
    write_unsigned_fields(buf, payload);
    write_blob(buf, &payload.signature);
}

fn write_unsigned_fields(buf: &mut Vec<u8>, payload: &HandshakePayload) {
    buf.push(payload.network.code());
    buf.extend_from_slice(&payload.network_version.to_be_bytes());
    write_blob(buf, payload.peer_id.as_bytes());
    write_blob(buf, payload.ip.as_bytes());
    buf.extend_from_slice(&payload.port.to_be_bytes());
    write_blob(buf, payload.client_id.as_bytes());
    buf.extend_from_slice(&payload.latest_block_number.to_be_bytes());
    write_blob(buf, &payload.public_key);
    buf.extend_from_slice(&payload.timestamp.to_be_bytes());
}

fn write_blob(buf: &mut Vec<u8>, value: &[u8]) {
    debug_assert!(value.len() <= u16::MAX as usize);
    buf.extend_from_slice(&(value.len() as u16).to_be_bytes());
    buf.extend_from_slice(value);
}

fn read_payload(reader: &mut Reader<'_>) -> Result<HandshakePayload, DecodeError> {
    let network_code = reader.read_u8("network")?;
    let network =
        Network::from_code(network_code).ok_or(DecodeError::UnknownNetwork(network_code))?;

    Ok(HandshakePayload {
        network,
        network_version: reader.read_u16("network_version")?,
        peer_id: reader.read_string("peer_id")?,
        ip: reader.read_string("ip")?,
        port: reader.read_u16("port")?,
        client_id: reader.read_string("client_id")?,
        latest_block_number: reader.read_u64("latest_block_number")?,
        public_key: reader.read_blob("public_key")?,
        timestamp: reader.read_u64("timestamp")?,
        signature: reader.read_blob("signature")?,
    })
}

/// Bounds-checked cursor over an input buffer.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, width: usize, field: &'static str) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(width)
            .ok_or(DecodeError::Truncated(field))?;
        if end > self.buf.len() {
            return Err(DecodeError::Truncated(field));
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self, field: &'static str) -> Result<u8, DecodeError> {
        Ok(self.take(1, field)?[0])
    }

    fn read_u16(&mut self, field: &'static str) -> Result<u16, DecodeError> {
        Ok(BigEndian::read_u16(self.take(2, field)?))
    }

    fn read_u64(&mut self, field: &'static str) -> Result<u64, DecodeError> {
        Ok(BigEndian::read_u64(self.take(8, field)?))
    }

    fn read_blob(&mut self, field: &'static str) -> Result<Vec<u8>, DecodeError> {
        let len = self.read_u16(field)? as usize;
        Ok(self.take(len, field)?.to_vec())
    }

    fn read_string(&mut self, field: &'static str) -> Result<String, DecodeError> {
        String::from_utf8(self.read_blob(field)?).map_err(|_| DecodeError::InvalidUtf8(field))
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::config::DEFAULT_MAX_MESSAGE_SIZE;
    use crate::protocol::identity::NodeIdentity;

    fn sample_payload() -> HandshakePayload {
        HandshakePayload::build(
            &NodeIdentity::generate(),
            Network::Testnet,
            3,
            "10.0.0.7".to_string(),
            5161,
            "codec-test/0.1.0".to_string(),
            1_234_567,
            1_700_000_000_000,
        )
    }

    fn round_trip(message: &Message) -> Message {
        decode(&encode(message), DEFAULT_MAX_MESSAGE_SIZE).unwrap()
    }

    #[test]
    fn test_round_trip_all_kinds() {
        let payload = sample_payload();

        assert_eq!(
            round_trip(&Message::Hello(payload.clone())),
            Message::Hello(payload.clone())
        );
        assert_eq!(
            round_trip(&Message::World(payload.clone())),
            Message::World(payload)
        );
        assert_eq!(round_trip(&Message::Ping), Message::Ping);
        assert_eq!(round_trip(&Message::Pong), Message::Pong);
    }

    #[test]
    fn test_kind_codes_are_stable() {
        let payload = sample_payload();

        assert_eq!(encode(&Message::Hello(payload.clone()))[0], KIND_HELLO);
        assert_eq!(encode(&Message::World(payload))[0], KIND_WORLD);
        assert_eq!(encode(&Message::Ping), vec![KIND_PING]);
        assert_eq!(encode(&Message::Pong), vec![KIND_PONG]);
    }

    #[test]
    fn test_empty_input_is_truncated() {
        assert_eq!(
            decode(&[], DEFAULT_MAX_MESSAGE_SIZE),
            Err(DecodeError::Truncated("kind"))
        );
    }

    #[test]
    fn test_unknown_kind_rejected() {
        assert_eq!(
            decode(&[0x7f], DEFAULT_MAX_MESSAGE_SIZE),
            Err(DecodeError::UnknownKind(0x7f))
        );
    }

    #[test]
    fn test_unknown_network_rejected() {
        assert_eq!(
            decode(&[KIND_HELLO, 0x09], DEFAULT_MAX_MESSAGE_SIZE),
            Err(DecodeError::UnknownNetwork(0x09))
        );
    }

    #[test]
    fn test_truncation_at_every_boundary() {
        // Chopping the encoding anywhere must produce an error, never a
        // partially-populated message or a panic.
        let encoded = encode(&Message::Hello(sample_payload()));

        for len in 0..encoded.len() {
            let result = decode(&encoded[..len], DEFAULT_MAX_MESSAGE_SIZE);
            assert!(
                matches!(result, Err(DecodeError::Truncated(_))),
                "prefix of {} bytes decoded to {:?}",
                len,
                result
            );
        }
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut encoded = encode(&Message::Hello(sample_payload()));
        encoded.push(0x00);

        assert_eq!(
            decode(&encoded, DEFAULT_MAX_MESSAGE_SIZE),
            Err(DecodeError::TrailingBytes(1))
        );

        assert_eq!(
            decode(&[KIND_PING, 0xaa, 0xbb], DEFAULT_MAX_MESSAGE_SIZE),
            Err(DecodeError::TrailingBytes(2))
        );
    }

    #[test]
    fn test_oversized_input_rejected() {
        let encoded = encode(&Message::Hello(sample_payload()));

        let result = decode(&encoded, 16);
        assert_eq!(
            result,
            Err(DecodeError::Oversized {
                len: encoded.len(),
                max: 16
            })
        );
    }

    #[test]
    fn test_blob_length_is_bounds_checked() {
        // A Hello whose peer_id claims far more bytes than the buffer holds.
        let mut bytes = vec![KIND_HELLO, 0x00, 0x00, 0x03];
        bytes.extend_from_slice(&0xffffu16.to_be_bytes());
        bytes.extend_from_slice(b"abc");

        assert_eq!(
            decode(&bytes, DEFAULT_MAX_MESSAGE_SIZE),
            Err(DecodeError::Truncated("peer_id"))
        );
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let mut bytes = vec![KIND_HELLO, 0x00, 0x00, 0x03];
        bytes.extend_from_slice(&2u16.to_be_bytes());
        bytes.extend_from_slice(&[0xc3, 0x28]); // invalid UTF-8 sequence

        assert_eq!(
            decode(&bytes, DEFAULT_MAX_MESSAGE_SIZE),
            Err(DecodeError::InvalidUtf8("peer_id"))
        );
    }

    #[test]
    fn test_unsigned_bytes_exclude_signature() {
        let payload = sample_payload();
        let mut resigned = payload.clone();
        resigned.signature = vec![0u8; 64];

        assert_eq!(unsigned_bytes(&payload), unsigned_bytes(&resigned));

        let encoded = encode(&Message::Hello(payload.clone()));
        let unsigned = unsigned_bytes(&payload);
        // kind byte, then the unsigned fields verbatim, then the signature blob
        assert_eq!(&encoded[1..1 + unsigned.len()], unsigned.as_slice());
    }

    #[test]
    fn test_second_encoding_is_identical() {
        let message = Message::World(sample_payload());
        let first = encode(&message);
        let decoded = decode(&first, DEFAULT_MAX_MESSAGE_SIZE).unwrap();

        assert_eq!(encode(&decoded), first);
    }
}
