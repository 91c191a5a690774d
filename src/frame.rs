//! The physical frame envelope exchanged with the fridge.
//!
//! Every command and notification is wrapped in the same envelope:
//!
//! Start Byte | End Byte | Meaning
//! 0          | 1        | A constant header with value [0xFE, 0xFE]
//! 2          | 2        | The payload length in bytes, plus 2
//! 3          | x        | The payload
//! x+1        | x+2      | Big-endian 16-bit arithmetic sum of bytes 0..=x

use thiserror::Error;

const HEADER: [u8; 2] = [0xFE, 0xFE];

/// The largest payload the one-byte length field can describe.
pub const MAX_PAYLOAD_LEN: usize = 253;

/// Ways in which raw notification bytes can fail to be a valid frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame too short: {0} bytes")]
    TooShort(usize),
    #[error("invalid frame header")]
    BadHeader,
    #[error("length byte {length} does not match {body} body bytes")]
    LengthMismatch { length: u8, body: usize },
    #[error("checksum {found:#06x} matches neither {computed:#06x} nor its double")]
    BadChecksum { found: u16, computed: u16 },
}

/// Wrap a payload in a frame for sending to the fridge.
///
/// Panics if the payload is longer than [`MAX_PAYLOAD_LEN`]; no protocol
/// payload comes anywhere near that.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    assert!(payload.len() <= MAX_PAYLOAD_LEN, "payload too long for a single frame");

    let mut pkt = Vec::with_capacity(payload.len() + 5);
    pkt.extend_from_slice(&HEADER);
    pkt.push((payload.len() + 2) as u8);
    pkt.extend_from_slice(payload);
    let sum = checksum(&pkt);
    pkt.extend_from_slice(&sum.to_be_bytes());
    pkt
}

/// Unwrap a received frame, returning the payload.
///
/// Some firmware revisions send the checksum doubled, so both the plain sum
/// and twice the sum are accepted.
pub fn decode(raw: &[u8]) -> Result<&[u8], FrameError> {
    if raw.len() <= 2 {
        return Err(FrameError::TooShort(raw.len()));
    }

    if raw[..2] != HEADER {
        return Err(FrameError::BadHeader);
    }

    let body = raw.len() - 3;
    if usize::from(raw[2]) != body || body < 2 {
        return Err(FrameError::LengthMismatch { length: raw[2], body });
    }

    let (content, trailer) = raw.split_at(raw.len() - 2);
    let found = u16::from_be_bytes([trailer[0], trailer[1]]);
    let computed = checksum(content);
    if found != computed && found != computed.wrapping_mul(2) {
        return Err(FrameError::BadChecksum { found, computed });
    }

    Ok(&content[3..])
}

fn checksum(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |acc, &b| acc.wrapping_add(u16::from(b)))
}

#[test]
fn test_encode_query_frame() {
    // 0xFE + 0xFE + 0x03 + 0x01 = 0x0200
    assert_eq!(encode(&[0x01]), [0xFE, 0xFE, 0x03, 0x01, 0x02, 0x00]);
}

#[test]
fn test_roundtrip() {
    for len in [0usize, 1, 17, 26, MAX_PAYLOAD_LEN] {
        let payload: Vec<u8> = (0..len).map(|i| i as u8).collect();
        let pkt = encode(&payload);
        assert_eq!(decode(&pkt), Ok(&payload[..]), "len {len}");
    }
}

#[test]
fn test_decode_accepts_doubled_checksum() {
    let mut pkt = encode(&[0x01]);
    let n = pkt.len();
    // 2 * 0x0200 = 0x0400
    pkt[n - 2..].copy_from_slice(&[0x04, 0x00]);
    assert_eq!(decode(&pkt), Ok(&[0x01][..]));
}

#[test]
fn test_decode_rejects_other_checksum() {
    let mut pkt = encode(&[0x01]);
    let n = pkt.len();
    pkt[n - 2..].copy_from_slice(&[0x12, 0x34]);
    assert_eq!(
        decode(&pkt),
        Err(FrameError::BadChecksum { found: 0x1234, computed: 0x0200 })
    );
}

#[test]
fn test_decode_too_short() {
    assert_eq!(decode(&[]), Err(FrameError::TooShort(0)));
    assert_eq!(decode(&[0xFE, 0xFE]), Err(FrameError::TooShort(2)));
}

#[test]
fn test_decode_bad_header() {
    let pkt = [0x01, 0x03, 0x03, 0x01, 0x00, 0x08];
    assert_eq!(decode(&pkt), Err(FrameError::BadHeader));
}

#[test]
fn test_decode_length_mismatch() {
    let pkt = [0xFE, 0xFE, 0x04, 0x01, 0x02, 0x01];
    assert_eq!(
        decode(&pkt),
        Err(FrameError::LengthMismatch { length: 4, body: 3 })
    );
}
