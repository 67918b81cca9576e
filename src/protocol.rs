//! Wire protocol between workers and the coordinator.
//!
//! Two verbs, both six bytes on the wire:
//!
//! - `weight`: the server answers with a length-prefixed parameter blob and
//!   the client acknowledges with `weight_ok` before closing, so the server
//!   can log confirmed delivery.
//! - `record`: the server signals `ready`, the client sends a
//!   length-prefixed serialized game record, and the server answers
//!   `record_ok` once the record has been ingested. A client that never
//!   sees the acknowledgement knows its game was lost.
//!
//! Length prefixes are 16 bytes little-endian. A wrong acknowledgement token
//! or an oversized length prefix is a protocol violation, fatal to that
//! connection only.

use std::io::{Read, Write};
use std::net::TcpStream;

use crate::error::{Error, Result};

pub const VERB_WEIGHT: &[u8; 6] = b"weight";
pub const VERB_RECORD: &[u8; 6] = b"record";
pub const ACK_WEIGHT: &[u8] = b"weight_ok";
pub const ACK_RECORD: &[u8] = b"record_ok";
pub const TOKEN_READY: &[u8] = b"ready";

/// Upper bound on a single frame; anything larger is treated as a malformed
/// length prefix.
pub const MAX_FRAME: u128 = 1 << 30;

/// Writes a 16-byte little-endian length followed by the payload.
pub fn write_frame(writer: &mut impl Write, payload: &[u8]) -> Result<()> {
    writer.write_all(&(payload.len() as u128).to_le_bytes())?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

/// Reads one length-prefixed frame.
pub fn read_frame(reader: &mut impl Read) -> Result<Vec<u8>> {
    let mut prefix = [0u8; 16];
    reader.read_exact(&mut prefix)?;
    let len = u128::from_le_bytes(prefix);
    if len > MAX_FRAME {
        return Err(Error::ProtocolViolation(format!(
            "malformed length prefix: {len}"
        )));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

/// Reads exactly `expected.len()` bytes and requires them to match.
pub fn expect_token(reader: &mut impl Read, expected: &[u8]) -> Result<()> {
    let mut got = vec![0u8; expected.len()];
    reader.read_exact(&mut got)?;
    if got != expected {
        return Err(Error::ProtocolViolation(format!(
            "expected token {:?}, got {:?}",
            String::from_utf8_lossy(expected),
            String::from_utf8_lossy(&got)
        )));
    }
    Ok(())
}

/// Client side of the `weight` verb: one blocking round trip.
pub fn fetch_weights(addr: &str) -> Result<Vec<u8>> {
    let mut stream = TcpStream::connect(addr)?;
    stream.write_all(VERB_WEIGHT)?;
    let blob = read_frame(&mut stream)?;
    stream.write_all(ACK_WEIGHT)?;
    stream.flush()?;
    Ok(blob)
}

/// Client side of the `record` verb: one blocking round trip. Returns only
/// after the server confirms the record was ingested.
pub fn submit_record(addr: &str, record: &[u8]) -> Result<()> {
    let mut stream = TcpStream::connect(addr)?;
    stream.write_all(VERB_RECORD)?;
    stream.flush()?;
    expect_token(&mut stream, TOKEN_READY)?;
    write_frame(&mut stream, record)?;
    expect_token(&mut stream, ACK_RECORD)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trip() {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, b"payload").unwrap();
        assert_eq!(buffer.len(), 16 + 7);
        let mut cursor = std::io::Cursor::new(buffer);
        assert_eq!(read_frame(&mut cursor).unwrap(), b"payload");
    }

    #[test]
    fn oversized_length_prefix_is_a_protocol_violation() {
        let mut buffer = (MAX_FRAME + 1).to_le_bytes().to_vec();
        buffer.extend_from_slice(b"x");
        let mut cursor = std::io::Cursor::new(buffer);
        assert!(matches!(
            read_frame(&mut cursor),
            Err(Error::ProtocolViolation(_))
        ));
    }

    #[test]
    fn wrong_token_is_rejected() {
        let mut cursor = std::io::Cursor::new(b"record_no".to_vec());
        assert!(matches!(
            expect_token(&mut cursor, ACK_RECORD),
            Err(Error::ProtocolViolation(_))
        ));
    }
}
