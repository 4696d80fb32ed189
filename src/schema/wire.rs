//! The binary wire envelope.
//!
//! Every record on the broker is framed as
//! `[0x00][4-byte big-endian schema id][avro binary payload]`. Byte 0 is a
//! format-version marker and is always zero; bytes 1..5 select the decoding
//! schema. The layout is bit-exact for interoperability with other client
//! libraries in the broker ecosystem.

use crate::{Error, Result};

/// Format-version marker carried in byte 0 of every record.
pub const WIRE_FORMAT_VERSION: u8 = 0x00;

/// Envelope length: version marker plus big-endian schema id.
pub const ENVELOPE_LEN: usize = 5;

/// Prepends the envelope to an encoded payload.
pub fn encode(schema_id: u32, payload: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(ENVELOPE_LEN + payload.len());
    bytes.push(WIRE_FORMAT_VERSION);
    bytes.extend_from_slice(&schema_id.to_be_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

/// Splits a record into its schema id and payload, validating the envelope.
pub fn decode(bytes: &[u8]) -> Result<(u32, &[u8])> {
    let schema_id = schema_id(bytes)?;
    Ok((schema_id, &bytes[ENVELOPE_LEN..]))
}

/// Reads the schema id from bytes 1..5 without touching the payload.
pub fn schema_id(bytes: &[u8]) -> Result<u32> {
    if bytes.len() < ENVELOPE_LEN {
        return Err(Error::WireFormat {
            message: format!(
                "record of {} bytes is shorter than the {ENVELOPE_LEN}-byte envelope",
                bytes.len()
            ),
        });
    }
    if bytes[0] != WIRE_FORMAT_VERSION {
        return Err(Error::WireFormat {
            message: format!("unknown format version marker 0x{:02x}", bytes[0]),
        });
    }
    let id = [bytes[1], bytes[2], bytes[3], bytes[4]];
    Ok(u32::from_be_bytes(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_layout() {
        let bytes = encode(0x01020304, b"payload");
        assert_eq!(bytes[0], 0x00);
        assert_eq!(&bytes[1..5], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&bytes[5..], b"payload");
    }

    #[test]
    fn decode_round_trips() {
        let bytes = encode(42, &[0xde, 0xad]);
        let (id, payload) = decode(&bytes).unwrap();
        assert_eq!(id, 42);
        assert_eq!(payload, &[0xde, 0xad]);
    }

    #[test]
    fn empty_payload_is_valid() {
        let bytes = encode(7, &[]);
        let (id, payload) = decode(&bytes).unwrap();
        assert_eq!(id, 7);
        assert!(payload.is_empty());
    }

    #[test]
    fn truncated_record_is_rejected() {
        let err = decode(&[0x00, 0x00, 0x01]).unwrap_err();
        assert!(matches!(err, Error::WireFormat { .. }));
    }

    #[test]
    fn wrong_version_marker_is_rejected() {
        let mut bytes = encode(1, b"x");
        bytes[0] = 0x01;
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, Error::WireFormat { .. }));
    }
}
