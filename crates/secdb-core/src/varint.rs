//! Variable-length integer encoding.
//!
//! Two flavors share one wire shape:
//!
//! ## UVarint
//! Little-endian base-128: each byte carries 7 payload bits, the high bit
//! says "more bytes follow". Values 0..=127 take a single byte; a `u64`
//! never takes more than 10. The encoding is canonical: no redundant
//! trailing continuation bytes are ever written, and decode rejects inputs
//! that would overflow 64 bits.
//!
//! ## SVarint
//! ZigZag maps signed integers onto unsigned ones so small magnitudes of
//! either sign stay small: 0 → 0, -1 → 1, 1 → 2, -2 → 3, 2 → 4. The result
//! is then UVarint-encoded. Price and size deltas between consecutive
//! snapshots hover near zero, which is exactly where this wins.
//!
//! Decoding is fallible: running out of bytes mid-varint returns
//! [`Error::Truncated`], which the reader uses to detect a torn record at
//! the end of a file.

use bytes::{Buf, BufMut};

use crate::error::{Error, Result};

/// Encode an unsigned integer as a UVarint.
pub fn encode_uvarint(buf: &mut impl BufMut, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;

        if value != 0 {
            byte |= 0x80;
        }

        buf.put_u8(byte);

        if value == 0 {
            break;
        }
    }
}

/// Encode a signed integer as a zigzag SVarint.
pub fn encode_svarint(buf: &mut impl BufMut, value: i64) {
    let zigzag = ((value << 1) ^ (value >> 63)) as u64;
    encode_uvarint(buf, zigzag);
}

/// Decode a UVarint.
pub fn decode_uvarint(buf: &mut impl Buf) -> Result<u64> {
    let mut value: u64 = 0;
    let mut shift = 0u32;

    loop {
        if !buf.has_remaining() {
            return Err(Error::Truncated);
        }
        let byte = buf.get_u8();

        // the tenth byte may only carry the single remaining bit
        if shift == 63 && byte > 1 {
            return Err(Error::CorruptStream(
                "varint overflows 64 bits".to_string(),
            ));
        }

        value |= ((byte & 0x7F) as u64) << shift;

        if byte & 0x80 == 0 {
            return Ok(value);
        }

        shift += 7;
        if shift >= 64 {
            return Err(Error::CorruptStream("varint too long".to_string()));
        }
    }
}

/// Decode a zigzag SVarint.
pub fn decode_svarint(buf: &mut impl Buf) -> Result<i64> {
    let zigzag = decode_uvarint(buf)?;
    Ok(((zigzag >> 1) as i64) ^ -((zigzag & 1) as i64))
}
