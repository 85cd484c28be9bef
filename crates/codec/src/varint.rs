//! Unsigned LEB128 varints.
//!
//! Seven payload bits per byte, least significant group first, high bit set
//! on every byte except the last. A `u64` takes at most 10 bytes.

use std::io::{self, Write};

use crate::CodecError;

/// Longest encoding of a `u64`.
pub const MAX_VARINT_BYTES: usize = 10;

/// Number of bytes `value` occupies once encoded.
#[must_use]
pub fn encoded_len(mut value: u64) -> usize {
    let mut n = 1;
    while value >= 0x80 {
        value >>= 7;
        n += 1;
    }
    n
}

/// Appends the encoding of `value` to `out`, returning the bytes written.
pub fn encode_u64(mut value: u64, out: &mut Vec<u8>) -> usize {
    let start = out.len();
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
    out.len() - start
}

/// Writes the encoding of `value` to `w`, returning the bytes written.
pub fn write_u64<W: Write>(w: &mut W, value: u64) -> io::Result<usize> {
    let mut buf = [0u8; MAX_VARINT_BYTES];
    let mut v = value;
    let mut n = 0;
    while v >= 0x80 {
        buf[n] = (v as u8) | 0x80;
        v >>= 7;
        n += 1;
    }
    buf[n] = v as u8;
    n += 1;
    w.write_all(&buf[..n])?;
    Ok(n)
}

/// Decodes a varint from the front of `buf`.
///
/// Returns `Ok(Some((value, consumed)))` on success and `Ok(None)` when `buf`
/// ends before the terminating byte, so callers reading from disk in pieces
/// can fetch more bytes and retry.
///
/// # Errors
///
/// [`CodecError::Varint`] if the encoding is longer than 10 bytes or does not
/// fit in a `u64`.
pub fn decode_u64(buf: &[u8]) -> Result<Option<(u64, usize)>, CodecError> {
    let mut value: u64 = 0;
    for (i, &byte) in buf.iter().enumerate() {
        if i == MAX_VARINT_BYTES - 1 && byte > 1 {
            return Err(CodecError::Varint("value overflows u64"));
        }
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
        if i + 1 == MAX_VARINT_BYTES {
            return Err(CodecError::Varint("encoding longer than 10 bytes"));
        }
    }
    Ok(None)
}
