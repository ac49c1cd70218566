//! Primitive writers for the mobile wire format.
//!
//! Strings follow Java's `DataOutput.writeUTF` layout so existing handheld
//! clients can decode them: a big-endian `u16` byte length followed by
//! modified UTF-8.

use std::io::Write;

use crate::codec::CodecError;

/// Largest encoded string the `u16` length prefix can describe.
pub const MAX_UTF_LEN: usize = u16::MAX as usize;

/// Encodes `value` as modified UTF-8.
///
/// Differs from standard UTF-8 in two places: U+0000 is written as `C0 80`,
/// and characters outside the BMP are written as a surrogate pair of two
/// 3-byte sequences.
#[must_use]
pub fn encode_modified_utf8(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((unit >> 6) & 0x1F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

/// Writes a length-prefixed modified UTF-8 string.
pub fn write_utf<W: Write>(writer: &mut W, value: &str) -> Result<(), CodecError> {
    let encoded = encode_modified_utf8(value);
    let len = u16::try_from(encoded.len()).map_err(|_| CodecError::StringTooLong {
        len: encoded.len(),
        limit: MAX_UTF_LEN,
    })?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(&encoded)?;
    Ok(())
}

pub fn write_bool<W: Write>(writer: &mut W, value: bool) -> Result<(), CodecError> {
    writer.write_all(&[u8::from(value)])?;
    Ok(())
}
