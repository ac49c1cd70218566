//! Primitive readers for the mobile wire format.

use std::io::Read;

use crate::codec::CodecError;

/// Decodes modified UTF-8 as produced by [`crate::ser::encode_modified_utf8`].
pub fn decode_modified_utf8(bytes: &[u8]) -> Result<String, CodecError> {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut offset = 0;

    while offset < bytes.len() {
        let lead = bytes[offset];
        match lead >> 4 {
            0x0..=0x7 => {
                units.push(u16::from(lead));
                offset += 1;
            }
            0xC | 0xD => {
                let b1 = continuation_byte(bytes, offset + 1)?;
                units.push((u16::from(lead & 0x1F) << 6) | u16::from(b1 & 0x3F));
                offset += 2;
            }
            0xE => {
                let b1 = continuation_byte(bytes, offset + 1)?;
                let b2 = continuation_byte(bytes, offset + 2)?;
                units.push(
                    (u16::from(lead & 0x0F) << 12)
                        | (u16::from(b1 & 0x3F) << 6)
                        | u16::from(b2 & 0x3F),
                );
                offset += 3;
            }
            _ => return Err(CodecError::InvalidModifiedUtf8 { offset }),
        }
    }

    String::from_utf16(&units).map_err(|_| CodecError::InvalidModifiedUtf8 { offset })
}

fn continuation_byte(bytes: &[u8], offset: usize) -> Result<u8, CodecError> {
    match bytes.get(offset) {
        Some(byte) if byte & 0xC0 == 0x80 => Ok(*byte),
        _ => Err(CodecError::InvalidModifiedUtf8 { offset }),
    }
}

/// Reads a length-prefixed modified UTF-8 string.
pub fn read_utf<R: Read>(reader: &mut R) -> Result<String, CodecError> {
    let len = read_u16(reader)?;
    let mut buffer = vec![0u8; usize::from(len)];
    reader.read_exact(&mut buffer)?;
    decode_modified_utf8(&buffer)
}

/// Reads a boolean byte; any non-zero value is `true`.
pub fn read_bool<R: Read>(reader: &mut R) -> Result<bool, CodecError> {
    Ok(read_u8(reader)? != 0)
}

pub fn read_u8<R: Read>(reader: &mut R) -> Result<u8, CodecError> {
    let mut buffer = [0u8; 1];
    reader.read_exact(&mut buffer)?;
    Ok(buffer[0])
}

pub fn read_u16<R: Read>(reader: &mut R) -> Result<u16, CodecError> {
    let mut buffer = [0u8; 2];
    reader.read_exact(&mut buffer)?;
    Ok(u16::from_be_bytes(buffer))
}

pub fn read_i16<R: Read>(reader: &mut R) -> Result<i16, CodecError> {
    let mut buffer = [0u8; 2];
    reader.read_exact(&mut buffer)?;
    Ok(i16::from_be_bytes(buffer))
}
