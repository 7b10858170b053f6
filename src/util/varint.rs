//! Variable-length integer encoding utilities.
//!
//! Used by the sparse feature encodings and the reference point resources:
//! 7 bits per byte, low bits first, high bit set on every byte but the last.

use std::io::{Read, Write};

use byteorder::ReadBytesExt;

use crate::error::{ImgsimError, Result};

/// Append the variable-length encoding of `value` to `out`.
pub fn encode_u32_into(out: &mut Vec<u8>, value: u32) {
    let mut val = value;

    loop {
        let mut byte = (val & 0x7F) as u8;
        val >>= 7;

        if val != 0 {
            byte |= 0x80; // Set continuation bit
        }

        out.push(byte);

        if val == 0 {
            break;
        }
    }
}

/// Write a variable-length encoded u32 to a writer.
pub fn write_u32<W: Write>(writer: &mut W, value: u32) -> Result<usize> {
    let mut bytes = Vec::with_capacity(5);
    encode_u32_into(&mut bytes, value);
    writer.write_all(&bytes)?;
    Ok(bytes.len())
}

/// Read a variable-length encoded u32 from a reader.
pub fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut result = 0u32;
    let mut shift = 0;

    loop {
        let byte = reader.read_u8()?;

        if shift >= 32 {
            return Err(ImgsimError::serialization("VarInt overflow"));
        }

        result |= ((byte & 0x7F) as u32) << shift;

        if (byte & 0x80) == 0 {
            return Ok(result);
        }

        shift += 7;
    }
}
