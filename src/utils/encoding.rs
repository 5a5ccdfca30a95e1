use std::io::{self, Read, Write};

/// Encode a u32 as a variable-length integer
pub fn encode_varint(mut value: u32, buf: &mut Vec<u8>) {
    loop {
        if value < 0x80 {
            buf.push(value as u8);
            break;
        }
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
}

/// Decode a variable-length integer from a slice
/// Returns (value, bytes_consumed), or None if truncated or wider than 32 bits
pub fn decode_varint(buf: &[u8]) -> Option<(u32, usize)> {
    let mut result: u32 = 0;
    let mut shift = 0;

    for (i, &byte) in buf.iter().enumerate() {
        if shift >= 32 {
            return None; // Overflow
        }

        let bits = (byte & 0x7F) as u32;
        // The fifth byte may only carry the top 4 bits
        if shift == 28 && bits > 0x0F {
            return None;
        }
        result |= bits << shift;

        if byte & 0x80 == 0 {
            return Some((result, i + 1));
        }

        shift += 7;
    }

    None // Incomplete
}

/// Decode a whole buffer of varints. None if any integer is malformed.
pub fn decode_varints(buf: &[u8]) -> Option<Vec<u32>> {
    let mut result = Vec::with_capacity(buf.len());
    let mut pos = 0;
    while pos < buf.len() {
        let (value, consumed) = decode_varint(&buf[pos..])?;
        result.push(value);
        pos += consumed;
    }
    Some(result)
}

/// Gap-encode a strictly increasing list of u32s starting from `base`
pub fn gap_encode(values: &[u32], base: u32, buf: &mut Vec<u8>) {
    let mut prev = base;
    for &value in values {
        debug_assert!(value >= prev, "gap_encode requires sorted input");
        encode_varint(value - prev, buf);
        prev = value;
    }
}

/// Gap-decode a list of u32s relative to `base`.
/// Returns None on malformed varints or when the running sum overflows.
pub fn gap_decode(buf: &[u8], base: u32) -> Option<Vec<u32>> {
    let mut result = Vec::new();
    let mut prev = base;
    let mut pos = 0;

    while pos < buf.len() {
        let (delta, consumed) = decode_varint(&buf[pos..])?;
        prev = prev.checked_add(delta)?;
        result.push(prev);
        pos += consumed;
    }

    Some(result)
}

/// Write a u32 in little-endian format
pub fn write_u32_le<W: Write>(writer: &mut W, value: u32) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

/// Read a u32 in little-endian format
pub fn read_u32_le<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Write a u64 in little-endian format
pub fn write_u64_le<W: Write>(writer: &mut W, value: u64) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

/// Read a u64 in little-endian format
pub fn read_u64_le<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Read a single byte
pub fn read_u8<R: Read>(reader: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

/// Read a little-endian u32 from a slice at `pos`
#[inline]
pub fn u32_at(buf: &[u8], pos: usize) -> u32 {
    u32::from_le_bytes([buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]])
}
