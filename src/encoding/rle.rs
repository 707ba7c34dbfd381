//! RLE / bit-packed hybrid encoding, plus the deprecated BIT_PACKED levels.

use crate::error::{ParquetError, Result};

/// Bits needed to store values up to `max_value`
pub fn bit_width(max_value: u32) -> u8 {
    (32 - max_value.leading_zeros()) as u8
}

/// Read an unsigned LEB128 varint at `*pos`.
pub(crate) fn read_uleb128(data: &[u8], pos: &mut usize) -> Result<u64> {
    let mut result = 0u64;
    let mut shift = 0u32;
    loop {
        let byte = *data
            .get(*pos)
            .ok_or_else(|| ParquetError::format_at("truncated varint", *pos as u64))?;
        *pos += 1;
        if shift > 63 {
            return Err(ParquetError::format_at("varint overflows 64 bits", *pos as u64));
        }
        result |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }
}

/// Unpack `count` LSB-first values of `bit_width` bits (at most 64).
pub(crate) fn unpack_lsb(data: &[u8], bit_width: u8, count: usize, out: &mut Vec<u64>) {
    let width = bit_width as usize;
    let mask = if width == 64 { u64::MAX } else { (1u64 << width) - 1 };
    let mut bit = 0usize;
    for _ in 0..count {
        let byte = bit / 8;
        let mut window = 0u128;
        for k in 0..9 {
            if let Some(&b) = data.get(byte + k) {
                window |= u128::from(b) << (8 * k);
            }
        }
        out.push((window >> (bit % 8)) as u64 & mask);
        bit += width;
    }
}

/// Decode exactly `count` values of RLE / bit-packed hybrid data.
///
/// Runs are consumed until the value budget is met; a trailing bit-packed
/// group may hold padding past the last real value.
pub fn decode_hybrid(data: &[u8], bit_width: u8, count: usize) -> Result<Vec<u32>> {
    if bit_width > 32 {
        return Err(ParquetError::format(format!(
            "hybrid bit width {bit_width} exceeds 32"
        )));
    }
    if bit_width == 0 {
        return Ok(vec![0; count]);
    }

    let mut out: Vec<u32> = Vec::with_capacity(count);
    let mut scratch: Vec<u64> = Vec::with_capacity(8);
    let mut pos = 0usize;
    let value_bytes = (bit_width as usize).div_ceil(8);

    while out.len() < count {
        if pos >= data.len() {
            return Err(ParquetError::format_at(
                format!("hybrid data ended after {} of {count} values", out.len()),
                pos as u64,
            ));
        }
        let header = read_uleb128(data, &mut pos)?;
        let remaining = count - out.len();

        if header & 1 == 0 {
            let run = usize::try_from(header >> 1).unwrap_or(usize::MAX);
            let bytes = data.get(pos..pos + value_bytes).ok_or_else(|| {
                ParquetError::format_at("truncated RLE run value", pos as u64)
            })?;
            pos += value_bytes;
            let mut value = 0u32;
            for (i, b) in bytes.iter().enumerate() {
                value |= u32::from(*b) << (8 * i);
            }
            if run == 0 {
                return Err(ParquetError::format_at("empty RLE run", pos as u64));
            }
            out.extend(std::iter::repeat_n(value, run.min(remaining)));
        } else {
            let groups = usize::try_from(header >> 1).unwrap_or(usize::MAX);
            let group_bytes = groups.saturating_mul(bit_width as usize);
            let wanted = groups.saturating_mul(8).min(remaining);
            let needed_bytes = (wanted * bit_width as usize).div_ceil(8);
            if pos + needed_bytes > data.len() {
                return Err(ParquetError::format_at(
                    format!("bit-packed run of {groups} groups overflows the buffer"),
                    pos as u64,
                ));
            }
            scratch.clear();
            unpack_lsb(&data[pos..], bit_width, wanted, &mut scratch);
            out.extend(scratch.iter().map(|&v| v as u32));
            pos += group_bytes.min(data.len() - pos);
        }
    }
    Ok(out)
}

/// V1 level section: 4-byte little-endian length, then hybrid data.
///
/// Returns the levels and the number of bytes consumed.
pub fn decode_prefixed_hybrid(data: &[u8], bit_width: u8, count: usize) -> Result<(Vec<u32>, usize)> {
    let prefix = data
        .get(..4)
        .ok_or_else(|| ParquetError::format("truncated level length prefix"))?;
    let len = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
    let body = data.get(4..4 + len).ok_or_else(|| {
        ParquetError::format(format!("level section of {len} bytes overflows the page"))
    })?;
    Ok((decode_hybrid(body, bit_width, count)?, 4 + len))
}

/// Deprecated BIT_PACKED level encoding: MSB-first, no header.
///
/// Returns the levels and the number of bytes consumed.
pub fn decode_bit_packed_msb(data: &[u8], bit_width: u8, count: usize) -> Result<(Vec<u32>, usize)> {
    let width = bit_width as usize;
    let total_bytes = (count * width).div_ceil(8);
    if total_bytes > data.len() {
        return Err(ParquetError::format(format!(
            "bit-packed levels need {total_bytes} bytes, page has {}",
            data.len()
        )));
    }
    let mut out = Vec::with_capacity(count);
    let mut bit = 0usize;
    for _ in 0..count {
        let mut value = 0u32;
        for _ in 0..width {
            let b = (data[bit / 8] >> (7 - bit % 8)) & 1;
            value = (value << 1) | u32::from(b);
            bit += 1;
        }
        out.push(value);
    }
    Ok((out, total_bytes))
}
