//! DELTA_BINARY_PACKED and the two byte-array encodings built on it.

use bytes::{Bytes, BytesMut};

use super::rle::{read_uleb128, unpack_lsb};
use crate::config::MAX_DELTA_BLOCK_SIZE;
use crate::error::{ParquetError, Result};

fn read_zigzag(data: &[u8], pos: &mut usize) -> Result<i64> {
    let n = read_uleb128(data, pos)?;
    Ok(((n >> 1) as i64) ^ -((n & 1) as i64))
}

/// Decode a DELTA_BINARY_PACKED stream.
///
/// Returns every value the header declares and the number of bytes
/// consumed. Arithmetic wraps, matching writers that compute deltas in
/// two's complement.
pub fn decode_delta_binary_packed(data: &[u8]) -> Result<(Vec<i64>, usize)> {
    let mut pos = 0usize;
    let block_size = usize::try_from(read_uleb128(data, &mut pos)?).unwrap_or(usize::MAX);
    let miniblocks = usize::try_from(read_uleb128(data, &mut pos)?).unwrap_or(usize::MAX);
    let total = usize::try_from(read_uleb128(data, &mut pos)?).unwrap_or(usize::MAX);
    let first = read_zigzag(data, &mut pos)?;

    if block_size > MAX_DELTA_BLOCK_SIZE {
        return Err(ParquetError::format(format!(
            "delta block of {block_size} values exceeds the {MAX_DELTA_BLOCK_SIZE} limit"
        )));
    }
    if miniblocks == 0 || block_size == 0 || block_size % miniblocks != 0 {
        return Err(ParquetError::format(format!(
            "invalid delta header: block size {block_size}, {miniblocks} miniblocks"
        )));
    }
    let per_miniblock = block_size / miniblocks;
    if per_miniblock % 8 != 0 {
        return Err(ParquetError::format(format!(
            "miniblock of {per_miniblock} values is not a multiple of 8"
        )));
    }
    // Each block costs at least its min delta and bit width bytes
    let max_blocks = data.len() / (1 + miniblocks) + 1;
    if total.saturating_sub(1) > max_blocks.saturating_mul(block_size) {
        return Err(ParquetError::format(format!(
            "delta header declares {total} values in {} bytes",
            data.len()
        )));
    }

    // Capacity follows the input size; zero-width blocks grow past it
    let mut values = Vec::with_capacity(total.min(data.len().saturating_mul(8)));
    if total == 0 {
        return Ok((values, pos));
    }
    values.push(first);
    let mut last = first;
    let mut deltas = Vec::with_capacity(per_miniblock);

    while values.len() < total {
        let min_delta = read_zigzag(data, &mut pos)?;
        let widths = data.get(pos..pos.saturating_add(miniblocks)).ok_or_else(|| {
            ParquetError::format_at("truncated delta block bit widths", pos as u64)
        })?;
        pos += miniblocks;

        for &width in widths {
            if values.len() >= total {
                break;
            }
            if width > 64 {
                return Err(ParquetError::format_at(
                    format!("delta bit width {width} exceeds 64"),
                    pos as u64,
                ));
            }
            let wanted = per_miniblock.min(total - values.len());
            let needed = (wanted * width as usize).div_ceil(8);
            if needed > data.len() - pos {
                return Err(ParquetError::format_at("truncated delta miniblock", pos as u64));
            }
            deltas.clear();
            unpack_lsb(&data[pos..], width, wanted, &mut deltas);
            for &delta in &deltas {
                last = last.wrapping_add(min_delta).wrapping_add(delta as i64);
                values.push(last);
            }
            // Miniblocks holding values are padded to full size
            let padded = per_miniblock
                .checked_mul(width as usize)
                .map_or(usize::MAX, |bits| bits / 8);
            pos += padded.min(data.len() - pos);
        }
    }
    Ok((values, pos))
}

fn lengths(values: Vec<i64>) -> Result<Vec<usize>> {
    values
        .into_iter()
        .map(|len| {
            usize::try_from(len)
                .map_err(|_| ParquetError::format(format!("negative byte array length {len}")))
        })
        .collect()
}

/// Decode DELTA_LENGTH_BYTE_ARRAY: delta-packed lengths, then the
/// concatenated bytes. Values are sliced from `data` without copying.
pub fn decode_delta_length_byte_array(data: &Bytes) -> Result<(Vec<Bytes>, usize)> {
    let (lengths_raw, mut pos) = decode_delta_binary_packed(data)?;
    let mut values = Vec::with_capacity(lengths_raw.len());
    for len in lengths(lengths_raw)? {
        let end = pos
            .checked_add(len)
            .filter(|&end| end <= data.len())
            .ok_or_else(|| {
                ParquetError::format_at(format!("byte array of {len} bytes overflows the page"), pos as u64)
            })?;
        values.push(data.slice(pos..end));
        pos = end;
    }
    Ok((values, pos))
}

/// Decode DELTA_BYTE_ARRAY: prefix lengths, then suffixes as
/// DELTA_LENGTH_BYTE_ARRAY. Each value is the previous value's prefix
/// followed by its suffix.
pub fn decode_delta_byte_array(data: &Bytes) -> Result<(Vec<Bytes>, usize)> {
    let (prefixes, consumed) = decode_delta_binary_packed(data)?;
    let prefixes = lengths(prefixes)?;
    let (suffixes, suffix_len) = decode_delta_length_byte_array(&data.slice(consumed..))?;
    if suffixes.len() != prefixes.len() {
        return Err(ParquetError::format(format!(
            "{} prefix lengths but {} suffixes",
            prefixes.len(),
            suffixes.len()
        )));
    }

    let mut values: Vec<Bytes> = Vec::with_capacity(prefixes.len());
    let mut previous = Bytes::new();
    for (prefix, suffix) in prefixes.into_iter().zip(suffixes) {
        if prefix > previous.len() {
            return Err(ParquetError::format(format!(
                "prefix length {prefix} exceeds previous value of {} bytes",
                previous.len()
            )));
        }
        let value = if prefix == 0 {
            suffix
        } else {
            let mut buf = BytesMut::with_capacity(prefix + suffix.len());
            buf.extend_from_slice(&previous[..prefix]);
            buf.extend_from_slice(&suffix);
            buf.freeze()
        };
        previous = value.clone();
        values.push(value);
    }
    Ok((values, consumed + suffix_len))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn uleb(out: &mut Vec<u8>, mut v: u64) {
        loop {
            let b = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                out.push(b);
                return;
            }
            out.push(b | 0x80);
        }
    }

    fn zigzag(out: &mut Vec<u8>, v: i64) {
        uleb(out, ((v << 1) ^ (v >> 63)) as u64);
    }

    /// Straightforward encoder with one block of 4 miniblocks of 32 values.
    pub(crate) fn encode_delta(values: &[i64]) -> Vec<u8> {
        let mut out = Vec::new();
        uleb(&mut out, 128);
        uleb(&mut out, 4);
        uleb(&mut out, values.len() as u64);
        zigzag(&mut out, values.first().copied().unwrap_or(0));
        let deltas: Vec<i64> = values.windows(2).map(|w| w[1].wrapping_sub(w[0])).collect();
        for block in deltas.chunks(128) {
            let min = *block.iter().min().unwrap();
            zigzag(&mut out, min);
            let adjusted: Vec<u64> = block.iter().map(|d| d.wrapping_sub(min) as u64).collect();
            let minis: Vec<&[u64]> = adjusted.chunks(32).collect();
            let widths: Vec<u8> = (0..4)
                .map(|i| {
                    minis
                        .get(i)
                        .map(|m| m.iter().map(|v| 64 - v.leading_zeros() as u8).max().unwrap_or(0))
                        .unwrap_or(0)
                })
                .collect();
            out.extend_from_slice(&widths);
            for (mini, &width) in minis.iter().zip(&widths) {
                let mut bits = vec![0u8; 32 * width as usize / 8];
                for (i, &v) in mini.iter().enumerate() {
                    for b in 0..width as usize {
                        if v >> b & 1 == 1 {
                            let bit = i * width as usize + b;
                            bits[bit / 8] |= 1 << (bit % 8);
                        }
                    }
                }
                out.extend_from_slice(&bits);
            }
        }
        out
    }

    #[test]
    fn test_delta_binary_packed() {
        let values: Vec<i64> = (0..300).map(|i| i * i - 7 * i).collect();
        let encoded = encode_delta(&values);
        let (decoded, consumed) = decode_delta_binary_packed(&encoded).unwrap();
        assert_eq!(decoded, values);
        assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn test_delta_wrapping_extremes() {
        let values = vec![i64::MAX, i64::MIN, 0, -1, i64::MAX];
        let (decoded, _) = decode_delta_binary_packed(&encode_delta(&values)).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_delta_single_and_empty() {
        let (decoded, _) = decode_delta_binary_packed(&encode_delta(&[42])).unwrap();
        assert_eq!(decoded, vec![42]);
        let (decoded, _) = decode_delta_binary_packed(&encode_delta(&[])).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_delta_truncated() {
        let encoded = encode_delta(&(0..100).map(|i| i * i).collect::<Vec<_>>());
        let err = decode_delta_binary_packed(&encoded[..encoded.len() / 2]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn test_delta_corrupt_header_sizes() {
        // block of 2^62 values, one miniblock, two values, width 64
        let mut data = Vec::new();
        uleb(&mut data, 1 << 62);
        uleb(&mut data, 1);
        uleb(&mut data, 2);
        zigzag(&mut data, 0);
        zigzag(&mut data, 0);
        data.push(64);
        data.extend_from_slice(&[0xff; 8]);
        let err = decode_delta_binary_packed(&data).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        assert!(err.to_string().contains("exceeds"));

        // plausible block, but a value count no page of this size could hold
        let mut data = Vec::new();
        uleb(&mut data, 128);
        uleb(&mut data, 4);
        uleb(&mut data, u64::MAX >> 1);
        zigzag(&mut data, 0);
        let err = decode_delta_binary_packed(&data).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn test_delta_length_byte_array() {
        let words = ["hello", "", "parquet", "x"];
        let lens: Vec<i64> = words.iter().map(|w| w.len() as i64).collect();
        let mut data = encode_delta(&lens);
        for w in words {
            data.extend_from_slice(w.as_bytes());
        }
        let (values, consumed) = decode_delta_length_byte_array(&Bytes::from(data.clone())).unwrap();
        let strings: Vec<&[u8]> = values.iter().map(|b| b.as_ref()).collect();
        assert_eq!(strings, vec![&b"hello"[..], b"", b"parquet", b"x"]);
        assert_eq!(consumed, data.len());
    }

    #[test]
    fn test_delta_byte_array() {
        // apple, applesauce, apply, banana
        let prefixes = [0i64, 5, 4, 0];
        let suffixes = ["apple", "sauce", "y", "banana"];
        let mut data = encode_delta(&prefixes);
        data.extend(encode_delta(
            &suffixes.iter().map(|s| s.len() as i64).collect::<Vec<_>>(),
        ));
        for s in suffixes {
            data.extend_from_slice(s.as_bytes());
        }
        let (values, _) = decode_delta_byte_array(&Bytes::from(data)).unwrap();
        let strings: Vec<&[u8]> = values.iter().map(|b| b.as_ref()).collect();
        assert_eq!(strings, vec![&b"apple"[..], b"applesauce", b"apply", b"banana"]);
    }

    #[test]
    fn test_delta_byte_array_bad_prefix() {
        let mut data = encode_delta(&[3]);
        data.extend(encode_delta(&[1]));
        data.push(b'a');
        let err = decode_delta_byte_array(&Bytes::from(data)).unwrap_err();
        assert!(err.to_string().contains("prefix length"));
    }
}
