//! PLAIN encoding of every physical type.

use bytes::Bytes;

use crate::error::{ParquetError, Result};
use crate::metadata::PhysicalType;
use crate::value::Value;

fn fixed_width(physical: PhysicalType, type_length: Option<i32>) -> Result<Option<usize>> {
    Ok(match physical {
        PhysicalType::Boolean | PhysicalType::ByteArray => None,
        PhysicalType::Int32 | PhysicalType::Float => Some(4),
        PhysicalType::Int64 | PhysicalType::Double => Some(8),
        PhysicalType::Int96 => Some(12),
        PhysicalType::FixedLenByteArray => {
            let len = type_length
                .filter(|&len| len >= 0)
                .ok_or_else(|| ParquetError::format("FIXED_LEN_BYTE_ARRAY without type_length"))?;
            Some(len as usize)
        }
    })
}

/// Interpret `width` little-endian bytes as a raw value of `physical`.
fn fixed_value(physical: PhysicalType, data: &Bytes, start: usize, width: usize) -> Value {
    let b = &data[start..start + width];
    match physical {
        PhysicalType::Int32 => Value::Int32(i32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        PhysicalType::Float => Value::Float(f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        PhysicalType::Int64 => {
            Value::Int64(i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
        }
        PhysicalType::Double => {
            Value::Double(f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
        }
        _ => Value::Bytes(data.slice(start..start + width)),
    }
}

/// Decode `count` PLAIN values from the start of `data`.
///
/// Byte arrays are sliced from `data` without copying. Returns the values
/// and the number of bytes consumed.
pub fn decode_plain(
    data: &Bytes,
    physical: PhysicalType,
    type_length: Option<i32>,
    count: usize,
) -> Result<(Vec<Value>, usize)> {
    let mut values = Vec::with_capacity(count);
    match (physical, fixed_width(physical, type_length)?) {
        (PhysicalType::Boolean, _) => {
            let bytes = count.div_ceil(8);
            if bytes > data.len() {
                return Err(truncated(physical, count, data.len()));
            }
            for i in 0..count {
                values.push(Value::Bool((data[i / 8] >> (i % 8)) & 1 == 1));
            }
            Ok((values, bytes))
        }
        (_, Some(width)) => {
            let bytes = count
                .checked_mul(width)
                .filter(|&bytes| bytes <= data.len())
                .ok_or_else(|| truncated(physical, count, data.len()))?;
            for i in 0..count {
                values.push(fixed_value(physical, data, i * width, width));
            }
            Ok((values, bytes))
        }
        (_, None) => {
            let mut pos = 0usize;
            for _ in 0..count {
                let prefix = data
                    .get(pos..pos + 4)
                    .ok_or_else(|| truncated(physical, count, data.len()))?;
                let len = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
                let start = pos + 4;
                let end = start
                    .checked_add(len)
                    .filter(|&end| end <= data.len())
                    .ok_or_else(|| {
                        ParquetError::format_at(
                            format!("byte array of {len} bytes overflows the page"),
                            pos as u64,
                        )
                    })?;
                values.push(Value::Bytes(data.slice(start..end)));
                pos = end;
            }
            Ok((values, pos))
        }
    }
}

/// Interpret the gathered bytes of one fixed-width value.
pub(crate) fn fixed_from_bytes(physical: PhysicalType, bytes: Bytes) -> Value {
    let width = bytes.len();
    fixed_value(physical, &bytes, 0, width)
}

fn truncated(physical: PhysicalType, count: usize, available: usize) -> ParquetError {
    ParquetError::format(format!(
        "page too short for {count} PLAIN {physical:?} values ({available} bytes)"
    ))
}
