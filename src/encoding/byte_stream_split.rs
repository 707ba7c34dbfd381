//! BYTE_STREAM_SPLIT: byte `j` of value `i` is stored at `j * n + i`.

use bytes::{Bytes, BytesMut};

use super::plain::fixed_from_bytes;
use crate::error::{ParquetError, Result};
use crate::metadata::PhysicalType;
use crate::value::Value;

pub fn decode_byte_stream_split(
    data: &[u8],
    physical: PhysicalType,
    type_length: Option<i32>,
    count: usize,
) -> Result<Vec<Value>> {
    let width = match physical {
        PhysicalType::Int32 | PhysicalType::Float => 4,
        PhysicalType::Int64 | PhysicalType::Double => 8,
        PhysicalType::FixedLenByteArray => type_length
            .filter(|&len| len > 0)
            .ok_or_else(|| ParquetError::format("FIXED_LEN_BYTE_ARRAY without type_length"))?
            as usize,
        other => {
            return Err(ParquetError::format(format!(
                "BYTE_STREAM_SPLIT does not apply to {other:?}"
            )));
        }
    };
    if data.len() % width != 0 {
        return Err(ParquetError::format(format!(
            "BYTE_STREAM_SPLIT data of {} bytes is not a multiple of {width}",
            data.len()
        )));
    }
    let stride = data.len() / width;
    if count > stride {
        return Err(ParquetError::format(format!(
            "BYTE_STREAM_SPLIT data holds {stride} values, {count} expected"
        )));
    }

    let mut values = Vec::with_capacity(count);
    let mut scratch = BytesMut::with_capacity(width);
    for i in 0..count {
        scratch.clear();
        for j in 0..width {
            scratch.extend_from_slice(&[data[j * stride + i]]);
        }
        let value: Bytes = scratch.split().freeze();
        values.push(fixed_from_bytes(physical, value));
    }
    Ok(values)
}
