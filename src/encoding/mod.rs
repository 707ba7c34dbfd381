//! Value encodings.
//!
//! [`decode_values`] turns the value section of a data page into raw
//! physical values. Logical conversion happens later in
//! [`ValueConverter`](crate::convert::ValueConverter).

mod byte_stream_split;
mod delta;
mod plain;
mod rle;

pub use byte_stream_split::decode_byte_stream_split;
pub use delta::{decode_delta_binary_packed, decode_delta_byte_array, decode_delta_length_byte_array};
pub use plain::decode_plain;
pub use rle::{bit_width, decode_bit_packed_msb, decode_hybrid, decode_prefixed_hybrid};

use bytes::Bytes;

use crate::error::{ParquetError, Result};
use crate::metadata::{Encoding, PhysicalType};
use crate::value::Value;

fn unsupported(encoding: Encoding, physical: PhysicalType) -> ParquetError {
    ParquetError::UnsupportedEncoding {
        encoding,
        what: format!("{physical:?} values"),
    }
}

/// Decode `count` non-null values encoded with `encoding`.
///
/// Dictionary encodings resolve indices against `dictionary`, which must
/// hold the chunk's decoded dictionary page.
pub fn decode_values(
    encoding: Encoding,
    data: &Bytes,
    physical: PhysicalType,
    type_length: Option<i32>,
    count: usize,
    dictionary: Option<&[Value]>,
) -> Result<Vec<Value>> {
    let values = match encoding {
        Encoding::Plain => decode_plain(data, physical, type_length, count)?.0,
        Encoding::PlainDictionary | Encoding::RleDictionary => {
            let dictionary = dictionary.ok_or_else(|| {
                ParquetError::format("dictionary-encoded page without a dictionary page")
            })?;
            decode_dictionary_indices(data, count, dictionary)?
        }
        Encoding::Rle if physical == PhysicalType::Boolean => {
            let (bits, _) = decode_prefixed_hybrid(data, 1, count)?;
            bits.into_iter().map(|bit| Value::Bool(bit == 1)).collect()
        }
        Encoding::DeltaBinaryPacked => {
            let (values, _) = decode_delta_binary_packed(data)?;
            let values = values.into_iter().take(count);
            match physical {
                PhysicalType::Int32 => values.map(|v| Value::Int32(v as i32)).collect(),
                PhysicalType::Int64 => values.map(Value::Int64).collect(),
                other => return Err(unsupported(encoding, other)),
            }
        }
        Encoding::DeltaLengthByteArray if physical == PhysicalType::ByteArray => {
            let (values, _) = decode_delta_length_byte_array(data)?;
            values.into_iter().take(count).map(Value::Bytes).collect()
        }
        Encoding::DeltaByteArray
            if matches!(physical, PhysicalType::ByteArray | PhysicalType::FixedLenByteArray) =>
        {
            let (values, _) = decode_delta_byte_array(data)?;
            values.into_iter().take(count).map(Value::Bytes).collect()
        }
        Encoding::ByteStreamSplit => decode_byte_stream_split(data, physical, type_length, count)?,
        other => return Err(unsupported(other, physical)),
    };

    if values.len() < count {
        return Err(ParquetError::format(format!(
            "{encoding:?} page holds {} values, {count} expected",
            values.len()
        )));
    }
    Ok(values)
}

/// Bit-width byte followed by hybrid-encoded dictionary indices.
fn decode_dictionary_indices(data: &[u8], count: usize, dictionary: &[Value]) -> Result<Vec<Value>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let (&width, rest) = data
        .split_first()
        .ok_or_else(|| ParquetError::format("empty dictionary index data"))?;
    let indices = decode_hybrid(rest, width, count)?;
    indices
        .into_iter()
        .map(|index| {
            dictionary.get(index as usize).cloned().ok_or_else(|| {
                ParquetError::format(format!(
                    "dictionary index {index} out of range for {} entries",
                    dictionary.len()
                ))
            })
        })
        .collect()
}
