//! Mapping of physical values to logical values.
//!
//! A [`ValueConverter`] is prepared once per column from the leaf schema
//! element and then applied to every decoded value. All conversions are
//! exact: decimals stay fixed-point and timestamps stay integral.

use bytes::Bytes;
use chrono::NaiveDate;

use crate::error::{ParquetError, Result};
use crate::metadata::{ConvertedType, LogicalType, PhysicalType, SchemaElement, TimeUnit};
use crate::value::{Decimal, Time, Timestamp, Value};

/// Days from 0001-01-01 (CE day 1) to 1970-01-01
const UNIX_EPOCH_FROM_CE: i32 = 719_163;

/// Julian day number of 1970-01-01
const JULIAN_DAY_OF_EPOCH: i64 = 2_440_588;

const NANOS_PER_DAY: i64 = 86_400 * 1_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Conversion {
    Identity,
    Utf8,
    Decimal { scale: i32, precision: i32 },
    Date,
    Timestamp { unit: TimeUnit, adjusted_to_utc: bool },
    Time { unit: TimeUnit, adjusted_to_utc: bool },
    Int96Timestamp,
    Unsigned { bit_width: u8 },
    Float16,
}

/// Converts raw physical values of one column into logical values
#[derive(Debug, Clone, PartialEq)]
pub struct ValueConverter {
    physical_type: PhysicalType,
    conversion: Conversion,
}

impl ValueConverter {
    pub fn new(element: &SchemaElement) -> Result<Self> {
        let physical_type = element.physical_type.ok_or_else(|| {
            ParquetError::format(format!("{} is not a leaf column", element.name))
        })?;
        let conversion = match element.logical_type {
            Some(logical) => from_logical(logical),
            None => from_converted(element),
        };
        let conversion = match (conversion, physical_type) {
            (Conversion::Identity, PhysicalType::Int96) => Conversion::Int96Timestamp,
            (other, _) => other,
        };
        Ok(Self {
            physical_type,
            conversion,
        })
    }

    pub fn physical_type(&self) -> PhysicalType {
        self.physical_type
    }

    /// Convert one raw value; `Null` passes through.
    pub fn convert(&self, raw: Value) -> Result<Value> {
        if raw.is_null() {
            return Ok(raw);
        }
        match self.conversion {
            Conversion::Identity => Ok(raw),
            Conversion::Utf8 => match raw {
                Value::Bytes(bytes) => utf8(bytes),
                other => Err(mismatch("UTF-8 string", &other)),
            },
            Conversion::Decimal { scale, precision } => {
                let unscaled = match raw {
                    Value::Int32(v) => i128::from(v),
                    Value::Int64(v) => i128::from(v),
                    Value::Bytes(bytes) => decimal_from_be_bytes(&bytes)?,
                    other => return Err(mismatch("decimal", &other)),
                };
                Ok(Value::Decimal(Decimal {
                    unscaled,
                    scale,
                    precision,
                }))
            }
            Conversion::Date => match raw {
                Value::Int32(days) => date_from_days(days).map(Value::Date),
                other => Err(mismatch("date", &other)),
            },
            Conversion::Timestamp {
                unit,
                adjusted_to_utc,
            } => match raw {
                Value::Int64(value) => Ok(Value::Timestamp(Timestamp {
                    value,
                    unit,
                    adjusted_to_utc,
                })),
                Value::Bytes(bytes) if bytes.len() == 12 => int96_timestamp(&bytes),
                other => Err(mismatch("timestamp", &other)),
            },
            Conversion::Time {
                unit,
                adjusted_to_utc,
            } => {
                let value = match raw {
                    Value::Int32(v) => i64::from(v),
                    Value::Int64(v) => v,
                    other => return Err(mismatch("time", &other)),
                };
                Ok(Value::Time(Time {
                    value,
                    unit,
                    adjusted_to_utc,
                }))
            }
            Conversion::Int96Timestamp => match raw {
                Value::Bytes(bytes) => int96_timestamp(&bytes),
                other => Err(mismatch("INT96 timestamp", &other)),
            },
            Conversion::Unsigned { bit_width } => match raw {
                Value::Int32(v) if bit_width < 32 => Ok(Value::Int32(v)),
                Value::Int32(v) => Ok(Value::Int64(i64::from(v as u32))),
                Value::Int64(v) => Ok(Value::UInt64(v as u64)),
                other => Err(mismatch("unsigned integer", &other)),
            },
            Conversion::Float16 => match raw {
                Value::Bytes(bytes) if bytes.len() == 2 => {
                    Ok(Value::Float(f16_to_f32(u16::from_le_bytes([bytes[0], bytes[1]]))))
                }
                other => Err(mismatch("FLOAT16", &other)),
            },
        }
    }
}

fn from_logical(logical: LogicalType) -> Conversion {
    match logical {
        LogicalType::String | LogicalType::Enum | LogicalType::Json => Conversion::Utf8,
        LogicalType::Decimal { scale, precision } => Conversion::Decimal { scale, precision },
        LogicalType::Date => Conversion::Date,
        LogicalType::Timestamp {
            adjusted_to_utc,
            unit,
        } => Conversion::Timestamp {
            unit,
            adjusted_to_utc,
        },
        LogicalType::Time {
            adjusted_to_utc,
            unit,
        } => Conversion::Time {
            unit,
            adjusted_to_utc,
        },
        LogicalType::Integer {
            bit_width,
            signed: false,
        } => Conversion::Unsigned {
            bit_width: bit_width.max(0) as u8,
        },
        LogicalType::Float16 => Conversion::Float16,
        LogicalType::Integer { signed: true, .. }
        | LogicalType::Map
        | LogicalType::List
        | LogicalType::Unknown
        | LogicalType::Bson
        | LogicalType::Uuid => Conversion::Identity,
    }
}

fn from_converted(element: &SchemaElement) -> Conversion {
    let Some(converted) = element.converted_type else {
        return Conversion::Identity;
    };
    match converted {
        ConvertedType::Utf8 | ConvertedType::Enum | ConvertedType::Json => Conversion::Utf8,
        ConvertedType::Decimal => Conversion::Decimal {
            scale: element.scale.unwrap_or(0),
            precision: element.precision.unwrap_or(0),
        },
        ConvertedType::Date => Conversion::Date,
        // Legacy timestamp annotations are UTC-normalized
        ConvertedType::TimestampMillis => Conversion::Timestamp {
            unit: TimeUnit::Millis,
            adjusted_to_utc: true,
        },
        ConvertedType::TimestampMicros => Conversion::Timestamp {
            unit: TimeUnit::Micros,
            adjusted_to_utc: true,
        },
        ConvertedType::TimeMillis => Conversion::Time {
            unit: TimeUnit::Millis,
            adjusted_to_utc: true,
        },
        ConvertedType::TimeMicros => Conversion::Time {
            unit: TimeUnit::Micros,
            adjusted_to_utc: true,
        },
        ConvertedType::Uint8 => Conversion::Unsigned { bit_width: 8 },
        ConvertedType::Uint16 => Conversion::Unsigned { bit_width: 16 },
        ConvertedType::Uint32 => Conversion::Unsigned { bit_width: 32 },
        ConvertedType::Uint64 => Conversion::Unsigned { bit_width: 64 },
        ConvertedType::Map
        | ConvertedType::MapKeyValue
        | ConvertedType::List
        | ConvertedType::Int8
        | ConvertedType::Int16
        | ConvertedType::Int32
        | ConvertedType::Int64
        | ConvertedType::Bson
        | ConvertedType::Interval => Conversion::Identity,
    }
}

fn mismatch(expected: &str, found: &Value) -> ParquetError {
    ParquetError::format(format!("cannot read {found:?} as {expected}"))
}

fn utf8(bytes: Bytes) -> Result<Value> {
    String::from_utf8(bytes.to_vec())
        .map(Value::String)
        .map_err(|e| ParquetError::format(format!("invalid UTF-8 in string column: {e}")))
}

/// Two's-complement big-endian bytes to an i128.
pub fn decimal_from_be_bytes(bytes: &[u8]) -> Result<i128> {
    if bytes.is_empty() {
        return Ok(0);
    }
    let negative = bytes[0] & 0x80 != 0;
    let sign_byte = if negative { 0xff } else { 0x00 };
    let significant = if bytes.len() > 16 {
        let (extra, rest) = bytes.split_at(bytes.len() - 16);
        // Wider encodings are fine as long as the extra bytes are sign extension
        if extra.iter().any(|&b| b != sign_byte) || (rest[0] & 0x80 != 0) != negative {
            return Err(ParquetError::format(format!(
                "decimal of {} bytes overflows 128 bits",
                bytes.len()
            )));
        }
        rest
    } else {
        bytes
    };
    let mut buf = [sign_byte; 16];
    buf[16 - significant.len()..].copy_from_slice(significant);
    Ok(i128::from_be_bytes(buf))
}

/// Days since the Unix epoch to a calendar date.
pub fn date_from_days(days: i32) -> Result<NaiveDate> {
    days.checked_add(UNIX_EPOCH_FROM_CE)
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .ok_or_else(|| ParquetError::format(format!("date {days} days from epoch is out of range")))
}

/// Legacy INT96: 8 bytes nanoseconds of day, then 4 bytes Julian day, both LE.
fn int96_timestamp(bytes: &[u8]) -> Result<Value> {
    if bytes.len() != 12 {
        return Err(ParquetError::format(format!(
            "INT96 value must be 12 bytes, got {}",
            bytes.len()
        )));
    }
    let mut nanos_of_day = [0u8; 8];
    nanos_of_day.copy_from_slice(&bytes[..8]);
    let mut julian_day = [0u8; 4];
    julian_day.copy_from_slice(&bytes[8..]);
    let nanos_of_day = i64::from_le_bytes(nanos_of_day);
    let julian_day = i64::from(i32::from_le_bytes(julian_day));

    let value = (julian_day - JULIAN_DAY_OF_EPOCH)
        .checked_mul(NANOS_PER_DAY)
        .and_then(|nanos| nanos.checked_add(nanos_of_day))
        .ok_or_else(|| ParquetError::format("INT96 timestamp overflows 64-bit nanoseconds"))?;
    Ok(Value::Timestamp(Timestamp {
        value,
        unit: TimeUnit::Nanos,
        adjusted_to_utc: true,
    }))
}

/// IEEE 754 half precision to single precision.
fn f16_to_f32(bits: u16) -> f32 {
    let sign = u32::from(bits >> 15) << 31;
    let exponent = u32::from((bits >> 10) & 0x1f);
    let mantissa = u32::from(bits & 0x3ff);
    let bits32 = match (exponent, mantissa) {
        (0, 0) => sign,
        (0, _) => {
            // Subnormal: normalize into the f32 exponent range
            let mut exponent = 127 - 15 + 1;
            let mut mantissa = mantissa;
            while mantissa & 0x400 == 0 {
                mantissa <<= 1;
                exponent -= 1;
            }
            sign | (exponent << 23) | ((mantissa & 0x3ff) << 13)
        }
        (0x1f, 0) => sign | 0x7f80_0000,
        (0x1f, _) => sign | 0x7fc0_0000 | (mantissa << 13),
        _ => sign | ((exponent + 127 - 15) << 23) | (mantissa << 13),
    };
    f32::from_bits(bits32)
}

/// Decode a raw statistics bound (column index or chunk statistics) into a
/// logical value.
///
/// Bounds use plain encoding without a length prefix for byte arrays.
pub fn decode_statistic(element: &SchemaElement, converter: &ValueConverter, raw: &[u8]) -> Result<Value> {
    let fixed = |width: usize| -> Result<&[u8]> {
        if raw.len() < width {
            return Err(ParquetError::format(format!(
                "statistic for {} has {} bytes, expected {width}",
                element.name,
                raw.len()
            )));
        }
        Ok(&raw[..width])
    };
    let physical = match converter.physical_type() {
        PhysicalType::Boolean => Value::Bool(fixed(1)?[0] != 0),
        PhysicalType::Int32 => {
            let b = fixed(4)?;
            Value::Int32(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        }
        PhysicalType::Int64 => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(fixed(8)?);
            Value::Int64(i64::from_le_bytes(buf))
        }
        PhysicalType::Float => {
            let b = fixed(4)?;
            Value::Float(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        }
        PhysicalType::Double => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(fixed(8)?);
            Value::Double(f64::from_le_bytes(buf))
        }
        PhysicalType::Int96 => Value::Bytes(Bytes::copy_from_slice(fixed(12)?)),
        PhysicalType::ByteArray | PhysicalType::FixedLenByteArray => {
            Value::Bytes(Bytes::copy_from_slice(raw))
        }
    };
    converter.convert(physical)
}
