//! Decoded column values.

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};
use std::cmp::Ordering;
use std::fmt;

use crate::metadata::TimeUnit;

/// Exact fixed-point decimal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decimal {
    pub unscaled: i128,
    pub scale: i32,
    pub precision: i32,
}

/// Instant since the Unix epoch in the annotated unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub value: i64,
    pub unit: TimeUnit,
    pub adjusted_to_utc: bool,
}

impl Timestamp {
    /// `None` when the instant is outside chrono's range
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self.unit {
            TimeUnit::Millis => DateTime::from_timestamp_millis(self.value),
            TimeUnit::Micros => DateTime::from_timestamp_micros(self.value),
            TimeUnit::Nanos => Some(DateTime::from_timestamp_nanos(self.value)),
        }
    }

    fn nanos(&self) -> i128 {
        i128::from(self.value) * i128::from(1_000_000_000 / self.unit.per_second())
    }
}

/// Time of day since midnight in the annotated unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Time {
    pub value: i64,
    pub unit: TimeUnit,
    pub adjusted_to_utc: bool,
}

impl Time {
    fn nanos(&self) -> i128 {
        i128::from(self.value) * i128::from(1_000_000_000 / self.unit.per_second())
    }
}

/// A single logical value read from a column
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    /// UINT_64 / INTEGER(64, unsigned)
    UInt64(u64),
    Float(f32),
    Double(f64),
    Bytes(Bytes),
    String(String),
    Decimal(Decimal),
    Date(NaiveDate),
    Timestamp(Timestamp),
    Time(Time),
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(v) => Some(i64::from(*v)),
            Value::Int64(v) => Some(*v),
            Value::UInt64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Compare two values of compatible types.
    ///
    /// Integers of any width compare exactly; an integer against a float
    /// compares as `f64`. Strings and byte arrays compare bytewise, decimals
    /// after aligning scales, timestamps and times across units. Returns
    /// `None` for incomparable pairs, including anything against `Null`.
    pub fn partial_cmp_value(&self, other: &Value) -> Option<Ordering> {
        use Value::*;
        match (self, other) {
            (Bool(a), Bool(b)) => Some(a.cmp(b)),
            (String(a), String(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
            (Bytes(a), Bytes(b)) => Some(a.as_ref().cmp(b.as_ref())),
            (String(a), Bytes(b)) => Some(a.as_bytes().cmp(b.as_ref())),
            (Bytes(a), String(b)) => Some(a.as_ref().cmp(b.as_bytes())),
            (Date(a), Date(b)) => Some(a.cmp(b)),
            (Timestamp(a), Timestamp(b)) => Some(a.nanos().cmp(&b.nanos())),
            (Time(a), Time(b)) => Some(a.nanos().cmp(&b.nanos())),
            (Decimal(a), Decimal(b)) => compare_decimals(a, b),
            (Decimal(a), b) => b.as_integer().and_then(|b| compare_decimals(a, &integer_decimal(b))),
            (a, Decimal(b)) => a.as_integer().and_then(|a| compare_decimals(&integer_decimal(a), b)),
            (a, b) => match (a.as_integer(), b.as_integer()) {
                (Some(a), Some(b)) => Some(a.cmp(&b)),
                _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
            },
        }
    }

    fn as_integer(&self) -> Option<i128> {
        match self {
            Value::Int32(v) => Some(i128::from(*v)),
            Value::Int64(v) => Some(i128::from(*v)),
            Value::UInt64(v) => Some(i128::from(*v)),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            other => other.as_integer().map(|v| v as f64),
        }
    }
}

fn integer_decimal(unscaled: i128) -> Decimal {
    Decimal {
        unscaled,
        scale: 0,
        precision: 38,
    }
}

fn compare_decimals(a: &Decimal, b: &Decimal) -> Option<Ordering> {
    let rescale = |d: &Decimal, scale: i32| -> Option<i128> {
        let factor = 10i128.checked_pow(u32::try_from(scale - d.scale).ok()?)?;
        d.unscaled.checked_mul(factor)
    };
    let scale = a.scale.max(b.scale);
    match (rescale(a, scale), rescale(b, scale)) {
        (Some(a), Some(b)) => Some(a.cmp(&b)),
        // Overflow only happens far outside any realistic precision
        _ => {
            let a = a.unscaled as f64 / 10f64.powi(a.scale);
            let b = b.unscaled as f64 / 10f64.powi(b.scale);
            a.partial_cmp(&b)
        }
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale <= 0 {
            let zeros = "0".repeat(self.scale.unsigned_abs() as usize);
            return if self.unscaled == 0 {
                write!(f, "0")
            } else {
                write!(f, "{}{}", self.unscaled, zeros)
            };
        }

        let digits = self.unscaled.unsigned_abs().to_string();
        let scale = self.scale as usize;
        let sign = if self.unscaled < 0 { "-" } else { "" };
        if digits.len() > scale {
            let (int_part, frac_part) = digits.split_at(digits.len() - scale);
            write!(f, "{sign}{int_part}.{frac_part}")
        } else {
            write!(f, "{sign}0.{digits:0>scale$}")
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::UInt64(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Bytes(bytes) => {
                for byte in bytes.iter() {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Value::String(s) => write!(f, "{s}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Timestamp(ts) => match ts.to_datetime() {
                Some(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.f")),
                None => write!(f, "{}({:?})", ts.value, ts.unit),
            },
            Value::Time(t) => {
                let nanos = t.nanos();
                let secs = nanos / 1_000_000_000;
                write!(
                    f,
                    "{:02}:{:02}:{:02}.{:09}",
                    secs / 3600,
                    secs / 60 % 60,
                    secs % 60,
                    nanos % 1_000_000_000
                )
            }
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}
