use std::fmt;
use std::ops::Range;

use crate::error::{ParquetError, Result};

/// A validated byte range request.
///
/// Three shapes are accepted:
/// - `start..end` (both non-negative, `start <= end`)
/// - `start..` (to end of file)
/// - `-len..` (the last `len` bytes of the file)
///
/// A negative start combined with an explicit end is rejected before any
/// I/O is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    start: i64,
    end: Option<i64>,
}

/// Canonical identity of a byte range once the file length is known.
///
/// An absolute range and an equivalent suffix range map to the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RangeKey {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Validate a `(start, end?)` pair.
    pub fn new(start: i64, end: Option<i64>) -> Result<Self> {
        match end {
            Some(_) if start < 0 => Err(ParquetError::invalid_range(
                start,
                end,
                "a suffix range cannot have an end",
            )),
            Some(end_value) if end_value < start => Err(ParquetError::invalid_range(
                start,
                end,
                "start is greater than end",
            )),
            _ => Ok(Self { start, end }),
        }
    }

    /// Absolute range `[start, end)`.
    pub fn bounded(start: u64, end: u64) -> Result<Self> {
        let start = to_signed(start)?;
        let end = to_signed(end)?;
        Self::new(start, Some(end))
    }

    /// The last `len` bytes of the file.
    pub fn suffix(len: u64) -> Result<Self> {
        let len = to_signed(len)?;
        Self::new(-len, None)
    }

    /// Everything from `start` to end of file.
    pub fn from_offset(start: u64) -> Result<Self> {
        Self::new(to_signed(start)?, None)
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn end(&self) -> Option<i64> {
        self.end
    }

    pub fn is_suffix(&self) -> bool {
        self.start < 0
    }

    /// Resolve against the file length.
    ///
    /// Suffix ranges longer than the file and ends past the file are clamped
    /// to the file, as HTTP servers do. A start past the end of the file is
    /// an invalid range.
    pub fn resolve(&self, total_length: u64) -> Result<Range<u64>> {
        if self.start < 0 {
            let len = self.start.unsigned_abs();
            return Ok(total_length.saturating_sub(len)..total_length);
        }
        let start = self.start as u64;
        if start > total_length {
            return Err(ParquetError::invalid_range(
                self.start,
                self.end,
                "start is past the end of the file",
            ));
        }
        let end = match self.end {
            Some(end) => (end as u64).min(total_length),
            None => total_length,
        };
        Ok(start..end)
    }

    /// Canonical cache key for this range in a file of `total_length` bytes.
    pub fn key(&self, total_length: u64) -> Result<RangeKey> {
        let range = self.resolve(total_length)?;
        Ok(RangeKey {
            start: range.start,
            end: range.end,
        })
    }
}

impl From<RangeKey> for Range<u64> {
    fn from(key: RangeKey) -> Self {
        key.start..key.end
    }
}

impl RangeKey {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "{}..{}", self.start, end),
            None => write!(f, "{}..", self.start),
        }
    }
}

fn to_signed(value: u64) -> Result<i64> {
    i64::try_from(value)
        .map_err(|_| ParquetError::invalid_range(i64::MAX, None, "offset exceeds i64 range"))
}
