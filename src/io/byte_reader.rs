use async_trait::async_trait;
use bytes::Bytes;

use super::range::ByteRange;
use crate::error::Result;

/// Abstraction for byte-level I/O operations
///
/// This trait turns a file (local or remote) into an addressable set of byte
/// ranges. Implementations only need `total_length` and `read_range`; the
/// batch form falls back to sequential single-range reads.
#[async_trait]
pub trait ByteRangeSource: Send + Sync {
    /// Total size of the file/object in bytes
    fn total_length(&self) -> u64;

    /// Read one range of bytes
    async fn read_range(&self, range: ByteRange) -> Result<Bytes>;

    /// Read several ranges at once
    ///
    /// The result has one buffer per input entry, in input order. A `None`
    /// entry yields an empty buffer.
    async fn read_ranges(&self, ranges: &[Option<ByteRange>]) -> Result<Vec<Bytes>> {
        let mut buffers = Vec::with_capacity(ranges.len());
        for range in ranges {
            match range {
                Some(range) => buffers.push(self.read_range(*range).await?),
                None => buffers.push(Bytes::new()),
            }
        }
        Ok(buffers)
    }
}

/// Helper to read `[start, end)` from a source
pub async fn read_absolute(source: &dyn ByteRangeSource, start: u64, end: u64) -> Result<Bytes> {
    source.read_range(ByteRange::bounded(start, end)?).await
}
