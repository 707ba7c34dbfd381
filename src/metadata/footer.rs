//! Locating and decoding the file footer.

use bytes::Bytes;
use tracing::debug;

use super::decode::decode_file_metadata;
use super::types::FileMetadata;
use crate::config::{ENCRYPTED_MAGIC, FOOTER_TRAILER_LEN, PARQUET_MAGIC};
use crate::error::{ParquetError, Result};
use crate::io::{ByteRange, ByteRangeSource, read_absolute};

/// Parse the 8-byte trailer and return the footer length.
pub fn parse_trailer(trailer: &[u8], trailer_offset: u64) -> Result<u64> {
    if trailer.len() != FOOTER_TRAILER_LEN as usize {
        return Err(ParquetError::format_at(
            format!("footer trailer must be 8 bytes, got {}", trailer.len()),
            trailer_offset,
        ));
    }
    let magic = &trailer[4..];
    if magic == ENCRYPTED_MAGIC {
        return Err(ParquetError::format_at(
            "file uses an encrypted footer",
            trailer_offset + 4,
        ));
    }
    if magic != PARQUET_MAGIC {
        return Err(ParquetError::format_at(
            format!("invalid magic {magic:?}, not a parquet file"),
            trailer_offset + 4,
        ));
    }
    let mut len = [0u8; 4];
    len.copy_from_slice(&trailer[..4]);
    Ok(u32::from_le_bytes(len) as u64)
}

/// Read and decode the footer with a single suffix read when it fits.
///
/// The first request fetches the last `footer_fetch_size` bytes. A footer
/// larger than that costs one more request for the missing prefix.
pub async fn read_metadata(
    source: &dyn ByteRangeSource,
    footer_fetch_size: u64,
) -> Result<FileMetadata> {
    let total_length = source.total_length();
    let magic_len = PARQUET_MAGIC.len() as u64;
    if total_length < magic_len + FOOTER_TRAILER_LEN {
        return Err(ParquetError::format(format!(
            "file of {total_length} bytes is too small to be parquet"
        )));
    }

    let fetch = footer_fetch_size
        .max(FOOTER_TRAILER_LEN)
        .min(total_length);
    let tail = source.read_range(ByteRange::suffix(fetch)?).await?;
    if (tail.len() as u64) < FOOTER_TRAILER_LEN {
        return Err(ParquetError::format("short read of footer trailer"));
    }
    let tail_start = total_length - tail.len() as u64;
    let trailer_offset = total_length - FOOTER_TRAILER_LEN;
    let footer_len = parse_trailer(&tail[tail.len() - FOOTER_TRAILER_LEN as usize..], trailer_offset)?;

    if footer_len + FOOTER_TRAILER_LEN + magic_len > total_length {
        return Err(ParquetError::format_at(
            format!("footer length {footer_len} exceeds file size {total_length}"),
            trailer_offset,
        ));
    }
    let footer_start = trailer_offset - footer_len;

    let footer: Bytes = if footer_start >= tail_start {
        let start = (footer_start - tail_start) as usize;
        tail.slice(start..start + footer_len as usize)
    } else {
        debug!(footer_len, fetched = tail.len(), "footer exceeds initial read");
        let prefix = read_absolute(source, footer_start, tail_start).await?;
        let in_tail = (trailer_offset - tail_start) as usize;
        let mut joined = Vec::with_capacity(footer_len as usize);
        joined.extend_from_slice(&prefix);
        joined.extend_from_slice(&tail[..in_tail]);
        Bytes::from(joined)
    };

    let metadata = decode_file_metadata(&footer, footer_start)?;
    debug!(
        footer_len,
        total_length,
        num_rows = metadata.num_rows,
        row_groups = metadata.row_groups.len(),
        "decoded footer"
    );
    Ok(metadata)
}
