//! Reading the pages of one column chunk.

use bytes::Bytes;
use tracing::{debug, trace};

use crate::assemble::RowAssembler;
use crate::codec::Decompressor;
use crate::error::{PageContext, Result};
use crate::io::{ByteRangeSource, read_absolute};
use crate::metadata::ColumnChunk;
use crate::page::{Page, PageDecoder};
use crate::page_index::OffsetIndex;
use crate::schema::SchemaPath;
use crate::value::Value;

/// Decode pages laid out back to back in `data`, which starts at absolute
/// file offset `offset`.
///
/// With a `row_limit`, no page is decoded once that many rows have
/// started. Pages are always decoded whole, so the result may hold more
/// rows than the limit.
pub fn decode_chunk(
    decoder: &PageDecoder<'_>,
    data: &Bytes,
    offset: u64,
    row_limit: Option<usize>,
) -> Result<Vec<Value>> {
    let mut assembler = RowAssembler::new(decoder.schema_path());
    let mut dictionary: Option<Vec<Value>> = None;
    let mut pos = 0usize;
    let mut pages = 0usize;

    while pos < data.len() {
        if row_limit.is_some_and(|limit| assembler.row_count() >= limit) {
            trace!(column = decoder.column(), pages, "row limit reached");
            break;
        }
        let page_offset = offset + pos as u64;
        let read = decoder.read_page(&data.slice(pos..), page_offset, dictionary.as_deref())?;
        pos += read.encoded_len;
        match read.page {
            Page::Dictionary(entries) => dictionary = Some(entries),
            Page::Data(page) => {
                assembler
                    .push_page(page)
                    .at_page(decoder.column(), page_offset)?;
                pages += 1;
            }
            Page::Skipped => {}
        }
    }
    Ok(assembler.finish())
}

/// Decode a selection of pages from one chunk.
///
/// `prefix` holds the bytes between the chunk start and its first data
/// page, where the dictionary page lives. Every entry of `pages` holds
/// exactly one data page. Returns the rows of each page separately.
pub fn decode_pages(
    decoder: &PageDecoder<'_>,
    prefix: Option<(&Bytes, u64)>,
    pages: &[(Bytes, u64)],
) -> Result<Vec<Vec<Value>>> {
    let mut dictionary: Option<Vec<Value>> = None;
    if let Some((data, offset)) = prefix {
        let mut pos = 0usize;
        while pos < data.len() {
            let read = decoder.read_page(&data.slice(pos..), offset + pos as u64, None)?;
            pos += read.encoded_len;
            if let Page::Dictionary(entries) = read.page {
                dictionary = Some(entries);
            }
        }
    }

    let mut rows = Vec::with_capacity(pages.len());
    for (data, offset) in pages {
        let read = decoder.read_page(data, *offset, dictionary.as_deref())?;
        let mut assembler = RowAssembler::new(decoder.schema_path());
        if let Page::Data(page) = read.page {
            assembler.push_page(page).at_page(decoder.column(), *offset)?;
        }
        rows.push(assembler.finish());
    }
    Ok(rows)
}

/// Read the values of one column chunk, one entry per row.
///
/// When both a `row_limit` and the chunk's offset index are given, only
/// the pages needed to reach the limit are fetched.
pub async fn read_column(
    source: &dyn ByteRangeSource,
    chunk: &ColumnChunk,
    path: &SchemaPath,
    row_limit: Option<usize>,
    offset_index: Option<&OffsetIndex>,
    decompressor: &dyn Decompressor,
) -> Result<Vec<Value>> {
    let decoder = PageDecoder::new(chunk, path, decompressor)?;
    if row_limit == Some(0) {
        return Ok(Vec::new());
    }

    let range = chunk.byte_range();
    let end = match (row_limit, offset_index) {
        (Some(limit), Some(index)) => index
            .page_locations
            .iter()
            .take_while(|page| page.first_row_index < limit as u64)
            .last()
            .map_or(range.end, |page| page.byte_range().end.min(range.end)),
        _ => range.end,
    };
    if end <= range.start {
        return Ok(Vec::new());
    }

    let data = read_absolute(source, range.start, end).await?;
    debug!(
        column = decoder.column(),
        bytes = data.len(),
        truncated = end < range.end,
        "read column chunk"
    );
    decode_chunk(&decoder, &data, range.start, row_limit)
}
