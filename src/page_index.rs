//! Column index and offset index decoding.
//!
//! Both structures hold one entry per data page of a column chunk. The
//! column index carries page statistics, already decoded to the column's
//! logical values so they compare directly against predicate literals.

use std::ops::Range;

use crate::convert::{ValueConverter, decode_statistic};
use crate::error::{ParquetError, Result};
use crate::io::RangeKey;
use crate::metadata::{BoundaryOrder, SchemaElement};
use crate::thrift::{CompactReader, FieldType};
use crate::value::Value;

/// Per-page statistics of one column chunk
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnIndex {
    /// `true` when a page holds only nulls and its bounds are meaningless
    pub null_pages: Vec<bool>,
    /// `Value::Null` for null pages
    pub min_values: Vec<Value>,
    pub max_values: Vec<Value>,
    pub null_counts: Option<Vec<i64>>,
    pub boundary_order: BoundaryOrder,
}

impl ColumnIndex {
    pub fn page_count(&self) -> usize {
        self.null_pages.len()
    }

    /// Bounds of page `page`, or `None` when they cannot be used for pruning
    pub fn page_bounds(&self, page: usize) -> Option<(&Value, &Value)> {
        if self.null_pages.get(page).copied().unwrap_or(true) {
            return None;
        }
        match (self.min_values.get(page), self.max_values.get(page)) {
            (Some(min), Some(max)) if !min.is_null() && !max.is_null() => Some((min, max)),
            _ => None,
        }
    }
}

/// Physical location of one data page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLocation {
    pub offset: u64,
    /// Header included
    pub compressed_page_size: u64,
    /// Index of the page's first row within the row group
    pub first_row_index: u64,
}

impl PageLocation {
    pub fn byte_range(&self) -> RangeKey {
        RangeKey {
            start: self.offset,
            end: self.offset + self.compressed_page_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetIndex {
    pub page_locations: Vec<PageLocation>,
}

impl OffsetIndex {
    pub fn page_count(&self) -> usize {
        self.page_locations.len()
    }

    /// Rows covered by page `page` of a row group with `num_rows` rows
    pub fn page_rows(&self, page: usize, num_rows: u64) -> Range<u64> {
        let start = self.page_locations[page].first_row_index;
        let end = self
            .page_locations
            .get(page + 1)
            .map_or(num_rows, |next| next.first_row_index);
        start..end.max(start)
    }
}

/// Decode a ColumnIndex, converting bounds with the leaf's logical type.
pub fn read_column_index(bytes: &[u8], leaf: &SchemaElement) -> Result<ColumnIndex> {
    let converter = ValueConverter::new(leaf)?;
    let mut r = CompactReader::new(bytes);
    let mut null_pages = None;
    let mut min_raw: Option<Vec<Vec<u8>>> = None;
    let mut max_raw: Option<Vec<Vec<u8>>> = None;
    let mut boundary_order = None;
    let mut null_counts = None;

    r.read_struct(|r, id, ty| {
        match (id, ty) {
            (1, FieldType::List) => null_pages = Some(r.read_list(|r, _| r.read_list_bool())?),
            (2, FieldType::List) => {
                min_raw = Some(r.read_list(|r, _| Ok(r.read_binary()?.to_vec()))?)
            }
            (3, FieldType::List) => {
                max_raw = Some(r.read_list(|r, _| Ok(r.read_binary()?.to_vec()))?)
            }
            (4, FieldType::I32) => {
                let raw = r.read_i32()?;
                boundary_order = Some(
                    BoundaryOrder::try_from(raw)
                        .map_err(|v| r.error(format!("unknown boundary order {v}")))?,
                );
            }
            (5, FieldType::List) => null_counts = Some(r.read_list(|r, _| r.read_i64())?),
            _ => r.skip(ty)?,
        }
        Ok(())
    })?;

    let null_pages = null_pages.ok_or_else(|| r.error("missing required field ColumnIndex.null_pages"))?;
    let min_raw = min_raw.ok_or_else(|| r.error("missing required field ColumnIndex.min_values"))?;
    let max_raw = max_raw.ok_or_else(|| r.error("missing required field ColumnIndex.max_values"))?;
    let boundary_order =
        boundary_order.ok_or_else(|| r.error("missing required field ColumnIndex.boundary_order"))?;

    let pages = null_pages.len();
    let counts_match = null_counts.as_ref().is_none_or(|c: &Vec<i64>| c.len() == pages);
    if min_raw.len() != pages || max_raw.len() != pages || !counts_match {
        return Err(ParquetError::format(format!(
            "column index lists disagree: {pages} null flags, {} minimums, {} maximums",
            min_raw.len(),
            max_raw.len()
        ))
        .in_column(&leaf.name));
    }

    let bounds = |raw: Vec<Vec<u8>>| -> Result<Vec<Value>> {
        raw.iter()
            .zip(&null_pages)
            .map(|(bytes, &null_page)| {
                if null_page {
                    Ok(Value::Null)
                } else {
                    decode_statistic(leaf, &converter, bytes)
                }
            })
            .collect()
    };
    let min_values = bounds(min_raw).map_err(|e| e.in_column(&leaf.name))?;
    let max_values = bounds(max_raw).map_err(|e| e.in_column(&leaf.name))?;

    Ok(ColumnIndex {
        null_pages,
        min_values,
        max_values,
        null_counts,
        boundary_order,
    })
}

fn read_page_location(r: &mut CompactReader<'_>) -> Result<PageLocation> {
    let mut offset = None;
    let mut size = None;
    let mut first_row = None;
    r.read_struct(|r, id, ty| {
        match (id, ty) {
            (1, FieldType::I64) => offset = Some(r.read_i64()?),
            (2, FieldType::I32) => size = Some(r.read_i32()?),
            (3, FieldType::I64) => first_row = Some(r.read_i64()?),
            _ => r.skip(ty)?,
        }
        Ok(())
    })?;
    match (offset, size, first_row) {
        (Some(offset), Some(size), Some(first_row)) if offset >= 0 && size >= 0 && first_row >= 0 => {
            Ok(PageLocation {
                offset: offset as u64,
                compressed_page_size: size as u64,
                first_row_index: first_row as u64,
            })
        }
        _ => Err(r.error("invalid PageLocation")),
    }
}

/// Decode an OffsetIndex and check that pages start at increasing rows.
pub fn read_offset_index(bytes: &[u8]) -> Result<OffsetIndex> {
    let mut r = CompactReader::new(bytes);
    let mut page_locations = None;
    r.read_struct(|r, id, ty| {
        match (id, ty) {
            (1, FieldType::List) => page_locations = Some(r.read_list(|r, _| read_page_location(r))?),
            _ => r.skip(ty)?,
        }
        Ok(())
    })?;
    let page_locations =
        page_locations.ok_or_else(|| r.error("missing required field OffsetIndex.page_locations"))?;

    for pair in page_locations.windows(2) {
        if pair[1].first_row_index <= pair[0].first_row_index {
            return Err(ParquetError::format(format!(
                "page first row indexes not increasing: {} then {}",
                pair[0].first_row_index, pair[1].first_row_index
            )));
        }
        if pair[1].offset < pair[0].offset + pair[0].compressed_page_size {
            return Err(ParquetError::format(format!(
                "pages at offsets {} and {} overlap",
                pair[0].offset, pair[1].offset
            )));
        }
    }
    Ok(OffsetIndex { page_locations })
}

/// Check that a column index and an offset index describe the same pages.
pub fn check_page_counts(column_index: &ColumnIndex, offset_index: &OffsetIndex) -> Result<()> {
    if column_index.page_count() != offset_index.page_count() {
        return Err(ParquetError::format(format!(
            "column index has {} pages, offset index has {}",
            column_index.page_count(),
            offset_index.page_count()
        )));
    }
    Ok(())
}
