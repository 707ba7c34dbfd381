//! Statistics-based pruning of pages and row groups.
//!
//! A [`RangePredicate`] answers one question: could any value between a
//! page's minimum and maximum satisfy it? Pages and row groups for which it
//! answers no are never fetched. Pages selected on the filter column are
//! translated to row ranges, and sibling columns pick the pages covering
//! those rows through their own offset indexes.

use std::cmp::Ordering;
use std::ops::Range;

use crate::convert::{ValueConverter, decode_statistic};
use crate::error::Result;
use crate::metadata::{PhysicalType, RowGroup};
use crate::page_index::{ColumnIndex, OffsetIndex};
use crate::schema::SchemaPath;
use crate::value::Value;

/// Predicate over the value range of a page or row group
pub trait RangePredicate: Send + Sync {
    /// `false` only when no value in `[min, max]` can match.
    fn may_match(&self, min: &Value, max: &Value) -> bool;
}

/// Inclusive value interval; an absent bound is unbounded
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValueRange {
    pub min: Option<Value>,
    pub max: Option<Value>,
}

impl ValueRange {
    pub fn between(min: Value, max: Value) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn equal_to(value: Value) -> Self {
        Self::between(value.clone(), value)
    }

    pub fn at_least(min: Value) -> Self {
        Self {
            min: Some(min),
            max: None,
        }
    }

    pub fn at_most(max: Value) -> Self {
        Self {
            min: None,
            max: Some(max),
        }
    }

    /// Whether a single value lies in the range
    pub fn contains(&self, value: &Value) -> bool {
        let above_min = self
            .min
            .as_ref()
            .is_none_or(|min| value.partial_cmp_value(min).is_some_and(Ordering::is_ge));
        let below_max = self
            .max
            .as_ref()
            .is_none_or(|max| value.partial_cmp_value(max).is_some_and(Ordering::is_le));
        above_min && below_max
    }
}

impl RangePredicate for ValueRange {
    fn may_match(&self, min: &Value, max: &Value) -> bool {
        // Incomparable bounds never exclude anything
        let below = self
            .min
            .as_ref()
            .is_some_and(|lo| max.partial_cmp_value(lo) == Some(Ordering::Less));
        let above = self
            .max
            .as_ref()
            .is_some_and(|hi| min.partial_cmp_value(hi) == Some(Ordering::Greater));
        !below && !above
    }
}

/// Indexes of pages that may hold matching values.
///
/// Null pages and pages without usable bounds are always selected.
pub fn select_pages(column_index: &ColumnIndex, predicate: &dyn RangePredicate) -> Vec<usize> {
    (0..column_index.page_count())
        .filter(|&page| match column_index.page_bounds(page) {
            Some((min, max)) => predicate.may_match(min, max),
            None => true,
        })
        .collect()
}

/// Row ranges covered by `pages`, merged where adjacent.
pub fn page_row_ranges(offset_index: &OffsetIndex, pages: &[usize], num_rows: u64) -> Vec<Range<u64>> {
    let mut ranges: Vec<Range<u64>> = Vec::new();
    for &page in pages {
        if page >= offset_index.page_count() {
            continue;
        }
        let rows = offset_index.page_rows(page, num_rows);
        match ranges.last_mut() {
            Some(last) if last.end >= rows.start => last.end = last.end.max(rows.end),
            _ => ranges.push(rows),
        }
    }
    ranges
}

/// Pages of a sibling column that overlap any of `rows`.
///
/// Alignment is by row number: the sibling's pages may be sized
/// independently of the filter column's.
pub fn pages_for_rows(offset_index: &OffsetIndex, rows: &[Range<u64>], num_rows: u64) -> Vec<usize> {
    (0..offset_index.page_count())
        .filter(|&page| {
            let page_rows = offset_index.page_rows(page, num_rows);
            rows.iter()
                .any(|r| r.start < page_rows.end && page_rows.start < r.end)
        })
        .collect()
}

/// Row groups whose chunk statistics for `path` may match `predicate`.
///
/// Row groups without statistics for the column are kept. Legacy byte-array
/// bounds were computed with signed byte order and are not trusted.
pub fn prune_row_groups(
    row_groups: &[RowGroup],
    path: &SchemaPath,
    predicate: &dyn RangePredicate,
) -> Result<Vec<usize>> {
    let leaf = path.leaf_element();
    let converter = ValueConverter::new(leaf)?;
    let column = path.dotted();
    let mut kept = Vec::new();
    for (index, row_group) in row_groups.iter().enumerate() {
        let stats = row_group
            .column(&column)
            .and_then(|chunk| chunk.meta_data.statistics.as_ref());
        let bounds = match stats {
            Some(stats)
                if stats.legacy_bounds
                    && matches!(
                        converter.physical_type(),
                        PhysicalType::ByteArray | PhysicalType::FixedLenByteArray
                    ) =>
            {
                None
            }
            Some(stats) => match (&stats.min, &stats.max) {
                (Some(min), Some(max)) => Some((
                    decode_statistic(leaf, &converter, min)?,
                    decode_statistic(leaf, &converter, max)?,
                )),
                _ => None,
            },
            None => None,
        };
        let keep = match bounds {
            Some((min, max)) => predicate.may_match(&min, &max),
            None => true,
        };
        if keep {
            kept.push(index);
        }
    }
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::BoundaryOrder;
    use crate::page_index::PageLocation;

    fn column_index(bounds: &[Option<(i32, i32)>]) -> ColumnIndex {
        ColumnIndex {
            null_pages: bounds.iter().map(Option::is_none).collect(),
            min_values: bounds
                .iter()
                .map(|b| b.map_or(Value::Null, |(min, _)| Value::Int32(min)))
                .collect(),
            max_values: bounds
                .iter()
                .map(|b| b.map_or(Value::Null, |(_, max)| Value::Int32(max)))
                .collect(),
            null_counts: None,
            boundary_order: BoundaryOrder::Unordered,
        }
    }

    fn offset_index(first_rows: &[u64]) -> OffsetIndex {
        OffsetIndex {
            page_locations: first_rows
                .iter()
                .enumerate()
                .map(|(i, &first_row_index)| PageLocation {
                    offset: 100 * i as u64,
                    compressed_page_size: 100,
                    first_row_index,
                })
                .collect(),
        }
    }

    #[test]
    fn test_selects_overlapping_pages_only() {
        let index = column_index(&[Some((1, 10)), Some((50, 60))]);
        let predicate = ValueRange::between(Value::Int32(5), Value::Int32(15));
        assert_eq!(select_pages(&index, &predicate), vec![0]);
    }

    #[test]
    fn test_null_pages_are_never_excluded() {
        let index = column_index(&[Some((1, 10)), None, Some((50, 60))]);
        let predicate = ValueRange::at_least(Value::Int32(55));
        assert_eq!(select_pages(&index, &predicate), vec![1, 2]);
    }

    #[test]
    fn test_incomparable_bounds_are_kept() {
        let predicate = ValueRange::equal_to(Value::String("x".to_string()));
        assert!(predicate.may_match(&Value::Int32(1), &Value::Int32(2)));
    }

    #[test]
    fn test_open_ranges() {
        let at_most = ValueRange::at_most(Value::Int64(0));
        assert!(!at_most.may_match(&Value::Int32(1), &Value::Int32(9)));
        assert!(at_most.may_match(&Value::Int32(-1), &Value::Int32(9)));
        assert!(at_most.contains(&Value::Int32(0)));
        assert!(!at_most.contains(&Value::Null));
    }

    #[test]
    fn test_sibling_alignment_by_rows() {
        // filter column pages start at rows 0, 100, 200; sibling at 0, 150
        let filter = offset_index(&[0, 100, 200]);
        let sibling = offset_index(&[0, 150]);
        let rows = page_row_ranges(&filter, &[1], 300);
        assert_eq!(rows, vec![100..200]);
        assert_eq!(pages_for_rows(&sibling, &rows, 300), vec![0, 1]);

        let rows = page_row_ranges(&filter, &[0], 300);
        assert_eq!(pages_for_rows(&sibling, &rows, 300), vec![0]);
    }

    #[test]
    fn test_adjacent_pages_merge() {
        let filter = offset_index(&[0, 100, 200]);
        assert_eq!(page_row_ranges(&filter, &[0, 1], 300), vec![0..200]);
        assert_eq!(page_row_ranges(&filter, &[0, 2], 300), vec![0..100, 200..300]);
    }
}
