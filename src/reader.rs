//! Caller-facing entry point tying the pipeline together.

use std::ops::Range;
use std::sync::Arc;

use anyhow::Context;
use derive_builder::Builder;
use tracing::{debug, info};

use crate::codec::{CodecRegistry, Decompressor};
use crate::column::{decode_pages, read_column};
use crate::config::DEFAULT_FOOTER_FETCH_SIZE;
use crate::error::{ParquetError, Result};
use crate::io::{ByteRange, ByteRangeSource, RangeKey, SourceUri};
use crate::metadata::{ColumnChunk, FileMetadata, RowGroup, read_metadata};
use crate::page::PageDecoder;
use crate::page_index::{
    ColumnIndex, OffsetIndex, check_page_counts, read_column_index, read_offset_index,
};
use crate::pushdown::{
    RangePredicate, page_row_ranges, pages_for_rows, prune_row_groups, select_pages,
};
use crate::schema::{SchemaPath, get_schema_path, leaf_paths};
use crate::value::Value;

#[derive(Builder, Clone)]
pub struct ReaderOptions {
    /// Size of the initial suffix read that should cover the footer
    #[builder(default = "DEFAULT_FOOTER_FETCH_SIZE")]
    footer_fetch_size: u64,
    #[builder(default = "Arc::new(CodecRegistry::default())")]
    decompressor: Arc<dyn Decompressor>,
}

impl ReaderOptions {
    pub fn footer_fetch_size(&self) -> u64 {
        self.footer_fetch_size
    }

    pub fn decompressor(&self) -> &dyn Decompressor {
        self.decompressor.as_ref()
    }
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            footer_fetch_size: DEFAULT_FOOTER_FETCH_SIZE,
            decompressor: Arc::new(CodecRegistry::default()),
        }
    }
}

impl std::fmt::Debug for ReaderOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderOptions")
            .field("footer_fetch_size", &self.footer_fetch_size)
            .finish_non_exhaustive()
    }
}

/// Page indexes of one column chunk
#[derive(Debug, Clone, PartialEq)]
pub struct PageIndex {
    pub column: String,
    pub column_index: Option<ColumnIndex>,
    pub offset_index: Option<OffsetIndex>,
}

/// Rows of one row group that survived page pruning
#[derive(Debug, Clone, PartialEq)]
pub struct PushdownRead {
    pub row_group: usize,
    /// Row ranges within the row group that were read
    pub row_ranges: Vec<Range<u64>>,
    /// One entry per requested column, all with the same number of rows
    pub columns: Vec<(String, Vec<Value>)>,
}

impl PushdownRead {
    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, |(_, values)| values.len())
    }

    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, values)| values.as_slice())
    }
}

/// A Parquet file opened over a byte-range source
///
/// The footer is decoded once on open; every read after that fetches only
/// the byte ranges it needs.
pub struct ParquetFile {
    source: Arc<dyn ByteRangeSource>,
    metadata: Arc<FileMetadata>,
    options: ReaderOptions,
}

struct ColumnPlan<'a> {
    name: &'a str,
    chunk: &'a ColumnChunk,
    path: SchemaPath,
    offsets: &'a OffsetIndex,
    pages: Vec<usize>,
    prefix: Option<RangeKey>,
}

impl ParquetFile {
    pub async fn open(source: Arc<dyn ByteRangeSource>, options: ReaderOptions) -> Result<Self> {
        let metadata = read_metadata(source.as_ref(), options.footer_fetch_size).await?;
        debug!(
            num_rows = metadata.num_rows,
            row_groups = metadata.row_groups.len(),
            created_by = metadata.created_by.as_deref().unwrap_or("unknown"),
            "opened parquet file"
        );
        Ok(Self {
            source,
            metadata: Arc::new(metadata),
            options,
        })
    }

    /// Open a local path or http(s) URL behind a per-file range cache.
    pub async fn open_uri(uri: &str, options: ReaderOptions) -> anyhow::Result<Self> {
        let source = SourceUri::parse(uri)?.open().await?;
        Self::open(source, options)
            .await
            .with_context(|| format!("Failed to read parquet metadata from {uri}"))
    }

    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    pub fn source(&self) -> &Arc<dyn ByteRangeSource> {
        &self.source
    }

    /// Dotted paths of every leaf column
    pub fn column_paths(&self) -> Result<Vec<String>> {
        leaf_paths(&self.metadata.schema)
    }

    pub fn schema_path(&self, column: &str) -> Result<SchemaPath> {
        get_schema_path(&self.metadata.schema, column)
    }

    fn row_group(&self, row_group: usize) -> Result<&RowGroup> {
        self.metadata.row_groups.get(row_group).ok_or_else(|| {
            ParquetError::format(format!(
                "row group {row_group} does not exist, file has {}",
                self.metadata.row_groups.len()
            ))
        })
    }

    fn chunk(&self, row_group: usize, column: &str) -> Result<&ColumnChunk> {
        self.row_group(row_group)?.column(column).ok_or_else(|| {
            ParquetError::format(format!("row group {row_group} has no column chunk"))
                .in_column(column)
        })
    }

    /// Fetch and decode the page indexes of `columns` with one batched read.
    pub async fn read_page_indexes(&self, row_group: usize, columns: &[&str]) -> Result<Vec<PageIndex>> {
        let mut ranges = Vec::with_capacity(columns.len() * 2);
        let mut chunks = Vec::with_capacity(columns.len());
        for column in columns {
            let chunk = self.chunk(row_group, column)?;
            for range in [chunk.column_index_range(), chunk.offset_index_range()] {
                ranges.push(range.map(|r| ByteRange::bounded(r.start, r.end)).transpose()?);
            }
            chunks.push(chunk);
        }
        let buffers = self.source.read_ranges(&ranges).await?;
        debug!(
            row_group,
            columns = columns.len(),
            ranges = ranges.iter().flatten().count(),
            "read page indexes"
        );

        let mut indexes = Vec::with_capacity(columns.len());
        for (position, (column, chunk)) in columns.iter().zip(chunks).enumerate() {
            let path = self.schema_path(column)?;
            let column_index = match chunk.column_index_range() {
                Some(_) => Some(
                    read_column_index(&buffers[position * 2], path.leaf_element())
                        .map_err(|e| e.in_column(column))?,
                ),
                None => None,
            };
            let offset_index = match chunk.offset_index_range() {
                Some(_) => Some(
                    read_offset_index(&buffers[position * 2 + 1]).map_err(|e| e.in_column(column))?,
                ),
                None => None,
            };
            if let (Some(ci), Some(oi)) = (&column_index, &offset_index) {
                check_page_counts(ci, oi).map_err(|e| e.in_column(column))?;
            }
            indexes.push(PageIndex {
                column: column.to_string(),
                column_index,
                offset_index,
            });
        }
        Ok(indexes)
    }

    /// Read one column chunk, one value per row.
    ///
    /// With a `row_limit`, pages past the limit are neither fetched (when
    /// the chunk has an offset index) nor decoded.
    pub async fn read_column(
        &self,
        row_group: usize,
        column: &str,
        row_limit: Option<usize>,
    ) -> Result<Vec<Value>> {
        let chunk = self.chunk(row_group, column)?;
        let path = self.schema_path(column)?;
        let offset_index = match (row_limit, chunk.offset_index_range()) {
            (Some(_), Some(range)) => {
                let bytes = self
                    .source
                    .read_range(ByteRange::bounded(range.start, range.end)?)
                    .await?;
                Some(read_offset_index(&bytes).map_err(|e| e.in_column(column))?)
            }
            _ => None,
        };
        read_column(
            self.source.as_ref(),
            chunk,
            &path,
            row_limit,
            offset_index.as_ref(),
            self.options.decompressor(),
        )
        .await
    }

    /// Read a column across row groups until `row_limit` rows are in hand.
    pub async fn read_column_rows(&self, column: &str, row_limit: Option<usize>) -> Result<Vec<Value>> {
        let mut rows = Vec::new();
        for row_group in 0..self.metadata.row_groups.len() {
            let remaining = match row_limit {
                Some(limit) if rows.len() >= limit => break,
                Some(limit) => Some(limit - rows.len()),
                None => None,
            };
            rows.extend(self.read_column(row_group, column, remaining).await?);
        }
        Ok(rows)
    }

    /// Row groups whose statistics for `column` may match `predicate`
    pub fn prune_row_groups(&self, column: &str, predicate: &dyn RangePredicate) -> Result<Vec<usize>> {
        let path = self.schema_path(column)?;
        let kept = prune_row_groups(&self.metadata.row_groups, &path, predicate)?;
        debug!(
            column,
            kept = kept.len(),
            total = self.metadata.row_groups.len(),
            "pruned row groups"
        );
        Ok(kept)
    }

    /// Read `columns` from the pages of one row group that may match
    /// `predicate` on `filter_column`.
    ///
    /// Page indexes come in one batched request and the selected pages,
    /// with their dictionaries, in another. Sibling columns are aligned by
    /// row number and trimmed, so every returned column has one value per
    /// selected row.
    pub async fn read_with_pushdown(
        &self,
        row_group: usize,
        filter_column: &str,
        predicate: &dyn RangePredicate,
        columns: &[&str],
    ) -> Result<PushdownRead> {
        let num_rows = self.row_group(row_group)?.num_rows.max(0) as u64;
        let mut names: Vec<&str> = vec![filter_column];
        names.extend(columns.iter().copied().filter(|c| *c != filter_column));
        let indexes = self.read_page_indexes(row_group, &names).await?;

        let filter_offsets = offsets_of(&indexes[0])?;
        let selected = match &indexes[0].column_index {
            Some(column_index) => select_pages(column_index, predicate),
            None => (0..filter_offsets.page_count()).collect(),
        };
        let row_ranges = page_row_ranges(filter_offsets, &selected, num_rows);
        info!(
            row_group,
            column = filter_column,
            selected = selected.len(),
            pages = filter_offsets.page_count(),
            "selected pages"
        );

        let mut plans = Vec::with_capacity(columns.len());
        for &name in columns {
            let index = indexes
                .iter()
                .find(|index| index.column == name)
                .ok_or_else(|| ParquetError::format("page index missing").in_column(name))?;
            let offsets = offsets_of(index)?;
            let chunk = self.chunk(row_group, name)?;
            let pages = pages_for_rows(offsets, &row_ranges, num_rows);
            let chunk_start = chunk.byte_range().start;
            let prefix = match offsets.page_locations.first() {
                Some(first) if !pages.is_empty() && chunk_start < first.offset => Some(RangeKey {
                    start: chunk_start,
                    end: first.offset,
                }),
                _ => None,
            };
            plans.push(ColumnPlan {
                name,
                chunk,
                path: self.schema_path(name)?,
                offsets,
                pages,
                prefix,
            });
        }

        let mut ranges = Vec::new();
        for plan in &plans {
            ranges.push(plan.prefix.map(|r| ByteRange::bounded(r.start, r.end)).transpose()?);
            for &page in &plan.pages {
                let r = plan.offsets.page_locations[page].byte_range();
                ranges.push(Some(ByteRange::bounded(r.start, r.end)?));
            }
        }
        let mut buffers = self.source.read_ranges(&ranges).await?.into_iter();

        let mut output = Vec::with_capacity(plans.len());
        for plan in plans {
            let prefix_bytes = buffers.next().unwrap_or_default();
            let pages: Vec<_> = plan
                .pages
                .iter()
                .map(|&page| {
                    let bytes = buffers.next().unwrap_or_default();
                    (bytes, plan.offsets.page_locations[page].offset)
                })
                .collect();
            let decoder = PageDecoder::new(plan.chunk, &plan.path, self.options.decompressor())?;
            let prefix = plan.prefix.map(|r| (&prefix_bytes, r.start));
            let page_rows = decode_pages(&decoder, prefix, &pages)?;

            let mut values = Vec::new();
            for (&page, rows) in plan.pages.iter().zip(page_rows) {
                let covered = plan.offsets.page_rows(page, num_rows);
                if rows.len() as u64 != covered.end - covered.start {
                    return Err(ParquetError::format(format!(
                        "page {page} decoded {} rows, offset index declares {}",
                        rows.len(),
                        covered.end - covered.start
                    ))
                    .in_column(plan.name));
                }
                values.extend(
                    rows.into_iter()
                        .zip(covered)
                        .filter(|(_, row)| row_ranges.iter().any(|r| r.contains(row)))
                        .map(|(value, _)| value),
                );
            }
            output.push((plan.name.to_string(), values));
        }

        Ok(PushdownRead {
            row_group,
            row_ranges,
            columns: output,
        })
    }

    /// Prune row groups by chunk statistics, then pages by page indexes.
    pub async fn read_filtered(
        &self,
        filter_column: &str,
        predicate: &dyn RangePredicate,
        columns: &[&str],
    ) -> Result<Vec<PushdownRead>> {
        let mut reads = Vec::new();
        for row_group in self.prune_row_groups(filter_column, predicate)? {
            reads.push(
                self.read_with_pushdown(row_group, filter_column, predicate, columns)
                    .await?,
            );
        }
        Ok(reads)
    }
}

fn offsets_of(index: &PageIndex) -> Result<&OffsetIndex> {
    index
        .offset_index
        .as_ref()
        .ok_or_else(|| ParquetError::format("column chunk has no offset index").in_column(&index.column))
}
