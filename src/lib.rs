//! Parquet reader over byte-range sources.
//!
//! Files are read through a [`ByteRangeSource`] (local file, HTTP range
//! requests, or a caching decorator over either). Only the footer is read
//! on open; column and offset indexes let [`ParquetFile::read_with_pushdown`]
//! skip pages whose statistics cannot match a predicate.

// Public API
pub mod codec;
pub mod config;
pub mod convert;
pub mod encoding;
pub mod error;
pub mod io;
pub mod metadata;
pub mod page;
pub mod page_index;
pub mod pushdown;
pub mod reader;
pub mod schema;
pub mod value;

// Internal modules
mod assemble;
mod column;
mod thrift;

pub use assemble::RowAssembler;
pub use column::{decode_chunk, decode_pages, read_column};
pub use error::{ErrorKind, ParquetError, Result};
pub use io::{ByteRange, ByteRangeSource, CachedSource, HttpRangeSource, LocalFileSource};
pub use reader::{PageIndex, ParquetFile, PushdownRead, ReaderOptions, ReaderOptionsBuilder};
pub use value::Value;

#[cfg(test)]
mod integ_tests;
