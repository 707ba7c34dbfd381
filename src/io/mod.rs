//! I/O abstraction layer for reading byte ranges from different sources

pub mod byte_reader;
pub mod cached_reader;
pub mod coalesce;
pub mod http_reader;
pub mod local_reader;
pub mod multipart;
pub mod range;
pub mod uri;

pub use byte_reader::{ByteRangeSource, read_absolute};
pub use cached_reader::CachedSource;
pub use coalesce::{CoalescedRange, coalesce_ranges};
pub use http_reader::{HttpRangeSource, HttpSourceArgs, HttpSourceArgsBuilder};
pub use local_reader::LocalFileSource;
pub use multipart::BoundaryPolicy;
pub use range::{ByteRange, RangeKey};
pub use uri::SourceUri;
