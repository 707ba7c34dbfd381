//! File metadata: footer location, compact decoding and the decoded types.

mod decode;
mod footer;
mod types;

pub use decode::{decode_file_metadata, decode_page_header};
pub use footer::{parse_trailer, read_metadata};
pub use types::*;
