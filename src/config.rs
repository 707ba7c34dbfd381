//! Configuration constants for the reader
//!
//! This module centralizes the tunable parameters and format constants used
//! throughout the crate.

// ============================================================================
// Footer Configuration
// ============================================================================

/// Magic marker at the start and end of every Parquet file
pub const PARQUET_MAGIC: &[u8; 4] = b"PAR1";

/// Magic marker of a file whose footer is encrypted
pub const ENCRYPTED_MAGIC: &[u8; 4] = b"PARE";

/// Fixed-size trailer: 4-byte little-endian footer length + 4-byte magic
pub const FOOTER_TRAILER_LEN: u64 = 8;

/// Size of the initial suffix read used to locate the footer
///
/// Set to 512KB so that the metadata of most files (including those with
/// hundreds of row groups) arrives in the same request as the trailer.
/// Files with larger footers need exactly one additional request.
pub const DEFAULT_FOOTER_FETCH_SIZE: u64 = 512 * 1024; // 512 KB

// ============================================================================
// Metadata Decoding
// ============================================================================

/// Maximum nesting depth accepted by the compact struct decoder
///
/// Parquet metadata never nests deeper than a handful of levels. The limit
/// keeps corrupt or hostile input from exhausting the stack.
pub const MAX_STRUCT_DEPTH: usize = 64;

// ============================================================================
// HTTP Configuration
// ============================================================================

/// Maximum gap between two requested ranges that are merged into one part
///
/// Set to 64KB: fetching a small amount of unused bytes is cheaper than an
/// extra part in a multi-range response (or an extra round-trip when the
/// server ignores multi-range requests).
pub const DEFAULT_MAX_COALESCE_GAP: u64 = 64 * 1024; // 64 KB

// ============================================================================
// Page Decoding
// ============================================================================

/// Largest DELTA_BINARY_PACKED block accepted from a page header
///
/// Writers use blocks of 128 (sometimes up to a few thousand) values. Larger
/// headers are treated as corrupt rather than sized into allocations.
pub const MAX_DELTA_BLOCK_SIZE: usize = 64 * 1024;
