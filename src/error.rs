//! Error types for the reader.

use std::sync::Arc;

use thiserror::Error;

use crate::metadata::{CompressionCodec, Encoding};

/// Result alias used throughout the crate.
pub type Result<T, E = ParquetError> = std::result::Result<T, E>;

/// Coarse classification of failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// HTTP status failures, missing response headers, local I/O failures.
    Transport,
    /// Malformed or unsupported file content.
    Format,
    /// Invalid byte range requested by the caller.
    Range,
}

/// Errors that can occur while reading a Parquet file.
#[derive(Debug, Error)]
pub enum ParquetError {
    /// Local file I/O failed.
    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// An HTTP request could not be completed.
    #[error("HTTP request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The source URL could not be parsed.
    #[error("invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// The server answered with an unexpected status.
    #[error("HTTP request to {url} returned status {status}")]
    HttpStatus { url: String, status: u16 },

    /// A response lacked a header the reader depends on.
    #[error("response from {url} is missing required header {header}")]
    MissingHeader { url: String, header: &'static str },

    /// A response body could not be split into the requested ranges.
    #[error("malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },

    /// The requested byte range is invalid.
    #[error("invalid byte range (start {start}, end {end:?}): {reason}")]
    InvalidRange {
        start: i64,
        end: Option<i64>,
        reason: &'static str,
    },

    /// The bytes do not form valid Parquet content.
    #[error("malformed parquet data{}: {message}", describe_location(.offset, .column))]
    Format {
        message: String,
        offset: Option<u64>,
        column: Option<String>,
    },

    /// A page uses an encoding this reader does not implement.
    #[error("unsupported encoding {encoding:?} for {what}")]
    UnsupportedEncoding { encoding: Encoding, what: String },

    /// No decompressor is registered for the codec.
    #[error("unsupported compression codec {0:?}")]
    UnsupportedCodec(CompressionCodec),

    /// The registered decompressor failed.
    #[error("{codec:?} decompression failed: {source}")]
    Decompression {
        codec: CompressionCodec,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Decoding a single page failed.
    #[error("failed to decode page of column {column} at offset {offset}: {source}")]
    Page {
        column: String,
        offset: u64,
        #[source]
        source: Box<ParquetError>,
    },

    /// A failure observed by several concurrent readers of the same range.
    #[error(transparent)]
    Shared(Arc<ParquetError>),
}

impl ParquetError {
    /// Build a format error without location information.
    pub fn format(message: impl Into<String>) -> Self {
        ParquetError::Format {
            message: message.into(),
            offset: None,
            column: None,
        }
    }

    /// Build a format error at a byte offset.
    pub fn format_at(message: impl Into<String>, offset: u64) -> Self {
        ParquetError::Format {
            message: message.into(),
            offset: Some(offset),
            column: None,
        }
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        ParquetError::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn invalid_range(start: i64, end: Option<i64>, reason: &'static str) -> Self {
        ParquetError::InvalidRange { start, end, reason }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ParquetError::Io { .. }
            | ParquetError::Http { .. }
            | ParquetError::InvalidUrl { .. }
            | ParquetError::HttpStatus { .. }
            | ParquetError::MissingHeader { .. }
            | ParquetError::MalformedResponse { .. } => ErrorKind::Transport,
            ParquetError::InvalidRange { .. } => ErrorKind::Range,
            ParquetError::Format { .. }
            | ParquetError::UnsupportedEncoding { .. }
            | ParquetError::UnsupportedCodec(_)
            | ParquetError::Decompression { .. } => ErrorKind::Format,
            ParquetError::Page { source, .. } => source.kind(),
            ParquetError::Shared(inner) => inner.kind(),
        }
    }

    /// Attach the column path to a format error that has none yet.
    pub(crate) fn in_column(self, path: &str) -> Self {
        match self {
            ParquetError::Format {
                message,
                offset,
                column: None,
            } => ParquetError::Format {
                message,
                offset,
                column: Some(path.to_string()),
            },
            other => other,
        }
    }
}

fn describe_location(offset: &Option<u64>, column: &Option<String>) -> String {
    match (offset, column) {
        (Some(offset), Some(column)) => format!(" in column {column} at offset {offset}"),
        (Some(offset), None) => format!(" at offset {offset}"),
        (None, Some(column)) => format!(" in column {column}"),
        (None, None) => String::new(),
    }
}

/// Extension for attaching page context to decode results.
pub(crate) trait PageContext<T> {
    fn at_page(self, column: &str, offset: u64) -> Result<T>;
}

impl<T> PageContext<T> for Result<T> {
    fn at_page(self, column: &str, offset: u64) -> Result<T> {
        self.map_err(|e| ParquetError::Page {
            column: column.to_string(),
            offset,
            source: Box::new(e),
        })
    }
}
