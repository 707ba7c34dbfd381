//! Page decompression.
//!
//! Decoding only needs the [`Decompressor`] capability. [`CodecRegistry`] is
//! the stock implementation: it maps codec ids to [`Codec`] implementations
//! and checks every output against the length declared in the page header.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ParquetError, Result};
use crate::metadata::CompressionCodec;

/// Decompression capability consumed by the page decoder
pub trait Decompressor: Send + Sync {
    /// Decompress `input` into exactly `output_len` bytes.
    fn decompress(
        &self,
        codec: CompressionCodec,
        input: &[u8],
        output_len: usize,
    ) -> Result<Vec<u8>>;
}

/// A single compression algorithm
pub trait Codec: Send + Sync {
    fn decompress(&self, input: &[u8], output_len: usize) -> anyhow::Result<Vec<u8>>;
}

struct Uncompressed;

impl Codec for Uncompressed {
    fn decompress(&self, input: &[u8], _output_len: usize) -> anyhow::Result<Vec<u8>> {
        Ok(input.to_vec())
    }
}

#[cfg(feature = "codecs")]
mod builtin {
    use super::*;
    use anyhow::Context;
    use std::io::Read;

    pub(super) struct Snappy;

    impl Codec for Snappy {
        fn decompress(&self, input: &[u8], _output_len: usize) -> anyhow::Result<Vec<u8>> {
            snap::raw::Decoder::new()
                .decompress_vec(input)
                .context("Invalid snappy block")
        }
    }

    pub(super) struct Gzip;

    impl Codec for Gzip {
        fn decompress(&self, input: &[u8], output_len: usize) -> anyhow::Result<Vec<u8>> {
            let mut output = Vec::with_capacity(output_len);
            flate2::read::MultiGzDecoder::new(input)
                .read_to_end(&mut output)
                .context("Invalid gzip stream")?;
            Ok(output)
        }
    }

    pub(super) struct Zstd;

    impl Codec for Zstd {
        fn decompress(&self, input: &[u8], _output_len: usize) -> anyhow::Result<Vec<u8>> {
            zstd::stream::decode_all(input).context("Invalid zstd frame")
        }
    }

    pub(super) struct Lz4Raw;

    impl Codec for Lz4Raw {
        fn decompress(&self, input: &[u8], output_len: usize) -> anyhow::Result<Vec<u8>> {
            lz4_flex::block::decompress(input, output_len).context("Invalid LZ4 block")
        }
    }
}

/// Registry of codecs keyed by codec id
#[derive(Clone)]
pub struct CodecRegistry {
    codecs: HashMap<CompressionCodec, Arc<dyn Codec>>,
}

impl CodecRegistry {
    /// Registry that only handles uncompressed pages
    pub fn uncompressed_only() -> Self {
        let mut codecs: HashMap<CompressionCodec, Arc<dyn Codec>> = HashMap::new();
        codecs.insert(CompressionCodec::Uncompressed, Arc::new(Uncompressed));
        Self { codecs }
    }

    /// Add or replace the implementation for `codec`.
    pub fn register(&mut self, codec: CompressionCodec, implementation: Arc<dyn Codec>) {
        self.codecs.insert(codec, implementation);
    }

    pub fn supports(&self, codec: CompressionCodec) -> bool {
        self.codecs.contains_key(&codec)
    }
}

impl Default for CodecRegistry {
    /// Every codec compiled into this build
    fn default() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::uncompressed_only();
        #[cfg(feature = "codecs")]
        {
            registry.register(CompressionCodec::Snappy, Arc::new(builtin::Snappy));
            registry.register(CompressionCodec::Gzip, Arc::new(builtin::Gzip));
            registry.register(CompressionCodec::Zstd, Arc::new(builtin::Zstd));
            registry.register(CompressionCodec::Lz4Raw, Arc::new(builtin::Lz4Raw));
        }
        registry
    }
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut codecs: Vec<_> = self.codecs.keys().map(|c| format!("{c:?}")).collect();
        codecs.sort();
        f.debug_struct("CodecRegistry").field("codecs", &codecs).finish()
    }
}

impl Decompressor for CodecRegistry {
    fn decompress(
        &self,
        codec: CompressionCodec,
        input: &[u8],
        output_len: usize,
    ) -> Result<Vec<u8>> {
        let implementation = self
            .codecs
            .get(&codec)
            .ok_or(ParquetError::UnsupportedCodec(codec))?;
        let output = implementation
            .decompress(input, output_len)
            .map_err(|e| ParquetError::Decompression {
                codec,
                source: e.into(),
            })?;
        if output.len() != output_len {
            return Err(ParquetError::format(format!(
                "{codec:?} page decompressed to {} bytes, header declares {output_len}",
                output.len()
            )));
        }
        Ok(output)
    }
}
