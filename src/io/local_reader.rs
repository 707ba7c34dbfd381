use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::trace;

use super::byte_reader::ByteRangeSource;
use super::range::ByteRange;
use crate::error::{ParquetError, Result};

/// ByteRangeSource implementation for local files
///
/// The file length is captured when the source is opened. Every read (or
/// batch of reads) opens the file, issues positioned reads and closes it.
#[derive(Debug, Clone)]
pub struct LocalFileSource {
    file_path: PathBuf,
    total_length: u64,
}

impl LocalFileSource {
    pub async fn open(file_path: impl AsRef<Path>) -> Result<Self> {
        let file_path = file_path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&file_path).await.map_err(|e| {
            ParquetError::io(format!("reading metadata of {}", file_path.display()), e)
        })?;
        Ok(Self {
            file_path,
            total_length: metadata.len(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    async fn open_file(&self) -> Result<File> {
        File::open(&self.file_path)
            .await
            .map_err(|e| ParquetError::io(format!("opening {}", self.file_path.display()), e))
    }

    async fn read_at(&self, file: &mut File, range: ByteRange) -> Result<Bytes> {
        let range = range.resolve(self.total_length)?;
        trace!(path = %self.file_path.display(), start = range.start, end = range.end, "local read");

        file.seek(std::io::SeekFrom::Start(range.start))
            .await
            .map_err(|e| ParquetError::io(format!("seeking to {}", range.start), e))?;

        let mut buffer = vec![0u8; (range.end - range.start) as usize];
        file.read_exact(&mut buffer).await.map_err(|e| {
            let context = if e.kind() == ErrorKind::UnexpectedEof {
                format!(
                    "reading {}..{}: file {} is shorter than expected",
                    range.start,
                    range.end,
                    self.file_path.display()
                )
            } else {
                format!("reading {}..{}", range.start, range.end)
            };
            ParquetError::io(context, e)
        })?;

        Ok(Bytes::from(buffer))
    }
}

#[async_trait]
impl ByteRangeSource for LocalFileSource {
    fn total_length(&self) -> u64 {
        self.total_length
    }

    async fn read_range(&self, range: ByteRange) -> Result<Bytes> {
        let mut file = self.open_file().await?;
        self.read_at(&mut file, range).await
    }

    async fn read_ranges(&self, ranges: &[Option<ByteRange>]) -> Result<Vec<Bytes>> {
        // Validate everything before touching the file
        for range in ranges.iter().flatten() {
            range.resolve(self.total_length)?;
        }
        if ranges.iter().all(Option::is_none) {
            return Ok(vec![Bytes::new(); ranges.len()]);
        }

        let mut file = self.open_file().await?;
        let mut buffers = Vec::with_capacity(ranges.len());
        for range in ranges {
            match range {
                Some(range) => buffers.push(self.read_at(&mut file, *range).await?),
                None => buffers.push(Bytes::new()),
            }
        }
        Ok(buffers)
    }
}
