use anyhow::{Context, Result, anyhow};
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

use super::byte_reader::ByteRangeSource;
use super::cached_reader::CachedSource;
use super::http_reader::{HttpRangeSource, HttpSourceArgsBuilder};
use super::local_reader::LocalFileSource;

/// Where a Parquet file lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceUri {
    Local(PathBuf),
    Http(Url),
}

impl SourceUri {
    /// Accepts `http(s)://` and `file://` URLs; anything that is not a URL
    /// is a local path.
    pub fn parse(uri: &str) -> Result<Self> {
        let Ok(url) = Url::parse(uri) else {
            return Ok(SourceUri::Local(PathBuf::from(uri)));
        };
        match url.scheme() {
            "http" | "https" if url.host_str().is_some() => Ok(SourceUri::Http(url)),
            "http" | "https" => Err(anyhow!("HTTP URI has no host: {uri}")),
            "file" => url
                .to_file_path()
                .map(SourceUri::Local)
                .map_err(|_| anyhow!("file:// URI is not a local path: {uri}")),
            other => Err(anyhow!("Unsupported source scheme {other:?} in {uri}")),
        }
    }

    /// Open the source behind a per-session range cache
    pub async fn open(&self) -> Result<Arc<dyn ByteRangeSource>> {
        let source: Arc<dyn ByteRangeSource> = match self {
            SourceUri::Local(path) => Arc::new(
                LocalFileSource::open(path)
                    .await
                    .with_context(|| format!("Failed to open {}", path.display()))?,
            ),
            SourceUri::Http(url) => {
                let args = HttpSourceArgsBuilder::default()
                    .url(url.as_str())
                    .build()
                    .context("Failed to build HTTP source arguments")?;
                Arc::new(
                    HttpRangeSource::open(args)
                        .await
                        .with_context(|| format!("Failed to open {url}"))?,
                )
            }
        };
        Ok(Arc::new(CachedSource::new(source)))
    }
}
