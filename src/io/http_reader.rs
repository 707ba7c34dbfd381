use async_trait::async_trait;
use bytes::Bytes;
use derive_builder::Builder;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, HeaderMap, RANGE};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};
use url::Url;

use super::byte_reader::ByteRangeSource;
use super::coalesce::coalesce_ranges;
use super::multipart::{
    BoundaryPolicy, Part, contiguous_parts, parse_content_range, slice_requested, split_multipart,
};
use super::range::{ByteRange, RangeKey};
use crate::config::DEFAULT_MAX_COALESCE_GAP;
use crate::error::{ParquetError, Result};

#[derive(Builder, Debug, Clone)]
pub struct HttpSourceArgs {
    #[builder(setter(into))]
    url: String,
    /// Skips the HEAD request when the object size is already known
    #[builder(default, setter(strip_option))]
    total_length: Option<u64>,
    /// Sent with every request (auth tokens and the like)
    #[builder(default)]
    headers: HeaderMap,
    #[builder(default)]
    boundary_policy: BoundaryPolicy,
    #[builder(default = "DEFAULT_MAX_COALESCE_GAP")]
    max_coalesce_gap: u64,
    #[builder(default, setter(strip_option))]
    client: Option<Client>,
}

/// ByteRangeSource implementation over HTTP range requests
///
/// A batch of ranges is coalesced and sent as a single multi-range request.
/// The response may be `multipart/byteranges`, a single `206` part, or the
/// full object (`200`); every requested range is sliced out of whatever came
/// back, and ranges the server did not return read as empty.
#[derive(Debug, Clone)]
pub struct HttpRangeSource {
    client: Client,
    url: Url,
    headers: HeaderMap,
    total_length: u64,
    boundary_policy: BoundaryPolicy,
    max_coalesce_gap: u64,
}

impl HttpRangeSource {
    pub async fn open(args: HttpSourceArgs) -> Result<Self> {
        let HttpSourceArgs {
            url,
            total_length,
            headers,
            boundary_policy,
            max_coalesce_gap,
            client,
        } = args;
        let parsed = Url::parse(&url).map_err(|source| ParquetError::InvalidUrl {
            url: url.clone(),
            source,
        })?;
        let client = client.unwrap_or_default();

        let total_length = match total_length {
            Some(length) => length,
            None => Self::head_length(&client, &parsed, &headers).await?,
        };
        debug!(url = %parsed, total_length, "opened HTTP source");

        Ok(Self {
            client,
            url: parsed,
            headers,
            total_length,
            boundary_policy,
            max_coalesce_gap,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn head_length(client: &Client, url: &Url, headers: &HeaderMap) -> Result<u64> {
        let response = client
            .head(url.clone())
            .headers(headers.clone())
            .send()
            .await
            .map_err(|source| ParquetError::Http {
                url: url.to_string(),
                source,
            })?;
        if !response.status().is_success() {
            return Err(ParquetError::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        // Read the raw header; HEAD responses have no body for reqwest to measure
        response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .ok_or_else(|| ParquetError::MissingHeader {
                url: url.to_string(),
                header: "Content-Length",
            })
    }

    /// Fetch the given non-empty ranges with one request.
    async fn fetch(&self, wanted: &[RangeKey]) -> Result<Vec<Bytes>> {
        let coalesced = coalesce_ranges(wanted, self.max_coalesce_gap);
        let request_ranges: Vec<RangeKey> = coalesced.iter().map(|c| c.range).collect();
        let header = format!(
            "bytes={}",
            request_ranges
                .iter()
                .map(|r| format!("{}-{}", r.start, r.end - 1))
                .collect::<Vec<_>>()
                .join(",")
        );
        debug!(
            url = %self.url,
            requested = wanted.len(),
            parts = request_ranges.len(),
            bytes = request_ranges.iter().map(RangeKey::len).sum::<u64>(),
            "issuing range request"
        );

        let url = self.url.to_string();
        let response = self
            .client
            .get(self.url.clone())
            .headers(self.headers.clone())
            .header(RANGE, header)
            .send()
            .await
            .map_err(|source| ParquetError::Http {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        let content_type = header_string(response.headers(), CONTENT_TYPE);
        let content_range = header_string(response.headers(), CONTENT_RANGE);
        if status != StatusCode::OK && status != StatusCode::PARTIAL_CONTENT {
            return Err(ParquetError::HttpStatus {
                url,
                status: status.as_u16(),
            });
        }
        let body = response.bytes().await.map_err(|source| ParquetError::Http {
            url: url.clone(),
            source,
        })?;

        let parts = if status == StatusCode::OK {
            warn!(url = %self.url, "server ignored Range header and sent the full object");
            vec![Part {
                range: RangeKey {
                    start: 0,
                    end: body.len() as u64,
                },
                payload: body,
            }]
        } else {
            match self.boundary_policy.detect(content_type.as_deref(), &body) {
                Some(boundary) => split_multipart(&url, &body, &boundary)?,
                None => {
                    if request_ranges.len() > 1 {
                        debug!(url = %self.url, "multi-range request answered with a single part");
                    }
                    let declared = content_range.as_deref().and_then(parse_content_range);
                    contiguous_parts(&body, declared, &request_ranges)
                }
            }
        };

        Ok(slice_requested(&parts, wanted))
    }
}

fn header_string(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

#[async_trait]
impl ByteRangeSource for HttpRangeSource {
    fn total_length(&self) -> u64 {
        self.total_length
    }

    async fn read_range(&self, range: ByteRange) -> Result<Bytes> {
        let key = range.key(self.total_length)?;
        if key.is_empty() {
            return Ok(Bytes::new());
        }
        let mut buffers = self.fetch(&[key]).await?;
        Ok(buffers.pop().unwrap_or_default())
    }

    async fn read_ranges(&self, ranges: &[Option<ByteRange>]) -> Result<Vec<Bytes>> {
        // Range errors surface before any request is sent
        let keys = ranges
            .iter()
            .map(|range| range.map(|r| r.key(self.total_length)).transpose())
            .collect::<Result<Vec<_>>>()?;

        let wanted: Vec<(usize, RangeKey)> = keys
            .iter()
            .enumerate()
            .filter_map(|(index, key)| key.filter(|k| !k.is_empty()).map(|k| (index, k)))
            .collect();

        let mut buffers = vec![Bytes::new(); ranges.len()];
        if wanted.is_empty() {
            return Ok(buffers);
        }

        let wanted_keys: Vec<RangeKey> = wanted.iter().map(|(_, key)| *key).collect();
        let fetched = self.fetch(&wanted_keys).await?;
        for ((index, _), bytes) in wanted.into_iter().zip(fetched) {
            buffers[index] = bytes;
        }
        Ok(buffers)
    }
}
