//! Splitting of `multipart/byteranges` and single-blob range responses.
//!
//! Boundaries and headers are located by scanning the raw body. Payloads are
//! always sliced out of the original buffer by offset.

use bytes::Bytes;

use super::range::RangeKey;
use crate::error::{ParquetError, Result};

/// How to decide whether a range response is multipart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BoundaryPolicy {
    /// Only a `multipart/byteranges` content type with a `boundary`
    /// parameter marks a multipart body.
    TrustContentType,
    /// Use the content type when it declares a boundary, otherwise inspect
    /// the body: a first line `--X` and a last line `--X--` mark a multipart
    /// body with boundary `X`.
    #[default]
    SniffBody,
}

impl BoundaryPolicy {
    pub fn detect(&self, content_type: Option<&str>, body: &[u8]) -> Option<String> {
        if let Some(boundary) = content_type.and_then(boundary_from_content_type) {
            return Some(boundary);
        }
        match self {
            BoundaryPolicy::TrustContentType => None,
            BoundaryPolicy::SniffBody => sniff_boundary(body),
        }
    }
}

/// One part of a range response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub range: RangeKey,
    pub payload: Bytes,
}

/// Extract the boundary from a `multipart/byteranges` content type.
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    let mut params = content_type.split(';');
    let media_type = params.next()?.trim();
    if !media_type.eq_ignore_ascii_case("multipart/byteranges") {
        return None;
    }
    params.find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("boundary") {
            return None;
        }
        let value = value.trim().trim_matches('"');
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// Look for `--boundary` as the first line and `--boundary--` as the last.
pub fn sniff_boundary(body: &[u8]) -> Option<String> {
    let first_line = body.split(|&b| b == b'\n').next()?;
    let first_line = trim_line(first_line);
    if first_line.len() <= 2 || !first_line.starts_with(b"--") {
        return None;
    }
    let boundary = &first_line[2..];

    let last_line = body
        .split(|&b| b == b'\n')
        .map(trim_line)
        .rfind(|line| !line.is_empty())?;

    let mut closing = Vec::with_capacity(boundary.len() + 4);
    closing.extend_from_slice(b"--");
    closing.extend_from_slice(boundary);
    closing.extend_from_slice(b"--");
    if last_line != closing.as_slice() {
        return None;
    }
    // Bytes map 1:1 onto chars, so any boundary round-trips
    Some(boundary.iter().map(|&b| b as char).collect())
}

/// Split a multipart body into its parts.
pub fn split_multipart(url: &str, body: &Bytes, boundary: &str) -> Result<Vec<Part>> {
    let delimiter: Vec<u8> = format!("--{boundary}").chars().map(|c| c as u8).collect();
    let malformed = |reason: String| ParquetError::MalformedResponse {
        url: url.to_string(),
        reason,
    };

    let mut parts = Vec::new();
    let mut cursor = find(body, &delimiter, 0)
        .ok_or_else(|| malformed(format!("boundary {boundary:?} not found in body")))?;

    loop {
        let after_delimiter = cursor + delimiter.len();
        if body[after_delimiter..].starts_with(b"--") {
            break;
        }

        let headers_start = match find(body, b"\n", after_delimiter) {
            Some(newline) => newline + 1,
            None => break,
        };
        let (headers_end, payload_start) = header_block_end(body, headers_start)
            .ok_or_else(|| malformed("unterminated part headers".to_string()))?;

        let range = body[headers_start..headers_end]
            .split(|&b| b == b'\n')
            .map(trim_line)
            .find_map(|line| {
                let colon = line.iter().position(|&b| b == b':')?;
                let (name, value) = line.split_at(colon);
                if !name.eq_ignore_ascii_case(b"content-range") {
                    return None;
                }
                let value: String = value[1..].iter().map(|&b| b as char).collect();
                Some(parse_content_range(value.trim()))
            })
            .ok_or_else(|| ParquetError::MissingHeader {
                url: url.to_string(),
                header: "Content-Range",
            })?
            .ok_or_else(|| malformed("unparseable Content-Range in part".to_string()))?;

        let payload_end = usize::try_from(range.len())
            .ok()
            .and_then(|len| payload_start.checked_add(len))
            .filter(|&end| end <= body.len());
        let Some(payload_end) = payload_end else {
            return Err(malformed(format!(
                "part {}-{} extends past the end of the body",
                range.start, range.end
            )));
        };
        parts.push(Part {
            range,
            payload: body.slice(payload_start..payload_end),
        });

        match find(body, &delimiter, payload_end) {
            Some(next) => cursor = next,
            None => break,
        }
    }

    Ok(parts)
}

/// Parse `bytes start-end/total` into an exclusive range.
pub fn parse_content_range(value: &str) -> Option<RangeKey> {
    let rest = value.strip_prefix("bytes")?.trim_start();
    let (span, _total) = rest.split_once('/')?;
    let (start, end) = span.trim().split_once('-')?;
    let start: u64 = start.trim().parse().ok()?;
    let end: u64 = end.trim().parse().ok()?;
    if end < start {
        return None;
    }
    Some(RangeKey {
        start,
        end: end.checked_add(1)?,
    })
}

/// Interpret a non-multipart body.
///
/// With a `Content-Range`, the body is one part at that position. Without
/// one, a body whose length equals the sum of the requested lengths is taken
/// as their concatenation in order; any other body is taken as a span that
/// starts at the first requested offset.
pub fn contiguous_parts(
    body: &Bytes,
    content_range: Option<RangeKey>,
    requested: &[RangeKey],
) -> Vec<Part> {
    if let Some(range) = content_range {
        let len = (range.len() as usize).min(body.len());
        return vec![Part {
            range: RangeKey {
                start: range.start,
                end: range.start + len as u64,
            },
            payload: body.slice(..len),
        }];
    }

    let total: u64 = requested.iter().map(RangeKey::len).sum();
    if total == body.len() as u64 {
        let mut offset = 0usize;
        return requested
            .iter()
            .map(|range| {
                let len = range.len() as usize;
                let part = Part {
                    range: *range,
                    payload: body.slice(offset..offset + len),
                };
                offset += len;
                part
            })
            .collect();
    }

    match requested.iter().map(|r| r.start).min() {
        Some(start) => vec![Part {
            range: RangeKey {
                start,
                end: start.saturating_add(body.len() as u64),
            },
            payload: body.clone(),
        }],
        None => Vec::new(),
    }
}

/// Slice each requested range out of the part that contains it.
///
/// Ranges no part fully covers come back empty.
pub fn slice_requested(parts: &[Part], requested: &[RangeKey]) -> Vec<Bytes> {
    requested
        .iter()
        .map(|wanted| {
            if wanted.is_empty() {
                return Bytes::new();
            }
            parts
                .iter()
                .find(|part| part.range.start <= wanted.start && wanted.end <= part.range.end)
                .and_then(|part| {
                    let offset = usize::try_from(wanted.start - part.range.start).ok()?;
                    let end = offset.checked_add(usize::try_from(wanted.len()).ok()?)?;
                    (end <= part.payload.len()).then(|| part.payload.slice(offset..end))
                })
                .unwrap_or_default()
        })
        .collect()
}

fn trim_line(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

/// End of a header block: (end of header lines, start of payload).
fn header_block_end(body: &[u8], from: usize) -> Option<(usize, usize)> {
    // A part may have no headers at all in malformed responses; the first
    // blank line always ends the block
    let crlf = find(body, b"\r\n\r\n", from).map(|pos| (pos, pos + 4));
    let lf = find(body, b"\n\n", from).map(|pos| (pos, pos + 2));
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}
