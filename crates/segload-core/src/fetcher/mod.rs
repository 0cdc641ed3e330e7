mod http;

pub use http::HttpRangeFetcher;

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use url::Url;

use crate::session::SessionId;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Server did not honor range request for {url}: HTTP {status}")]
    UnsupportedRange { url: String, status: u16 },
    #[error("Malformed Content-Range from {url}: {reason}")]
    MalformedRange { url: String, reason: String },
    #[error("Transport error fetching {url}: {reason}")]
    Transport {
        url: String,
        reason: String,
        timeout: bool,
    },
}

impl FetchError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedRange { .. } => "UnsupportedRange",
            Self::MalformedRange { .. } => "MalformedRange",
            Self::Transport { .. } => "TransportError",
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::UnsupportedRange { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport { timeout: true, .. })
    }
}

/// Inclusive byte range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

#[allow(clippy::len_without_is_empty)]
impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end, "inverted byte range {start}-{end}");
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn to_header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Parsed `Content-Range: bytes <start>-<end>/<total>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

impl ContentRange {
    pub fn parse(value: &str) -> Result<Self, String> {
        let rest = value
            .trim()
            .strip_prefix("bytes ")
            .ok_or_else(|| format!("expected 'bytes' unit in '{value}'"))?;
        let (span, total) = rest
            .split_once('/')
            .ok_or_else(|| format!("missing total size in '{value}'"))?;
        let (start, end) = span
            .split_once('-')
            .ok_or_else(|| format!("missing range span in '{value}'"))?;

        let parse = |field: &str, what: &str| {
            field
                .trim()
                .parse::<u64>()
                .map_err(|_| format!("invalid {what} '{field}' in '{value}'"))
        };
        let start = parse(start, "start")?;
        let end = parse(end, "end")?;
        let total = parse(total, "total")?;

        if start > end {
            return Err(format!("start after end in '{value}'"));
        }
        if end >= total {
            return Err(format!("end beyond total size in '{value}'"));
        }
        Ok(Self { start, end, total })
    }

    pub fn range(&self) -> ByteRange {
        ByteRange::new(self.start, self.end)
    }
}

/// A validated 206 response.
#[derive(Debug, Clone)]
pub struct PartialResponse {
    pub bytes: Bytes,
    pub content_range: ContentRange,
}

impl PartialResponse {
    pub fn total_bytes(&self) -> u64 {
        self.content_range.total
    }
}

/// Checks a response against the range that was asked for. A server may end
/// the range early at the end of the resource, but never start elsewhere or
/// return more than requested.
pub fn validate_partial(
    url: &str,
    requested: Option<ByteRange>,
    content_range: ContentRange,
    body_len: u64,
) -> Result<(), FetchError> {
    let malformed = |reason: String| FetchError::MalformedRange {
        url: url.to_string(),
        reason,
    };

    if let Some(req) = requested {
        if content_range.start != req.start {
            return Err(malformed(format!(
                "requested start {} but server returned {}",
                req.start, content_range.start
            )));
        }
        if content_range.end > req.end {
            return Err(malformed(format!(
                "requested end {} but server returned {}",
                req.end, content_range.end
            )));
        }
    }

    let expected = content_range.range().len();
    if body_len != expected {
        return Err(malformed(format!(
            "body has {body_len} bytes, Content-Range announces {expected}"
        )));
    }
    Ok(())
}

/// Issues range requests against a media resource.
///
/// Implementations hold no mutable state between calls and never retry;
/// retry policy belongs to the scheduler.
#[async_trait]
pub trait RangeFetcher: Send + Sync {
    async fn fetch_range(
        &self,
        url: &Url,
        session_id: &SessionId,
        range: Option<ByteRange>,
    ) -> Result<PartialResponse, FetchError>;
}
