use thiserror::Error;

use crate::fetcher::FetchError;
use crate::playback::PlaybackError;

/// Failure of one fetch-and-append operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    PlaybackBuffer(#[from] PlaybackError),
}

impl LoadError {
    /// Stable name used in status messages and webhook payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch(e) => e.kind(),
            Self::PlaybackBuffer(_) => "PlaybackBufferError",
        }
    }

    /// Whether a timer may re-issue the same segment. Rejected appends would
    /// be rejected again, so they wait for an external trigger instead.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fetch(_))
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Fetch(e) => e.status_code(),
            Self::PlaybackBuffer(_) => None,
        }
    }
}
