mod simulated;

pub use simulated::SimulatedPlayback;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("Playback buffer rejected {len} bytes: {reason}")]
    Rejected { len: usize, reason: String },
    #[error("Playback buffer is closed")]
    Closed,
}

/// A buffered interval of media time, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }
}

/// Point-in-time view of the playback surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BufferSnapshot {
    pub current_time: f64,
    pub buffered: Vec<TimeRange>,
}

impl BufferSnapshot {
    pub fn new(current_time: f64, buffered: Vec<TimeRange>) -> Self {
        Self {
            current_time,
            buffered,
        }
    }

    /// End of the last buffered range, if anything is buffered.
    pub fn buffered_end(&self) -> Option<f64> {
        self.buffered.last().map(|r| r.end)
    }

    /// Buffered-but-unplayed seconds ahead of the playhead.
    pub fn headroom(&self) -> Option<f64> {
        self.buffered_end().map(|end| end - self.current_time)
    }
}

/// Notifications a playback surface forwards to the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackEvent {
    Playing,
    Waiting,
    Progress,
}

impl std::fmt::Display for PlaybackEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Playing => write!(f, "playing"),
            Self::Waiting => write!(f, "waiting"),
            Self::Progress => write!(f, "progress"),
        }
    }
}

/// The consumer of loaded bytes: an append-only buffer plus a playhead.
#[async_trait]
pub trait PlaybackSurface: Send + Sync {
    /// Appends bytes; resolves once the surface has applied them.
    async fn append(&self, bytes: Bytes) -> Result<(), PlaybackError>;

    async fn end_of_stream(&self) -> Result<(), PlaybackError>;

    fn snapshot(&self) -> BufferSnapshot;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headroom_uses_last_range() {
        let snap = BufferSnapshot::new(
            5.0,
            vec![TimeRange::new(0.0, 3.0), TimeRange::new(4.0, 17.0)],
        );
        assert_eq!(snap.buffered_end(), Some(17.0));
        assert_eq!(snap.headroom(), Some(12.0));
    }

    #[test]
    fn empty_snapshot_has_no_headroom() {
        assert_eq!(BufferSnapshot::default().headroom(), None);
    }
}
