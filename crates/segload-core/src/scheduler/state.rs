use serde::{Deserialize, Serialize};

use crate::fetcher::ByteRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Uninitialized,
    MetadataPending,
    Ready,
    FetchingSegment,
    Failed,
    Complete,
}

impl SchedulerState {
    pub fn can_transition_to(self, target: SchedulerState) -> bool {
        use SchedulerState::*;
        matches!(
            (self, target),
            (Uninitialized, MetadataPending)
                | (MetadataPending, Ready)
                | (MetadataPending, Failed)
                | (Ready, FetchingSegment)
                | (Ready, Complete)
                | (FetchingSegment, Ready)
                | (FetchingSegment, Complete)
                | (FetchingSegment, Failed)
                | (Failed, Ready)
                | (Failed, MetadataPending)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == SchedulerState::Complete
    }
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::MetadataPending => write!(f, "metadata_pending"),
            Self::Ready => write!(f, "ready"),
            Self::FetchingSegment => write!(f, "fetching_segment"),
            Self::Failed => write!(f, "failed"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// Mutable per-session byte accounting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadState {
    pub total_bytes: Option<u64>,
    /// Bytes fetched and applied to the playback buffer.
    pub loaded_bytes: u64,
    pub metadata_loaded: bool,
    pub fetch_in_flight: bool,
    pub chunk_size: u64,
}

impl LoadState {
    pub fn new(chunk_size: u64) -> Self {
        Self {
            total_bytes: None,
            loaded_bytes: 0,
            metadata_loaded: false,
            fetch_in_flight: false,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn remaining(&self) -> Option<u64> {
        self.total_bytes
            .map(|total| total.saturating_sub(self.loaded_bytes))
    }

    pub fn is_fully_loaded(&self) -> bool {
        matches!(self.total_bytes, Some(total) if self.loaded_bytes >= total)
    }

    /// The next segment to request, or `None` before metadata or once done.
    pub fn next_segment(&self) -> Option<ByteRange> {
        let total = self.total_bytes?;
        if !self.metadata_loaded || self.loaded_bytes >= total {
            return None;
        }
        let start = self.loaded_bytes;
        let end = start
            .saturating_add(self.chunk_size - 1)
            .min(total - 1);
        Some(ByteRange::new(start, end))
    }

    pub fn percent_loaded(&self) -> u64 {
        match self.total_bytes {
            Some(0) => 100,
            Some(total) => ((self.loaded_bytes as f64 / total as f64) * 100.0).round() as u64,
            None => 0,
        }
    }
}

/// What kind of operation is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchKind {
    Metadata,
    Segment,
}

/// Published after every transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadProgress {
    pub state: SchedulerState,
    pub loaded_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
    pub fetch_in_flight: bool,
    pub segments_loaded: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl LoadProgress {
    pub fn initial() -> Self {
        Self {
            state: SchedulerState::Uninitialized,
            loaded_bytes: 0,
            total_bytes: None,
            fetch_in_flight: false,
            segments_loaded: 0,
            last_error: None,
        }
    }
}
