//! Human-readable progress notifications.
//!
//! The scheduler reports every transition and every error to a
//! [`StatusSink`]. Nothing in the loader depends on what a sink does with it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use crate::scheduler::SchedulerState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub state: SchedulerState,
    pub message: String,
    pub loaded_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
}

impl StatusUpdate {
    pub fn new(
        session_id: impl Into<String>,
        state: SchedulerState,
        message: impl Into<String>,
        loaded_bytes: u64,
        total_bytes: Option<u64>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            session_id: session_id.into(),
            state,
            message: message.into(),
            loaded_bytes,
            total_bytes,
        }
    }
}

pub trait StatusSink: Send + Sync {
    fn status_changed(&self, update: &StatusUpdate);
}

/// Mirrors status messages into the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatusSink;

impl StatusSink for TracingStatusSink {
    fn status_changed(&self, update: &StatusUpdate) {
        info!(
            session_id = %update.session_id,
            state = %update.state,
            loaded_bytes = update.loaded_bytes,
            "{}",
            update.message
        );
    }
}

/// Forwards updates into an unbounded channel, e.g. for the webhook dispatcher.
#[derive(Debug, Clone)]
pub struct ChannelStatusSink {
    tx: mpsc::UnboundedSender<StatusUpdate>,
}

impl ChannelStatusSink {
    pub fn new(tx: mpsc::UnboundedSender<StatusUpdate>) -> Self {
        Self { tx }
    }
}

impl StatusSink for ChannelStatusSink {
    fn status_changed(&self, update: &StatusUpdate) {
        // A closed receiver just means nobody is listening any more.
        let _ = self.tx.send(update.clone());
    }
}

#[derive(Clone, Default)]
pub struct FanoutStatusSink {
    sinks: Vec<Arc<dyn StatusSink>>,
}

impl FanoutStatusSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl StatusSink for FanoutStatusSink {
    fn status_changed(&self, update: &StatusUpdate) {
        for sink in &self.sinks {
            sink.status_changed(update);
        }
    }
}

pub fn status_channel() -> (
    mpsc::UnboundedSender<StatusUpdate>,
    mpsc::UnboundedReceiver<StatusUpdate>,
) {
    mpsc::unbounded_channel()
}

/// Formats a byte count with base-1024 units, e.g. `4.77 MB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rendered = format!("{value:.2}");
    let trimmed = rendered.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[unit])
}
