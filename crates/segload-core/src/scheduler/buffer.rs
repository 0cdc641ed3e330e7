use std::time::Duration;

use tracing::debug;

use crate::playback::{BufferSnapshot, PlaybackEvent};

/// Turns playback notifications into low-buffer triggers.
///
/// Stateless apart from its threshold: every notification is judged on the
/// snapshot that came with it.
#[derive(Debug, Clone, Copy)]
pub struct BufferMonitor {
    threshold: f64,
}

impl BufferMonitor {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold: threshold.as_secs_f64(),
        }
    }

    pub fn threshold(&self) -> Duration {
        Duration::from_secs_f64(self.threshold)
    }

    /// True when headroom is under the threshold and the scheduler could act
    /// on it. Nothing buffered yet means nothing to judge.
    pub fn check(&self, event: PlaybackEvent, snapshot: &BufferSnapshot, scheduler_idle: bool) -> bool {
        let Some(headroom) = snapshot.headroom() else {
            return false;
        };
        let low = headroom < self.threshold;
        if low {
            debug!(%event, headroom, threshold = self.threshold, scheduler_idle, "Buffer headroom low");
        }
        low && scheduler_idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::TimeRange;

    fn snapshot(current: f64, buffered_end: f64) -> BufferSnapshot {
        BufferSnapshot::new(current, vec![TimeRange::new(0.0, buffered_end)])
    }

    #[test]
    fn no_trigger_with_ample_headroom() {
        let m = BufferMonitor::new(Duration::from_secs(10));
        assert!(!m.check(PlaybackEvent::Progress, &snapshot(20.0, 32.0), true));
    }

    #[test]
    fn triggers_when_headroom_below_threshold() {
        let m = BufferMonitor::new(Duration::from_secs(10));
        assert!(m.check(PlaybackEvent::Progress, &snapshot(20.0, 28.0), true));
        assert!(m.check(PlaybackEvent::Waiting, &snapshot(28.0, 28.0), true));
    }

    #[test]
    fn suppressed_while_fetch_in_flight() {
        let m = BufferMonitor::new(Duration::from_secs(10));
        assert!(!m.check(PlaybackEvent::Playing, &snapshot(20.0, 28.0), false));
    }

    #[test]
    fn exact_threshold_is_not_low() {
        let m = BufferMonitor::new(Duration::from_secs(10));
        assert!(!m.check(PlaybackEvent::Progress, &snapshot(0.0, 10.0), true));
    }

    #[test]
    fn ignores_empty_buffer() {
        let m = BufferMonitor::new(Duration::from_secs(10));
        assert!(!m.check(PlaybackEvent::Waiting, &BufferSnapshot::default(), true));
    }

    #[test]
    fn uses_last_buffered_range() {
        let m = BufferMonitor::new(Duration::from_secs(10));
        let snap = BufferSnapshot::new(
            5.0,
            vec![TimeRange::new(0.0, 3.0), TimeRange::new(4.0, 30.0)],
        );
        assert!(!m.check(PlaybackEvent::Progress, &snap, true));
    }
}
