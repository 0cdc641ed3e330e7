use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::error::LoadError;
use super::state::{FetchKind, LoadProgress, LoadState, SchedulerState};
use crate::config::LoaderConfig;
use crate::fetcher::{ByteRange, ContentRange};
use crate::playback::{PlaybackError, PlaybackEvent};
use crate::session::SessionId;
use crate::status::{format_bytes, StatusSink, StatusUpdate};

/// Why the scheduler is being asked to consider a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Headroom dropped below the buffer threshold.
    BufferLow,
    /// Caller-initiated retry. After a metadata failure this restarts the probe.
    Manual,
    /// A retry timer fired; stale generations are ignored.
    RetryTimer(u64),
}

/// Side effects the driver must carry out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Fetch `range`, append it to the playback buffer and report back.
    Fetch { kind: FetchKind, range: ByteRange },
    EndOfStream,
    ScheduleRetry { delay: Duration, generation: u64 },
}

/// The segment-fetch state machine.
///
/// Owns the session's [`LoadState`] and is its only writer. Every method is
/// synchronous; the async driver turns returned [`Command`]s into I/O and
/// feeds completions back in.
pub struct Scheduler {
    config: LoaderConfig,
    state: SchedulerState,
    load: LoadState,
    in_flight: Option<(FetchKind, ByteRange)>,
    failed_attempts: u32,
    retry_generation: u64,
    pending_retry: Option<u64>,
    end_of_stream_sent: bool,
    segments_loaded: u64,
    last_error: Option<LoadError>,
    last_playback: Option<PlaybackEvent>,
    session_id: String,
    status: Arc<dyn StatusSink>,
}

impl Scheduler {
    pub fn new(mut config: LoaderConfig, session_id: &SessionId, status: Arc<dyn StatusSink>) -> Self {
        config.chunk_size = config.chunk_size.max(1);
        config.metadata_probe_bytes = config.metadata_probe_bytes.max(1);
        Self {
            load: LoadState::new(config.chunk_size),
            config,
            state: SchedulerState::Uninitialized,
            in_flight: None,
            failed_attempts: 0,
            retry_generation: 0,
            pending_retry: None,
            end_of_stream_sent: false,
            segments_loaded: 0,
            last_error: None,
            last_playback: None,
            session_id: session_id.to_string(),
            status,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn load_state(&self) -> &LoadState {
        &self.load
    }

    pub fn last_error(&self) -> Option<&LoadError> {
        self.last_error.as_ref()
    }

    pub fn in_flight(&self) -> Option<ByteRange> {
        self.in_flight.map(|(_, range)| range)
    }

    /// Idle means a trigger could start a fetch right now.
    pub fn is_idle(&self) -> bool {
        self.state == SchedulerState::Ready && !self.load.fetch_in_flight
    }

    pub fn progress(&self) -> LoadProgress {
        LoadProgress {
            state: self.state,
            loaded_bytes: self.load.loaded_bytes,
            total_bytes: self.load.total_bytes,
            fetch_in_flight: self.load.fetch_in_flight,
            segments_loaded: self.segments_loaded,
            last_error: self.last_error.as_ref().map(|e| e.to_string()),
        }
    }

    /// Issues the bootstrap probe. Only valid once, from `Uninitialized`.
    pub fn start(&mut self) -> Option<Command> {
        if self.state != SchedulerState::Uninitialized {
            debug!(state = %self.state, "Ignoring start on a started session");
            return None;
        }
        info!(session_id = %self.session_id, "Starting loader session");
        Some(self.begin_metadata())
    }

    /// Re-issues the bootstrap probe after a metadata failure.
    pub fn restart(&mut self) -> Option<Command> {
        if self.state != SchedulerState::Failed || self.load.metadata_loaded {
            debug!(state = %self.state, "Restart only applies after a metadata failure");
            return None;
        }
        Some(self.begin_metadata())
    }

    pub fn trigger(&mut self, trigger: Trigger) -> Option<Command> {
        match trigger {
            Trigger::RetryTimer(generation) => {
                if self.pending_retry != Some(generation) {
                    debug!(generation, "Ignoring superseded retry timer");
                    return None;
                }
                self.pending_retry = None;
            }
            Trigger::Manual
                if self.state == SchedulerState::Failed && !self.load.metadata_loaded =>
            {
                return self.restart();
            }
            _ => {}
        }

        if !self.is_idle() {
            debug!(?trigger, state = %self.state, "Trigger ignored, scheduler not idle");
            return None;
        }
        let range = self.load.next_segment()?;
        Some(self.begin_segment(range))
    }

    /// Handles the end of the in-flight fetch-and-append. `applied` is the
    /// range that was written to the playback buffer.
    pub fn on_fetch_complete(&mut self, applied: Result<ContentRange, LoadError>) -> Vec<Command> {
        let Some((kind, requested)) = self.in_flight.take() else {
            warn!("Fetch completion with nothing in flight");
            return Vec::new();
        };
        self.load.fetch_in_flight = false;

        match (kind, applied) {
            (FetchKind::Metadata, Ok(cr)) => self.metadata_loaded(cr),
            (FetchKind::Metadata, Err(e)) => {
                self.metadata_failed(e);
                Vec::new()
            }
            (FetchKind::Segment, Ok(cr)) => self.segment_loaded(requested, cr),
            (FetchKind::Segment, Err(e)) => self.segment_failed(requested, e),
        }
    }

    pub fn on_end_of_stream(&mut self, result: Result<(), PlaybackError>) {
        match result {
            Ok(()) => self.emit("Media source ended"),
            Err(e) => {
                warn!(error = %e, "Playback surface refused end of stream");
                self.emit(format!("End of stream failed: {e}"));
            }
        }
    }

    /// Reports playing and buffering on the status sink when playback
    /// switches between them. Progress ticks are not reported.
    pub fn note_playback(&mut self, event: PlaybackEvent) {
        let message = match event {
            PlaybackEvent::Playing => "Video playing",
            PlaybackEvent::Waiting => "Video buffering...",
            PlaybackEvent::Progress => return,
        };
        if self.last_playback == Some(event) {
            return;
        }
        self.last_playback = Some(event);
        self.emit(message);
    }

    /// Forgets a fetch the driver decided not to start, e.g. during shutdown.
    pub fn abandon_in_flight(&mut self) {
        let Some((kind, range)) = self.in_flight.take() else {
            return;
        };
        self.load.fetch_in_flight = false;
        debug!(?kind, %range, "Abandoning unstarted fetch");
        match kind {
            FetchKind::Segment => self.transition(SchedulerState::Ready, "Loading stopped"),
            FetchKind::Metadata => self.transition(SchedulerState::Failed, "Loading stopped"),
        }
    }

    fn begin_metadata(&mut self) -> Command {
        let range = self.config.metadata_range();
        self.transition(SchedulerState::MetadataPending, "Loading media metadata...");
        self.in_flight = Some((FetchKind::Metadata, range));
        self.load.fetch_in_flight = true;
        Command::Fetch {
            kind: FetchKind::Metadata,
            range,
        }
    }

    fn begin_segment(&mut self, range: ByteRange) -> Command {
        self.transition(
            SchedulerState::FetchingSegment,
            format!(
                "Loading segment: {}-{}",
                format_bytes(range.start),
                format_bytes(range.end)
            ),
        );
        self.in_flight = Some((FetchKind::Segment, range));
        self.load.fetch_in_flight = true;
        Command::Fetch {
            kind: FetchKind::Segment,
            range,
        }
    }

    fn metadata_loaded(&mut self, cr: ContentRange) -> Vec<Command> {
        self.load.total_bytes = Some(cr.total);
        self.load.loaded_bytes = (cr.end + 1).min(cr.total);
        self.load.metadata_loaded = true;
        self.last_error = None;
        self.transition(
            SchedulerState::Ready,
            format!("Metadata loaded, total size: {}", format_bytes(cr.total)),
        );

        if self.load.is_fully_loaded() {
            return self.complete();
        }
        match self.load.next_segment() {
            Some(range) => vec![self.begin_segment(range)],
            None => Vec::new(),
        }
    }

    fn metadata_failed(&mut self, e: LoadError) {
        warn!(session_id = %self.session_id, error = %e, "Metadata probe failed");
        self.transition(
            SchedulerState::Failed,
            format!("Failed to load metadata ({}): {}", e.kind(), e),
        );
        self.last_error = Some(e);
    }

    fn segment_loaded(&mut self, requested: ByteRange, cr: ContentRange) -> Vec<Command> {
        if Some(cr.total) != self.load.total_bytes {
            warn!(
                announced = cr.total,
                known = ?self.load.total_bytes,
                "Segment response announced a different total size, keeping the original"
            );
        }
        let total = self.load.total_bytes.unwrap_or(cr.total);
        let end = cr.end.min(requested.end);
        self.load.loaded_bytes = self.load.loaded_bytes.max((end + 1).min(total));
        self.segments_loaded += 1;
        self.failed_attempts = 0;
        self.pending_retry = None;
        self.last_error = None;

        let message = format!(
            "Loaded: {}% ({}/{})",
            self.load.percent_loaded(),
            format_bytes(self.load.loaded_bytes),
            format_bytes(total)
        );
        if self.load.is_fully_loaded() {
            self.emit(message);
            return self.complete();
        }

        self.transition(SchedulerState::Ready, message);
        match self.load.next_segment() {
            Some(range) => vec![self.begin_segment(range)],
            None => Vec::new(),
        }
    }

    fn segment_failed(&mut self, requested: ByteRange, e: LoadError) -> Vec<Command> {
        warn!(
            start = requested.start,
            end = requested.end,
            loaded_bytes = self.load.loaded_bytes,
            error = %e,
            "Segment fetch failed"
        );
        self.transition(
            SchedulerState::Failed,
            format!("Failed to load segment {} ({}): {}", requested, e.kind(), e),
        );
        self.transition(SchedulerState::Ready, "Waiting to retry segment");

        self.failed_attempts += 1;
        let retryable = e.is_retryable();
        self.last_error = Some(e);
        if !retryable {
            return Vec::new();
        }

        match self.config.retry.backoff_for(self.failed_attempts) {
            Some(delay) => {
                self.retry_generation += 1;
                self.pending_retry = Some(self.retry_generation);
                self.emit(format!(
                    "Retrying segment in {}ms (attempt {})",
                    delay.as_millis(),
                    self.failed_attempts
                ));
                vec![Command::ScheduleRetry {
                    delay,
                    generation: self.retry_generation,
                }]
            }
            None => {
                debug!(attempts = self.failed_attempts, "No timed retry, waiting for the next trigger");
                Vec::new()
            }
        }
    }

    fn complete(&mut self) -> Vec<Command> {
        self.transition(SchedulerState::Complete, "Media loading complete");
        if self.end_of_stream_sent {
            return Vec::new();
        }
        self.end_of_stream_sent = true;
        info!(
            session_id = %self.session_id,
            total_bytes = ?self.load.total_bytes,
            segments = self.segments_loaded,
            "Loader session complete"
        );
        vec![Command::EndOfStream]
    }

    fn transition(&mut self, target: SchedulerState, message: impl Into<String>) {
        debug_assert!(
            self.state.can_transition_to(target),
            "illegal transition {} -> {}",
            self.state,
            target
        );
        debug!(from = %self.state, to = %target, "Scheduler transition");
        self.state = target;
        self.emit(message);
    }

    fn emit(&self, message: impl Into<String>) {
        self.status.status_changed(&StatusUpdate::new(
            self.session_id.as_str(),
            self.state,
            message,
            self.load.loaded_bytes,
            self.load.total_bytes,
        ));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::config::RetryPolicy;
    use crate::fetcher::FetchError;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<StatusUpdate>>);

    impl StatusSink for Recorder {
        fn status_changed(&self, update: &StatusUpdate) {
            self.0.lock().unwrap().push(update.clone());
        }
    }

    impl Recorder {
        fn messages(&self) -> Vec<String> {
            self.0.lock().unwrap().iter().map(|u| u.message.clone()).collect()
        }
    }

    fn scheduler(config: LoaderConfig) -> (Scheduler, Arc<Recorder>) {
        let rec = Arc::new(Recorder::default());
        let s = Scheduler::new(config, &SessionId::from("session_test"), rec.clone());
        (s, rec)
    }

    fn scenario_config() -> LoaderConfig {
        LoaderConfig::default()
            .with_chunk_size(2_000_000)
            .with_metadata_probe_bytes(65536)
            .with_retry(RetryPolicy::disabled())
    }

    fn ok(start: u64, end: u64, total: u64) -> Result<ContentRange, LoadError> {
        Ok(ContentRange { start, end, total })
    }

    fn transport() -> LoadError {
        FetchError::Transport {
            url: "http://x/v.mp4".into(),
            reason: "connection reset".into(),
            timeout: false,
        }
        .into()
    }

    fn fetched_range(cmd: &Command) -> ByteRange {
        match cmd {
            Command::Fetch { range, .. } => *range,
            other => panic!("expected fetch, got {other:?}"),
        }
    }

    #[test]
    fn start_issues_metadata_request_once() {
        let (mut s, _) = scheduler(scenario_config());
        let cmd = s.start().unwrap();
        assert_eq!(
            cmd,
            Command::Fetch { kind: FetchKind::Metadata, range: ByteRange::new(0, 65535) }
        );
        assert_eq!(s.state(), SchedulerState::MetadataPending);
        assert!(s.load_state().fetch_in_flight);
        assert!(s.start().is_none());
    }

    #[test]
    fn zero_sized_config_still_requests_one_byte() {
        let config: LoaderConfig = serde_json::from_value(serde_json::json!({
            "chunk_size": 0,
            "metadata_probe_bytes": 0,
            "buffer_threshold": { "secs": 10, "nanos": 0 },
            "request_timeout": { "secs": 30, "nanos": 0 },
            "connect_timeout": { "secs": 5, "nanos": 0 },
            "retry": {
                "max_retries": 0,
                "base_backoff": { "secs": 0, "nanos": 500_000_000 },
                "max_backoff": { "secs": 8, "nanos": 0 }
            }
        }))
        .unwrap();
        let (mut s, _) = scheduler(config);
        assert_eq!(fetched_range(&s.start().unwrap()), ByteRange::new(0, 0));

        // One-byte segments follow the one-byte metadata request.
        let cmds = s.on_fetch_complete(ok(0, 0, 3));
        assert_eq!(fetched_range(&cmds[0]), ByteRange::new(1, 1));
    }

    #[test]
    fn scenario_a_partitions_resource() {
        let (mut s, rec) = scheduler(scenario_config());
        s.start();

        let mut ranges = Vec::new();
        let mut cmds = s.on_fetch_complete(ok(0, 65535, 5_000_000));
        loop {
            match cmds.as_slice() {
                [Command::Fetch { kind: FetchKind::Segment, range }] => {
                    let range = *range;
                    ranges.push(range);
                    assert!(s.trigger(Trigger::BufferLow).is_none());
                    cmds = s.on_fetch_complete(ok(range.start, range.end, 5_000_000));
                }
                [Command::EndOfStream] => break,
                other => panic!("unexpected commands {other:?}"),
            }
        }

        assert_eq!(
            ranges,
            vec![
                ByteRange::new(65536, 2_065_535),
                ByteRange::new(2_065_536, 4_065_535),
                ByteRange::new(4_065_536, 4_999_999),
            ]
        );
        assert_eq!(s.state(), SchedulerState::Complete);
        assert_eq!(s.load_state().loaded_bytes, 5_000_000);
        assert!(rec.messages().iter().any(|m| m == "Media loading complete"));
        assert!(rec.messages().iter().any(|m| m.starts_with("Loaded: 100%")));
    }

    #[test]
    fn scenario_b_metadata_failure_halts() {
        let (mut s, rec) = scheduler(scenario_config());
        s.start();
        let err: LoadError = FetchError::UnsupportedRange { url: "u".into(), status: 200 }.into();
        let cmds = s.on_fetch_complete(Err(err));
        assert!(cmds.is_empty());
        assert_eq!(s.state(), SchedulerState::Failed);
        assert!(!s.load_state().fetch_in_flight);
        assert!(s.trigger(Trigger::BufferLow).is_none());
        assert!(rec.messages().iter().any(|m| m.contains("UnsupportedRange")));
    }

    #[test]
    fn manual_trigger_restarts_failed_metadata() {
        let (mut s, _) = scheduler(scenario_config());
        s.start();
        s.on_fetch_complete(Err(transport()));
        let cmd = s.trigger(Trigger::Manual).unwrap();
        assert_eq!(fetched_range(&cmd), ByteRange::new(0, 65535));
        assert_eq!(s.state(), SchedulerState::MetadataPending);
    }

    #[test]
    fn scenario_c_failed_segment_is_reissued() {
        let (mut s, _) = scheduler(scenario_config());
        s.start();
        let first = fetched_range(&s.on_fetch_complete(ok(0, 65535, 5_000_000))[0]);

        let cmds = s.on_fetch_complete(Err(transport()));
        assert!(cmds.is_empty());
        assert_eq!(s.state(), SchedulerState::Ready);
        assert!(!s.load_state().fetch_in_flight);
        assert_eq!(s.load_state().loaded_bytes, 65536);

        let again = fetched_range(&s.trigger(Trigger::BufferLow).unwrap());
        assert_eq!(again, first);
    }

    #[test]
    fn retry_policy_schedules_timers_until_budget() {
        let config = scenario_config().with_retry(RetryPolicy {
            max_retries: Some(2),
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
        });
        let (mut s, _) = scheduler(config);
        s.start();
        s.on_fetch_complete(ok(0, 65535, 5_000_000));

        let cmds = s.on_fetch_complete(Err(transport()));
        let Command::ScheduleRetry { delay, generation } = cmds[0] else {
            panic!("expected retry, got {cmds:?}");
        };
        assert_eq!(delay, Duration::from_millis(100));
        s.trigger(Trigger::RetryTimer(generation)).unwrap();

        let cmds = s.on_fetch_complete(Err(transport()));
        let Command::ScheduleRetry { delay, generation } = cmds[0] else {
            panic!("expected retry, got {cmds:?}");
        };
        assert_eq!(delay, Duration::from_millis(200));
        s.trigger(Trigger::RetryTimer(generation)).unwrap();

        assert!(s.on_fetch_complete(Err(transport())).is_empty());
        assert_eq!(s.state(), SchedulerState::Ready);
    }

    #[test]
    fn superseded_retry_timer_is_ignored() {
        let config = scenario_config().with_retry(RetryPolicy::default());
        let (mut s, _) = scheduler(config);
        s.start();
        s.on_fetch_complete(ok(0, 65535, 5_000_000));
        let cmds = s.on_fetch_complete(Err(transport()));
        let Command::ScheduleRetry { generation, .. } = cmds[0] else {
            panic!("expected retry");
        };

        // A low-buffer signal wins the race and the segment succeeds.
        let range = fetched_range(&s.trigger(Trigger::BufferLow).unwrap());
        s.on_fetch_complete(ok(range.start, range.end, 5_000_000));
        assert!(s.load_state().fetch_in_flight);
        assert!(s.trigger(Trigger::RetryTimer(generation)).is_none());
    }

    #[test]
    fn playback_rejection_waits_for_external_trigger() {
        let config = scenario_config().with_retry(RetryPolicy::default());
        let (mut s, rec) = scheduler(config);
        s.start();
        let range = fetched_range(&s.on_fetch_complete(ok(0, 65535, 5_000_000))[0]);
        let err: LoadError = PlaybackError::Rejected { len: 10, reason: "overlap".into() }.into();
        assert!(s.on_fetch_complete(Err(err)).is_empty());
        assert_eq!(s.load_state().loaded_bytes, 65536);
        assert!(rec.messages().iter().any(|m| m.contains("PlaybackBufferError")));
        assert_eq!(fetched_range(&s.trigger(Trigger::Manual).unwrap()), range);
    }

    #[test]
    fn low_buffer_while_fetching_is_noop() {
        let (mut s, _) = scheduler(scenario_config());
        s.start();
        assert!(s.trigger(Trigger::BufferLow).is_none());
        s.on_fetch_complete(ok(0, 65535, 5_000_000));
        assert_eq!(s.state(), SchedulerState::FetchingSegment);
        assert!(s.trigger(Trigger::BufferLow).is_none());
        assert!(s.trigger(Trigger::Manual).is_none());
    }

    #[test]
    fn small_resource_completes_from_metadata() {
        let (mut s, _) = scheduler(scenario_config());
        s.start();
        let cmds = s.on_fetch_complete(ok(0, 999, 1000));
        assert_eq!(cmds, vec![Command::EndOfStream]);
        assert_eq!(s.state(), SchedulerState::Complete);
        assert_eq!(s.load_state().loaded_bytes, 1000);
    }

    #[test]
    fn complete_is_terminal() {
        let (mut s, _) = scheduler(scenario_config());
        s.start();
        s.on_fetch_complete(ok(0, 999, 1000));
        for _ in 0..5 {
            assert!(s.trigger(Trigger::BufferLow).is_none());
        }
        assert!(s.trigger(Trigger::Manual).is_none());
        assert!(s.restart().is_none());
        assert!(s.on_fetch_complete(ok(0, 1, 1000)).is_empty());
    }

    #[test]
    fn abandoned_segment_returns_to_ready() {
        let (mut s, _) = scheduler(scenario_config());
        s.start();
        let range = fetched_range(&s.on_fetch_complete(ok(0, 65535, 5_000_000))[0]);
        s.abandon_in_flight();
        assert_eq!(s.state(), SchedulerState::Ready);
        assert!(!s.load_state().fetch_in_flight);
        assert_eq!(s.in_flight(), None);
        assert_eq!(fetched_range(&s.trigger(Trigger::BufferLow).unwrap()), range);
    }

    #[test]
    fn segment_total_mismatch_keeps_metadata_total() {
        let (mut s, _) = scheduler(scenario_config());
        s.start();
        let first = fetched_range(&s.on_fetch_complete(ok(0, 65535, 5_000_000))[0]);
        assert_eq!(first, ByteRange::new(65536, 2_065_535));

        let cmds = s.on_fetch_complete(ok(65536, 2_065_535, 9_000_000));
        assert_eq!(s.load_state().total_bytes, Some(5_000_000));
        assert_eq!(s.load_state().loaded_bytes, 2_065_536);
        assert_eq!(fetched_range(&cmds[0]), ByteRange::new(2_065_536, 4_065_535));

        let cmds = s.on_fetch_complete(ok(2_065_536, 4_065_535, 9_000_000));
        let last = fetched_range(&cmds[0]);
        assert_eq!(last, ByteRange::new(4_065_536, 4_999_999));
        assert_eq!(s.on_fetch_complete(ok(4_065_536, 4_999_999, 5_000_000)), vec![Command::EndOfStream]);
        assert_eq!(s.state(), SchedulerState::Complete);
    }

    #[test]
    fn short_segment_response_keeps_segments_contiguous() {
        let (mut s, _) = scheduler(scenario_config());
        s.start();
        s.on_fetch_complete(ok(0, 65535, 5_000_000));

        let cmds = s.on_fetch_complete(ok(65536, 1_000_000, 5_000_000));
        assert_eq!(s.state(), SchedulerState::FetchingSegment);
        assert_eq!(s.load_state().loaded_bytes, 1_000_001);
        assert_eq!(fetched_range(&cmds[0]), ByteRange::new(1_000_001, 3_000_000));

        let cmds = s.on_fetch_complete(ok(1_000_001, 3_000_000, 5_000_000));
        assert_eq!(fetched_range(&cmds[0]), ByteRange::new(3_000_001, 4_999_999));
        assert_eq!(s.on_fetch_complete(ok(3_000_001, 4_999_999, 5_000_000)), vec![Command::EndOfStream]);
        assert_eq!(s.load_state().loaded_bytes, 5_000_000);
    }

    #[test]
    fn stray_completion_is_ignored() {
        let (mut s, _) = scheduler(scenario_config());
        assert!(s.on_fetch_complete(ok(0, 1, 10)).is_empty());
        assert_eq!(s.state(), SchedulerState::Uninitialized);
    }

    #[test]
    fn every_transition_reports_status() {
        let (mut s, rec) = scheduler(scenario_config());
        s.start();
        s.on_fetch_complete(ok(0, 65535, 100_000));
        let messages = rec.messages();
        assert_eq!(messages[0], "Loading media metadata...");
        assert_eq!(messages[1], "Metadata loaded, total size: 97.66 KB");
        assert_eq!(messages[2], "Loading segment: 64 KB-97.66 KB");
    }

    #[test]
    fn playback_changes_are_reported_once() {
        let (mut s, rec) = scheduler(scenario_config());
        s.start();
        s.note_playback(PlaybackEvent::Waiting);
        s.note_playback(PlaybackEvent::Waiting);
        s.note_playback(PlaybackEvent::Progress);
        s.note_playback(PlaybackEvent::Playing);
        s.note_playback(PlaybackEvent::Playing);
        s.note_playback(PlaybackEvent::Waiting);
        assert_eq!(
            rec.messages(),
            vec![
                "Loading media metadata...",
                "Video buffering...",
                "Video playing",
                "Video buffering...",
            ]
        );
        assert_eq!(s.state(), SchedulerState::MetadataPending);
    }

    #[test]
    fn progress_reflects_state() {
        let (mut s, _) = scheduler(scenario_config());
        s.start();
        s.on_fetch_complete(ok(0, 65535, 5_000_000));
        let p = s.progress();
        assert_eq!(p.state, SchedulerState::FetchingSegment);
        assert_eq!(p.loaded_bytes, 65536);
        assert_eq!(p.total_bytes, Some(5_000_000));
        assert!(p.fetch_in_flight);
        assert_eq!(p.segments_loaded, 0);
    }
}
