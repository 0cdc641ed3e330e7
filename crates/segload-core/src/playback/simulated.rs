use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tracing::debug;

use super::{BufferSnapshot, PlaybackError, PlaybackEvent, PlaybackSurface, TimeRange};

#[derive(Debug)]
struct Clock {
    bytes_appended: u64,
    position: f64,
    started: Option<Instant>,
    last_tick: Option<Instant>,
    ended: bool,
}

impl Clock {
    fn buffered_secs(&self, byte_rate: f64) -> f64 {
        self.bytes_appended as f64 / byte_rate
    }

    /// Moves the playhead forward by wall time, never past the buffered end.
    fn advance(&mut self, byte_rate: f64) {
        let now = Instant::now();
        if let Some(last) = self.last_tick {
            let elapsed = now.duration_since(last).as_secs_f64();
            self.position = (self.position + elapsed).min(self.buffered_secs(byte_rate));
        }
        if self.started.is_some() {
            self.last_tick = Some(now);
        }
    }
}

/// Writer plus the leading bytes of an append that failed partway. Those
/// bytes are already in the writer but not counted as appended.
#[derive(Debug)]
struct Sink<W> {
    writer: W,
    unfinished: Bytes,
}

/// Playback surface that writes appended bytes to a sink and plays them back
/// on a clock, treating the media as a constant `byte_rate` stream.
///
/// Playback starts with the first append. An append that fails partway
/// leaves nothing counted. Appending the same bytes again writes only the
/// part the sink has not seen, so the sink never holds a duplicated prefix.
pub struct SimulatedPlayback<W> {
    sink: tokio::sync::Mutex<Sink<W>>,
    byte_rate: f64,
    clock: Mutex<Clock>,
}

impl<W> SimulatedPlayback<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(sink: W, bytes_per_second: u64) -> Self {
        Self {
            sink: tokio::sync::Mutex::new(Sink {
                writer: sink,
                unfinished: Bytes::new(),
            }),
            byte_rate: bytes_per_second.max(1) as f64,
            clock: Mutex::new(Clock {
                bytes_appended: 0,
                position: 0.0,
                started: None,
                last_tick: None,
                ended: false,
            }),
        }
    }

    pub fn from_bitrate_kbps(sink: W, kbps: u64) -> Self {
        Self::new(sink, kbps.saturating_mul(1000) / 8)
    }

    fn with_clock<T>(&self, f: impl FnOnce(&mut Clock) -> T) -> T {
        let mut clock = match self.clock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        clock.advance(self.byte_rate);
        f(&mut clock)
    }

    pub fn bytes_appended(&self) -> u64 {
        self.with_clock(|c| c.bytes_appended)
    }

    pub fn position(&self) -> f64 {
        self.with_clock(|c| c.position)
    }

    pub fn is_ended(&self) -> bool {
        self.with_clock(|c| c.ended)
    }

    /// True once the stream has ended and the playhead reached its end.
    pub fn is_finished(&self) -> bool {
        let rate = self.byte_rate;
        self.with_clock(|c| c.ended && c.position >= c.buffered_secs(rate))
    }

    /// The notification a media element would currently be raising.
    pub fn event(&self) -> PlaybackEvent {
        let rate = self.byte_rate;
        self.with_clock(|c| {
            if c.started.is_some() && c.position < c.buffered_secs(rate) {
                PlaybackEvent::Playing
            } else {
                PlaybackEvent::Waiting
            }
        })
    }

    pub async fn into_inner(self) -> W {
        self.sink.into_inner().writer
    }
}

#[async_trait]
impl<W> PlaybackSurface for SimulatedPlayback<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn append(&self, bytes: Bytes) -> Result<(), PlaybackError> {
        if self.is_ended() {
            return Err(PlaybackError::Closed);
        }

        let len = bytes.len();
        {
            let mut guard = self.sink.lock().await;
            let sink = &mut *guard;
            let mut written = if sink.unfinished.is_empty() {
                0
            } else if bytes.starts_with(&sink.unfinished) {
                sink.unfinished.len()
            } else {
                return Err(PlaybackError::Rejected {
                    len,
                    reason: format!(
                        "sink holds {} bytes of an unfinished append",
                        sink.unfinished.len()
                    ),
                });
            };

            while written < len {
                match sink.writer.write(&bytes[written..]).await {
                    Ok(0) => {
                        sink.unfinished = bytes.slice(..written);
                        return Err(PlaybackError::Rejected {
                            len,
                            reason: "sink accepted no bytes".into(),
                        });
                    }
                    Ok(n) => written += n,
                    Err(e) => {
                        sink.unfinished = bytes.slice(..written);
                        return Err(PlaybackError::Rejected {
                            len,
                            reason: e.to_string(),
                        });
                    }
                }
            }
            if let Err(e) = sink.writer.flush().await {
                sink.unfinished = bytes.clone();
                return Err(PlaybackError::Rejected {
                    len,
                    reason: e.to_string(),
                });
            }
            sink.unfinished = Bytes::new();
        }

        self.with_clock(|c| {
            c.bytes_appended += len as u64;
            if c.started.is_none() {
                let now = Instant::now();
                c.started = Some(now);
                c.last_tick = Some(now);
            }
        });
        debug!(len, "Appended to simulated playback");
        Ok(())
    }

    async fn end_of_stream(&self) -> Result<(), PlaybackError> {
        self.with_clock(|c| {
            if c.ended {
                Err(PlaybackError::Closed)
            } else {
                c.ended = true;
                Ok(())
            }
        })
    }

    fn snapshot(&self) -> BufferSnapshot {
        let rate = self.byte_rate;
        self.with_clock(|c| {
            let buffered = if c.bytes_appended == 0 {
                Vec::new()
            } else {
                vec![TimeRange::new(0.0, c.buffered_secs(rate))]
            };
            BufferSnapshot::new(c.position, buffered)
        })
    }
}
