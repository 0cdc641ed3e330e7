#![forbid(unsafe_code)]

pub mod config;
pub mod fetcher;
pub mod playback;
pub mod scheduler;
pub mod session;
pub mod status;
pub mod webhook;

pub use config::{LoaderConfig, RetryPolicy, SESSION_HEADER};
pub use fetcher::{
    validate_partial, ByteRange, ContentRange, FetchError, HttpRangeFetcher, PartialResponse,
    RangeFetcher,
};
pub use playback::{
    BufferSnapshot, PlaybackError, PlaybackEvent, PlaybackSurface, SimulatedPlayback, TimeRange,
};
pub use scheduler::{
    BufferMonitor, Command, FetchKind, LoadError, LoadProgress, LoadState, Loader, LoaderHandle,
    LoaderMessage, Scheduler, SchedulerState, Trigger,
};
pub use session::{FileIdentityStore, IdentityStore, MemoryIdentityStore, SessionId};
pub use status::{
    format_bytes, status_channel, ChannelStatusSink, FanoutStatusSink, StatusSink, StatusUpdate,
    TracingStatusSink,
};
pub use webhook::{WebhookConfig, WebhookDispatcher, WebhookPayload};
