pub mod buffer;
pub mod engine;
pub mod error;
pub mod machine;
pub mod state;

pub use buffer::BufferMonitor;
pub use engine::{Loader, LoaderHandle, LoaderMessage};
pub use error::LoadError;
pub use machine::{Command, Scheduler, Trigger};
pub use state::{FetchKind, LoadProgress, LoadState, SchedulerState};
