use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use url::Url;

use super::buffer::BufferMonitor;
use super::error::LoadError;
use super::machine::{Command, Scheduler, Trigger};
use super::state::LoadProgress;
use crate::config::LoaderConfig;
use crate::fetcher::{ContentRange, RangeFetcher};
use crate::playback::{BufferSnapshot, PlaybackEvent, PlaybackSurface};
use crate::session::SessionId;
use crate::status::StatusSink;

/// Inputs from outside the loader task.
#[derive(Debug, Clone)]
pub enum LoaderMessage {
    Playback {
        event: PlaybackEvent,
        snapshot: BufferSnapshot,
    },
    Retry,
    Restart,
    Shutdown,
}

/// Completions reported by work the loader spawned.
#[derive(Debug)]
enum Completion {
    Fetched(Result<ContentRange, LoadError>),
    RetryTimer(u64),
}

/// Cloneable handle to a running loader session.
#[derive(Debug, Clone)]
pub struct LoaderHandle {
    tx: mpsc::UnboundedSender<LoaderMessage>,
    progress: watch::Receiver<LoadProgress>,
}

impl LoaderHandle {
    /// Forwards a playback notification. Returns false once the loader exited.
    pub fn notify(&self, event: PlaybackEvent, snapshot: BufferSnapshot) -> bool {
        self.tx
            .send(LoaderMessage::Playback { event, snapshot })
            .is_ok()
    }

    /// Re-requests the pending segment, or restarts a failed metadata probe.
    pub fn retry(&self) -> bool {
        self.tx.send(LoaderMessage::Retry).is_ok()
    }

    /// Re-issues the metadata probe after it failed.
    pub fn restart(&self) -> bool {
        self.tx.send(LoaderMessage::Restart).is_ok()
    }

    /// Stops after the in-flight operation, if any, has finished.
    pub fn shutdown(&self) -> bool {
        self.tx.send(LoaderMessage::Shutdown).is_ok()
    }

    pub fn progress(&self) -> LoadProgress {
        self.progress.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LoadProgress> {
        self.progress.clone()
    }

    /// Waits until `predicate` holds, returning the matching progress, or
    /// `None` if the loader exited first.
    pub async fn wait_for(&self, predicate: impl FnMut(&LoadProgress) -> bool) -> Option<LoadProgress> {
        let mut rx = self.progress.clone();
        let progress = rx.wait_for(predicate).await.ok()?;
        Some((*progress).clone())
    }
}

/// One playback session: fetches a resource into a playback surface.
pub struct Loader {
    url: Url,
    session_id: SessionId,
    config: LoaderConfig,
    fetcher: Arc<dyn RangeFetcher>,
    playback: Arc<dyn PlaybackSurface>,
    status: Arc<dyn StatusSink>,
}

impl Loader {
    pub fn new(
        url: Url,
        session_id: SessionId,
        config: LoaderConfig,
        fetcher: Arc<dyn RangeFetcher>,
        playback: Arc<dyn PlaybackSurface>,
        status: Arc<dyn StatusSink>,
    ) -> Self {
        Self {
            url,
            session_id,
            config,
            fetcher,
            playback,
            status,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Spawns the session onto the runtime. The join handle yields the final
    /// progress once the loader shuts down.
    pub fn spawn(self) -> (LoaderHandle, JoinHandle<LoadProgress>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (progress_tx, progress_rx) = watch::channel(LoadProgress::initial());
        let handle = LoaderHandle {
            tx,
            progress: progress_rx,
        };
        let task = tokio::spawn(self.run(rx, progress_tx));
        (handle, task)
    }

    /// Drives the scheduler until shutdown or until every handle is dropped.
    ///
    /// This task is the only writer of the session's load state. Fetches and
    /// retry timers run in spawned tasks and report back over a channel.
    pub async fn run(
        self,
        mut inbox: mpsc::UnboundedReceiver<LoaderMessage>,
        progress: watch::Sender<LoadProgress>,
    ) -> LoadProgress {
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        let mut driver = Driver::new(
            Scheduler::new(self.config.clone(), &self.session_id, Arc::clone(&self.status)),
            done_tx,
        );
        let monitor = BufferMonitor::new(self.config.buffer_threshold);

        info!(url = %self.url, session_id = %self.session_id, "Loader started");
        if let Some(cmd) = driver.scheduler.start() {
            self.execute(vec![cmd], &mut driver).await;
        }
        progress.send_replace(driver.scheduler.progress());

        loop {
            if driver.stopping && !driver.operation_running {
                break;
            }

            tokio::select! {
                msg = inbox.recv(), if !driver.stopping => {
                    let cmds = match msg {
                        Some(LoaderMessage::Playback { event, snapshot }) => {
                            driver.scheduler.note_playback(event);
                            if monitor.check(event, &snapshot, driver.scheduler.is_idle()) {
                                driver.scheduler.trigger(Trigger::BufferLow).into_iter().collect()
                            } else {
                                Vec::new()
                            }
                        }
                        Some(LoaderMessage::Retry) => {
                            driver.scheduler.trigger(Trigger::Manual).into_iter().collect()
                        }
                        Some(LoaderMessage::Restart) => {
                            driver.scheduler.restart().into_iter().collect()
                        }
                        Some(LoaderMessage::Shutdown) | None => {
                            debug!("Loader stopping");
                            driver.stopping = true;
                            Vec::new()
                        }
                    };
                    self.execute(cmds, &mut driver).await;
                }
                Some(done) = done_rx.recv() => {
                    let cmds = match done {
                        Completion::Fetched(result) => {
                            driver.operation_running = false;
                            driver.scheduler.on_fetch_complete(result)
                        }
                        Completion::RetryTimer(_) if driver.stopping => Vec::new(),
                        Completion::RetryTimer(generation) => driver
                            .scheduler
                            .trigger(Trigger::RetryTimer(generation))
                            .into_iter()
                            .collect(),
                    };
                    self.execute(cmds, &mut driver).await;
                }
            }

            progress.send_replace(driver.scheduler.progress());
        }

        driver.cancel_retry_timer();
        let final_progress = driver.scheduler.progress();
        progress.send_replace(final_progress.clone());
        info!(
            url = %self.url,
            state = %final_progress.state,
            loaded_bytes = final_progress.loaded_bytes,
            "Loader stopped"
        );
        final_progress
    }

    async fn execute(&self, commands: Vec<Command>, driver: &mut Driver) {
        for cmd in commands {
            match cmd {
                Command::Fetch { range, .. } if driver.stopping => {
                    debug!(%range, "Not starting fetch during shutdown");
                    driver.scheduler.abandon_in_flight();
                }
                Command::Fetch { kind, range } => {
                    debug!(?kind, %range, "Spawning fetch");
                    driver.operation_running = true;
                    let fetcher = Arc::clone(&self.fetcher);
                    let playback = Arc::clone(&self.playback);
                    let url = self.url.clone();
                    let session_id = self.session_id.clone();
                    let done_tx = driver.done_tx.clone();
                    tokio::spawn(async move {
                        let result = async {
                            let response = fetcher.fetch_range(&url, &session_id, Some(range)).await?;
                            let applied = response.content_range;
                            playback.append(response.bytes).await?;
                            Ok::<_, LoadError>(applied)
                        }
                        .await;
                        let _ = done_tx.send(Completion::Fetched(result));
                    });
                }
                Command::EndOfStream => {
                    let result = self.playback.end_of_stream().await;
                    driver.scheduler.on_end_of_stream(result);
                }
                Command::ScheduleRetry { delay, generation } => {
                    driver.schedule_retry(delay, generation);
                }
            }
        }
    }
}

/// State owned by one run of the loader task.
struct Driver {
    scheduler: Scheduler,
    done_tx: mpsc::UnboundedSender<Completion>,
    stopping: bool,
    operation_running: bool,
    retry_timer: Option<JoinHandle<()>>,
}

impl Driver {
    fn new(scheduler: Scheduler, done_tx: mpsc::UnboundedSender<Completion>) -> Self {
        Self {
            scheduler,
            done_tx,
            stopping: false,
            operation_running: false,
            retry_timer: None,
        }
    }

    /// Arms the retry timer. A timer still pending belongs to an older
    /// generation and is aborted.
    fn schedule_retry(&mut self, delay: Duration, generation: u64) {
        self.cancel_retry_timer();
        let done_tx = self.done_tx.clone();
        self.retry_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = done_tx.send(Completion::RetryTimer(generation));
        }));
    }

    fn cancel_retry_timer(&mut self) {
        if let Some(timer) = self.retry_timer.take() {
            timer.abort();
        }
    }
}
