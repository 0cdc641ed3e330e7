mod config;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::{fmt, EnvFilter};
use url::Url;

use segload_core::{
    format_bytes, status_channel, ChannelStatusSink, FanoutStatusSink,
    FileIdentityStore, HttpRangeFetcher, Loader, PlaybackSurface, RangeFetcher, SchedulerState,
    SessionId, SimulatedPlayback, StatusSink, StatusUpdate, TracingStatusSink,
    WebhookDispatcher,
};

use crate::config::AppConfig;

fn version_string() -> &'static str {
    static VERSION: OnceLock<String> = OnceLock::new();
    VERSION.get_or_init(|| match env!("GIT_HASH") {
        "" => env!("CARGO_PKG_VERSION").to_string(),
        hash => format!("{} ({})", env!("CARGO_PKG_VERSION"), hash),
    })
}

/// Progressive byte-range media loader.
#[derive(Parser)]
#[command(name = "segload", version = version_string(), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a resource segment by segment into a file.
    Fetch {
        /// Media URL. The server must answer range requests with 206.
        url: Url,

        /// File to write the loaded bytes to.
        #[arg(short, long)]
        output: PathBuf,

        /// Bitrate used to simulate playback of the loaded bytes.
        #[arg(long, default_value_t = 2500)]
        bitrate_kbps: u64,

        /// Path to TOML config file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Run the metadata probe only and report the resource size.
    Probe {
        url: Url,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the persisted session id.
    Session {
        /// Discard the stored id and generate a new one.
        #[arg(long, default_value_t = false)]
        reset: bool,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Fetch {
            url,
            output,
            bitrate_kbps,
            config,
        } => {
            let app_config = load_config(config.as_deref(), "warn");
            run_fetch(app_config, url, output, bitrate_kbps).await
        }
        Commands::Probe { url, config } => {
            let app_config = load_config(config.as_deref(), "warn");
            run_probe(app_config, url).await
        }
        Commands::Session { reset, config } => {
            let app_config = load_config(config.as_deref(), "info");
            run_session(app_config, reset)
        }
    }
}

/// Loads the config file, if any, and initialises logging from it.
/// Exits the process when the file is unusable.
fn load_config(path: Option<&Path>, default_level: &str) -> AppConfig {
    let Some(path) = path else {
        init_tracing("pretty", default_level);
        return AppConfig::default();
    };
    match AppConfig::load(path) {
        Ok(c) => {
            init_tracing(&c.log.format, default_level);
            tracing::debug!(path = %path.display(), "Loaded config file");
            c
        }
        Err(e) => {
            init_tracing("pretty", default_level);
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    }
}

fn check_scheme(url: &Url) -> Result<(), String> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(format!("URL must use http or https, got '{other}': {url}")),
    }
}

/// Shows each status message on the progress bar.
struct ProgressStatusSink {
    bar: ProgressBar,
}

impl StatusSink for ProgressStatusSink {
    fn status_changed(&self, update: &StatusUpdate) {
        let message = match update.state {
            SchedulerState::Failed => style(&update.message).red().to_string(),
            SchedulerState::Complete => style(&update.message).green().to_string(),
            _ => update.message.clone(),
        };
        self.bar.set_message(message);
    }
}

async fn run_fetch(app_config: AppConfig, url: Url, output: PathBuf, bitrate_kbps: u64) -> ExitCode {
    if let Err(e) = check_scheme(&url) {
        tracing::error!("{}", e);
        return ExitCode::FAILURE;
    }

    let loader_config = app_config.loader.to_loader_config();
    let store = FileIdentityStore::new(app_config.session.identity_path());
    let session_id = SessionId::get_or_create(&store);

    let file = match tokio::fs::File::create(&output).await {
        Ok(f) => f,
        Err(e) => {
            tracing::error!(path = %output.display(), error = %e, "Failed to create output file");
            return ExitCode::FAILURE;
        }
    };
    let playback = Arc::new(SimulatedPlayback::from_bitrate_kbps(file, bitrate_kbps));

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    bar.enable_steady_tick(Duration::from_millis(120));

    bar.println(format!(
        "{} {}",
        style("segload").bold(),
        style(env!("CARGO_PKG_VERSION")).dim()
    ));
    bar.println(format!("  {} {}", style("url:    ").dim(), style(&url).bold()));
    bar.println(format!("  {} {}", style("output: ").dim(), output.display()));
    bar.println(format!("  {} {}", style("session:").dim(), session_id));
    bar.println(format!(
        "  {} {}",
        style("chunk:  ").dim(),
        format_bytes(loader_config.chunk_size)
    ));
    for wh in &app_config.webhook {
        bar.println(format!("  {} {}", style("webhook:").dim(), wh.url));
    }
    bar.println("");

    let mut status = FanoutStatusSink::new()
        .with(Arc::new(ProgressStatusSink { bar: bar.clone() }))
        .with(Arc::new(TracingStatusSink));
    let webhook_handle = if app_config.webhook.is_empty() {
        None
    } else {
        let (tx, rx) = status_channel();
        status = status.with(Arc::new(ChannelStatusSink::new(tx)));
        let client = HttpRangeFetcher::build_client(
            loader_config.request_timeout,
            loader_config.connect_timeout,
        );
        let dispatcher = WebhookDispatcher::new(rx, app_config.webhook.clone(), client);
        Some(tokio::spawn(dispatcher.run()))
    };

    let fetcher = Arc::new(HttpRangeFetcher::from_config(&loader_config));
    let loader = Loader::new(
        url,
        session_id,
        loader_config,
        fetcher,
        playback.clone(),
        Arc::new(status),
    );
    let (handle, task) = loader.spawn();
    let mut progress = handle.subscribe();

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut tick = tokio::time::interval(Duration::from_millis(250));

    let outcome = loop {
        tokio::select! {
            _ = tick.tick() => {
                handle.notify(playback.event(), playback.snapshot());
            }
            changed = progress.changed() => {
                if changed.is_err() {
                    break ExitCode::FAILURE;
                }
                let p = progress.borrow_and_update().clone();
                if let Some(total) = p.total_bytes {
                    bar.set_length(total);
                }
                bar.set_position(p.loaded_bytes);
                match p.state {
                    SchedulerState::Complete => break ExitCode::SUCCESS,
                    // A failed probe never recovers on its own.
                    SchedulerState::Failed if p.total_bytes.is_none() && !p.fetch_in_flight => {
                        break ExitCode::FAILURE;
                    }
                    _ => {}
                }
            }
            _ = &mut shutdown => {
                bar.println(format!("{}", style("Interrupted, finishing current segment...").dim()));
                break ExitCode::FAILURE;
            }
        }
    };

    handle.shutdown();
    let last = task.await.ok();
    bar.finish();

    if let Some(last) = &last {
        let summary = format!(
            "{} of {} in {} segments",
            format_bytes(last.loaded_bytes),
            last.total_bytes.map(format_bytes).unwrap_or_else(|| "unknown".into()),
            last.segments_loaded
        );
        match (&last.last_error, last.state) {
            (_, SchedulerState::Complete) => println!("{} {}", style("Done:").green().bold(), summary),
            (Some(err), _) => println!("{} {} ({})", style("Stopped:").red().bold(), summary, err),
            (None, _) => println!("{} {}", style("Stopped:").yellow().bold(), summary),
        }
    }

    if let Some(handle) = webhook_handle {
        if tokio::time::timeout(Duration::from_secs(5), handle).await.is_err() {
            tracing::warn!("Webhook dispatcher did not shut down in time");
        }
    }

    outcome
}

async fn run_probe(app_config: AppConfig, url: Url) -> ExitCode {
    if let Err(e) = check_scheme(&url) {
        tracing::error!("{}", e);
        return ExitCode::FAILURE;
    }

    let loader_config = app_config.loader.to_loader_config();
    let session_id = SessionId::get_or_create(&FileIdentityStore::new(
        app_config.session.identity_path(),
    ));
    let fetcher = HttpRangeFetcher::from_config(&loader_config);
    let range = loader_config.metadata_range();

    match fetcher.fetch_range(&url, &session_id, Some(range)).await {
        Ok(resp) => {
            let total = resp.total_bytes();
            let segments = total
                .saturating_sub(resp.bytes.len() as u64)
                .div_ceil(loader_config.chunk_size.max(1));
            println!("{} {}", style("url:     ").dim(), url);
            println!(
                "{} {} ({} bytes)",
                style("size:    ").dim(),
                style(format_bytes(total)).bold(),
                total
            );
            println!("{} {}", style("probe:   ").dim(), resp.content_range.range());
            println!(
                "{} {} of {}",
                style("segments:").dim(),
                segments,
                format_bytes(loader_config.chunk_size)
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("{} {} ({})", style("Probe failed:").red().bold(), e, e.kind());
            ExitCode::FAILURE
        }
    }
}

fn run_session(app_config: AppConfig, reset: bool) -> ExitCode {
    let store = FileIdentityStore::new(app_config.session.identity_path());
    if reset {
        if let Err(e) = store.clear() {
            tracing::error!(path = %store.path().display(), error = %e, "Failed to remove session id");
            return ExitCode::FAILURE;
        }
    }
    let id = SessionId::get_or_create(&store);
    println!("{id}");
    tracing::info!(path = %store.path().display(), "Session id file");
    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn init_tracing(log_format: &str, default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match log_format {
        "json" => fmt().with_env_filter(filter).json().init(),
        _ => fmt().with_env_filter(filter).with_writer(std::io::stderr).init(),
    }
}
