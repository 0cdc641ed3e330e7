//! TOML configuration file schema and parsing.
//!
//! Example config file:
//!
//! ```toml
//! [log]
//! format = "json"
//!
//! [loader]
//! chunk_size = 1048576
//! buffer_threshold_ms = 15000
//! max_retries = 5
//!
//! [session]
//! identity_file = "/var/lib/segload/session_id"
//!
//! [[webhook]]
//! url = "https://hooks.example.com/segload"
//! states = ["failed", "complete"]
//! secret = "shared-key"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use segload_core::{LoaderConfig, RetryPolicy, WebhookConfig};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub loader: LoaderSection,

    #[serde(default)]
    pub session: SessionSection,

    #[serde(default)]
    pub webhook: Vec<WebhookConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
        }
    }
}

fn default_log_format() -> String {
    "pretty".into()
}

/// Overrides for [`LoaderConfig`]. Anything left out keeps its default.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoaderSection {
    pub chunk_size: Option<u64>,
    pub metadata_probe_bytes: Option<u64>,
    pub buffer_threshold_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
    pub max_retries: Option<u32>,
    /// Retry a failed segment on a timer forever.
    #[serde(default)]
    pub retry_forever: bool,
    pub retry_base_ms: Option<u64>,
    pub retry_max_ms: Option<u64>,
}

impl LoaderSection {
    pub fn to_loader_config(&self) -> LoaderConfig {
        let mut c = LoaderConfig::default();
        if let Some(v) = self.chunk_size {
            c = c.with_chunk_size(v);
        }
        if let Some(v) = self.metadata_probe_bytes {
            c = c.with_metadata_probe_bytes(v);
        }
        if let Some(ms) = self.buffer_threshold_ms {
            c = c.with_buffer_threshold(Duration::from_millis(ms));
        }
        if let Some(ms) = self.request_timeout_ms {
            c = c.with_request_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.connect_timeout_ms {
            c = c.with_connect_timeout(Duration::from_millis(ms));
        }

        let mut retry = RetryPolicy::default();
        if let Some(n) = self.max_retries {
            retry.max_retries = Some(n);
        }
        if self.retry_forever {
            retry.max_retries = None;
        }
        if let Some(ms) = self.retry_base_ms {
            retry.base_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = self.retry_max_ms {
            retry.max_backoff = Duration::from_millis(ms);
        }
        c.with_retry(retry)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionSection {
    pub identity_file: Option<PathBuf>,
}

impl SessionSection {
    pub fn identity_path(&self) -> PathBuf {
        if let Some(path) = &self.identity_file {
            return path.clone();
        }
        match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join(".segload").join("session_id"),
            None => PathBuf::from(".segload_session_id"),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;

        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| format!("Failed to parse config file {}: {}", path.display(), e))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        for (i, wh) in self.webhook.iter().enumerate() {
            url::Url::parse(&wh.url)
                .map_err(|e| format!("Invalid webhook URL at index {}: {} ({})", i, wh.url, e))?;
        }

        if self.loader.chunk_size == Some(0) {
            return Err("loader.chunk_size must be greater than zero".into());
        }
        if self.loader.metadata_probe_bytes == Some(0) {
            return Err("loader.metadata_probe_bytes must be greater than zero".into());
        }

        match self.log.format.as_str() {
            "pretty" | "json" => {}
            other => {
                return Err(format!(
                    "Invalid log format '{}': must be 'pretty' or 'json'",
                    other
                ));
            }
        }

        Ok(())
    }
}
