//! Webhook status delivery.
//!
//! A [`crate::status::ChannelStatusSink`] pushes every [`StatusUpdate`] into
//! an mpsc channel. The [`WebhookDispatcher`] drains that channel and POSTs a
//! JSON envelope to each configured endpoint.

use std::time::Duration;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::status::StatusUpdate;

pub const SIGNATURE_HEADER: &str = "X-Segload-Signature-256";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,

    /// Scheduler states to deliver, e.g. `failed`. Empty means all.
    #[serde(default)]
    pub states: Vec<String>,

    #[serde(default = "default_webhook_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_webhook_retries")]
    pub max_retries: u32,

    /// HMAC-SHA256 key for the signature header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

fn default_webhook_timeout_ms() -> u64 {
    5000
}

fn default_webhook_retries() -> u32 {
    2
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            states: Vec::new(),
            timeout_ms: default_webhook_timeout_ms(),
            max_retries: default_webhook_retries(),
            secret: None,
        }
    }

    pub fn accepts(&self, state: &str) -> bool {
        self.states.is_empty() || self.states.iter().any(|s| s == state)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    pub version: u8,
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub session_id: String,
    pub data: serde_json::Value,
}

impl WebhookPayload {
    pub fn from_update(update: &StatusUpdate) -> Self {
        Self {
            version: 1,
            id: update.id.clone(),
            timestamp: update.timestamp,
            notification_type: "status".to_string(),
            session_id: update.session_id.clone(),
            data: serde_json::json!({
                "state": update.state,
                "message": update.message,
                "loaded_bytes": update.loaded_bytes,
                "total_bytes": update.total_bytes,
            }),
        }
    }
}

pub struct WebhookDispatcher {
    rx: mpsc::UnboundedReceiver<StatusUpdate>,
    webhooks: Vec<WebhookConfig>,
    client: Client,
}

impl WebhookDispatcher {
    pub fn new(
        rx: mpsc::UnboundedReceiver<StatusUpdate>,
        webhooks: Vec<WebhookConfig>,
        client: Client,
    ) -> Self {
        Self {
            rx,
            webhooks,
            client,
        }
    }

    /// Delivers updates in order. Returns once every sender is dropped and
    /// the channel is drained.
    pub async fn run(mut self) {
        debug!(webhook_count = self.webhooks.len(), "Webhook dispatcher started");

        while let Some(update) = self.rx.recv().await {
            let state = update.state.to_string();
            let payload = WebhookPayload::from_update(&update);
            let body = match serde_json::to_vec(&payload) {
                Ok(b) => b,
                Err(e) => {
                    warn!(error = %e, "Failed to serialize webhook payload");
                    continue;
                }
            };

            for wh in self.webhooks.iter().filter(|wh| wh.accepts(&state)) {
                match deliver(&self.client, wh, &body).await {
                    Ok(()) => debug!(url = %wh.url, state, "Webhook delivered"),
                    Err(e) => warn!(url = %wh.url, state, error = %e, "Webhook delivery failed"),
                }
            }
        }

        debug!("Webhook dispatcher shutting down");
    }
}

async fn deliver(client: &Client, wh: &WebhookConfig, body: &[u8]) -> Result<(), String> {
    let signature = match wh.secret.as_deref() {
        Some(secret) => Some(sign_payload(body, secret)?),
        None => None,
    };
    let timeout = Duration::from_millis(wh.timeout_ms);
    let mut last_error = String::new();

    for attempt in 0..=wh.max_retries {
        if attempt > 0 {
            let backoff = Duration::from_millis(500 * 2u64.pow(attempt - 1));
            tokio::time::sleep(backoff).await;
        }

        let mut req = client
            .post(&wh.url)
            .header("Content-Type", "application/json")
            .header("User-Agent", concat!("segload/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .body(body.to_vec());
        if let Some(sig) = &signature {
            req = req.header(SIGNATURE_HEADER, format!("sha256={sig}"));
        }

        match req.send().await {
            Ok(resp) if resp.status().is_success() => return Ok(()),
            Ok(resp) => {
                let status = resp.status();
                last_error = format!("HTTP {} from {}", status, wh.url);
                if status.is_client_error() && status.as_u16() != 429 {
                    return Err(last_error);
                }
            }
            Err(e) => {
                last_error = format!("Request to {} failed: {}", wh.url, e);
            }
        }
        debug!(url = %wh.url, attempt, error = %last_error, "Webhook attempt failed");
    }

    Err(last_error)
}

fn sign_payload(body: &[u8], secret: &str) -> Result<String, String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| format!("invalid webhook secret: {e}"))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}
