//! Slack webhook notification delivery
//!
//! Formats alerts as Block Kit payloads and posts them to an incoming
//! webhook. Delivery is best-effort: every failure path is logged and
//! swallowed, because cooldown state is recorded on attempt and a flaky
//! endpoint must behave like a suppressed duplicate, not like a retry
//! queue.

use bytes::Bytes;
use chrono::Utc;
use http_body_util::{BodyExt, Full};
use hyper::{header, Method, Request, StatusCode};
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::TokioExecutor;
use native_tls::TlsConnector;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::NotifierConfig;
use crate::detector::{Alert, AlertKind};

/// Notifier errors
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::http::Error),

    #[error("serialize error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("request failed: {0}")]
    Request(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("webhook returned {status}: {body}")]
    Rejected { status: StatusCode, body: String },
}

/// Slack webhook payload
#[derive(Debug, Serialize)]
struct SlackPayload {
    /// Fallback text for notifications and previews
    text: String,
    blocks: Vec<Block>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Block {
    Header {
        text: TextObject,
    },
    Section {
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<TextObject>,
        #[serde(skip_serializing_if = "Option::is_none")]
        fields: Option<Vec<TextObject>>,
    },
    Context {
        elements: Vec<TextObject>,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TextObject {
    PlainText { text: String },
    Mrkdwn { text: String },
}

impl AlertKind {
    /// Slack emoji shorthand shown in the header block
    fn emoji(&self) -> &'static str {
        match self {
            AlertKind::Failover => ":arrows_counterclockwise:",
            AlertKind::ErrorRate => ":rotating_light:",
            AlertKind::Recovery => ":white_check_mark:",
        }
    }

    /// Upper-cased headline, e.g. "ERROR RATE"
    fn headline(&self) -> String {
        self.as_str().to_uppercase().replace('_', " ")
    }
}

/// Delivers alerts to a Slack incoming webhook
///
/// Honors two gates before any network traffic: a missing webhook URL
/// (detection-only mode, the would-be message is logged) and maintenance
/// mode (all outbound alerts suppressed).
pub struct SlackNotifier {
    webhook_url: Option<String>,
    maintenance_mode: bool,
    timeout: Duration,
    client: HyperClient<HttpsConnector<HttpConnector>, Full<Bytes>>,
}

impl SlackNotifier {
    /// Create a notifier from configuration
    pub fn new(config: &NotifierConfig) -> Self {
        let mut http = HttpConnector::new();
        http.set_nodelay(true);
        http.enforce_http(false);
        http.set_connect_timeout(Some(Duration::from_secs(config.timeout_secs)));

        let tls = if config.insecure_tls {
            warn!("INSECURE TLS MODE ENABLED: Certificate verification is disabled!");
            TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .build()
                .expect("Failed to build TLS connector")
        } else {
            TlsConnector::new().expect("Failed to build TLS connector")
        };

        let https = HttpsConnector::from((http, tls.into()));

        let client = HyperClient::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .set_host(true)
            .build(https);

        Self {
            webhook_url: config.webhook_url.clone().filter(|url| !url.is_empty()),
            maintenance_mode: config.maintenance_mode,
            timeout: Duration::from_secs(config.timeout_secs),
            client,
        }
    }

    /// Create a notifier that never delivers (tests)
    pub fn disabled() -> Self {
        Self::new(&NotifierConfig::default())
    }

    /// Whether a webhook endpoint is configured
    pub fn is_enabled(&self) -> bool {
        self.webhook_url.is_some()
    }

    /// Dispatch one alert; failures are logged, never raised
    pub async fn notify(&self, alert: &Alert) {
        let Some(url) = self.webhook_url.as_deref() else {
            warn!(
                kind = %alert.kind,
                "No webhook URL configured. Message: {}",
                alert.message
            );
            return;
        };

        if self.maintenance_mode {
            info!(kind = %alert.kind, "Maintenance mode ON. Skipping alert: {}", alert.message);
            return;
        }

        match self.post(url, alert).await {
            Ok(()) => {
                info!(kind = %alert.kind, "alert delivered");
            }
            Err(err) => {
                error!(kind = %alert.kind, error = %err, "alert delivery failed");
            }
        }
    }

    /// Build and send the webhook request
    async fn post(&self, url: &str, alert: &Alert) -> Result<(), NotifyError> {
        let payload = build_payload(alert);
        let body = serde_json::to_vec(&payload)?;

        let request = Request::builder()
            .method(Method::POST)
            .uri(url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(body)))?;

        let response = tokio::time::timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| NotifyError::Timeout(self.timeout))?
            .map_err(|err| NotifyError::Request(err.to_string()))?;

        let status = response.status();
        let body_bytes = response
            .collect()
            .await
            .map_err(|err| NotifyError::Request(err.to_string()))?
            .to_bytes();

        if !status.is_success() {
            return Err(NotifyError::Rejected {
                status,
                body: String::from_utf8_lossy(&body_bytes).into_owned(),
            });
        }

        debug!(status = %status, "webhook accepted payload");
        Ok(())
    }
}

/// Assemble the Block Kit payload for one alert
fn build_payload(alert: &Alert) -> SlackPayload {
    let emoji = alert.kind.emoji();
    let headline = alert.kind.headline();

    let mut blocks = vec![
        Block::Header {
            text: TextObject::PlainText {
                text: format!("{} {}", emoji, headline),
            },
        },
        Block::Section {
            text: Some(TextObject::Mrkdwn {
                text: alert.message.clone(),
            }),
            fields: None,
        },
    ];

    if !alert.metadata.is_empty() {
        blocks.push(Block::Section {
            text: None,
            fields: Some(
                alert
                    .metadata
                    .iter()
                    .map(|(key, value)| TextObject::Mrkdwn {
                        text: format!("*{}:*\n{}", key, value),
                    })
                    .collect(),
            ),
        });
    }

    blocks.push(Block::Context {
        elements: vec![TextObject::Mrkdwn {
            text: format!(
                ":alarm_clock: {}",
                Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
            ),
        }],
    });

    SlackPayload {
        text: format!("{} *{}*", emoji, headline),
        blocks,
    }
}
