//! Notification channels for delivering allocation notices
//!
//! Each channel posts a JSON document to an HTTP endpoint: a plain webhook,
//! or the Resend e-mail API.

pub mod email;
pub mod webhook;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::notifications::AllocationNotice;

/// Result type for channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Errors that can occur during channel operations
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Endpoint answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Invalid channel configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Notice could not be rendered
    #[error("Template error: {0}")]
    Template(#[from] handlebars::RenderError),

    /// Template failed to register
    #[error("Template setup error: {0}")]
    TemplateSetup(#[from] Box<handlebars::TemplateError>),

    /// Generic error
    #[error("Channel error: {0}")]
    Other(String),
}

/// Response from sending a notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryStatus {
    /// Whether the notification was successfully delivered
    pub success: bool,
    /// Channel that delivered (or failed to deliver) the notification
    pub channel: String,
    /// Optional message about the delivery
    pub message: Option<String>,
    /// Timestamp of delivery attempt
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl DeliveryStatus {
    /// Create a successful delivery status with a message
    pub fn success(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            channel: channel.into(),
            message: Some(message.into()),
            timestamp: chrono::Utc::now(),
        }
    }

    /// Create a failed delivery status
    pub fn failure(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            channel: channel.into(),
            message: Some(message.into()),
            timestamp: chrono::Utc::now(),
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.success { "SUCCESS" } else { "FAILED" };
        write!(f, "[{status}] {}", self.channel)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

/// Trait for notification channels
#[async_trait]
pub trait Channel: Send + Sync {
    /// Get the channel name
    fn name(&self) -> &str;

    /// Deliver a notice through this channel
    ///
    /// Delivery failures come back as a failed [`DeliveryStatus`]; `Err` is
    /// reserved for notices that could not be prepared at all.
    async fn send(&self, notice: &AllocationNotice) -> ChannelResult<DeliveryStatus>;
}

// ============================================================================
// Shared HTTP delivery
// ============================================================================

/// How often and how patiently to retry a failed POST
#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

/// Outbound JSON POST with bearer auth
pub(crate) struct JsonPost<'a> {
    pub url: &'a str,
    pub bearer: Option<&'a str>,
    pub headers: Vec<(String, String)>,
    pub payload: &'a serde_json::Value,
}

/// POST `request`, retrying with exponential backoff
///
/// Client errors (4xx) are final and never retried.
pub(crate) async fn post_json_with_retry(
    client: &Client,
    request: &JsonPost<'_>,
    policy: RetryPolicy,
) -> ChannelResult<()> {
    let mut last_error = None;

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            // base, 2x base, 4x base, ...
            let delay = policy.base_delay * 2_u32.pow(attempt - 1);
            tokio::time::sleep(delay).await;
            tracing::debug!(
                url = request.url,
                "Retrying notification request (attempt {}/{})",
                attempt + 1,
                policy.max_retries + 1
            );
        }

        let mut builder = client.post(request.url);
        if let Some(token) = request.bearer {
            builder = builder.bearer_auth(token);
        }
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }

        match builder.json(request.payload).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(url = request.url, status = %response.status(), "Notification accepted");
                return Ok(());
            }
            Ok(response) => {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unable to read response body".to_string());
                last_error = Some(ChannelError::Rejected {
                    status: status.as_u16(),
                    body,
                });

                if status.is_client_error() {
                    break;
                }
            }
            Err(e) => {
                last_error = Some(ChannelError::HttpError(e));
            }
        }
    }

    Err(last_error.unwrap_or_else(|| ChannelError::Other("Unknown error".to_string())))
}

/// Reject anything that is not an absolute http(s) URL
pub(crate) fn validate_http_url(field: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{field} cannot be empty"));
    }
    let parsed = url::Url::parse(value).map_err(|e| format!("{field} is not a valid URL: {e}"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(format!("{field} must start with http:// or https://"));
    }
    Ok(())
}
