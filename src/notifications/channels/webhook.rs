//! Webhook notification channel
//!
//! Posts each notice as JSON to a configured URL.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use super::{
    post_json_with_retry, validate_http_url, Channel, ChannelError, ChannelResult,
    DeliveryStatus, JsonPost, RetryPolicy,
};
use crate::notifications::AllocationNotice;

/// Webhook channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Webhook URL endpoint
    pub url: String,
    /// Optional authentication token (sent as Bearer token)
    pub auth_token: Option<String>,
    /// Custom headers to include in requests
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Maximum retry attempts on failure
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    /// First backoff delay in milliseconds; doubles per retry
    #[serde(default = "default_backoff")]
    pub backoff_ms: u64,
}

fn default_timeout() -> u64 {
    10
}

fn default_retries() -> u32 {
    3
}

fn default_backoff() -> u64 {
    1000
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_token: None,
            headers: HashMap::new(),
            timeout_secs: default_timeout(),
            max_retries: default_retries(),
            backoff_ms: default_backoff(),
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff_ms(mut self, backoff_ms: u64) -> Self {
        self.backoff_ms = backoff_ms;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        validate_http_url("Webhook URL", &self.url)?;

        if self.timeout_secs == 0 {
            return Err("Timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// Webhook notification channel
///
/// # Payload Format
///
/// ```json
/// {
///   "event": "allocation.created",
///   "notice_id": "6f1c...",
///   "allocation_id": 17,
///   "professor": "Barbara Liskov",
///   "room": "A-101",
///   "class": "CS 1",
///   "course": "Computer Science",
///   "day_of_week": "Monday",
///   "start_time": "08:00",
///   "end_time": "09:40",
///   "created_at": "2024-01-01T12:00:00Z"
/// }
/// ```
pub struct WebhookChannel {
    config: WebhookConfig,
    client: Client,
}

impl WebhookChannel {
    pub fn new(config: WebhookConfig) -> ChannelResult<Self> {
        config.validate().map_err(ChannelError::InvalidConfig)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ChannelError::Other(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Create a simple webhook channel with just a URL
    pub fn from_url(url: impl Into<String>) -> ChannelResult<Self> {
        Self::new(WebhookConfig::new(url))
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    fn build_payload(&self, notice: &AllocationNotice) -> serde_json::Value {
        serde_json::json!({
            "event": "allocation.created",
            "notice_id": notice.id,
            "allocation_id": notice.allocation_id,
            "professor": notice.professor_name,
            "room": notice.room_number,
            "class": notice.class_name,
            "course": notice.course,
            "day_of_week": notice.day_of_week,
            "start_time": notice.start_time,
            "end_time": notice.end_time,
            "created_at": notice.created_at.to_rfc3339(),
        })
    }
}

#[async_trait]
impl Channel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, notice: &AllocationNotice) -> ChannelResult<DeliveryStatus> {
        let payload = self.build_payload(notice);
        let headers = self
            .config
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let request = JsonPost {
            url: &self.config.url,
            bearer: self.config.auth_token.as_deref(),
            headers,
            payload: &payload,
        };
        let policy = RetryPolicy {
            max_retries: self.config.max_retries,
            base_delay: Duration::from_millis(self.config.backoff_ms),
        };

        match post_json_with_retry(&self.client, &request, policy).await {
            Ok(()) => Ok(DeliveryStatus::success(
                "webhook",
                format!("Delivered to {}", self.config.url),
            )),
            Err(e) => {
                tracing::error!(url = %self.config.url, error = %e, "Failed to deliver webhook");
                Ok(DeliveryStatus::failure("webhook", e.to_string()))
            }
        }
    }
}
