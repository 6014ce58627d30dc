//! E-mail channel backed by the Resend HTTP API
//!
//! Sends one message per notice to a fixed recipient list through
//! `POST {base_url}/emails`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{
    post_json_with_retry, validate_http_url, Channel, ChannelError, ChannelResult,
    DeliveryStatus, JsonPost, RetryPolicy,
};
use crate::notifications::{AllocationNotice, NoticeRenderer};

pub const DEFAULT_RESEND_BASE_URL: &str = "https://api.resend.com";

/// Resend channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResendConfig {
    /// API key, sent as a Bearer token
    pub api_key: String,
    /// Sender, e.g. `Timetable <noreply@example.com>`
    pub from: String,
    /// Recipients of every notice
    pub to: Vec<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff")]
    pub backoff_ms: u64,
}

fn default_base_url() -> String {
    DEFAULT_RESEND_BASE_URL.to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_retries() -> u32 {
    2
}

fn default_backoff() -> u64 {
    1000
}

impl ResendConfig {
    pub fn new(api_key: impl Into<String>, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            from: from.into(),
            to: vec![to.into()],
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            max_retries: default_retries(),
            backoff_ms: default_backoff(),
        }
    }

    /// Point at a different API host (tests, proxies)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
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

    pub fn validate(&self) -> Result<(), String> {
        if self.api_key.trim().is_empty() {
            return Err("Resend API key cannot be empty".to_string());
        }
        if self.from.trim().is_empty() {
            return Err("Sender address cannot be empty".to_string());
        }
        if self.to.is_empty() || self.to.iter().any(|r| !r.contains('@')) {
            return Err("At least one valid recipient address is required".to_string());
        }
        validate_http_url("Resend base URL", &self.base_url)?;
        if self.timeout_secs == 0 {
            return Err("Timeout must be greater than 0".to_string());
        }
        Ok(())
    }

    fn endpoint(&self) -> String {
        format!("{}/emails", self.base_url.trim_end_matches('/'))
    }
}

/// Resend e-mail channel
pub struct ResendChannel {
    config: ResendConfig,
    client: Client,
    renderer: NoticeRenderer,
}

impl ResendChannel {
    pub fn new(config: ResendConfig) -> ChannelResult<Self> {
        config.validate().map_err(ChannelError::InvalidConfig)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ChannelError::Other(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            config,
            client,
            renderer: NoticeRenderer::new()?,
        })
    }

    fn build_payload(&self, notice: &AllocationNotice) -> ChannelResult<serde_json::Value> {
        let rendered = self.renderer.render(notice)?;
        Ok(serde_json::json!({
            "from": self.config.from,
            "to": self.config.to,
            "subject": rendered.subject,
            "html": rendered.html,
            "text": rendered.text,
        }))
    }
}

#[async_trait]
impl Channel for ResendChannel {
    fn name(&self) -> &str {
        "email"
    }

    async fn send(&self, notice: &AllocationNotice) -> ChannelResult<DeliveryStatus> {
        let payload = self.build_payload(notice)?;
        let endpoint = self.config.endpoint();
        let request = JsonPost {
            url: &endpoint,
            bearer: Some(&self.config.api_key),
            headers: vec![("Idempotency-Key".to_string(), notice.id.to_string())],
            payload: &payload,
        };
        let policy = RetryPolicy {
            max_retries: self.config.max_retries,
            base_delay: Duration::from_millis(self.config.backoff_ms),
        };

        match post_json_with_retry(&self.client, &request, policy).await {
            Ok(()) => Ok(DeliveryStatus::success(
                "email",
                format!("Sent to {}", self.config.to.join(", ")),
            )),
            Err(e) => {
                tracing::error!(error = %e, "Failed to send allocation e-mail");
                Ok(DeliveryStatus::failure("email", e.to_string()))
            }
        }
    }
}
