//! Detached delivery of allocation notices

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::channels::email::{ResendChannel, ResendConfig};
use super::channels::webhook::{WebhookChannel, WebhookConfig};
use super::channels::{Channel, ChannelResult, DeliveryStatus};
use super::AllocationNotice;
use crate::config::NotificationConfig;
use crate::metrics;
use crate::models::Allocation;

/// Fans a notice out to every configured channel
///
/// Cheap to clone; all clones share the same channels.
#[derive(Clone, Default)]
pub struct Notifier {
    channels: Vec<Arc<dyn Channel>>,
}

impl Notifier {
    /// Notifier without channels; dispatching is a no-op
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, channel: Arc<dyn Channel>) -> Self {
        self.channels.push(channel);
        self
    }

    /// Build the channels whose credentials are configured
    pub fn from_config(config: &NotificationConfig) -> ChannelResult<Self> {
        let mut notifier = Self::new();

        if let Some(url) = &config.webhook_url {
            let mut webhook = WebhookConfig::new(url.clone())
                .with_timeout(config.timeout_secs)
                .with_max_retries(config.max_retries);
            if let Some(token) = &config.webhook_token {
                webhook = webhook.with_auth_token(token.clone());
            }
            notifier = notifier.with_channel(Arc::new(WebhookChannel::new(webhook)?));
        }

        match &config.resend_api_key {
            Some(key) => {
                let mut resend = ResendConfig::new(
                    key.clone(),
                    config.email_from.clone(),
                    config.email_to.clone(),
                )
                .with_base_url(config.resend_base_url.clone())
                .with_max_retries(config.max_retries);
                resend.timeout_secs = config.timeout_secs;
                notifier = notifier.with_channel(Arc::new(ResendChannel::new(resend)?));
            }
            None => tracing::info!("RESEND_API_KEY not set, allocation e-mails disabled"),
        }

        tracing::info!(channels = ?notifier.channel_names(), "Notifier configured");
        Ok(notifier)
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name().to_string()).collect()
    }

    /// Send `notice` through every channel, one after another
    ///
    /// Never fails; every outcome is logged, counted and returned.
    pub async fn deliver(&self, notice: &AllocationNotice) -> Vec<DeliveryStatus> {
        let mut statuses = Vec::with_capacity(self.channels.len());

        for channel in &self.channels {
            let status = match channel.send(notice).await {
                Ok(status) => status,
                Err(e) => DeliveryStatus::failure(channel.name(), e.to_string()),
            };

            metrics::record_notification(channel.name(), status.success);
            if status.success {
                tracing::info!(allocation_id = notice.allocation_id, %status, "Notice delivered");
            } else {
                tracing::warn!(allocation_id = notice.allocation_id, %status, "Notice not delivered");
            }
            statuses.push(status);
        }

        statuses
    }

    /// Announce a new allocation in the background
    ///
    /// Returns immediately. `None` when there is nothing to send or no
    /// runtime to spawn on.
    pub fn dispatch(&self, allocation: &Allocation) -> Option<JoinHandle<Vec<DeliveryStatus>>> {
        if self.is_empty() {
            return None;
        }

        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!(
                    allocation_id = allocation.id,
                    "No async runtime available, notice dropped"
                );
                return None;
            }
        };

        let notifier = self.clone();
        let notice = AllocationNotice::from_allocation(allocation);
        Some(handle.spawn(async move { notifier.deliver(&notice).await }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::channels::ChannelError;
    use crate::notifications::tests::sample_allocation;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingChannel {
        sent: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Channel for CountingChannel {
        fn name(&self) -> &str {
            "counting"
        }

        async fn send(&self, _notice: &AllocationNotice) -> ChannelResult<DeliveryStatus> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ChannelError::Other("boom".to_string()))
            } else {
                Ok(DeliveryStatus::success("counting", "ok"))
            }
        }
    }

    #[tokio::test]
    async fn test_empty_notifier_is_noop() {
        let notifier = Notifier::new();
        assert!(notifier.dispatch(&sample_allocation()).is_none());
    }

    #[tokio::test]
    async fn test_dispatch_reaches_every_channel() {
        let ok = Arc::new(CountingChannel {
            sent: AtomicUsize::new(0),
            fail: false,
        });
        let failing = Arc::new(CountingChannel {
            sent: AtomicUsize::new(0),
            fail: true,
        });
        let notifier = Notifier::new()
            .with_channel(ok.clone())
            .with_channel(failing.clone());

        let statuses = notifier
            .dispatch(&sample_allocation())
            .unwrap()
            .await
            .unwrap();

        assert_eq!(statuses.len(), 2);
        assert!(statuses[0].success);
        assert!(!statuses[1].success);
        assert_eq!(ok.sent.load(Ordering::SeqCst), 1);
        assert_eq!(failing.sent.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispatch_without_runtime_drops_notice() {
        let notifier = Notifier::new().with_channel(Arc::new(CountingChannel {
            sent: AtomicUsize::new(0),
            fail: false,
        }));
        assert!(notifier.dispatch(&sample_allocation()).is_none());
    }

    #[test]
    fn test_from_config_builds_enabled_channels() {
        let config = NotificationConfig {
            webhook_url: Some("https://hooks.example.com/t".to_string()),
            resend_api_key: Some("re_key".to_string()),
            ..Default::default()
        };
        let notifier = Notifier::from_config(&config).unwrap();
        assert_eq!(notifier.channel_names(), vec!["webhook", "email"]);

        let none = Notifier::from_config(&NotificationConfig::default()).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_from_config_rejects_bad_webhook() {
        let config = NotificationConfig {
            webhook_url: Some("nope".to_string()),
            ..Default::default()
        };
        assert!(Notifier::from_config(&config).is_err());
    }
}
