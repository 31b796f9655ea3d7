//! Alerting dispatcher — best-effort operator notifications.
//!
//! Alerts fan out to every configured sink concurrently. A sink that fails
//! or hangs is logged and otherwise ignored; `notify` never fails.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{info, warn};

use crate::channels::{SlackWebhook, SmtpMailer};
use crate::config::AlertConfig;
use crate::error::AlertError;

/// Conditions that page an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    /// No template for a review's stars/period/language.
    TemplateMissing,
    /// The platform answered the publish call with a non-2xx, non-409 status.
    PublishRejected,
    /// The publish call never got an HTTP answer.
    PublishException,
}

impl AlertKind {
    pub fn title(self) -> &'static str {
        match self {
            Self::TemplateMissing => "Missing template",
            Self::PublishRejected => "Review reply rejected by platform",
            Self::PublishException => "Exception while posting review reply",
        }
    }
}

/// What an alert is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertContext {
    pub review_id: String,
    pub detail: String,
}

impl AlertContext {
    pub fn new(review_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            review_id: review_id.into(),
            detail: detail.into(),
        }
    }

    fn body(&self) -> String {
        format!("review_id={} {}", self.review_id, self.detail)
    }
}

/// A destination for alerts.
#[async_trait]
pub trait AlertSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, title: &str, body: &str) -> Result<(), AlertError>;
}

/// Slack incoming-webhook sink.
pub struct SlackAlertSink {
    hook: SlackWebhook,
}

impl SlackAlertSink {
    pub fn new(hook: SlackWebhook) -> Self {
        Self { hook }
    }
}

#[async_trait]
impl AlertSink for SlackAlertSink {
    fn name(&self) -> &'static str {
        "slack"
    }

    async fn deliver(&self, title: &str, body: &str) -> Result<(), AlertError> {
        self.hook
            .post_text(&format!(":warning: {title}\n{body}"))
            .await
            .map_err(|source| AlertError::Delivery {
                sink: self.name(),
                source,
            })
    }
}

/// SMTP email sink.
pub struct EmailAlertSink {
    mailer: SmtpMailer,
}

impl EmailAlertSink {
    pub fn new(mailer: SmtpMailer) -> Self {
        Self { mailer }
    }
}

#[async_trait]
impl AlertSink for EmailAlertSink {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn deliver(&self, title: &str, body: &str) -> Result<(), AlertError> {
        self.mailer
            .send(title, body)
            .await
            .map_err(|source| AlertError::Delivery {
                sink: self.name(),
                source,
            })
    }
}

/// Fans alerts out to the configured sinks.
#[derive(Clone)]
pub struct AlertDispatcher {
    sinks: Vec<Arc<dyn AlertSink>>,
    timeout: Duration,
}

impl AlertDispatcher {
    pub fn new(sinks: Vec<Arc<dyn AlertSink>>, timeout: Duration) -> Self {
        Self { sinks, timeout }
    }

    /// Dispatcher with no sinks. Alerts are only logged.
    pub fn disabled() -> Self {
        Self::new(Vec::new(), Duration::from_secs(1))
    }

    /// Build sinks from the alert channel selection.
    pub fn from_config(config: &AlertConfig) -> Self {
        let mut sinks: Vec<Arc<dyn AlertSink>> = Vec::new();
        if let Some(url) = &config.slack_webhook {
            sinks.push(Arc::new(SlackAlertSink::new(SlackWebhook::new(
                url.clone(),
                config.timeout,
            ))));
        }
        if let Some(smtp) = &config.email {
            sinks.push(Arc::new(EmailAlertSink::new(SmtpMailer::new(
                smtp.clone(),
                config.timeout,
            ))));
        }
        info!(channel = %config.channel, sinks = sinks.len(), "Alerting configured");
        // Sinks enforce their own transport timeout; leave headroom before cutting them off.
        Self::new(sinks, config.timeout + Duration::from_secs(5))
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Notify every sink. Failures are logged and swallowed.
    pub async fn notify(&self, kind: AlertKind, context: AlertContext) {
        let title = kind.title();
        let body = context.body();
        warn!(alert = title, review_id = %context.review_id, detail = %context.detail, "Raising alert");

        let deliveries = self.sinks.iter().map(|sink| {
            let body = body.as_str();
            async move {
                let result = match tokio::time::timeout(self.timeout, sink.deliver(title, body)).await {
                    Ok(result) => result,
                    Err(_) => Err(AlertError::Timeout {
                        sink: sink.name(),
                        timeout: self.timeout,
                    }),
                };
                if let Err(e) = result {
                    warn!(sink = sink.name(), error = %e, "Alert delivery failed");
                }
            }
        });

        join_all(deliveries).await;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::error::ChannelError;

    /// Sink that records what it receives.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub(crate) received: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl AlertSink for RecordingSink {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn deliver(&self, title: &str, body: &str) -> Result<(), AlertError> {
            self.received
                .lock()
                .unwrap()
                .push((title.to_string(), body.to_string()));
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl AlertSink for FailingSink {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn deliver(&self, _title: &str, _body: &str) -> Result<(), AlertError> {
            Err(AlertError::Delivery {
                sink: "failing",
                source: ChannelError::SendFailed {
                    name: "failing".into(),
                    reason: "down".into(),
                },
            })
        }
    }

    struct HangingSink;

    #[async_trait]
    impl AlertSink for HangingSink {
        fn name(&self) -> &'static str {
            "hanging"
        }

        async fn deliver(&self, _title: &str, _body: &str) -> Result<(), AlertError> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn fans_out_to_every_sink() {
        let a = Arc::new(RecordingSink::default());
        let b = Arc::new(RecordingSink::default());
        let dispatcher = AlertDispatcher::new(
            vec![a.clone() as Arc<dyn AlertSink>, b.clone() as Arc<dyn AlertSink>],
            Duration::from_secs(1),
        );

        dispatcher
            .notify(
                AlertKind::TemplateMissing,
                AlertContext::new("r1", "key=5_fresh_fr"),
            )
            .await;

        for sink in [&a, &b] {
            let got = sink.received.lock().unwrap();
            assert_eq!(got.len(), 1);
            assert_eq!(got[0].0, "Missing template");
            assert_eq!(got[0].1, "review_id=r1 key=5_fresh_fr");
        }
    }

    #[tokio::test]
    async fn failing_sink_does_not_block_others() {
        let ok = Arc::new(RecordingSink::default());
        let dispatcher = AlertDispatcher::new(
            vec![Arc::new(FailingSink) as Arc<dyn AlertSink>, ok.clone() as Arc<dyn AlertSink>],
            Duration::from_secs(1),
        );

        dispatcher
            .notify(AlertKind::PublishRejected, AlertContext::new("r1", "status=500"))
            .await;

        assert_eq!(ok.received.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn hanging_sink_is_cut_off() {
        let ok = Arc::new(RecordingSink::default());
        let dispatcher = AlertDispatcher::new(
            vec![Arc::new(HangingSink) as Arc<dyn AlertSink>, ok.clone() as Arc<dyn AlertSink>],
            Duration::from_millis(50),
        );

        tokio::time::timeout(
            Duration::from_secs(2),
            dispatcher.notify(AlertKind::PublishException, AlertContext::new("r1", "reset")),
        )
        .await
        .expect("notify must not hang");

        assert_eq!(ok.received.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn disabled_dispatcher_is_a_noop() {
        let dispatcher = AlertDispatcher::disabled();
        assert_eq!(dispatcher.sink_count(), 0);
        dispatcher
            .notify(AlertKind::TemplateMissing, AlertContext::new("r1", "x"))
            .await;
    }

    #[test]
    fn from_config_builds_selected_sinks() {
        let config = AlertConfig {
            slack_webhook: Some("http://127.0.0.1:9/hook".into()),
            timeout: Duration::from_secs(1),
            ..AlertConfig::default()
        };
        assert_eq!(AlertDispatcher::from_config(&config).sink_count(), 1);
        assert_eq!(AlertDispatcher::from_config(&AlertConfig::default()).sink_count(), 0);
    }
}
