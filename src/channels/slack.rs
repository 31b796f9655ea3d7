//! Slack channel — incoming-webhook posts.

use std::time::Duration;

use crate::error::ChannelError;

/// Client for one Slack incoming webhook URL.
#[derive(Debug, Clone)]
pub struct SlackWebhook {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl SlackWebhook {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
            timeout,
        }
    }

    /// Post a plain `{"text": ...}` message.
    pub async fn post_text(&self, text: &str) -> Result<(), ChannelError> {
        let resp = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "slack".into(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "slack".into(),
                reason: format!("HTTP {status}: {body}"),
            });
        }

        tracing::debug!("Slack webhook message posted");
        Ok(())
    }
}
