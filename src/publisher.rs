//! Publisher adapter — posts replies to the reviews platform.

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use secrecy::ExposeSecret;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::PublisherConfig;
use crate::error::PublishError;

/// Stable idempotency token for a review. Same input, same token, forever.
pub fn idempotency_key(review_id: &str) -> String {
    Uuid::new_v5(
        &Uuid::NAMESPACE_URL,
        format!("urn:review-reply:{review_id}").as_bytes(),
    )
    .to_string()
}

/// Successful publish results. Both mean the reply is live upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// 2xx: the reply was created by this call.
    Created,
    /// 409: a reply already existed upstream.
    AlreadyReplied,
}

/// Something that can post a reply for a review.
#[async_trait]
pub trait ReplyPublisher: Send + Sync {
    /// Make exactly one publish attempt.
    async fn publish(
        &self,
        review_id: &str,
        message: &str,
        idempotency_key: &str,
    ) -> Result<PublishOutcome, PublishError>;
}

/// Reviews platform reply API over HTTP.
pub struct HttpPublisher {
    config: PublisherConfig,
    client: reqwest::Client,
}

impl HttpPublisher {
    pub fn new(config: PublisherConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// `{api_base}/v1/private/reviews/{review_id}/reply`, with the review id
    /// percent-encoded as a single path segment.
    fn reply_url(&self, review_id: &str) -> Result<Url, PublishError> {
        if review_id.is_empty() || review_id == "." || review_id == ".." {
            return Err(PublishError::InvalidUrl {
                reason: format!("unusable review id {review_id:?}"),
            });
        }

        let mut url = Url::parse(&self.config.api_base).map_err(|e| PublishError::InvalidUrl {
            reason: format!("bad API base {}: {e}", self.config.api_base),
        })?;
        url.path_segments_mut()
            .map_err(|()| PublishError::InvalidUrl {
                reason: format!("API base {} cannot carry a path", self.config.api_base),
            })?
            .pop_if_empty()
            .extend(["v1", "private", "reviews", review_id, "reply"]);
        Ok(url)
    }
}

#[async_trait]
impl ReplyPublisher for HttpPublisher {
    async fn publish(
        &self,
        review_id: &str,
        message: &str,
        idempotency_key: &str,
    ) -> Result<PublishOutcome, PublishError> {
        let url = self.reply_url(review_id)?;
        debug!(review_id, url = %url, "Posting review reply");

        let resp = self
            .client
            .post(url)
            .timeout(self.config.timeout)
            .bearer_auth(self.config.business_token.expose_secret())
            .header("Idempotency-Key", idempotency_key)
            .json(&serde_json::json!({
                "message": message,
                "replySource": "automation",
            }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PublishError::Timeout {
                        timeout: self.config.timeout,
                    }
                } else {
                    PublishError::Transport {
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = resp.status();
        if status.is_success() {
            info!(review_id, status = status.as_u16(), "Review reply created");
            return Ok(PublishOutcome::Created);
        }
        if status == StatusCode::CONFLICT {
            info!(review_id, "Review already has a reply upstream");
            return Ok(PublishOutcome::AlreadyReplied);
        }

        let body = resp.text().await.unwrap_or_default();
        Err(PublishError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
