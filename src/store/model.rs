//! Reply ledger records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::types::{Period, ReviewEvent};

/// Lifecycle state of a [`ReplyRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    /// Reserved or claimed for publishing; a publish attempt is in flight.
    Pending,
    /// Waiting for an operator decision.
    QueuedForApproval,
    /// Reply is live upstream.
    Sent,
    /// Operator rejected the draft (or it expired).
    Rejected,
    /// Template missing or publish failed. Alerted; can be retried.
    Failed,
    /// Company had already responded. Terminal no-op.
    Skipped,
}

impl ReplyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::QueuedForApproval => "queued_for_approval",
            Self::Sent => "sent",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for ReplyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReplyStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "queued_for_approval" => Ok(Self::QueuedForApproval),
            "sent" => Ok(Self::Sent),
            "rejected" => Ok(Self::Rejected),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            _ => Err(format!("Unknown reply status: {}", s)),
        }
    }
}

/// One row of the reply ledger. At most one exists per review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplyRecord {
    pub review_id: String,
    pub status: ReplyStatus,
    pub stars: u8,
    pub language: String,
    /// When the review itself was posted.
    pub review_created_at: DateTime<Utc>,
    pub consumer_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<Period>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Sent as `Idempotency-Key` on every publish attempt for this review.
    pub idempotency_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// HTTP status of the last publish attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_status: Option<u16>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReplyRecord {
    /// A freshly reserved record for a first-seen review.
    pub fn reserved(event: &ReviewEvent, idempotency_key: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            review_id: event.review_id.clone(),
            status: ReplyStatus::Pending,
            stars: event.stars,
            language: event.language.clone(),
            review_created_at: event.created_at,
            consumer_name: event.consumer_name.clone(),
            period: None,
            template_key: None,
            message: None,
            idempotency_key: idempotency_key.into(),
            last_error: None,
            publish_status: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuild the review this record was created from (used for retries).
    pub fn review_event(&self) -> ReviewEvent {
        ReviewEvent {
            review_id: self.review_id.clone(),
            stars: self.stars,
            created_at: self.review_created_at,
            language: self.language.clone(),
            consumer_name: self.consumer_name.clone(),
            company_response_exists: false,
        }
    }
}

/// Result of trying to reserve a review id in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// This caller owns the review and must drive it to a final state.
    Fresh,
    /// Another delivery got there first.
    AlreadySeen,
}

/// Field changes applied together with a status transition.
///
/// `None` for `period`, `template_key` and `message` keeps the stored value.
/// `last_error` and `publish_status` are always overwritten.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordUpdate {
    pub period: Option<Period>,
    pub template_key: Option<String>,
    pub message: Option<String>,
    pub last_error: Option<String>,
    pub publish_status: Option<u16>,
}

impl RecordUpdate {
    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            last_error: Some(reason.into()),
            ..Self::default()
        }
    }
}

/// Operator-facing view of a record waiting for approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalDraft {
    pub review_id: String,
    pub stars: u8,
    pub period: Option<Period>,
    pub language: String,
    pub consumer_name: String,
    pub message: String,
    pub queued_at: DateTime<Utc>,
}

impl TryFrom<&ReplyRecord> for ApprovalDraft {
    type Error = ();

    fn try_from(record: &ReplyRecord) -> Result<Self, Self::Error> {
        if record.status != ReplyStatus::QueuedForApproval {
            return Err(());
        }
        Ok(Self {
            review_id: record.review_id.clone(),
            stars: record.stars,
            period: record.period,
            language: record.language.clone(),
            consumer_name: record.consumer_name.clone(),
            message: record.message.clone().unwrap_or_default(),
            queued_at: record.updated_at,
        })
    }
}
