//! Shared types for the review processing pipeline.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Reviews at most this many days old count as fresh.
pub const FRESH_WINDOW_DAYS: i64 = 5;

// ── Inbound payload ─────────────────────────────────────────────────

/// Raw webhook body as posted by the reviews platform.
///
/// Only shape is enforced here. Semantic checks happen in
/// [`ReviewEvent::try_from`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewPayload {
    pub review_id: String,
    pub stars: i64,
    pub created_at: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub consumer_name: Option<String>,
    #[serde(default)]
    pub company_response_exists: bool,
}

/// A validated inbound review. Immutable once received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewEvent {
    pub review_id: String,
    /// Star rating, always 1–5.
    pub stars: u8,
    pub created_at: DateTime<Utc>,
    /// Normalized primary language subtag, lowercase (`it`, `en`, `fr`...).
    pub language: String,
    /// Display name; empty when the platform sent none.
    pub consumer_name: String,
    pub company_response_exists: bool,
}

impl TryFrom<ReviewPayload> for ReviewEvent {
    type Error = ValidationError;

    fn try_from(payload: ReviewPayload) -> Result<Self, Self::Error> {
        let review_id = payload.review_id.trim().to_string();
        if review_id.is_empty() {
            return Err(ValidationError::EmptyReviewId);
        }
        if !review_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ValidationError::InvalidReviewId(review_id));
        }

        if !(1..=5).contains(&payload.stars) {
            return Err(ValidationError::StarsOutOfRange(payload.stars));
        }

        let language = normalize_language(payload.language.as_deref().unwrap_or_default())
            .ok_or(ValidationError::EmptyLanguage)?;

        let created_at = parse_timestamp(&payload.created_at)
            .ok_or_else(|| ValidationError::InvalidTimestamp(payload.created_at.clone()))?;

        Ok(Self {
            review_id,
            stars: payload.stars as u8,
            created_at,
            language,
            consumer_name: payload.consumer_name.unwrap_or_default().trim().to_string(),
            company_response_exists: payload.company_response_exists,
        })
    }
}

/// Reduce a language tag to its lowercase primary subtag (`it-IT` → `it`).
pub fn normalize_language(raw: &str) -> Option<String> {
    let primary = raw
        .trim()
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    if primary.is_empty() {
        None
    } else {
        Some(primary)
    }
}

/// Parse an ISO-8601 timestamp. Offset-less values are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|ndt| ndt.and_utc())
}

// ── Period ──────────────────────────────────────────────────────────

/// How old a review is relative to the decision time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Fresh,
    Aged,
}

impl Period {
    /// Classify a review timestamp. Exactly [`FRESH_WINDOW_DAYS`] old is still
    /// fresh; timestamps ahead of `now` are fresh too.
    pub fn classify(created_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        if now.signed_duration_since(created_at) <= chrono::Duration::days(FRESH_WINDOW_DAYS) {
            Self::Fresh
        } else {
            Self::Aged
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Aged => "aged",
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Period {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fresh" => Ok(Self::Fresh),
            "aged" => Ok(Self::Aged),
            _ => Err(format!("Unknown period: {}", s)),
        }
    }
}

// ── Outcome ─────────────────────────────────────────────────────────

/// Terminal result of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// The review id was already in the ledger. Nothing happened.
    Duplicate,
    /// The company already answered upstream. Recorded as a no-op.
    Skipped,
    /// Draft is waiting for an operator.
    QueuedForApproval,
    /// Reply is live upstream (created now, or already existed).
    Sent,
    /// Template or publish failure. Alerted and persisted.
    Failed { reason: String },
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Duplicate => "duplicate",
            Self::Skipped => "skipped",
            Self::QueuedForApproval => "queued_for_approval",
            Self::Sent => "sent",
            Self::Failed { .. } => "failed",
        }
    }
}
