//! Error types for the review auto-reply service.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Approval error: {0}")]
    Approval(#[from] ApprovalError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Template catalog error: {0}")]
    Templates(#[from] TemplateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Outbound notification channel errors (Slack webhook, SMTP).
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to send on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Invalid address on channel {name}: {reason}")]
    InvalidAddress { name: String, reason: String },
}

/// Malformed inbound review payload. Rejected before any state change.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("review_id must not be empty")]
    EmptyReviewId,

    #[error("review_id may only contain ASCII letters, digits, '-' and '_', got {0:?}")]
    InvalidReviewId(String),

    #[error("stars must be between 1 and 5, got {0}")]
    StarsOutOfRange(i64),

    #[error("language must not be empty")]
    EmptyLanguage,

    #[error("created_at is not a valid ISO-8601 timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Template catalog errors.
///
/// `NotFound` is a runtime configuration gap and gets alerted. `Malformed`
/// is caught when the catalog is loaded and never surfaces at resolution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("No template for key {key}")]
    NotFound { key: String },

    #[error("Malformed template {key}: {reason}")]
    Malformed { key: String, reason: String },
}

/// Errors from posting a reply to the reviews platform.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Platform rejected reply with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Transport error: {reason}")]
    Transport { reason: String },

    #[error("Request timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Cannot build reply URL: {reason}")]
    InvalidUrl { reason: String },
}

impl PublishError {
    /// HTTP status returned by the platform, if the request got that far.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Alert delivery failures. Logged, never propagated.
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("Alert via {sink} failed: {source}")]
    Delivery {
        sink: &'static str,
        #[source]
        source: ChannelError,
    },

    #[error("Alert via {sink} timed out after {timeout:?}")]
    Timeout { sink: &'static str, timeout: Duration },
}

/// Errors from operator actions (approve, reject, retry).
#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    #[error("No reply record for review {review_id}")]
    NotFound { review_id: String },

    #[error("Review {review_id} is {state}, cannot transition to {target}")]
    InvalidTransition {
        review_id: String,
        state: String,
        target: String,
    },
}
