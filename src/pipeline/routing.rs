//! Classification and routing — the pure decision step of the pipeline.
//!
//! Given a validated review, the decision time and the approval toggle,
//! decide whether to skip, queue for approval, or publish, and render the
//! reply text. No I/O happens here.

use chrono::{DateTime, Utc};

use crate::error::TemplateError;
use crate::pipeline::types::{Period, ReviewEvent};
use crate::templates::{TemplateCatalog, TemplateKey, generic_name};

/// What the pipeline should do with a review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Company already answered upstream. No template is resolved.
    Skip,
    /// Hold the rendered reply for an operator.
    QueueForApproval(RenderedReply),
    /// Send the rendered reply straight away.
    Publish(RenderedReply),
}

/// A resolved and rendered reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedReply {
    pub key: TemplateKey,
    pub period: Period,
    pub message: String,
}

/// Low-star reviews (this many stars or fewer) are sensitive.
pub const SENSITIVE_MAX_STARS: u8 = 2;

/// Whether a review needs a human before its reply goes out.
pub fn needs_approval(approval_mode: bool, stars: u8, period: Period) -> bool {
    approval_mode && stars <= SENSITIVE_MAX_STARS && period == Period::Fresh
}

/// Run classification and template resolution for one review.
pub fn route(
    event: &ReviewEvent,
    now: DateTime<Utc>,
    approval_mode: bool,
    catalog: &TemplateCatalog,
) -> Result<RouteDecision, TemplateError> {
    if event.company_response_exists {
        return Ok(RouteDecision::Skip);
    }

    let period = Period::classify(event.created_at, now);
    let template = catalog.resolve(event.stars, period, &event.language)?;

    let name = if event.consumer_name.trim().is_empty() {
        generic_name(&event.language)
    } else {
        event.consumer_name.as_str()
    };

    let reply = RenderedReply {
        key: TemplateKey::new(event.stars, period, event.language.clone()),
        period,
        message: template.render(name),
    };

    if needs_approval(approval_mode, event.stars, period) {
        Ok(RouteDecision::QueueForApproval(reply))
    } else {
        Ok(RouteDecision::Publish(reply))
    }
}
