//! Review processor — drives one review from webhook to a final ledger state.
//!
//! Flow:
//! 1. Reserve the review id in the ledger (duplicates stop here)
//! 2. Route: skip, queue for approval, or publish
//! 3. Publish and persist `sent` / `failed`
//! 4. Alert on template or publish failures
//!
//! Every reserved record leaves `pending` on every path, or the error is
//! returned to the caller for logging. Stale-pending recovery, at startup and
//! then on an interval, catches the rest.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::alerts::{AlertContext, AlertDispatcher, AlertKind};
use crate::approval::ApprovalQueue;
use crate::error::{ApprovalError, Error, PublishError};
use crate::pipeline::routing::{RouteDecision, route};
use crate::pipeline::types::{Outcome, Period, ReviewEvent};
use crate::publisher::{PublishOutcome, ReplyPublisher, idempotency_key};
use crate::store::{RecordUpdate, ReplyRecord, ReplyStatus, ReplyStore, Reservation};
use crate::templates::TemplateCatalog;

/// `pending` records untouched for longer than this are considered abandoned.
pub const STALE_PENDING_MINUTES: i64 = 10;

/// How often the stale-pending sweep runs after startup.
pub const RECOVERY_INTERVAL_SECS: u64 = 60;

/// Last-error text for records failed by stale-pending recovery.
pub const INTERRUPTED_REASON: &str = "processing interrupted";

/// The per-review pipeline.
pub struct ReviewProcessor {
    store: Arc<dyn ReplyStore>,
    catalog: Arc<TemplateCatalog>,
    publisher: Arc<dyn ReplyPublisher>,
    alerts: Arc<AlertDispatcher>,
    approvals: Arc<ApprovalQueue>,
    approval_mode: bool,
}

impl ReviewProcessor {
    pub fn new(
        store: Arc<dyn ReplyStore>,
        catalog: Arc<TemplateCatalog>,
        publisher: Arc<dyn ReplyPublisher>,
        alerts: Arc<AlertDispatcher>,
        approvals: Arc<ApprovalQueue>,
        approval_mode: bool,
    ) -> Self {
        Self {
            store,
            catalog,
            publisher,
            alerts,
            approvals,
            approval_mode,
        }
    }

    pub fn approvals(&self) -> &Arc<ApprovalQueue> {
        &self.approvals
    }

    /// Process a validated review delivered by the webhook.
    pub async fn handle(&self, event: &ReviewEvent, now: DateTime<Utc>) -> Result<Outcome, Error> {
        info!(
            review_id = %event.review_id,
            stars = event.stars,
            language = %event.language,
            "Processing review"
        );

        let record = ReplyRecord::reserved(event, idempotency_key(&event.review_id), now);
        if self.store.reserve(&record).await? == Reservation::AlreadySeen {
            info!(review_id = %event.review_id, "Review already processed, ignoring delivery");
            return Ok(Outcome::Duplicate);
        }

        self.drive(event, &record.idempotency_key, now).await
    }

    /// Publish an approved draft.
    pub async fn approve(&self, review_id: &str, now: DateTime<Utc>) -> Result<Outcome, Error> {
        let record = self.approvals.approve(review_id, now).await?;
        let message = record.message.clone().unwrap_or_default();
        self.deliver(
            &record.review_id,
            &record.idempotency_key,
            &message,
            RecordUpdate::default(),
            now,
        )
        .await
    }

    /// Reject a draft. No alert.
    pub async fn reject(&self, review_id: &str, now: DateTime<Utc>) -> Result<(), Error> {
        self.approvals.reject(review_id, now).await
    }

    /// Re-run a `failed` record from its stored review fields.
    ///
    /// Routing runs again with `now`, so a retried low-star fresh review may
    /// land back in the approval queue.
    pub async fn retry(&self, review_id: &str, now: DateTime<Utc>) -> Result<Outcome, Error> {
        let claimed = self
            .store
            .transition(
                review_id,
                ReplyStatus::Failed,
                ReplyStatus::Pending,
                &RecordUpdate::default(),
                now,
            )
            .await?;

        let record = self.store.get(review_id).await?.ok_or_else(|| ApprovalError::NotFound {
            review_id: review_id.to_string(),
        })?;
        if !claimed {
            return Err(ApprovalError::InvalidTransition {
                review_id: review_id.to_string(),
                state: record.status.to_string(),
                target: ReplyStatus::Pending.to_string(),
            }
            .into());
        }

        info!(review_id, "Retrying failed review reply");
        self.drive(&record.review_event(), &record.idempotency_key, now)
            .await
    }

    /// Look up the ledger record for a review.
    pub async fn record(&self, review_id: &str) -> Result<Option<ReplyRecord>, Error> {
        Ok(self.store.get(review_id).await?)
    }

    /// Fail records left in `pending` by a previous process.
    pub async fn recover_stale_pending(&self, now: DateTime<Utc>) -> Result<Vec<String>, Error> {
        let cutoff = now - chrono::Duration::minutes(STALE_PENDING_MINUTES);
        let failed = self
            .store
            .sweep_stale(
                ReplyStatus::Pending,
                ReplyStatus::Failed,
                cutoff,
                INTERRUPTED_REASON,
                now,
            )
            .await?;
        for review_id in &failed {
            warn!(review_id = %review_id, "Marked interrupted reply as failed");
        }
        Ok(failed)
    }

    /// Route a record this caller owns (status `pending`) to its next state.
    async fn drive(
        &self,
        event: &ReviewEvent,
        idempotency_key: &str,
        now: DateTime<Utc>,
    ) -> Result<Outcome, Error> {
        let review_id = event.review_id.as_str();

        match route(event, now, self.approval_mode, &self.catalog) {
            Ok(RouteDecision::Skip) => {
                self.settle(review_id, ReplyStatus::Skipped, &RecordUpdate::default(), now)
                    .await?;
                info!(review_id, "Company already responded, skipping");
                Ok(Outcome::Skipped)
            }
            Ok(RouteDecision::QueueForApproval(reply)) => {
                self.approvals.enqueue(review_id, &reply, now).await?;
                Ok(Outcome::QueuedForApproval)
            }
            Ok(RouteDecision::Publish(reply)) => {
                let update = RecordUpdate {
                    period: Some(reply.period),
                    template_key: Some(reply.key.to_string()),
                    message: Some(reply.message.clone()),
                    ..RecordUpdate::default()
                };
                self.deliver(review_id, idempotency_key, &reply.message, update, now)
                    .await
            }
            Err(e) => {
                let reason = format!("template_missing: {e}");
                let update = RecordUpdate {
                    period: Some(Period::classify(event.created_at, now)),
                    last_error: Some(reason.clone()),
                    ..RecordUpdate::default()
                };
                self.settle(review_id, ReplyStatus::Failed, &update, now).await?;
                error!(review_id, error = %e, "No template for review");
                self.alerts
                    .notify(AlertKind::TemplateMissing, AlertContext::new(review_id, e.to_string()))
                    .await;
                Ok(Outcome::Failed { reason })
            }
        }
    }

    /// Make one publish attempt and persist the result.
    ///
    /// `update` carries the routed fields to store alongside the final status.
    async fn deliver(
        &self,
        review_id: &str,
        idempotency_key: &str,
        message: &str,
        mut update: RecordUpdate,
        now: DateTime<Utc>,
    ) -> Result<Outcome, Error> {
        match self.publisher.publish(review_id, message, idempotency_key).await {
            Ok(outcome) => {
                if outcome == PublishOutcome::AlreadyReplied {
                    update.publish_status = Some(409);
                }
                self.settle(review_id, ReplyStatus::Sent, &update, now).await?;
                info!(review_id, ?outcome, "Review reply sent");
                Ok(Outcome::Sent)
            }
            Err(e) => {
                let reason = e.to_string();
                update.last_error = Some(reason.clone());
                update.publish_status = e.status();
                self.settle(review_id, ReplyStatus::Failed, &update, now).await?;
                error!(review_id, error = %e, "Failed to publish review reply");

                let (kind, detail) = match &e {
                    PublishError::Rejected { status, body } => {
                        (AlertKind::PublishRejected, format!("status={status} body={body}"))
                    }
                    other => (AlertKind::PublishException, other.to_string()),
                };
                self.alerts
                    .notify(kind, AlertContext::new(review_id, detail))
                    .await;
                Ok(Outcome::Failed { reason })
            }
        }
    }

    /// Move an owned `pending` record to its final state.
    async fn settle(
        &self,
        review_id: &str,
        to: ReplyStatus,
        update: &RecordUpdate,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        let moved = self
            .store
            .transition(review_id, ReplyStatus::Pending, to, update, now)
            .await?;
        if !moved {
            // Only startup recovery moves a pending record we own.
            warn!(review_id, status = %to, "Record was no longer pending when settling");
        }
        Ok(())
    }
}

/// Spawn the periodic stale-pending sweep. The first pass runs immediately.
pub fn spawn_recovery_task(processor: Arc<ReviewProcessor>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(tokio::time::Duration::from_secs(RECOVERY_INTERVAL_SECS));
        loop {
            interval.tick().await;
            if let Err(e) = processor.recover_stale_pending(Utc::now()).await {
                warn!(error = %e, "Stale pending sweep failed");
            }
        }
    })
}
