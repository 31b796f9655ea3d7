//! Approval queue — drafts held for an operator decision.
//!
//! Drafts live in the reply ledger as `queued_for_approval` records; this
//! type owns the transitions into and out of that state. Every transition is
//! a compare-and-set on the stored status, so two operators clicking at the
//! same time cannot both win.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::notifier::DraftNotifier;
use crate::error::{ApprovalError, Error};
use crate::pipeline::routing::RenderedReply;
use crate::store::{ApprovalDraft, RecordUpdate, ReplyRecord, ReplyStatus, ReplyStore};

/// Last-error text for drafts removed by the TTL sweep.
pub const EXPIRED_REASON: &str = "approval expired";

/// Ledger-backed approval queue.
pub struct ApprovalQueue {
    store: Arc<dyn ReplyStore>,
    notifier: Option<Arc<dyn DraftNotifier>>,
}

impl ApprovalQueue {
    pub fn new(store: Arc<dyn ReplyStore>, notifier: Option<Arc<dyn DraftNotifier>>) -> Self {
        Self { store, notifier }
    }

    /// Park a reserved record as a draft and announce it.
    ///
    /// A failed announcement is logged only; the draft stays listed.
    pub async fn enqueue(
        &self,
        review_id: &str,
        reply: &RenderedReply,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        let update = RecordUpdate {
            period: Some(reply.period),
            template_key: Some(reply.key.to_string()),
            message: Some(reply.message.clone()),
            ..RecordUpdate::default()
        };
        let moved = self
            .store
            .transition(review_id, ReplyStatus::Pending, ReplyStatus::QueuedForApproval, &update, now)
            .await?;
        if !moved {
            return Err(self.invalid_transition(review_id, ReplyStatus::QueuedForApproval).await);
        }

        info!(review_id, template = %reply.key, "Reply queued for approval");

        let Some(notifier) = &self.notifier else {
            return Ok(());
        };
        let draft = self
            .store
            .get(review_id)
            .await?
            .and_then(|record| ApprovalDraft::try_from(&record).ok());
        if let Some(draft) = draft
            && let Err(e) = notifier.announce(&draft).await
        {
            warn!(review_id, error = %e, "Failed to announce draft");
        }
        Ok(())
    }

    /// Drafts awaiting a decision, oldest first.
    pub async fn pending(&self) -> Result<Vec<ApprovalDraft>, Error> {
        let records = self.store.list_by_status(ReplyStatus::QueuedForApproval).await?;
        Ok(records
            .iter()
            .filter_map(|r| ApprovalDraft::try_from(r).ok())
            .collect())
    }

    /// Claim a draft for publishing. The record moves back to `pending`
    /// and the caller must drive it to `sent` or `failed`.
    pub async fn approve(&self, review_id: &str, now: DateTime<Utc>) -> Result<ReplyRecord, Error> {
        let moved = self
            .store
            .transition(
                review_id,
                ReplyStatus::QueuedForApproval,
                ReplyStatus::Pending,
                &RecordUpdate::default(),
                now,
            )
            .await?;
        if !moved {
            return Err(self.invalid_transition(review_id, ReplyStatus::Sent).await);
        }
        info!(review_id, "Draft approved");
        self.store
            .get(review_id)
            .await?
            .ok_or_else(|| {
                ApprovalError::NotFound {
                    review_id: review_id.to_string(),
                }
                .into()
            })
    }

    /// Reject a draft. Terminal; rejection is not a failure and raises no alert.
    pub async fn reject(&self, review_id: &str, now: DateTime<Utc>) -> Result<(), Error> {
        let moved = self
            .store
            .transition(
                review_id,
                ReplyStatus::QueuedForApproval,
                ReplyStatus::Rejected,
                &RecordUpdate::default(),
                now,
            )
            .await?;
        if !moved {
            return Err(self.invalid_transition(review_id, ReplyStatus::Rejected).await);
        }
        info!(review_id, "Draft rejected");
        Ok(())
    }

    /// Reject drafts that have waited longer than `ttl`. Never publishes.
    pub async fn expire_older_than(
        &self,
        ttl: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>, Error> {
        // A TTL reaching past the earliest representable time expires nothing.
        let Some(cutoff) = now.checked_sub_signed(ttl) else {
            return Ok(Vec::new());
        };
        let expired = self
            .store
            .sweep_stale(
                ReplyStatus::QueuedForApproval,
                ReplyStatus::Rejected,
                cutoff,
                EXPIRED_REASON,
                now,
            )
            .await?;
        for review_id in &expired {
            info!(review_id = %review_id, "Draft expired without a decision");
        }
        Ok(expired)
    }

    async fn invalid_transition(&self, review_id: &str, target: ReplyStatus) -> Error {
        match self.store.get(review_id).await {
            Ok(Some(record)) => ApprovalError::InvalidTransition {
                review_id: review_id.to_string(),
                state: record.status.to_string(),
                target: target.to_string(),
            }
            .into(),
            Ok(None) => ApprovalError::NotFound {
                review_id: review_id.to_string(),
            }
            .into(),
            Err(e) => e.into(),
        }
    }
}

/// Spawn the draft TTL sweep (runs every 60s).
pub fn spawn_expiry_task(queue: Arc<ApprovalQueue>, ttl: chrono::Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            if let Err(e) = queue.expire_older_than(ttl, Utc::now()).await {
                warn!(error = %e, "Draft expiry sweep failed");
            }
        }
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::error::ChannelError;
    use crate::pipeline::types::{Period, ReviewEvent};
    use crate::store::{LibSqlBackend, Reservation};
    use crate::templates::TemplateKey;

    /// Notifier that records every announced draft.
    #[derive(Default)]
    pub(crate) struct RecordingNotifier {
        pub(crate) drafts: Mutex<Vec<ApprovalDraft>>,
        pub(crate) fail: bool,
    }

    #[async_trait]
    impl DraftNotifier for RecordingNotifier {
        async fn announce(&self, draft: &ApprovalDraft) -> Result<(), ChannelError> {
            self.drafts.lock().unwrap().push(draft.clone());
            if self.fail {
                return Err(ChannelError::SendFailed {
                    name: "slack".into(),
                    reason: "down".into(),
                });
            }
            Ok(())
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    fn reply() -> RenderedReply {
        RenderedReply {
            key: TemplateKey::new(2, Period::Fresh, "it"),
            period: Period::Fresh,
            message: "Gentile Mario Rossi, ci dispiace.".into(),
        }
    }

    async fn setup(notifier: Arc<RecordingNotifier>) -> (Arc<LibSqlBackend>, ApprovalQueue) {
        let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let event = ReviewEvent {
            review_id: "abcd1234".into(),
            stars: 2,
            created_at: t0() - Duration::days(3),
            language: "it".into(),
            consumer_name: "Mario Rossi".into(),
            company_response_exists: false,
        };
        let record = ReplyRecord::reserved(&event, "key", t0());
        assert_eq!(store.reserve(&record).await.unwrap(), Reservation::Fresh);
        let queue = ApprovalQueue::new(store.clone(), Some(notifier as Arc<dyn DraftNotifier>));
        (store, queue)
    }

    #[tokio::test]
    async fn enqueue_stores_draft_and_announces() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (store, queue) = setup(notifier.clone()).await;

        queue.enqueue("abcd1234", &reply(), t0()).await.unwrap();

        let record = store.get("abcd1234").await.unwrap().unwrap();
        assert_eq!(record.status, ReplyStatus::QueuedForApproval);
        assert_eq!(record.template_key.as_deref(), Some("2_fresh_it"));

        let announced = notifier.drafts.lock().unwrap();
        assert_eq!(announced.len(), 1);
        assert_eq!(announced[0].message, "Gentile Mario Rossi, ci dispiace.");

        let pending = queue.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].review_id, "abcd1234");
        assert_eq!(pending[0].consumer_name, "Mario Rossi");
    }

    #[tokio::test]
    async fn announce_failure_keeps_draft_queued() {
        let notifier = Arc::new(RecordingNotifier {
            fail: true,
            ..RecordingNotifier::default()
        });
        let (store, queue) = setup(notifier).await;

        queue.enqueue("abcd1234", &reply(), t0()).await.unwrap();

        let record = store.get("abcd1234").await.unwrap().unwrap();
        assert_eq!(record.status, ReplyStatus::QueuedForApproval);
    }

    #[tokio::test]
    async fn approve_claims_draft_once() {
        let (_store, queue) = setup(Arc::default()).await;
        queue.enqueue("abcd1234", &reply(), t0()).await.unwrap();

        let claimed = queue.approve("abcd1234", t0()).await.unwrap();
        assert_eq!(claimed.status, ReplyStatus::Pending);
        assert_eq!(claimed.message.as_deref(), Some("Gentile Mario Rossi, ci dispiace."));

        let err = queue.approve("abcd1234", t0()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Approval(ApprovalError::InvalidTransition { ref state, .. }) if state == "pending"
        ));
    }

    #[tokio::test]
    async fn reject_is_terminal() {
        let (store, queue) = setup(Arc::default()).await;
        queue.enqueue("abcd1234", &reply(), t0()).await.unwrap();

        queue.reject("abcd1234", t0()).await.unwrap();
        assert_eq!(
            store.get("abcd1234").await.unwrap().unwrap().status,
            ReplyStatus::Rejected
        );
        assert!(queue.approve("abcd1234", t0()).await.is_err());
        assert!(queue.pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn decisions_on_unknown_review_are_not_found() {
        let (_store, queue) = setup(Arc::default()).await;
        let err = queue.reject("missing", t0()).await.unwrap_err();
        assert!(matches!(err, Error::Approval(ApprovalError::NotFound { .. })));
    }

    #[tokio::test]
    async fn reject_before_enqueue_is_invalid() {
        let (_store, queue) = setup(Arc::default()).await;
        let err = queue.reject("abcd1234", t0()).await.unwrap_err();
        assert!(matches!(err, Error::Approval(ApprovalError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn expiry_rejects_old_drafts_only() {
        let (store, queue) = setup(Arc::default()).await;
        queue.enqueue("abcd1234", &reply(), t0()).await.unwrap();

        let none = queue
            .expire_older_than(Duration::hours(48), t0() + Duration::hours(47))
            .await
            .unwrap();
        assert!(none.is_empty());

        let expired = queue
            .expire_older_than(Duration::hours(48), t0() + Duration::hours(49))
            .await
            .unwrap();
        assert_eq!(expired, vec!["abcd1234".to_string()]);

        let record = store.get("abcd1234").await.unwrap().unwrap();
        assert_eq!(record.status, ReplyStatus::Rejected);
        assert_eq!(record.last_error.as_deref(), Some(EXPIRED_REASON));
    }

    #[tokio::test]
    async fn unbounded_ttl_expires_nothing() {
        let (store, queue) = setup(Arc::default()).await;
        queue.enqueue("abcd1234", &reply(), t0()).await.unwrap();

        let expired = queue
            .expire_older_than(Duration::MAX, t0() + Duration::hours(1))
            .await
            .unwrap();
        assert!(expired.is_empty());

        let record = store.get("abcd1234").await.unwrap().unwrap();
        assert_eq!(record.status, ReplyStatus::QueuedForApproval);
    }
}
