//! Draft announcements — tell operators a reply is waiting for them.

use async_trait::async_trait;

use crate::channels::SlackWebhook;
use crate::error::ChannelError;
use crate::store::ApprovalDraft;

/// Announces a queued draft to whoever approves replies.
#[async_trait]
pub trait DraftNotifier: Send + Sync {
    async fn announce(&self, draft: &ApprovalDraft) -> Result<(), ChannelError>;
}

/// Posts drafts to a Slack channel, with approve/reject links when the
/// service has a public URL.
pub struct SlackDraftNotifier {
    hook: SlackWebhook,
    public_url: Option<String>,
}

impl SlackDraftNotifier {
    pub fn new(hook: SlackWebhook, public_url: Option<String>) -> Self {
        Self { hook, public_url }
    }
}

#[async_trait]
impl DraftNotifier for SlackDraftNotifier {
    async fn announce(&self, draft: &ApprovalDraft) -> Result<(), ChannelError> {
        self.hook
            .post_text(&draft_text(draft, self.public_url.as_deref()))
            .await
    }
}

/// Slack message body for a draft.
pub fn draft_text(draft: &ApprovalDraft, public_url: Option<&str>) -> String {
    let period = draft.period.map(|p| p.as_str()).unwrap_or("-");
    let mut text = format!(
        "*Review {}*\nStars: {} | Period: {} | Lang: {}\n\n*Proposed reply:*\n{}\n\n",
        draft.review_id, draft.stars, period, draft.language, draft.message
    );
    match public_url {
        Some(base) => text.push_str(&format!(
            "Approve: POST {base}/api/approvals/{id}/approve\nReject: POST {base}/api/approvals/{id}/reject",
            id = draft.review_id
        )),
        None => text.push_str("Approve or reject it from the approvals API to continue."),
    }
    text
}
