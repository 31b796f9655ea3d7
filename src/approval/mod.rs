//! Human approval detour for sensitive replies.

pub mod notifier;
pub mod queue;

pub use notifier::{DraftNotifier, SlackDraftNotifier};
pub use queue::{ApprovalQueue, spawn_expiry_task};
