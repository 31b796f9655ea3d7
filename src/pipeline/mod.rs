//! Review processing pipeline.
//!
//! Every webhook delivery flows through:
//! 1. `ReviewEvent::try_from()` — payload validation
//! 2. `ReviewProcessor::handle()` — dedup reservation in the ledger
//! 3. `routing::route()` — classification and template rendering (pure)
//! 4. Publish, or detour through the approval queue

pub mod processor;
pub mod routing;
pub mod types;

pub use processor::{ReviewProcessor, spawn_recovery_task};
