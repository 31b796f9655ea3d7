//! Review auto-reply — webhook-driven replies to customer reviews.

pub mod alerts;
pub mod api;
pub mod approval;
pub mod channels;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod publisher;
pub mod store;
pub mod templates;
