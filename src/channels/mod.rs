//! Outbound notification channels.

pub mod email;
pub mod slack;

pub use email::SmtpMailer;
pub use slack::SlackWebhook;
