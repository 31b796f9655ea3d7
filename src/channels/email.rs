//! Email channel — outbound SMTP via lettre.

use std::time::Duration;

use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;

use crate::config::SmtpConfig;
use crate::error::ChannelError;

/// Sends plain-text mail through one configured SMTP relay.
#[derive(Debug, Clone)]
pub struct SmtpMailer {
    config: SmtpConfig,
    timeout: Duration,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }

    /// Send a message to the configured recipient.
    ///
    /// SMTP is blocking, so the transaction runs on the blocking pool.
    pub async fn send(&self, subject: &str, body: &str) -> Result<(), ChannelError> {
        let email = build_message(&self.config, subject, body)?;
        let config = self.config.clone();
        let timeout = self.timeout;

        tokio::task::spawn_blocking(move || send_blocking(&config, timeout, &email))
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "email".into(),
                reason: format!("SMTP task panicked: {e}"),
            })?
    }
}

fn parse_mailbox(raw: &str) -> Result<Mailbox, ChannelError> {
    raw.parse().map_err(|e| ChannelError::InvalidAddress {
        name: "email".into(),
        reason: format!("{raw:?}: {e}"),
    })
}

/// Build the alert message. Exposed to the crate for tests.
pub(crate) fn build_message(
    config: &SmtpConfig,
    subject: &str,
    body: &str,
) -> Result<Message, ChannelError> {
    Message::builder()
        .from(parse_mailbox(&config.from_address)?)
        .to(parse_mailbox(&config.to_address)?)
        .subject(subject)
        .body(body.to_string())
        .map_err(|e| ChannelError::SendFailed {
            name: "email".into(),
            reason: format!("Failed to build email: {e}"),
        })
}

fn send_blocking(config: &SmtpConfig, timeout: Duration, email: &Message) -> Result<(), ChannelError> {
    let creds = Credentials::new(
        config.username.clone(),
        config.password.expose_secret().to_string(),
    );

    let builder = if config.tls {
        SmtpTransport::starttls_relay(&config.host).map_err(|e| ChannelError::SendFailed {
            name: "email".into(),
            reason: format!("SMTP relay error: {e}"),
        })?
    } else {
        SmtpTransport::builder_dangerous(&config.host)
    };

    let transport = builder
        .port(config.port)
        .credentials(creds)
        .timeout(Some(timeout))
        .build();

    transport.send(email).map_err(|e| ChannelError::SendFailed {
        name: "email".into(),
        reason: format!("SMTP send failed: {e}"),
    })?;

    tracing::info!(to = %config.to_address, "Email sent");
    Ok(())
}
