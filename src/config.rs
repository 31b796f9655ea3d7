//! Configuration types.
//!
//! Everything is read once at startup into [`AppConfig`] and handed to the
//! components that need it. Decision logic never looks at the environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default reviews platform API base.
pub const DEFAULT_API_BASE: &str = "https://api.trustpilot.com";

/// Upper bound for `APP_APPROVAL_TTL_HOURS` (ten years).
pub const MAX_APPROVAL_TTL_HOURS: i64 = 24 * 365 * 10;

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Address the HTTP server binds to.
    pub bind_addr: String,
    /// Path of the libSQL database file.
    pub db_path: PathBuf,
    /// Path of the JSON template catalog.
    pub templates_path: PathBuf,
    /// Externally reachable base URL, used to build approve/reject links.
    pub public_url: Option<String>,
    /// Bearer token guarding the operator API. Open when unset.
    pub admin_token: Option<SecretString>,
    pub approval: ApprovalConfig,
    pub publisher: PublisherConfig,
    pub alerts: AlertConfig,
}

/// Human-approval detour settings.
#[derive(Debug, Clone)]
pub struct ApprovalConfig {
    /// Route low-star fresh reviews to an operator before publishing.
    pub enabled: bool,
    /// Slack incoming webhook that receives drafts. `None` keeps drafts API-only.
    pub slack_webhook: Option<String>,
    /// Drafts older than this are swept to `rejected`. Never auto-sent.
    pub ttl: Option<chrono::Duration>,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            slack_webhook: None,
            ttl: None,
        }
    }
}

/// Reviews platform reply API settings.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub api_base: String,
    pub business_token: SecretString,
    /// Upper bound on a single publish request.
    pub timeout: Duration,
}

/// Which alert channels are active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlertChannel {
    #[default]
    None,
    Slack,
    Email,
    Both,
}

impl AlertChannel {
    pub fn wants_slack(self) -> bool {
        matches!(self, Self::Slack | Self::Both)
    }

    pub fn wants_email(self) -> bool {
        matches!(self, Self::Email | Self::Both)
    }
}

impl FromStr for AlertChannel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "slack" => Ok(Self::Slack),
            "email" => Ok(Self::Email),
            "both" => Ok(Self::Both),
            other => Err(format!("expected none|slack|email|both, got {other:?}")),
        }
    }
}

impl std::fmt::Display for AlertChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Slack => write!(f, "slack"),
            Self::Email => write!(f, "email"),
            Self::Both => write!(f, "both"),
        }
    }
}

/// Alerting settings. Sinks are only populated for the selected channels.
#[derive(Debug, Clone, Default)]
pub struct AlertConfig {
    pub channel: AlertChannel,
    pub slack_webhook: Option<String>,
    pub email: Option<SmtpConfig>,
    /// Upper bound on a single alert delivery.
    pub timeout: Duration,
}

/// SMTP settings for email alerts.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    /// Upgrade the connection with STARTTLS.
    pub tls: bool,
    pub from_address: String,
    pub to_address: String,
}

impl AppConfig {
    /// Build config from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let business_token = get("TP_BUSINESS_TOKEN").ok_or_else(|| ConfigError::MissingRequired {
            key: "TP_BUSINESS_TOKEN".into(),
            hint: "Set the reviews platform business token.".into(),
        })?;

        let publisher = PublisherConfig {
            api_base: get("TP_API_BASE")
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            business_token: SecretString::from(business_token),
            timeout: Duration::from_secs(parse_or("TP_TIMEOUT_SECS", get("TP_TIMEOUT_SECS"), 20)?),
        };

        let approval_slack = match get("APP_APPROVAL_CHANNEL").as_deref().map(str::trim) {
            None | Some("none") => None,
            Some("slack") => Some(get("APP_APPROVAL_WEBHOOK").ok_or_else(|| {
                ConfigError::MissingRequired {
                    key: "APP_APPROVAL_WEBHOOK".into(),
                    hint: "APP_APPROVAL_CHANNEL=slack needs a Slack incoming webhook URL.".into(),
                }
            })?),
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "APP_APPROVAL_CHANNEL".into(),
                    message: format!("expected none|slack, got {other:?}"),
                });
            }
        };

        let ttl = match get("APP_APPROVAL_TTL_HOURS") {
            Some(raw) => approval_ttl(parse_value("APP_APPROVAL_TTL_HOURS", &raw)?)?,
            None => None,
        };

        let approval = ApprovalConfig {
            enabled: parse_bool("APP_APPROVAL_MODE", get("APP_APPROVAL_MODE"), true)?,
            slack_webhook: approval_slack,
            ttl,
        };

        let alerts = alert_config(&get)?;

        Ok(Self {
            bind_addr: get("APP_BIND").unwrap_or_else(|| "0.0.0.0:8000".to_string()),
            db_path: get("APP_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/bot.sqlite3")),
            templates_path: get("APP_TEMPLATES_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("templates/templates.json")),
            public_url: get("APP_PUBLIC_URL").map(|u| u.trim_end_matches('/').to_string()),
            admin_token: get("APP_ADMIN_TOKEN").map(SecretString::from),
            approval,
            publisher,
            alerts,
        })
    }
}

fn alert_config<G>(get: &G) -> Result<AlertConfig, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let channel: AlertChannel = get("ALERT_CHANNEL")
        .unwrap_or_default()
        .parse()
        .map_err(|message| ConfigError::InvalidValue {
            key: "ALERT_CHANNEL".into(),
            message,
        })?;

    let slack_webhook = if channel.wants_slack() {
        Some(get("ALERT_SLACK_WEBHOOK").ok_or_else(|| ConfigError::MissingRequired {
            key: "ALERT_SLACK_WEBHOOK".into(),
            hint: format!("ALERT_CHANNEL={channel} needs a Slack incoming webhook URL."),
        })?)
    } else {
        None
    };

    let email = if channel.wants_email() {
        let require = |key: &str| {
            get(key).ok_or_else(|| ConfigError::MissingRequired {
                key: key.into(),
                hint: format!("ALERT_CHANNEL={channel} needs SMTP settings."),
            })
        };
        let username = require("SMTP_USER")?;
        Some(SmtpConfig {
            host: require("SMTP_HOST")?,
            port: parse_or("SMTP_PORT", get("SMTP_PORT"), 587)?,
            password: SecretString::from(require("SMTP_PASS")?),
            tls: parse_bool("SMTP_TLS", get("SMTP_TLS"), true)?,
            from_address: get("SMTP_FROM").unwrap_or_else(|| username.clone()),
            to_address: require("ALERT_EMAIL_TO")?,
            username,
        })
    } else {
        None
    };

    Ok(AlertConfig {
        channel,
        slack_webhook,
        email,
        timeout: Duration::from_secs(parse_or("ALERT_TIMEOUT_SECS", get("ALERT_TIMEOUT_SECS"), 20)?),
    })
}

/// Zero or negative hours disable expiry.
fn approval_ttl(hours: i64) -> Result<Option<chrono::Duration>, ConfigError> {
    if hours <= 0 {
        return Ok(None);
    }
    if hours > MAX_APPROVAL_TTL_HOURS {
        return Err(ConfigError::InvalidValue {
            key: "APP_APPROVAL_TTL_HOURS".into(),
            message: format!("must be at most {MAX_APPROVAL_TTL_HOURS}, got {hours}"),
        });
    }
    chrono::Duration::try_hours(hours)
        .map(Some)
        .ok_or_else(|| ConfigError::InvalidValue {
            key: "APP_APPROVAL_TTL_HOURS".into(),
            message: format!("{hours} hours is out of range"),
        })
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.into(),
        message: e.to_string(),
    })
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_bool(key: &str, raw: Option<String>, default: bool) -> Result<bool, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.into(),
            message: format!("expected a boolean, got {other:?}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_with_only_token() {
        let config = config_from(&[("TP_BUSINESS_TOKEN", "tok")]).unwrap();
        assert_eq!(config.publisher.api_base, DEFAULT_API_BASE);
        assert_eq!(config.publisher.business_token.expose_secret(), "tok");
        assert_eq!(config.publisher.timeout, Duration::from_secs(20));
        assert!(config.approval.enabled);
        assert!(config.approval.slack_webhook.is_none());
        assert!(config.approval.ttl.is_none());
        assert_eq!(config.alerts.channel, AlertChannel::None);
        assert!(config.alerts.slack_webhook.is_none());
        assert!(config.alerts.email.is_none());
        assert!(config.admin_token.is_none());
    }

    #[test]
    fn missing_token_is_an_error() {
        let err = config_from(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { ref key, .. } if key == "TP_BUSINESS_TOKEN"));
    }

    #[test]
    fn approval_mode_can_be_disabled() {
        let config = config_from(&[("TP_BUSINESS_TOKEN", "t"), ("APP_APPROVAL_MODE", "FALSE")]).unwrap();
        assert!(!config.approval.enabled);
    }

    #[test]
    fn bad_boolean_is_rejected() {
        let err = config_from(&[("TP_BUSINESS_TOKEN", "t"), ("APP_APPROVAL_MODE", "maybe")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn slack_alerts_need_webhook() {
        let err = config_from(&[("TP_BUSINESS_TOKEN", "t"), ("ALERT_CHANNEL", "slack")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { ref key, .. } if key == "ALERT_SLACK_WEBHOOK"));
    }

    #[test]
    fn both_channels_populate_both_sinks() {
        let config = config_from(&[
            ("TP_BUSINESS_TOKEN", "t"),
            ("ALERT_CHANNEL", "both"),
            ("ALERT_SLACK_WEBHOOK", "https://hooks.slack.test/x"),
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_USER", "bot@example.com"),
            ("SMTP_PASS", "secret"),
            ("SMTP_TLS", "false"),
            ("ALERT_EMAIL_TO", "ops@example.com"),
        ])
        .unwrap();
        assert_eq!(config.alerts.channel, AlertChannel::Both);
        assert!(config.alerts.slack_webhook.is_some());
        let smtp = config.alerts.email.unwrap();
        assert_eq!(smtp.port, 587);
        assert!(!smtp.tls);
        assert_eq!(smtp.from_address, "bot@example.com");
        assert_eq!(smtp.to_address, "ops@example.com");
    }

    #[test]
    fn email_alerts_need_recipient() {
        let err = config_from(&[
            ("TP_BUSINESS_TOKEN", "t"),
            ("ALERT_CHANNEL", "email"),
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_USER", "bot@example.com"),
            ("SMTP_PASS", "secret"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { ref key, .. } if key == "ALERT_EMAIL_TO"));
    }

    #[test]
    fn slack_channel_not_selected_ignores_webhook() {
        let config = config_from(&[
            ("TP_BUSINESS_TOKEN", "t"),
            ("ALERT_CHANNEL", "none"),
            ("ALERT_SLACK_WEBHOOK", "https://hooks.slack.test/x"),
        ])
        .unwrap();
        assert!(config.alerts.slack_webhook.is_none());
    }

    #[test]
    fn unknown_alert_channel_is_rejected() {
        let err = config_from(&[("TP_BUSINESS_TOKEN", "t"), ("ALERT_CHANNEL", "pager")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "ALERT_CHANNEL"));
    }

    #[test]
    fn approval_ttl_in_hours() {
        let config = config_from(&[
            ("TP_BUSINESS_TOKEN", "t"),
            ("APP_APPROVAL_CHANNEL", "slack"),
            ("APP_APPROVAL_WEBHOOK", "https://hooks.slack.test/a"),
            ("APP_APPROVAL_TTL_HOURS", "48"),
        ])
        .unwrap();
        assert_eq!(config.approval.ttl, Some(chrono::Duration::hours(48)));
        assert_eq!(
            config.approval.slack_webhook.as_deref(),
            Some("https://hooks.slack.test/a")
        );
    }

    #[test]
    fn approval_ttl_out_of_range_is_rejected() {
        for hours in ["87601", "9223372036854775807"] {
            let err = config_from(&[
                ("TP_BUSINESS_TOKEN", "t"),
                ("APP_APPROVAL_TTL_HOURS", hours),
            ])
            .unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "APP_APPROVAL_TTL_HOURS"),
                "{hours}: {err:?}"
            );
        }
    }

    #[test]
    fn non_positive_approval_ttl_disables_expiry() {
        let config = config_from(&[
            ("TP_BUSINESS_TOKEN", "t"),
            ("APP_APPROVAL_TTL_HOURS", "0"),
        ])
        .unwrap();
        assert!(config.approval.ttl.is_none());
    }

    #[test]
    fn api_base_trailing_slash_is_trimmed() {
        let config = config_from(&[
            ("TP_BUSINESS_TOKEN", "t"),
            ("TP_API_BASE", "http://localhost:9000/"),
        ])
        .unwrap();
        assert_eq!(config.publisher.api_base, "http://localhost:9000");
    }
}
