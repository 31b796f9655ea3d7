use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use review_autoreply::alerts::AlertDispatcher;
use review_autoreply::api::{AppState, router};
use review_autoreply::approval::{self, ApprovalQueue, DraftNotifier, SlackDraftNotifier};
use review_autoreply::channels::SlackWebhook;
use review_autoreply::config::AppConfig;
use review_autoreply::pipeline::{self, ReviewProcessor};
use review_autoreply::publisher::HttpPublisher;
use review_autoreply::store::{LibSqlBackend, ReplyStore};
use review_autoreply::templates::TemplateCatalog;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().context("invalid configuration")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        bind = %config.bind_addr,
        approval_mode = config.approval.enabled,
        "Starting review auto-reply service"
    );

    // ── Templates ───────────────────────────────────────────────────────
    let catalog = Arc::new(
        TemplateCatalog::load(&config.templates_path).with_context(|| {
            format!(
                "failed to load templates from {}",
                config.templates_path.display()
            )
        })?,
    );

    // ── Database ────────────────────────────────────────────────────────
    let store: Arc<dyn ReplyStore> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("failed to open database at {}", config.db_path.display()))?,
    );
    info!(path = %config.db_path.display(), "Reply ledger ready");

    // ── Outbound ────────────────────────────────────────────────────────
    let publisher = Arc::new(HttpPublisher::new(config.publisher.clone()));
    let alerts = Arc::new(AlertDispatcher::from_config(&config.alerts));

    let notifier = config.approval.slack_webhook.as_ref().map(|url| {
        Arc::new(SlackDraftNotifier::new(
            SlackWebhook::new(url.clone(), config.alerts.timeout),
            config.public_url.clone(),
        )) as Arc<dyn DraftNotifier>
    });
    if config.approval.enabled && notifier.is_none() {
        warn!("Approval mode is on but no approval channel is set; drafts are only listed via the API");
    }
    let approvals = Arc::new(ApprovalQueue::new(Arc::clone(&store), notifier));

    let processor = Arc::new(ReviewProcessor::new(
        Arc::clone(&store),
        catalog,
        publisher,
        alerts,
        Arc::clone(&approvals),
        config.approval.enabled,
    ));

    // ── Startup Recovery ────────────────────────────────────────────────
    let interrupted = processor
        .recover_stale_pending(Utc::now())
        .await
        .context("startup recovery failed")?;
    if !interrupted.is_empty() {
        warn!(count = interrupted.len(), "Marked interrupted replies as failed; retry them via the API");
    }

    // Later strandings are swept by the same check on an interval.
    pipeline::spawn_recovery_task(Arc::clone(&processor));

    if let Some(ttl) = config.approval.ttl {
        approval::spawn_expiry_task(Arc::clone(&approvals), ttl);
        info!(ttl_hours = ttl.num_hours(), "Draft expiry enabled");
    }

    // ── HTTP ────────────────────────────────────────────────────────────
    let app = router(AppState {
        processor,
        admin_token: config.admin_token.clone(),
    });

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "Listening");

    axum::serve(listener, app).await?;
    Ok(())
}
