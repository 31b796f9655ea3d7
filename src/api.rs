//! HTTP surface — webhook intake, health, and operator endpoints.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Request, State, rejection::JsonRejection},
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::error::{ApprovalError, Error};
use crate::pipeline::ReviewProcessor;
use crate::pipeline::types::{Outcome, ReviewEvent, ReviewPayload};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<ReviewProcessor>,
    /// Bearer token guarding `/api/*`. Open when unset.
    pub admin_token: Option<SecretString>,
}

/// Build the service router.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/approvals", get(list_approvals))
        .route("/api/approvals/{review_id}/approve", post(approve))
        .route("/api/approvals/{review_id}/reject", post(reject))
        .route("/api/replies/{review_id}", get(get_reply))
        .route("/api/replies/{review_id}/retry", post(retry))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_admin_token,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/webhook/trustpilot", post(webhook))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn require_admin_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = &state.admin_token else {
        return Ok(next.run(request).await);
    };

    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .is_some_and(|token| token == expected.expose_secret());

    if !authorized {
        warn!(path = %request.uri().path(), "Rejected operator request without valid token");
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(request).await)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "review-autoreply"
    }))
}

// ── Webhook ─────────────────────────────────────────────────────────────

async fn webhook(
    State(state): State<AppState>,
    payload: Result<Json<ReviewPayload>, JsonRejection>,
) -> (StatusCode, Json<serde_json::Value>) {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "Malformed webhook body");
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({"error": rejection.body_text()})),
            );
        }
    };

    let event = match ReviewEvent::try_from(payload) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Invalid review payload");
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({"error": e.to_string()})),
            );
        }
    };

    let status = match state.processor.handle(&event, Utc::now()).await {
        Ok(Outcome::Duplicate) => "duplicate",
        Ok(Outcome::Skipped) => "skipped",
        Ok(outcome) => {
            info!(review_id = %event.review_id, outcome = outcome.label(), "Webhook processed");
            "accepted"
        }
        // Nothing durable was recorded: let the platform redeliver.
        Err(Error::Database(e)) => {
            error!(review_id = %event.review_id, error = %e, "Ledger unavailable");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"error": "ledger unavailable"})),
            );
        }
        Err(e) => {
            error!(review_id = %event.review_id, error = %e, "Review processing failed");
            "accepted"
        }
    };

    (StatusCode::OK, Json(json!({"status": status})))
}

// ── Operator API ────────────────────────────────────────────────────────

async fn list_approvals(State(state): State<AppState>) -> Response {
    match state.processor.approvals().pending().await {
        Ok(drafts) => Json(drafts).into_response(),
        Err(e) => error_response(e),
    }
}

async fn approve(State(state): State<AppState>, Path(review_id): Path<String>) -> Response {
    match state.processor.approve(&review_id, Utc::now()).await {
        Ok(outcome) => outcome_response(&review_id, &outcome),
        Err(e) => error_response(e),
    }
}

async fn reject(State(state): State<AppState>, Path(review_id): Path<String>) -> Response {
    match state.processor.reject(&review_id, Utc::now()).await {
        Ok(()) => Json(json!({"review_id": review_id, "status": "rejected"})).into_response(),
        Err(e) => error_response(e),
    }
}

async fn retry(State(state): State<AppState>, Path(review_id): Path<String>) -> Response {
    match state.processor.retry(&review_id, Utc::now()).await {
        Ok(outcome) => outcome_response(&review_id, &outcome),
        Err(e) => error_response(e),
    }
}

async fn get_reply(State(state): State<AppState>, Path(review_id): Path<String>) -> Response {
    match state.processor.record(&review_id).await {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => error_response(
            ApprovalError::NotFound {
                review_id: review_id.clone(),
            }
            .into(),
        ),
        Err(e) => error_response(e),
    }
}

fn outcome_response(review_id: &str, outcome: &Outcome) -> Response {
    let mut body = json!({"review_id": review_id, "status": outcome.label()});
    if let Outcome::Failed { reason } = outcome {
        body["error"] = json!(reason);
    }
    Json(body).into_response()
}

fn error_response(e: Error) -> Response {
    let status = match &e {
        Error::Approval(ApprovalError::NotFound { .. }) => StatusCode::NOT_FOUND,
        Error::Approval(ApprovalError::InvalidTransition { .. }) => StatusCode::CONFLICT,
        _ => {
            error!(error = %e, "Operator request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(json!({"error": e.to_string()}))).into_response()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::Request as HttpRequest;
    use tower::ServiceExt;

    use super::*;
    use crate::alerts::AlertDispatcher;
    use crate::approval::ApprovalQueue;
    use crate::error::PublishError;
    use crate::publisher::{PublishOutcome, ReplyPublisher};
    use crate::store::{LibSqlBackend, ReplyStore};
    use crate::templates::TemplateCatalog;

    #[derive(Default)]
    struct CountingPublisher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ReplyPublisher for CountingPublisher {
        async fn publish(
            &self,
            _review_id: &str,
            _message: &str,
            _idempotency_key: &str,
        ) -> Result<PublishOutcome, PublishError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(PublishOutcome::Created)
        }
    }

    async fn app(admin_token: Option<&str>) -> (Router, Arc<CountingPublisher>) {
        let store: Arc<dyn ReplyStore> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let catalog = TemplateCatalog::from_entries([
            ("2_fresh_it", "Gentile {name}, ci dispiace."),
            ("5_fresh_en", "Thank you {name}!"),
        ])
        .unwrap();
        let publisher = Arc::new(CountingPublisher::default());
        let processor = ReviewProcessor::new(
            store.clone(),
            Arc::new(catalog),
            publisher.clone(),
            Arc::new(AlertDispatcher::new(Vec::new(), Duration::from_secs(1))),
            Arc::new(ApprovalQueue::new(store, None)),
            true,
        );
        let state = AppState {
            processor: Arc::new(processor),
            admin_token: admin_token.map(SecretString::from),
        };
        (router(state), publisher)
    }

    fn review_body(review_id: &str, stars: u8, language: &str) -> String {
        json!({
            "review_id": review_id,
            "stars": stars,
            "created_at": Utc::now().to_rfc3339(),
            "language": language,
            "consumer_name": "Mario Rossi",
        })
        .to_string()
    }

    fn post_json(uri: &str, body: String) -> HttpRequest<Body> {
        HttpRequest::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    fn post_empty(uri: &str, token: Option<&str>) -> HttpRequest<Body> {
        let mut builder = HttpRequest::post(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_service() {
        let (app, _) = app(None).await;
        let response = app
            .oneshot(HttpRequest::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "review-autoreply");
    }

    #[tokio::test]
    async fn webhook_accepts_then_reports_duplicate() {
        let (app, publisher) = app(None).await;

        let first = app
            .clone()
            .oneshot(post_json("/webhook/trustpilot", review_body("r1", 5, "en")))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(json_body(first).await["status"], "accepted");

        let second = app
            .oneshot(post_json("/webhook/trustpilot", review_body("r1", 5, "en")))
            .await
            .unwrap();
        assert_eq!(json_body(second).await["status"], "duplicate");
        assert_eq!(publisher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn webhook_reports_skipped() {
        let (app, publisher) = app(None).await;
        let body = json!({
            "review_id": "r2",
            "stars": 4,
            "created_at": "2026-10-01T10:00:00Z",
            "language": "en",
            "company_response_exists": true,
        });
        let response = app
            .oneshot(post_json("/webhook/trustpilot", body.to_string()))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["status"], "skipped");
        assert_eq!(publisher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_template_is_still_accepted() {
        let (app, publisher) = app(None).await;
        let response = app
            .oneshot(post_json("/webhook/trustpilot", review_body("r3", 5, "fr")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "accepted");
        assert_eq!(publisher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_payloads_are_unprocessable() {
        let (app, _) = app(None).await;
        for body in [
            review_body("r4", 6, "en"),
            review_body("", 3, "en"),
            review_body("r4/../victim", 3, "en"),
            json!({"review_id": "r4", "stars": 3, "created_at": "yesterday", "language": "en"})
                .to_string(),
            json!({"review_id": "r4"}).to_string(),
            "not json".to_string(),
        ] {
            let response = app
                .clone()
                .oneshot(post_json("/webhook/trustpilot", body.clone()))
                .await
                .unwrap();
            assert!(
                response.status().is_client_error(),
                "body {body} gave {}",
                response.status()
            );
        }

        // Nothing reached the ledger.
        let response = app
            .oneshot(HttpRequest::get("/api/replies/r4").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn approval_round_trip() {
        let (app, publisher) = app(None).await;
        app.clone()
            .oneshot(post_json("/webhook/trustpilot", review_body("abcd1234", 2, "it")))
            .await
            .unwrap();

        let listed = app
            .clone()
            .oneshot(HttpRequest::get("/api/approvals").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let drafts = json_body(listed).await;
        assert_eq!(drafts.as_array().unwrap().len(), 1);
        assert_eq!(drafts[0]["review_id"], "abcd1234");
        assert_eq!(drafts[0]["message"], "Gentile Mario Rossi, ci dispiace.");
        assert_eq!(publisher.calls.load(Ordering::SeqCst), 0);

        let approved = app
            .clone()
            .oneshot(post_empty("/api/approvals/abcd1234/approve", None))
            .await
            .unwrap();
        assert_eq!(approved.status(), StatusCode::OK);
        assert_eq!(json_body(approved).await["status"], "sent");
        assert_eq!(publisher.calls.load(Ordering::SeqCst), 1);

        let again = app
            .clone()
            .oneshot(post_empty("/api/approvals/abcd1234/reject", None))
            .await
            .unwrap();
        assert_eq!(again.status(), StatusCode::CONFLICT);

        let record = app
            .oneshot(HttpRequest::get("/api/replies/abcd1234").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(json_body(record).await["status"], "sent");
    }

    #[tokio::test]
    async fn unknown_review_is_not_found() {
        let (app, _) = app(None).await;
        for uri in [
            "/api/approvals/nope/approve",
            "/api/approvals/nope/reject",
            "/api/replies/nope/retry",
        ] {
            let response = app.clone().oneshot(post_empty(uri, None)).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        }
    }

    #[tokio::test]
    async fn admin_token_guards_operator_routes() {
        let (app, _) = app(Some("s3cret")).await;

        let anonymous = app
            .clone()
            .oneshot(HttpRequest::get("/api/approvals").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

        let wrong = app
            .clone()
            .oneshot(post_empty("/api/approvals/x/reject", Some("guess")))
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

        let authorized = app
            .clone()
            .oneshot(
                HttpRequest::get("/api/approvals")
                    .header("authorization", "Bearer s3cret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(authorized.status(), StatusCode::OK);

        // Webhook and health stay open.
        let health = app
            .oneshot(HttpRequest::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);
    }
}
