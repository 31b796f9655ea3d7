//! libSQL backend — async `ReplyStore` implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info, warn};

use crate::error::DatabaseError;
use crate::pipeline::types::Period;
use crate::store::migrations;
use crate::store::model::{RecordUpdate, ReplyRecord, ReplyStatus, Reservation};
use crate::store::traits::ReplyStore;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical write format. Fixed width so string comparison orders correctly.
fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn opt_int(n: Option<u16>) -> libsql::Value {
    match n {
        Some(n) => libsql::Value::Integer(i64::from(n)),
        None => libsql::Value::Null,
    }
}

const REPLY_COLUMNS: &str = "review_id, status, stars, language, review_created_at, consumer_name, period, template_key, message, idempotency_key, last_error, publish_status, created_at, updated_at";

/// Map a libsql Row to a ReplyRecord. Column order matches REPLY_COLUMNS.
fn row_to_record(row: &libsql::Row) -> Result<ReplyRecord, libsql::Error> {
    let status_str: String = row.get(1)?;
    let stars: i64 = row.get(2)?;
    let review_created_str: String = row.get(4)?;
    let period_str: Option<String> = row.get(6).ok();
    let publish_status: Option<i64> = row.get(11).ok();
    let created_str: String = row.get(12)?;
    let updated_str: String = row.get(13)?;

    Ok(ReplyRecord {
        review_id: row.get(0)?,
        status: status_str.parse().unwrap_or_else(|e| {
            warn!(error = %e, "Unknown status in replies table, reading as failed");
            ReplyStatus::Failed
        }),
        stars: stars as u8,
        language: row.get(3)?,
        review_created_at: parse_datetime(&review_created_str),
        consumer_name: row.get(5)?,
        period: period_str.and_then(|p| p.parse::<Period>().ok()),
        template_key: row.get(7).ok(),
        message: row.get(8).ok(),
        idempotency_key: row.get(9)?,
        last_error: row.get(10).ok(),
        publish_status: publish_status.and_then(|s| u16::try_from(s).ok()),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl ReplyStore for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn reserve(&self, record: &ReplyRecord) -> Result<Reservation, DatabaseError> {
        let inserted = self
            .conn()
            .execute(
                "INSERT INTO replies (review_id, status, stars, language, review_created_at,
                    consumer_name, idempotency_key, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
                 ON CONFLICT(review_id) DO NOTHING",
                params![
                    record.review_id.clone(),
                    record.status.as_str(),
                    i64::from(record.stars),
                    record.language.clone(),
                    format_datetime(record.review_created_at),
                    record.consumer_name.clone(),
                    record.idempotency_key.clone(),
                    format_datetime(record.created_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("reserve: {e}")))?;

        let reservation = if inserted == 1 {
            Reservation::Fresh
        } else {
            Reservation::AlreadySeen
        };
        debug!(review_id = %record.review_id, ?reservation, "Ledger reservation");
        Ok(reservation)
    }

    async fn get(&self, review_id: &str) -> Result<Option<ReplyRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {REPLY_COLUMNS} FROM replies WHERE review_id = ?1"),
                params![review_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let record = row_to_record(&row)
                    .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?;
                Ok(Some(record))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get: {e}"))),
        }
    }

    async fn transition(
        &self,
        review_id: &str,
        from: ReplyStatus,
        to: ReplyStatus,
        update: &RecordUpdate,
        at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let changed = self
            .conn()
            .execute(
                "UPDATE replies SET
                    status = ?1,
                    period = COALESCE(?2, period),
                    template_key = COALESCE(?3, template_key),
                    message = COALESCE(?4, message),
                    last_error = ?5,
                    publish_status = ?6,
                    updated_at = ?7
                 WHERE review_id = ?8 AND status = ?9",
                params![
                    to.as_str(),
                    opt_text(update.period.map(Period::as_str)),
                    opt_text(update.template_key.as_deref()),
                    opt_text(update.message.as_deref()),
                    opt_text(update.last_error.as_deref()),
                    opt_int(update.publish_status),
                    format_datetime(at),
                    review_id,
                    from.as_str(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("transition: {e}")))?;

        if changed == 1 {
            debug!(review_id, %from, %to, "Reply record transitioned");
        } else {
            debug!(review_id, %from, %to, "Transition skipped, record not in expected state");
        }
        Ok(changed == 1)
    }

    async fn list_by_status(&self, status: ReplyStatus) -> Result<Vec<ReplyRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {REPLY_COLUMNS} FROM replies WHERE status = ?1 ORDER BY updated_at ASC"
                ),
                params![status.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_by_status: {e}")))?;

        let mut records = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_record(&row) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!("Skipping reply row: {e}");
                }
            }
        }
        Ok(records)
    }

    async fn sweep_stale(
        &self,
        from: ReplyStatus,
        to: ReplyStatus,
        cutoff: DateTime<Utc>,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<Vec<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "UPDATE replies SET status = ?1, last_error = ?2, updated_at = ?3
                 WHERE status = ?4 AND updated_at < ?5
                 RETURNING review_id",
                params![
                    to.as_str(),
                    reason,
                    format_datetime(at),
                    from.as_str(),
                    format_datetime(cutoff),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("sweep_stale: {e}")))?;

        let mut moved = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            if let Ok(id) = row.get::<String>(0) {
                moved.push(id);
            }
        }
        if !moved.is_empty() {
            info!(count = moved.len(), %from, %to, reason, "Swept stale reply records");
        }
        Ok(moved)
    }
}
