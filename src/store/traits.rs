//! `ReplyStore` trait — single async interface for the reply ledger.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;
use crate::store::model::{RecordUpdate, ReplyRecord, ReplyStatus, Reservation};

/// Backend-agnostic reply ledger.
///
/// The `review_id` uniqueness constraint is what makes the service safe
/// against webhook redelivery, so implementations must enforce it in
/// storage rather than in process memory.
#[async_trait]
pub trait ReplyStore: Send + Sync {
    /// Create tables and apply pending migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    /// Insert the record unless its review id is already present.
    ///
    /// Exactly one concurrent caller per review id gets `Fresh`.
    async fn reserve(&self, record: &ReplyRecord) -> Result<Reservation, DatabaseError>;

    /// Look up a record by review id.
    async fn get(&self, review_id: &str) -> Result<Option<ReplyRecord>, DatabaseError>;

    /// Move a record from `from` to `to`, applying `update`.
    ///
    /// Compare-and-set on status: returns `false` (and changes nothing) if
    /// the record is missing or not currently in `from`.
    async fn transition(
        &self,
        review_id: &str,
        from: ReplyStatus,
        to: ReplyStatus,
        update: &RecordUpdate,
        at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;

    /// All records in a status, oldest first.
    async fn list_by_status(&self, status: ReplyStatus) -> Result<Vec<ReplyRecord>, DatabaseError>;

    /// Move records sitting in `from` since before `cutoff` to `to`,
    /// recording `reason` as the last error. Returns the review ids moved.
    async fn sweep_stale(
        &self,
        from: ReplyStatus,
        to: ReplyStatus,
        cutoff: DateTime<Utc>,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<Vec<String>, DatabaseError>;
}
