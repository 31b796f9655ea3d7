//! Persistence layer — the reply ledger in libSQL.

pub mod libsql_backend;
pub mod migrations;
pub mod model;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use model::{ApprovalDraft, RecordUpdate, ReplyRecord, ReplyStatus, Reservation};
pub use traits::ReplyStore;
