//! Self-hosted collaborator implementations over SQLite.
//!
//! # Responsibility
//! - Provide a document store and an identity provider that need no remote
//!   service, for local use and end-to-end tests.
//! - Keep SQL details behind the collaborator traits.
//!
//! # Invariants
//! - SQLite failures surface as `RemoteError::Storage`, never as panics.
//! - Deletion without `permanent` leaves a tombstone row.
//! - Documents belong to the user in `local_session`; without a session row
//!   every document call is `Unauthorized`.

pub mod document_repo;
pub mod identity_repo;

use crate::db::DbError;
use crate::remote::RemoteError;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::sync::Arc;

/// Connection shared by the local identity provider and document store.
pub(crate) type SharedConnection = Arc<Mutex<Connection>>;

impl From<rusqlite::Error> for RemoteError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Storage(value.to_string())
    }
}

impl From<DbError> for RemoteError {
    fn from(value: DbError) -> Self {
        Self::Storage(value.to_string())
    }
}

fn now_epoch_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
