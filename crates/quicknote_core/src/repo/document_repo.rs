//! SQLite-backed document store.
//!
//! # Responsibility
//! - Implement `DocumentStore` over the `documents` table.
//! - Distinguish recoverable (tombstone) and permanent deletes.
//!
//! # Invariants
//! - Every call acts for the user in `local_session` and only sees rows that
//!   user owns; another user's document reads as not found.
//! - Reads return live documents only, oldest first (`created_at`, then
//!   insertion order).
//! - Document data is always a JSON object; updates merge top-level keys.
//! - Tombstoned documents cannot be updated or soft-deleted again.

use super::identity_repo::LocalIdentityProvider;
use super::{now_epoch_ms, SharedConnection};
use crate::db::{open_db, DbResult};
use crate::model::document::{Document, DocumentList};
use crate::remote::{DocumentStore, RemoteError, RemoteResult};
use async_trait::async_trait;
use log::info;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Document store persisted in one SQLite database.
pub struct SqliteDocumentStore {
    conn: SharedConnection,
}

impl SqliteDocumentStore {
    /// Wraps a connection returned by `db::open_db*`.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        Ok(Self::new(open_db(path)?))
    }

    /// Uses the identity provider's connection, so documents follow its
    /// signed-in user.
    pub fn sharing(identity: &LocalIdentityProvider) -> Self {
        Self {
            conn: identity.connection(),
        }
    }

    /// Counts the signed-in user's rows of one collection, optionally
    /// including tombstones.
    pub fn count_documents(&self, collection: &str, include_deleted: bool) -> RemoteResult<usize> {
        let conn = self.conn.lock();
        let owner = signed_in_owner(&conn)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents
             WHERE owner_id = ?1 AND collection = ?2 AND (?3 = 1 OR is_deleted = 0);",
            params![owner, collection, include_deleted],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Clears the tombstone of a soft-deleted document.
    pub fn restore_document(&self, id: &str) -> RemoteResult<()> {
        let conn = self.conn.lock();
        let owner = signed_in_owner(&conn)?;
        let changed = conn.execute(
            "UPDATE documents SET is_deleted = 0, updated_at = ?3
             WHERE id = ?1 AND owner_id = ?2 AND is_deleted = 1;",
            params![id, owner, now_epoch_ms()],
        )?;
        if changed == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    fn read_live(&self, collection: &str) -> RemoteResult<DocumentList> {
        let conn = self.conn.lock();
        let owner = signed_in_owner(&conn)?;
        let mut stmt = conn.prepare(
            "SELECT id, data FROM documents
             WHERE owner_id = ?1 AND collection = ?2 AND is_deleted = 0
             ORDER BY created_at ASC, rowid ASC;",
        )?;
        let rows = stmt.query_map(params![owner, collection], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut documents = Vec::new();
        for row in rows {
            let (id, raw) = row?;
            let data = parse_data(&id, &raw)?;
            documents.push(Document { id, data });
        }
        Ok(DocumentList { documents })
    }

    fn insert(&self, collection: &str, data: Value) -> RemoteResult<Document> {
        if !data.is_object() {
            return Err(RemoteError::InvalidRequest(
                "document data must be a JSON object".to_string(),
            ));
        }

        let conn = self.conn.lock();
        let owner = signed_in_owner(&conn)?;
        let id = Uuid::new_v4().to_string();
        let now = now_epoch_ms();
        conn.execute(
            "INSERT INTO documents
                (id, owner_id, collection, data, created_at, updated_at, is_deleted)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5, 0);",
            params![id, owner, collection, encode_data(&data)?, now],
        )?;
        Ok(Document { id, data })
    }

    fn merge(&self, id: &str, patch: Value) -> RemoteResult<Document> {
        let conn = self.conn.lock();
        let owner = signed_in_owner(&conn)?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT data FROM documents
                 WHERE id = ?1 AND owner_id = ?2 AND is_deleted = 0;",
                params![id, owner],
                |row| row.get(0),
            )
            .optional()?;
        let Some(raw) = raw else {
            return Err(not_found(id));
        };

        let mut data = parse_data(id, &raw)?;
        match (&mut data, patch) {
            (Value::Object(target), Value::Object(fields)) => {
                for (key, value) in fields {
                    target.insert(key, value);
                }
            }
            _ => {
                return Err(RemoteError::InvalidRequest(
                    "update patch must be a JSON object".to_string(),
                ))
            }
        }

        conn.execute(
            "UPDATE documents SET data = ?3, updated_at = ?4 WHERE id = ?1 AND owner_id = ?2;",
            params![id, owner, encode_data(&data)?, now_epoch_ms()],
        )?;
        Ok(Document {
            id: id.to_string(),
            data,
        })
    }

    fn remove(&self, id: &str, permanent: bool) -> RemoteResult<()> {
        let conn = self.conn.lock();
        let owner = signed_in_owner(&conn)?;
        let changed = if permanent {
            conn.execute(
                "DELETE FROM documents WHERE id = ?1 AND owner_id = ?2;",
                params![id, owner],
            )?
        } else {
            conn.execute(
                "UPDATE documents SET is_deleted = 1, updated_at = ?3
                 WHERE id = ?1 AND owner_id = ?2 AND is_deleted = 0;",
                params![id, owner, now_epoch_ms()],
            )?
        };
        if changed == 0 {
            return Err(not_found(id));
        }
        info!(
            "event=document_delete module=repo status=ok document_id={} permanent={}",
            id, permanent
        );
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn read_documents(&self, collection: &str) -> RemoteResult<DocumentList> {
        self.read_live(collection)
    }

    async fn create_document(&self, collection: &str, data: Value) -> RemoteResult<Document> {
        self.insert(collection, data)
    }

    async fn update_document(&self, id: &str, patch: Value) -> RemoteResult<Document> {
        self.merge(id, patch)
    }

    async fn delete_document(&self, id: &str, permanent: bool) -> RemoteResult<()> {
        self.remove(id, permanent)
    }
}

/// User id of the persisted local session.
fn signed_in_owner(conn: &Connection) -> RemoteResult<String> {
    conn.query_row(
        "SELECT user_id FROM local_session WHERE slot = 1;",
        [],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| RemoteError::Unauthorized("no active session".to_string()))
}

fn parse_data(id: &str, raw: &str) -> RemoteResult<Value> {
    serde_json::from_str(raw).map_err(|err| {
        RemoteError::Storage(format!("document `{id}` holds invalid json: {err}"))
    })
}

fn encode_data(data: &Value) -> RemoteResult<String> {
    serde_json::to_string(data).map_err(|err| RemoteError::Storage(err.to_string()))
}

fn not_found(id: &str) -> RemoteError {
    RemoteError::NotFound(format!("document `{id}`"))
}
