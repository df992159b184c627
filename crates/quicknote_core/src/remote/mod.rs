//! Collaborator contracts and remote implementations.
//!
//! # Responsibility
//! - Define the identity and document-store seams the core talks through.
//! - Provide the REST implementation and its credential persistence.
//!
//! # Invariants
//! - Collaborators scope reads/writes to the signed-in user themselves; the
//!   core never passes a user id.
//! - Every collaborator failure is a recoverable `RemoteError`.

pub mod credential;
pub mod http;

use crate::model::document::{Document, DocumentList};
use crate::model::session::UserIdentity;
use async_trait::async_trait;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Failure reported by a collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Request never produced a response (connect, timeout, TLS).
    Transport(String),
    /// Credentials missing, expired, or code rejected.
    Unauthorized(String),
    /// Target document or session does not exist.
    NotFound(String),
    /// Provider refused because of request frequency.
    RateLimited,
    /// Request payload was refused as malformed.
    InvalidRequest(String),
    /// Any other non-success status.
    Rejected { status: u16, message: String },
    /// Response body did not match the expected shape.
    InvalidResponse(String),
    /// Local persistence used by a collaborator failed.
    Storage(String),
}

impl Display for RemoteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(message) => write!(f, "network error: {message}"),
            Self::Unauthorized(message) => write!(f, "unauthorized: {message}"),
            Self::NotFound(what) => write!(f, "not found: {what}"),
            Self::RateLimited => write!(f, "too many requests, try again later"),
            Self::InvalidRequest(message) => write!(f, "invalid request: {message}"),
            Self::Rejected { status, message } => {
                write!(f, "request rejected with status {status}: {message}")
            }
            Self::InvalidResponse(message) => write!(f, "invalid response: {message}"),
            Self::Storage(message) => write!(f, "storage error: {message}"),
        }
    }
}

impl Error for RemoteError {}

impl RemoteError {
    /// Stable short code used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Unauthorized(_) => "unauthorized",
            Self::NotFound(_) => "not_found",
            Self::RateLimited => "rate_limited",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Rejected { .. } => "rejected",
            Self::InvalidResponse(_) => "invalid_response",
            Self::Storage(_) => "storage",
        }
    }
}

/// Passwordless identity collaborator.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Sends a one-time code to `email`.
    async fn request_code(&self, email: &str) -> RemoteResult<()>;
    /// Exchanges `email` + `code` for an authenticated user and persists the
    /// resulting credential.
    async fn verify_code(&self, email: &str, code: &str) -> RemoteResult<UserIdentity>;
    /// Returns the user of a still-valid persisted credential, if any.
    async fn persisted_session(&self) -> RemoteResult<Option<UserIdentity>>;
    /// Invalidates the persisted credential.
    async fn clear_persisted_session(&self) -> RemoteResult<()>;
}

/// Remote document-store collaborator.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn read_documents(&self, collection: &str) -> RemoteResult<DocumentList>;
    async fn create_document(&self, collection: &str, data: Value) -> RemoteResult<Document>;
    /// Applies `patch` to the document's data and returns the stored result.
    async fn update_document(&self, id: &str, patch: Value) -> RemoteResult<Document>;
    /// Deletes a document; `permanent = false` requests a recoverable delete.
    async fn delete_document(&self, id: &str, permanent: bool) -> RemoteResult<()>;
}
