//! Core logic for QuickNote.
//! Owns the session state machine and the note synchronization protocol;
//! presentation layers only render its snapshots and forward intents.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod remote;
pub mod repo;
pub mod service;
pub mod sync;

pub use config::{ClientConfig, ConfigError};
pub use logging::{default_log_level, init_logging, log_dir_for, logging_status};
pub use model::document::{Document, DocumentList};
pub use model::note::{DraftPatch, EditDraft, Note, NoteDecodeError, NoteDraft, NoteId};
pub use model::session::{Session, SessionSnapshot, SessionStatus, UserIdentity};
pub use model::validation::ValidationError;
pub use remote::credential::FileCredentialStore;
pub use remote::http::HttpBackend;
pub use remote::{DocumentStore, IdentityProvider, RemoteError, RemoteResult};
pub use repo::document_repo::SqliteDocumentStore;
pub use repo::identity_repo::{CodeDelivery, LocalIdentityProvider};
pub use service::session_manager::{SessionError, SessionManager};
pub use sync::note_sync::{NoteList, NoteSynchronizer, SyncError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
