//! Note collection synchronizer.
//!
//! # Responsibility
//! - Hold the cached note collection and the create/edit drafts.
//! - Send create/update/delete to the document store and reload the
//!   collection from the store after each successful mutation.
//!
//! # Invariants
//! - The cache is replaced wholesale; readers never see a partial list.
//! - A failed load keeps the previous cache.
//! - Mutations (including their reload) run one at a time, and each checks
//!   the session only after it holds the mutation gate.
//! - Each load takes a ticket; a response older than the last applied one is
//!   discarded.
//! - A response that arrives after the session left the `Authenticated`
//!   generation it started under is discarded. Drafts started under the
//!   current generation survive it.
//! - `active_note_id` refers to a cached note or is `None`.
//! - Deletes always request the recoverable variant (`permanent = false`).

use crate::model::note::{DraftPatch, EditDraft, Note, NoteDecodeError, NoteDraft, NoteId};
use crate::model::session::SessionSnapshot;
use crate::model::validation::ValidationError;
use crate::remote::{DocumentStore, RemoteError};
use chrono::Utc;
use log::{info, warn};
use parking_lot::RwLock;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Mutex};

/// Synchronizer operation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    Validation(ValidationError),
    /// No authenticated session; nothing was sent.
    NotAuthenticated,
    /// Note id is not in the cached collection.
    NoteNotFound(NoteId),
    NoEditDraft,
    NoCreateDraft,
    /// Store returned a document that is not a note.
    InvalidDocument(NoteDecodeError),
    Remote(RemoteError),
    /// A newer load was applied first; this response was dropped.
    Superseded,
    /// Session changed while the request was in flight; response dropped.
    SessionChanged,
    /// The mutation was applied remotely but the follow-up reload failed.
    Reload(Box<SyncError>),
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotAuthenticated => write!(f, "sign in first"),
            Self::NoteNotFound(id) => write!(f, "note not found: {id}"),
            Self::NoEditDraft => write!(f, "no note is being edited"),
            Self::NoCreateDraft => write!(f, "no new note is being composed"),
            Self::InvalidDocument(err) => write!(f, "{err}"),
            Self::Remote(err) => write!(f, "{err}"),
            Self::Superseded => write!(f, "a newer reload already updated the notes"),
            Self::SessionChanged => write!(f, "session changed while the request was in flight"),
            Self::Reload(err) => write!(f, "saved, but refreshing the notes failed: {err}"),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::InvalidDocument(err) => Some(err),
            Self::Remote(err) => Some(err),
            Self::Reload(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<ValidationError> for SyncError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<RemoteError> for SyncError {
    fn from(value: RemoteError) -> Self {
        Self::Remote(value)
    }
}

impl From<NoteDecodeError> for SyncError {
    fn from(value: NoteDecodeError) -> Self {
        Self::InvalidDocument(value)
    }
}

/// Shared, immutable view of the cached collection.
pub type NoteList = Arc<Vec<Note>>;

#[derive(Default)]
struct CollectionState {
    notes: NoteList,
    /// Ticket of the last applied load.
    applied_ticket: u64,
    /// Session generation the cache was loaded under.
    loaded_generation: Option<u64>,
    create_draft: Option<NoteDraft>,
    /// Session generation the create draft was started under.
    create_generation: Option<u64>,
    edit_draft: Option<EditDraft>,
}

/// Owner of the local note cache for one store collection.
pub struct NoteSynchronizer {
    store: Arc<dyn DocumentStore>,
    session: watch::Receiver<SessionSnapshot>,
    collection: String,
    state: RwLock<CollectionState>,
    mutation_gate: Mutex<()>,
    next_ticket: AtomicU64,
}

impl NoteSynchronizer {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        session: watch::Receiver<SessionSnapshot>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            store,
            session,
            collection: collection.into(),
            state: RwLock::new(CollectionState::default()),
            mutation_gate: Mutex::new(()),
            next_ticket: AtomicU64::new(0),
        }
    }

    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    /// Current cached collection, in store order.
    pub fn notes(&self) -> NoteList {
        Arc::clone(&self.state.read().notes)
    }

    pub fn note(&self, id: &NoteId) -> Option<Note> {
        self.state
            .read()
            .notes
            .iter()
            .find(|note| &note.id == id)
            .cloned()
    }

    pub fn create_draft(&self) -> Option<NoteDraft> {
        self.state.read().create_draft.clone()
    }

    pub fn edit_draft(&self) -> Option<EditDraft> {
        self.state.read().edit_draft.clone()
    }

    pub fn active_note_id(&self) -> Option<NoteId> {
        self.state
            .read()
            .edit_draft
            .as_ref()
            .map(|draft| draft.note_id.clone())
    }

    /// Drops the cache and both drafts.
    pub fn reset(&self) {
        let mut state = self.state.write();
        state.notes = NoteList::default();
        state.loaded_generation = None;
        state.create_draft = None;
        state.create_generation = None;
        state.edit_draft = None;
    }

    /// Fetches the collection and replaces the cache.
    ///
    /// # Errors
    /// - `NotAuthenticated` before any request.
    /// - `Remote`/`InvalidDocument` with the previous cache left in place.
    /// - `Superseded`/`SessionChanged` when the response is discarded.
    pub async fn load(&self) -> Result<NoteList, SyncError> {
        let generation = self.authenticated_generation()?;
        let ticket = self.next_ticket.fetch_add(1, Ordering::SeqCst) + 1;
        let started_at = Instant::now();
        info!(
            "event=notes_load module=sync status=start ticket={}",
            ticket
        );

        let response = self.store.read_documents(&self.collection).await;
        self.ensure_same_session(generation)?;
        let documents = response.map_err(|err| {
            warn!(
                "event=notes_load module=sync status=error ticket={} duration_ms={} error_code={} error={}",
                ticket,
                started_at.elapsed().as_millis(),
                err.code(),
                err
            );
            SyncError::Remote(err)
        })?;

        let notes = documents
            .documents
            .iter()
            .map(Note::from_document)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| {
                warn!(
                    "event=notes_load module=sync status=error ticket={} error_code=invalid_document document_id={}",
                    ticket, err.document_id
                );
                SyncError::InvalidDocument(err)
            })?;

        let mut state = self.state.write();
        if ticket < state.applied_ticket {
            info!(
                "event=notes_load module=sync status=discarded ticket={} applied_ticket={}",
                ticket, state.applied_ticket
            );
            return Err(SyncError::Superseded);
        }
        state.applied_ticket = ticket;
        state.notes = Arc::new(notes);
        state.loaded_generation = Some(generation);
        let edit_target_gone = state
            .edit_draft
            .as_ref()
            .is_some_and(|draft| !state.notes.iter().any(|note| note.id == draft.note_id));
        if edit_target_gone {
            state.edit_draft = None;
        }

        info!(
            "event=notes_load module=sync status=ok ticket={} count={} duration_ms={}",
            ticket,
            state.notes.len(),
            started_at.elapsed().as_millis()
        );
        Ok(Arc::clone(&state.notes))
    }

    /// Starts composing a new note, keeping an existing draft if present.
    pub fn begin_create(&self) -> NoteDraft {
        let generation = self.session.borrow().authenticated_generation();
        let mut state = self.state.write();
        if state.create_draft.is_none() {
            state.create_generation = generation;
        }
        state
            .create_draft
            .get_or_insert_with(NoteDraft::default)
            .clone()
    }

    pub fn update_create_draft(&self, patch: &DraftPatch) -> Result<NoteDraft, SyncError> {
        let mut state = self.state.write();
        let draft = state.create_draft.as_mut().ok_or(SyncError::NoCreateDraft)?;
        draft.apply(patch);
        Ok(draft.clone())
    }

    /// Discards the create draft, returning it.
    pub fn cancel_create(&self) -> Option<NoteDraft> {
        let mut state = self.state.write();
        state.create_generation = None;
        state.create_draft.take()
    }

    /// Submits the held create draft.
    pub async fn submit_create(&self) -> Result<NoteList, SyncError> {
        let draft = self.create_draft().ok_or(SyncError::NoCreateDraft)?;
        self.create(draft).await
    }

    /// Creates a note and reloads the collection.
    ///
    /// Blank titles are rejected locally. On success the held create draft is
    /// cleared if it is the one submitted; on failure it is left for a retry.
    pub async fn create(&self, draft: NoteDraft) -> Result<NoteList, SyncError> {
        draft.validate()?;
        let _gate = self.mutation_gate.lock().await;
        let generation = self.authenticated_generation()?;

        let response = self
            .store
            .create_document(&self.collection, draft.create_payload(Utc::now()))
            .await;
        self.ensure_same_session(generation)?;
        let created = response.map_err(|err| log_mutation_error("note_create", err))?;

        {
            let mut state = self.state.write();
            if state.create_draft.as_ref() == Some(&draft) {
                state.create_draft = None;
                state.create_generation = None;
            }
        }
        info!(
            "event=note_create module=sync status=ok document_id={}",
            created.id
        );
        self.reload_after_mutation().await
    }

    /// Puts one cached note into edit mode, replacing any other edit draft.
    pub fn begin_edit(&self, note_id: &NoteId) -> Result<EditDraft, SyncError> {
        let mut state = self.state.write();
        let draft = state
            .notes
            .iter()
            .find(|note| &note.id == note_id)
            .map(EditDraft::from_note)
            .ok_or_else(|| SyncError::NoteNotFound(note_id.clone()))?;
        state.edit_draft = Some(draft.clone());
        Ok(draft)
    }

    pub fn update_edit_draft(&self, patch: &DraftPatch) -> Result<EditDraft, SyncError> {
        let mut state = self.state.write();
        let draft = state.edit_draft.as_mut().ok_or(SyncError::NoEditDraft)?;
        draft.apply(patch);
        Ok(draft.clone())
    }

    /// Leaves edit mode without saving, returning the discarded draft.
    pub fn cancel_edit(&self) -> Option<EditDraft> {
        self.state.write().edit_draft.take()
    }

    /// Saves the edit draft and reloads the collection.
    ///
    /// On failure the draft stays open for a retry or cancel.
    pub async fn commit_edit(&self) -> Result<NoteList, SyncError> {
        let _gate = self.mutation_gate.lock().await;
        let generation = self.authenticated_generation()?;
        let draft = self.edit_draft().ok_or(SyncError::NoEditDraft)?;
        draft.validate()?;

        let response = self
            .store
            .update_document(draft.note_id.as_str(), draft.update_payload())
            .await;
        self.ensure_same_session(generation)?;
        response.map_err(|err| log_mutation_error("note_update", err))?;

        {
            let mut state = self.state.write();
            if state
                .edit_draft
                .as_ref()
                .is_some_and(|current| current.note_id == draft.note_id)
            {
                state.edit_draft = None;
            }
        }
        info!(
            "event=note_update module=sync status=ok document_id={}",
            draft.note_id
        );
        self.reload_after_mutation().await
    }

    /// Soft-deletes a note and reloads the collection.
    ///
    /// Confirmation is the caller's responsibility.
    pub async fn delete(&self, note_id: &NoteId) -> Result<NoteList, SyncError> {
        let _gate = self.mutation_gate.lock().await;
        let generation = self.authenticated_generation()?;

        let response = self.store.delete_document(note_id.as_str(), false).await;
        self.ensure_same_session(generation)?;
        response.map_err(|err| log_mutation_error("note_delete", err))?;

        {
            let mut state = self.state.write();
            if state
                .edit_draft
                .as_ref()
                .is_some_and(|current| &current.note_id == note_id)
            {
                state.edit_draft = None;
            }
        }
        info!(
            "event=note_delete module=sync status=ok document_id={} permanent=false",
            note_id
        );
        self.reload_after_mutation().await
    }

    async fn reload_after_mutation(&self) -> Result<NoteList, SyncError> {
        match self.load().await {
            Ok(notes) => Ok(notes),
            // A later load already refreshed the cache past this mutation.
            Err(SyncError::Superseded) => Ok(self.notes()),
            Err(SyncError::SessionChanged) => Err(SyncError::SessionChanged),
            Err(err) => Err(SyncError::Reload(Box::new(err))),
        }
    }

    fn authenticated_generation(&self) -> Result<u64, SyncError> {
        self.session
            .borrow()
            .authenticated_generation()
            .ok_or(SyncError::NotAuthenticated)
    }

    /// Fails with `SessionChanged` unless the session is still authenticated
    /// under `generation`. Cache and drafts that belong to another session are
    /// cleared.
    fn ensure_same_session(&self, generation: u64) -> Result<(), SyncError> {
        let current = self.session.borrow().authenticated_generation();
        if current == Some(generation) {
            return Ok(());
        }

        let mut state = self.state.write();
        if current.is_none() || state.loaded_generation != current {
            // An edit draft always points into the cache it was started from.
            state.notes = NoteList::default();
            state.loaded_generation = None;
            state.edit_draft = None;
        }
        if current.is_none() || state.create_generation != current {
            state.create_draft = None;
            state.create_generation = None;
        }
        warn!(
            "event=session_fence module=sync status=discarded started_generation={}",
            generation
        );
        Err(SyncError::SessionChanged)
    }
}

fn log_mutation_error(event: &str, err: RemoteError) -> SyncError {
    warn!(
        "event={} module=sync status=error error_code={} error={}",
        event,
        err.code(),
        err
    );
    SyncError::Remote(err)
}
