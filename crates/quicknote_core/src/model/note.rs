//! Note model, drafts and document decoding.
//!
//! # Responsibility
//! - Decode store documents into typed `Note` values.
//! - Own the transient create/edit drafts and their payload shapes.
//!
//! # Invariants
//! - A note title must be non-empty after trimming when it is sent to the store.
//! - Decoding never masks malformed documents; it returns `NoteDecodeError`.
//! - Payload keys follow the store schema: `title`, `content`, `createdAt`.

use crate::model::document::Document;
use crate::model::validation::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Opaque store-assigned note identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(String);

impl NoteId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for NoteId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NoteId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for NoteId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Cached read-only copy of one stored note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub id: NoteId,
    pub title: String,
    pub content: String,
    /// Timestamp assigned at creation, as stored (not as drafted locally).
    pub created_at: DateTime<Utc>,
}

/// Document payload as persisted by the store.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotePayload {
    title: String,
    #[serde(default)]
    content: String,
    created_at: DateTime<Utc>,
}

impl Note {
    /// Decodes one store document into a note.
    ///
    /// # Errors
    /// - Returns `NoteDecodeError` when `data` misses `title`/`createdAt` or
    ///   carries values of the wrong type.
    pub fn from_document(document: &Document) -> Result<Self, NoteDecodeError> {
        let payload: NotePayload =
            serde_json::from_value(document.data.clone()).map_err(|err| NoteDecodeError {
                document_id: document.id.clone(),
                reason: err.to_string(),
            })?;

        Ok(Self {
            id: NoteId::new(document.id.clone()),
            title: payload.title,
            content: payload.content,
            created_at: payload.created_at,
        })
    }
}

/// A store document that does not carry a valid note payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteDecodeError {
    pub document_id: String,
    pub reason: String,
}

impl Display for NoteDecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "document `{}` is not a valid note: {}",
            self.document_id, self.reason
        )
    }
}

impl Error for NoteDecodeError {}

/// Partial field update for a draft. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DraftPatch {
    pub title: Option<String>,
    pub content: Option<String>,
}

impl DraftPatch {
    pub fn title(value: impl Into<String>) -> Self {
        Self {
            title: Some(value.into()),
            content: None,
        }
    }

    pub fn content(value: impl Into<String>) -> Self {
        Self {
            title: None,
            content: Some(value.into()),
        }
    }
}

/// Unsaved input for a note being created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteDraft {
    pub title: String,
    pub content: String,
}

impl NoteDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_title(&self.title)
    }

    pub fn apply(&mut self, patch: &DraftPatch) {
        apply_patch(&mut self.title, &mut self.content, patch);
    }

    /// Builds the create payload stamped with `created_at`.
    ///
    /// The store may normalize the stamp; the cached value always comes from
    /// the reload that follows.
    pub fn create_payload(&self, created_at: DateTime<Utc>) -> Value {
        json!({
            "title": self.title,
            "content": self.content,
            "createdAt": created_at,
        })
    }
}

/// Unsaved edits for the single note in edit mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditDraft {
    pub note_id: NoteId,
    pub title: String,
    pub content: String,
}

impl EditDraft {
    /// Seeds a draft from the cached note.
    pub fn from_note(note: &Note) -> Self {
        Self {
            note_id: note.id.clone(),
            title: note.title.clone(),
            content: note.content.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_title(&self.title)
    }

    pub fn apply(&mut self, patch: &DraftPatch) {
        apply_patch(&mut self.title, &mut self.content, patch);
    }

    /// Builds the update patch. `createdAt` is never rewritten.
    pub fn update_payload(&self) -> Value {
        json!({
            "title": self.title,
            "content": self.content,
        })
    }
}

fn validate_title(title: &str) -> Result<(), ValidationError> {
    if title.trim().is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    Ok(())
}

fn apply_patch(title: &mut String, content: &mut String, patch: &DraftPatch) {
    if let Some(value) = &patch.title {
        title.clone_from(value);
    }
    if let Some(value) = &patch.content {
        content.clone_from(value);
    }
}
