//! Client-side domain model for notes and sessions.
//!
//! # Responsibility
//! - Define the shapes the core caches and exposes to presentation.
//! - Keep local validation rules (title, email, code) next to the data.
//!
//! # Invariants
//! - Notes are read-only copies of store documents; identity is `NoteId`.
//! - Session variants carry exactly the data valid in that state.

pub mod document;
pub mod note;
pub mod session;
pub mod validation;
