//! Document synchronization between the local note cache and the store.
//!
//! # See also
//! - `service::session_manager` for the session this module is fenced on.

pub mod note_sync;
