//! Core use-case services.
//!
//! # Responsibility
//! - Own authentication state and expose it to presentation as snapshots.
//! - Keep presentation decoupled from identity-provider details.

pub mod session_manager;
