//! Session and identity model.
//!
//! # Responsibility
//! - Describe the authentication lifecycle observed by presentation.
//! - Normalize and check email input before it reaches the identity provider.
//!
//! # Invariants
//! - A pending email exists only in `Session::OtpPending`.
//! - A user exists only in `Session::Authenticated`.
//! - `SessionSnapshot::generation` changes whenever the session enters or
//!   leaves `Authenticated`.

use crate::model::validation::ValidationError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex")
});

/// Authenticated user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    pub email: String,
}

/// Authentication state machine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Session {
    #[default]
    Anonymous,
    /// A code was sent to `email` and awaits verification.
    OtpPending { email: String },
    Authenticated { user: UserIdentity },
}

/// Discriminant of `Session`, used in errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Anonymous,
    OtpPending,
    Authenticated,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::OtpPending => "otp_pending",
            Self::Authenticated => "authenticated",
        }
    }
}

impl Display for SessionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Session {
    pub fn status(&self) -> SessionStatus {
        match self {
            Self::Anonymous => SessionStatus::Anonymous,
            Self::OtpPending { .. } => SessionStatus::OtpPending,
            Self::Authenticated { .. } => SessionStatus::Authenticated,
        }
    }

    pub fn pending_email(&self) -> Option<&str> {
        match self {
            Self::OtpPending { email } => Some(email.as_str()),
            _ => None,
        }
    }

    pub fn user(&self) -> Option<&UserIdentity> {
        match self {
            Self::Authenticated { user } => Some(user),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }
}

/// Observable session state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub session: Session,
    /// Bumped on every transition into or out of `Authenticated`.
    pub generation: u64,
    /// `true` once startup restore has resolved, successfully or not.
    pub ready: bool,
}

impl SessionSnapshot {
    /// Returns the generation when authenticated.
    pub fn authenticated_generation(&self) -> Option<u64> {
        self.session.is_authenticated().then_some(self.generation)
    }
}

/// Trims and syntax-checks an email address.
///
/// Only shape is checked here; deliverability is the provider's concern.
pub fn normalize_email(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if !EMAIL_RE.is_match(trimmed) {
        return Err(ValidationError::InvalidEmail(trimmed.to_string()));
    }
    Ok(trimmed.to_string())
}

/// Compares two addresses the way verification does: trimmed, ASCII
/// case-insensitive.
pub fn emails_match(left: &str, right: &str) -> bool {
    left.trim().eq_ignore_ascii_case(right.trim())
}
