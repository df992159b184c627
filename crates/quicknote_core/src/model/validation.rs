//! Local validation errors.
//!
//! Every variant is raised before any collaborator call is made.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Input rejected locally, without touching the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Email address is not syntactically valid.
    InvalidEmail(String),
    /// Verification email differs from the address the code was sent to.
    EmailMismatch { pending: String, provided: String },
    /// Verification code is blank.
    EmptyCode,
    /// Note title is blank after trimming.
    EmptyTitle,
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidEmail(value) => write!(f, "invalid email address: `{value}`"),
            Self::EmailMismatch { pending, provided } => write!(
                f,
                "code was sent to `{pending}`, not `{provided}`"
            ),
            Self::EmptyCode => write!(f, "verification code cannot be empty"),
            Self::EmptyTitle => write!(f, "note title cannot be empty"),
        }
    }
}

impl Error for ValidationError {}
