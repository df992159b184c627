//! Passwordless session lifecycle.
//!
//! # Responsibility
//! - Drive `Anonymous -> OtpPending -> Authenticated -> Anonymous`.
//! - Publish every transition as a `SessionSnapshot` on a watch channel.
//!
//! # Invariants
//! - Operations called from the wrong state return `InvalidState` and leave
//!   the session untouched.
//! - A failed collaborator call never changes state; the pending email is
//!   kept so the user can retry.
//! - `verify_code` only accepts the email the code was sent to (compared
//!   trimmed and ASCII case-insensitive); a mismatch fails locally.
//! - Operations are serialized: each one decides on the state left by the
//!   previous one.

use crate::model::session::{
    emails_match, normalize_email, Session, SessionSnapshot, SessionStatus, UserIdentity,
};
use crate::model::validation::ValidationError;
use crate::remote::{IdentityProvider, RemoteError};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

/// Session operation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    Validation(ValidationError),
    /// Operation is not valid from the current state.
    InvalidState {
        operation: &'static str,
        state: SessionStatus,
    },
    Remote(RemoteError),
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::InvalidState { operation, state } => {
                write!(f, "`{operation}` is not allowed while {state}")
            }
            Self::Remote(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Remote(err) => Some(err),
            Self::InvalidState { .. } => None,
        }
    }
}

impl From<ValidationError> for SessionError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<RemoteError> for SessionError {
    fn from(value: RemoteError) -> Self {
        Self::Remote(value)
    }
}

/// Owner of the current session.
pub struct SessionManager {
    identity: Arc<dyn IdentityProvider>,
    state: watch::Sender<SessionSnapshot>,
    gate: Mutex<()>,
}

impl SessionManager {
    /// Creates an `Anonymous`, not-yet-ready session.
    pub fn new(identity: Arc<dyn IdentityProvider>) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::default());
        Self {
            identity,
            state,
            gate: Mutex::new(()),
        }
    }

    /// Returns a copy of the current snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn session(&self) -> Session {
        self.state.borrow().session.clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.state.borrow().session.status()
    }

    pub fn current_user(&self) -> Option<UserIdentity> {
        self.state.borrow().session.user().cloned()
    }

    /// `true` once `restore()` has resolved.
    pub fn is_ready(&self) -> bool {
        self.state.borrow().ready
    }

    /// Subscribes to session snapshots.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    /// Sends a one-time code and moves to `OtpPending(email)`.
    ///
    /// # Errors
    /// - `InvalidState` unless `Anonymous`.
    /// - `Validation(InvalidEmail)` for a malformed address (no network call).
    /// - `Remote` when delivery fails; the session stays `Anonymous`.
    pub async fn request_code(&self, email: &str) -> Result<(), SessionError> {
        let _gate = self.gate.lock().await;
        self.require(SessionStatus::Anonymous, "request_code")?;
        let email = normalize_email(email)?;

        info!("event=otp_request module=session status=start");
        match self.identity.request_code(&email).await {
            Ok(()) => {
                self.transition(Session::OtpPending { email });
                info!("event=otp_request module=session status=ok");
                Ok(())
            }
            Err(err) => {
                warn!(
                    "event=otp_request module=session status=error error_code={} error={}",
                    err.code(),
                    err
                );
                Err(err.into())
            }
        }
    }

    /// Verifies the code sent to the pending email.
    ///
    /// # Errors
    /// - `InvalidState` unless `OtpPending`.
    /// - `Validation(EmailMismatch | EmptyCode)` without a network call.
    /// - `Remote` for a wrong or expired code; the session stays `OtpPending`.
    pub async fn verify_code(&self, email: &str, code: &str) -> Result<UserIdentity, SessionError> {
        let _gate = self.gate.lock().await;
        let pending = self
            .state
            .borrow()
            .session
            .pending_email()
            .map(str::to_string);
        let Some(pending) = pending else {
            return Err(self.invalid_state("verify_code"));
        };
        if !emails_match(&pending, email) {
            return Err(ValidationError::EmailMismatch {
                pending,
                provided: email.trim().to_string(),
            }
            .into());
        }
        let code = code.trim();
        if code.is_empty() {
            return Err(ValidationError::EmptyCode.into());
        }

        info!("event=otp_verify module=session status=start");
        match self.identity.verify_code(&pending, code).await {
            Ok(user) => {
                self.transition(Session::Authenticated { user: user.clone() });
                info!(
                    "event=otp_verify module=session status=ok user_id={}",
                    user.id
                );
                Ok(user)
            }
            Err(err) => {
                warn!(
                    "event=otp_verify module=session status=error error_code={} error={}",
                    err.code(),
                    err
                );
                Err(err.into())
            }
        }
    }

    /// Abandons the pending code and returns to `Anonymous`.
    pub async fn cancel_pending(&self) -> Result<(), SessionError> {
        let _gate = self.gate.lock().await;
        self.require(SessionStatus::OtpPending, "cancel_pending")?;
        self.transition(Session::Anonymous);
        info!("event=otp_cancel module=session status=ok");
        Ok(())
    }

    /// Signs out from any state and invalidates the persisted credential.
    ///
    /// The in-memory session is `Anonymous` even when clearing the persisted
    /// credential fails; that failure is still returned.
    pub async fn logout(&self) -> Result<(), SessionError> {
        let _gate = self.gate.lock().await;
        let previous = self.status();
        self.transition(Session::Anonymous);

        match self.identity.clear_persisted_session().await {
            Ok(()) => {
                info!(
                    "event=logout module=session status=ok previous_state={}",
                    previous
                );
                Ok(())
            }
            Err(err) => {
                warn!(
                    "event=logout module=session status=error error_code={} error={}",
                    err.code(),
                    err
                );
                Err(err.into())
            }
        }
    }

    /// Resumes a persisted session at startup.
    ///
    /// Marks the session ready in every outcome. Returns the restored user,
    /// or `None` when no valid credential exists.
    pub async fn restore(&self) -> Result<Option<UserIdentity>, SessionError> {
        let _gate = self.gate.lock().await;
        if let Err(err) = self.require(SessionStatus::Anonymous, "restore") {
            self.mark_ready();
            return Err(err);
        }

        info!("event=session_restore module=session status=start");
        match self.identity.persisted_session().await {
            Ok(Some(user)) => {
                self.state.send_modify(|snapshot| {
                    snapshot.session = Session::Authenticated { user: user.clone() };
                    snapshot.generation += 1;
                    snapshot.ready = true;
                });
                info!(
                    "event=session_restore module=session status=ok restored=true user_id={}",
                    user.id
                );
                Ok(Some(user))
            }
            Ok(None) => {
                self.mark_ready();
                info!("event=session_restore module=session status=ok restored=false");
                Ok(None)
            }
            Err(err) => {
                self.mark_ready();
                warn!(
                    "event=session_restore module=session status=error error_code={} error={}",
                    err.code(),
                    err
                );
                Err(err.into())
            }
        }
    }

    fn require(&self, expected: SessionStatus, operation: &'static str) -> Result<(), SessionError> {
        if self.status() == expected {
            Ok(())
        } else {
            Err(self.invalid_state(operation))
        }
    }

    fn invalid_state(&self, operation: &'static str) -> SessionError {
        SessionError::InvalidState {
            operation,
            state: self.status(),
        }
    }

    fn transition(&self, next: Session) {
        self.state.send_modify(|snapshot| {
            if snapshot.session.is_authenticated() != next.is_authenticated() {
                snapshot.generation += 1;
            }
            snapshot.session = next;
        });
    }

    fn mark_ready(&self) {
        self.state.send_if_modified(|snapshot| {
            let changed = !snapshot.ready;
            snapshot.ready = true;
            changed
        });
    }
}
