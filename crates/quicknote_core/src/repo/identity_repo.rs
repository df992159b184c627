//! Local one-time-code identity provider.
//!
//! # Responsibility
//! - Issue 6-digit codes and hand them to a `CodeDelivery` sink.
//! - Verify codes and persist the signed-in user in `local_session`.
//!
//! # Invariants
//! - At most one pending code per address (case-insensitive); a new request
//!   within the resend cooldown is rate limited.
//! - A code is single-use, expires after `code_ttl`, and is dropped after
//!   `MAX_VERIFY_ATTEMPTS` wrong guesses.
//! - User ids are derived from the lowercased address, so the same address
//!   always maps to the same user.

use super::{now_epoch_ms, SharedConnection};
use crate::db::{open_db, open_db_in_memory, DbResult};
use crate::model::session::UserIdentity;
use crate::remote::{IdentityProvider, RemoteError, RemoteResult};
use async_trait::async_trait;
use log::info;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

const DEFAULT_CODE_TTL: Duration = Duration::from_secs(10 * 60);
const DEFAULT_RESEND_COOLDOWN: Duration = Duration::from_secs(30);
const MAX_VERIFY_ATTEMPTS: u32 = 5;
const USER_ID_NAMESPACE: Uuid = Uuid::from_u128(0x3c9d_1f7a_52e4_4b0e_9a61_d2c8_7e05_b4f3);

/// Out-of-band channel that carries a code to the user.
pub trait CodeDelivery: Send + Sync {
    fn deliver(&self, email: &str, code: &str) -> RemoteResult<()>;
}

struct PendingCode {
    code: String,
    issued_at: Instant,
    failed_attempts: u32,
}

/// Identity provider that needs no remote service.
pub struct LocalIdentityProvider {
    conn: SharedConnection,
    delivery: Arc<dyn CodeDelivery>,
    pending: Mutex<HashMap<String, PendingCode>>,
    code_ttl: Duration,
    resend_cooldown: Duration,
}

impl LocalIdentityProvider {
    pub fn new(conn: Connection, delivery: Arc<dyn CodeDelivery>) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            delivery,
            pending: Mutex::new(HashMap::new()),
            code_ttl: DEFAULT_CODE_TTL,
            resend_cooldown: DEFAULT_RESEND_COOLDOWN,
        }
    }

    pub fn open(path: impl AsRef<Path>, delivery: Arc<dyn CodeDelivery>) -> DbResult<Self> {
        Ok(Self::new(open_db(path)?, delivery))
    }

    pub fn open_in_memory(delivery: Arc<dyn CodeDelivery>) -> DbResult<Self> {
        Ok(Self::new(open_db_in_memory()?, delivery))
    }

    pub fn with_code_ttl(mut self, ttl: Duration) -> Self {
        self.code_ttl = ttl;
        self
    }

    pub fn with_resend_cooldown(mut self, cooldown: Duration) -> Self {
        self.resend_cooldown = cooldown;
        self
    }

    pub(crate) fn connection(&self) -> SharedConnection {
        Arc::clone(&self.conn)
    }

    fn issue(&self, email: &str) -> RemoteResult<()> {
        let key = email.to_ascii_lowercase();
        let mut pending = self.pending.lock();
        if pending
            .get(&key)
            .is_some_and(|existing| existing.issued_at.elapsed() < self.resend_cooldown)
        {
            return Err(RemoteError::RateLimited);
        }

        let code = generate_code();
        self.delivery.deliver(email, &code)?;
        pending.insert(
            key,
            PendingCode {
                code,
                issued_at: Instant::now(),
                failed_attempts: 0,
            },
        );
        info!("event=otp_issue module=repo status=ok");
        Ok(())
    }

    fn check(&self, email: &str, code: &str) -> RemoteResult<UserIdentity> {
        let key = email.to_ascii_lowercase();
        let mut pending = self.pending.lock();
        let Some(entry) = pending.get_mut(&key) else {
            return Err(RemoteError::Unauthorized(
                "no code was requested for this address".to_string(),
            ));
        };

        if entry.issued_at.elapsed() >= self.code_ttl {
            pending.remove(&key);
            return Err(RemoteError::Unauthorized("code expired".to_string()));
        }
        if entry.code != code {
            entry.failed_attempts += 1;
            if entry.failed_attempts >= MAX_VERIFY_ATTEMPTS {
                pending.remove(&key);
            }
            return Err(RemoteError::Unauthorized("invalid code".to_string()));
        }
        pending.remove(&key);
        drop(pending);

        let user = UserIdentity {
            id: user_id_for(email),
            email: email.to_string(),
        };
        self.conn.lock().execute(
            "INSERT INTO local_session (slot, user_id, email, created_at)
             VALUES (1, ?1, ?2, ?3)
             ON CONFLICT (slot) DO UPDATE SET
                user_id = excluded.user_id,
                email = excluded.email,
                created_at = excluded.created_at;",
            params![user.id, user.email, now_epoch_ms()],
        )?;
        Ok(user)
    }

    fn stored_session(&self) -> RemoteResult<Option<UserIdentity>> {
        let user = self
            .conn
            .lock()
            .query_row(
                "SELECT user_id, email FROM local_session WHERE slot = 1;",
                [],
                |row| {
                    Ok(UserIdentity {
                        id: row.get(0)?,
                        email: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    fn forget_session(&self) -> RemoteResult<()> {
        self.conn
            .lock()
            .execute("DELETE FROM local_session;", [])?;
        Ok(())
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn request_code(&self, email: &str) -> RemoteResult<()> {
        self.issue(email)
    }

    async fn verify_code(&self, email: &str, code: &str) -> RemoteResult<UserIdentity> {
        self.check(email, code)
    }

    async fn persisted_session(&self) -> RemoteResult<Option<UserIdentity>> {
        self.stored_session()
    }

    async fn clear_persisted_session(&self) -> RemoteResult<()> {
        self.forget_session()
    }
}

/// Stable user id for an address.
pub fn user_id_for(email: &str) -> String {
    Uuid::new_v5(&USER_ID_NAMESPACE, email.trim().to_ascii_lowercase().as_bytes()).to_string()
}

fn generate_code() -> String {
    format!("{:06}", Uuid::new_v4().as_u128() % 1_000_000)
}

#[cfg(test)]
mod tests {
    use super::{generate_code, user_id_for};

    #[test]
    fn codes_are_six_digits() {
        for _ in 0..50 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn user_id_ignores_case_and_padding() {
        assert_eq!(user_id_for("A@B.com"), user_id_for(" a@b.com"));
        assert_ne!(user_id_for("a@b.com"), user_id_for("c@b.com"));
    }
}
