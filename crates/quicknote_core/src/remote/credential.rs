//! File-backed credential persistence for the REST backend.
//!
//! # Invariants
//! - A missing file means "no persisted session", never an error.
//! - A file that does not parse is reported, not silently discarded.
//! - Writes go through a temp file + rename so a crash never leaves a
//!   half-written credential.

use crate::model::session::UserIdentity;
use crate::remote::RemoteError;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const CREDENTIAL_FILE_NAME: &str = "session.json";

/// Bearer token plus the user it was issued for.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredential {
    pub token: String,
    pub user: UserIdentity,
}

impl Debug for StoredCredential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredCredential")
            .field("token", &"<redacted>")
            .field("user", &self.user)
            .finish()
    }
}

#[derive(Debug)]
pub enum CredentialError {
    Io(std::io::Error),
    Format(serde_json::Error),
}

impl Display for CredentialError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "credential file i/o failed: {err}"),
            Self::Format(err) => write!(f, "credential file is malformed: {err}"),
        }
    }
}

impl Error for CredentialError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Format(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for CredentialError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for CredentialError {
    fn from(value: serde_json::Error) -> Self {
        Self::Format(value)
    }
}

impl From<CredentialError> for RemoteError {
    fn from(value: CredentialError) -> Self {
        Self::Storage(value.to_string())
    }
}

/// JSON credential file at a fixed path.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Uses `<data_dir>/session.json`.
    pub fn in_dir(data_dir: impl AsRef<Path>) -> Self {
        Self::new(data_dir.as_ref().join(CREDENTIAL_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<StoredCredential>, CredentialError> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    pub fn save(&self, credential: &StoredCredential) -> Result<(), CredentialError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(credential)?;
        std::fs::write(&tmp_path, body)?;
        restrict_permissions(&tmp_path)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Removes the credential file. Removing an absent file succeeds.
    pub fn clear(&self) -> Result<(), CredentialError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{CredentialError, FileCredentialStore, StoredCredential};
    use crate::model::session::UserIdentity;

    fn credential() -> StoredCredential {
        StoredCredential {
            token: "secret-token".to_string(),
            user: UserIdentity {
                id: "u1".to_string(),
                email: "a@b.com".to_string(),
            },
        }
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::in_dir(dir.path());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn save_then_clear_leaves_no_credential() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::in_dir(dir.path().join("nested"));

        store.save(&credential()).unwrap();
        assert_eq!(store.load().unwrap(), Some(credential()));

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
        store.clear().expect("clearing twice is fine");
    }

    #[test]
    fn malformed_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::in_dir(dir.path());
        std::fs::write(store.path(), b"{not json").unwrap();

        assert!(matches!(store.load(), Err(CredentialError::Format(_))));
    }

    #[test]
    fn debug_output_redacts_token() {
        let rendered = format!("{:?}", credential());
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("a@b.com"));
    }
}
