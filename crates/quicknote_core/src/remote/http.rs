//! REST implementation of the identity and document-store collaborators.
//!
//! # Responsibility
//! - Map collaborator calls onto the backend's HTTP endpoints.
//! - Keep the bearer credential in memory and on disk between runs.
//!
//! # Invariants
//! - Document calls carry the bearer token of the active credential; without
//!   one they fail with `RemoteError::Unauthorized` before any request.
//! - A persisted token rejected with 401 is deleted, not retried.
//! - `verify_code` succeeds only once the credential is on disk; a failed
//!   save is a `Storage` error and leaves no active credential.
//! - Tokens and codes never appear in log events.

use crate::config::ClientConfig;
use crate::model::document::{Document, DocumentList};
use crate::model::session::UserIdentity;
use crate::remote::credential::{FileCredentialStore, StoredCredential};
use crate::remote::{DocumentStore, IdentityProvider, RemoteError, RemoteResult};
use async_trait::async_trait;
use log::{debug, info, warn};
use parking_lot::RwLock;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

const MAX_ERROR_MESSAGE_CHARS: usize = 200;

/// Session issued by `POST /auth/otp/verify`.
#[derive(Debug, Deserialize)]
struct IssuedSession {
    token: String,
    user: UserIdentity,
}

/// HTTP client for the notes backend.
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    credentials: FileCredentialStore,
    active: RwLock<Option<StoredCredential>>,
}

impl HttpBackend {
    /// Builds a backend client from validated configuration.
    ///
    /// # Errors
    /// - `InvalidRequest` when the base URL does not parse or cannot carry a path.
    /// - `Transport` when the HTTP client cannot be constructed.
    pub fn new(config: &ClientConfig, credentials: FileCredentialStore) -> RemoteResult<Self> {
        let raw_url = config.api_base_url.trim();
        let base_url = Url::parse(raw_url).map_err(|err| {
            RemoteError::InvalidRequest(format!("invalid base url `{raw_url}`: {err}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(RemoteError::InvalidRequest(format!(
                "base url `{raw_url}` cannot carry a path"
            )));
        }

        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("quicknote/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| RemoteError::Transport(err.to_string()))?;

        Ok(Self {
            client,
            base_url,
            credentials,
            active: RwLock::new(None),
        })
    }

    /// Returns the signed-in user, if a credential is active in memory.
    pub fn active_user(&self) -> Option<UserIdentity> {
        self.active
            .read()
            .as_ref()
            .map(|credential| credential.user.clone())
    }

    fn endpoint(&self, segments: &[&str]) -> RemoteResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                RemoteError::InvalidRequest(format!(
                    "base url `{}` cannot carry a path",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn bearer_token(&self) -> RemoteResult<String> {
        self.active
            .read()
            .as_ref()
            .map(|credential| credential.token.clone())
            .ok_or_else(|| RemoteError::Unauthorized("no active session".to_string()))
    }

    async fn send(&self, request: RequestBuilder) -> RemoteResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|err| RemoteError::Transport(err.to_string()))?;
        debug!(
            "event=http_response module=remote status={} path={}",
            response.status().as_u16(),
            response.url().path()
        );
        check_status(response).await
    }

    async fn send_authorized(&self, request: RequestBuilder) -> RemoteResult<Response> {
        let token = self.bearer_token()?;
        self.send(request.bearer_auth(token)).await
    }
}

#[async_trait]
impl IdentityProvider for HttpBackend {
    async fn request_code(&self, email: &str) -> RemoteResult<()> {
        let url = self.endpoint(&["auth", "otp"])?;
        self.send(self.client.post(url).json(&json!({ "email": email })))
            .await?;
        Ok(())
    }

    async fn verify_code(&self, email: &str, code: &str) -> RemoteResult<UserIdentity> {
        let url = self.endpoint(&["auth", "otp", "verify"])?;
        let response = self
            .send(
                self.client
                    .post(url)
                    .json(&json!({ "email": email, "code": code })),
            )
            .await?;
        let issued: IssuedSession = decode(response).await?;

        let user = issued.user.clone();
        let credential = StoredCredential {
            token: issued.token,
            user: issued.user,
        };
        if let Err(err) = self.credentials.save(&credential) {
            warn!(
                "event=credential_save module=remote status=error path={} error={}",
                self.credentials.path().display(),
                err
            );
            return Err(err.into());
        }
        *self.active.write() = Some(credential);
        Ok(user)
    }

    async fn persisted_session(&self) -> RemoteResult<Option<UserIdentity>> {
        let Some(stored) = self.credentials.load()? else {
            return Ok(None);
        };

        let url = self.endpoint(&["auth", "session"])?;
        match self
            .send(self.client.get(url).bearer_auth(&stored.token))
            .await
        {
            Ok(response) => {
                let user: UserIdentity = decode(response).await?;
                *self.active.write() = Some(StoredCredential {
                    token: stored.token,
                    user: user.clone(),
                });
                Ok(Some(user))
            }
            Err(RemoteError::Unauthorized(_)) => {
                info!("event=credential_expired module=remote status=ok action=clear");
                self.credentials.clear()?;
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    async fn clear_persisted_session(&self) -> RemoteResult<()> {
        let active = self.active.write().take();
        let token = match active {
            Some(credential) => Some(credential.token),
            None => self
                .credentials
                .load()
                .ok()
                .flatten()
                .map(|credential| credential.token),
        };

        if let Some(token) = token {
            let url = self.endpoint(&["auth", "logout"])?;
            if let Err(err) = self.send(self.client.post(url).bearer_auth(token)).await {
                // Server-side revoke is best effort; the local credential is
                // removed regardless.
                warn!(
                    "event=session_revoke module=remote status=error error_code={} error={}",
                    err.code(),
                    err
                );
            }
        }

        self.credentials.clear()?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for HttpBackend {
    async fn read_documents(&self, collection: &str) -> RemoteResult<DocumentList> {
        let url = self.endpoint(&["collections", collection, "documents"])?;
        let response = self.send_authorized(self.client.get(url)).await?;
        decode(response).await
    }

    async fn create_document(&self, collection: &str, data: Value) -> RemoteResult<Document> {
        let url = self.endpoint(&["collections", collection, "documents"])?;
        let response = self
            .send_authorized(self.client.post(url).json(&json!({ "data": data })))
            .await?;
        decode(response).await
    }

    async fn update_document(&self, id: &str, patch: Value) -> RemoteResult<Document> {
        let url = self.endpoint(&["documents", id])?;
        let response = self
            .send_authorized(self.client.patch(url).json(&json!({ "data": patch })))
            .await?;
        decode(response).await
    }

    async fn delete_document(&self, id: &str, permanent: bool) -> RemoteResult<()> {
        let mut url = self.endpoint(&["documents", id])?;
        url.query_pairs_mut()
            .append_pair("permanent", if permanent { "true" } else { "false" });
        self.send_authorized(self.client.delete(url)).await?;
        Ok(())
    }
}

async fn check_status(response: Response) -> RemoteResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = error_message(response).await;
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::Unauthorized(message),
        StatusCode::NOT_FOUND => RemoteError::NotFound(message),
        StatusCode::TOO_MANY_REQUESTS => RemoteError::RateLimited,
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            RemoteError::InvalidRequest(message)
        }
        other => RemoteError::Rejected {
            status: other.as_u16(),
            message,
        },
    })
}

/// Extracts `message`/`error` from a JSON error body, else the raw text.
async fn error_message(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let from_json = serde_json::from_str::<Value>(&body).ok().and_then(|value| {
        ["message", "error"]
            .iter()
            .find_map(|key| value.get(*key).and_then(Value::as_str).map(str::to_string))
    });

    let message = from_json.unwrap_or_else(|| body.trim().to_string());
    if message.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string();
    }
    message.chars().take(MAX_ERROR_MESSAGE_CHARS).collect()
}

async fn decode<T: DeserializeOwned>(response: Response) -> RemoteResult<T> {
    response
        .json::<T>()
        .await
        .map_err(|err| RemoteError::InvalidResponse(err.to_string()))
}
