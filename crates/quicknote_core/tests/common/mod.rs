#![allow(dead_code)]

use async_trait::async_trait;
use quicknote_core::{
    Document, DocumentList, DocumentStore, IdentityProvider, NoteSynchronizer, RemoteError,
    RemoteResult, SessionManager, UserIdentity,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub const EMAIL: &str = "a@b.com";
pub const VALID_CODE: &str = "123456";
pub const COLLECTION: &str = "notes";

/// Identity provider that accepts `VALID_CODE` for any address.
#[derive(Default)]
pub struct FakeIdentity {
    pub request_calls: AtomicUsize,
    pub verify_calls: AtomicUsize,
    pub clear_calls: AtomicUsize,
    fail_request: Mutex<Option<RemoteError>>,
    persisted: Mutex<Option<UserIdentity>>,
}

impl FakeIdentity {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_persisted(user: UserIdentity) -> Arc<Self> {
        let identity = Self::default();
        *identity.persisted.lock().unwrap() = Some(user);
        Arc::new(identity)
    }

    pub fn fail_next_request(&self, err: RemoteError) {
        *self.fail_request.lock().unwrap() = Some(err);
    }

    pub fn persisted(&self) -> Option<UserIdentity> {
        self.persisted.lock().unwrap().clone()
    }
}

pub fn user_for(email: &str) -> UserIdentity {
    UserIdentity {
        id: format!("user-{email}"),
        email: email.to_string(),
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn request_code(&self, _email: &str) -> RemoteResult<()> {
        self.request_calls.fetch_add(1, Ordering::SeqCst);
        match self.fail_request.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn verify_code(&self, email: &str, code: &str) -> RemoteResult<UserIdentity> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        if code != VALID_CODE {
            return Err(RemoteError::Unauthorized("invalid code".to_string()));
        }
        let user = user_for(email);
        *self.persisted.lock().unwrap() = Some(user.clone());
        Ok(user)
    }

    async fn persisted_session(&self) -> RemoteResult<Option<UserIdentity>> {
        Ok(self.persisted.lock().unwrap().clone())
    }

    async fn clear_persisted_session(&self) -> RemoteResult<()> {
        self.clear_calls.fetch_add(1, Ordering::SeqCst);
        *self.persisted.lock().unwrap() = None;
        Ok(())
    }
}

/// In-memory document store with call counters and scripted failures.
#[derive(Default)]
pub struct FakeStore {
    documents: Mutex<Vec<Document>>,
    next_id: AtomicUsize,
    pub reads: AtomicUsize,
    pub creates: AtomicUsize,
    pub updates: AtomicUsize,
    deletes: Mutex<Vec<(String, bool)>>,
    fail_next: Mutex<Option<RemoteError>>,
    fail_read: Mutex<Option<RemoteError>>,
    hold_next_read: AtomicBool,
    release: Notify,
    hold_next_write: AtomicBool,
    release_write: Notify,
}

impl FakeStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Inserts a note document with a fixed creation time.
    pub fn seed(&self, title: &str, content: &str) -> String {
        let id = self.allocate_id();
        self.documents.lock().unwrap().push(Document {
            id: id.clone(),
            data: json!({
                "title": title,
                "content": content,
                "createdAt": "2024-05-01T08:30:00.000Z",
            }),
        });
        id
    }

    pub fn insert_raw(&self, document: Document) {
        self.documents.lock().unwrap().push(document);
    }

    pub fn remove_directly(&self, id: &str) {
        self.documents.lock().unwrap().retain(|document| document.id != id);
    }

    pub fn fail_next(&self, err: RemoteError) {
        *self.fail_next.lock().unwrap() = Some(err);
    }

    /// Fails the next read only, leaving mutations untouched.
    pub fn fail_next_read(&self, err: RemoteError) {
        *self.fail_read.lock().unwrap() = Some(err);
    }

    /// Makes the next read capture its result, then wait for `release_read`.
    pub fn hold_next_read(&self) {
        self.hold_next_read.store(true, Ordering::SeqCst);
    }

    pub fn release_read(&self) {
        self.release.notify_one();
    }

    /// Makes the next create/update/delete apply, then wait for `release_write`.
    pub fn hold_next_write(&self) {
        self.hold_next_write.store(true, Ordering::SeqCst);
    }

    pub fn release_write(&self) {
        self.release_write.notify_one();
    }

    pub fn deletes(&self) -> Vec<(String, bool)> {
        self.deletes.lock().unwrap().clone()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn allocate_id(&self) -> String {
        format!("n{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn wait_if_held(&self) {
        if self.hold_next_write.swap(false, Ordering::SeqCst) {
            self.release_write.notified().await;
        }
    }

    fn take_failure(&self) -> RemoteResult<()> {
        match self.fail_next.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DocumentStore for FakeStore {
    async fn read_documents(&self, _collection: &str) -> RemoteResult<DocumentList> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fail_read.lock().unwrap().take() {
            return Err(err);
        }
        self.take_failure()?;
        let documents = self.documents.lock().unwrap().clone();
        if self.hold_next_read.swap(false, Ordering::SeqCst) {
            self.release.notified().await;
        }
        Ok(DocumentList { documents })
    }

    async fn create_document(&self, _collection: &str, data: Value) -> RemoteResult<Document> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.take_failure()?;
        let document = Document {
            id: self.allocate_id(),
            data,
        };
        self.documents.lock().unwrap().push(document.clone());
        self.wait_if_held().await;
        Ok(document)
    }

    async fn update_document(&self, id: &str, patch: Value) -> RemoteResult<Document> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.take_failure()?;
        let updated = {
            let mut documents = self.documents.lock().unwrap();
            let document = documents
                .iter_mut()
                .find(|document| document.id == id)
                .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
            if let (Some(target), Some(fields)) =
                (document.data.as_object_mut(), patch.as_object())
            {
                for (key, value) in fields {
                    target.insert(key.clone(), value.clone());
                }
            }
            document.clone()
        };
        self.wait_if_held().await;
        Ok(updated)
    }

    async fn delete_document(&self, id: &str, permanent: bool) -> RemoteResult<()> {
        self.deletes.lock().unwrap().push((id.to_string(), permanent));
        self.take_failure()?;
        let removed = {
            let mut documents = self.documents.lock().unwrap();
            let before = documents.len();
            documents.retain(|document| document.id != id);
            documents.len() != before
        };
        if !removed {
            return Err(RemoteError::NotFound(id.to_string()));
        }
        self.wait_if_held().await;
        Ok(())
    }
}

/// Session manager and synchronizer wired to fakes.
pub struct Harness {
    pub identity: Arc<FakeIdentity>,
    pub store: Arc<FakeStore>,
    pub session: SessionManager,
    pub notes: NoteSynchronizer,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_identity(FakeIdentity::new())
    }

    pub fn with_identity(identity: Arc<FakeIdentity>) -> Self {
        let store = FakeStore::new();
        let session = SessionManager::new(identity.clone());
        let notes = NoteSynchronizer::new(store.clone(), session.subscribe(), COLLECTION);
        Self {
            identity,
            store,
            session,
            notes,
        }
    }

    pub async fn signed_in() -> Self {
        let harness = Self::new();
        harness.session.request_code(EMAIL).await.unwrap();
        harness.session.verify_code(EMAIL, VALID_CODE).await.unwrap();
        harness
    }
}
