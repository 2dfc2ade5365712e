//! Remote file-store backend.
//!
//! Records are materialized as individual files named
//! `{data_type}_{owner}_{record_id}` inside a dedicated, lazily-created
//! folder. Reading is a two-step protocol: list the folder filtered by the
//! `{data_type}_{owner}_` name prefix, then download and decrypt each
//! match.
//!
//! Access requires a bearer token from an OAuth-style interactive
//! handshake, abstracted behind [`CloudAuthenticator`]. The token is
//! cached in device-local storage across sessions ([`TokenCache`]); an
//! `Unauthorized` reply from the file API invalidates the cached token so
//! the next connect re-runs the handshake.

use crate::backend::{BackendStats, Document, StorageBackend};
use crate::device::DeviceStore;
use crate::error::{BackendError, BackendResult};
use crate::record::{now_millis, RecordId, StorageLocation};
use async_trait::async_trait;
use medivault_cipher::{CipherKey, CipherService};
use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Name of the dedicated folder records are stored under.
pub const DEFAULT_FOLDER: &str = "medivault";

const TOKEN_CACHE_KEY: &str = "mv/cloud_token";

/// Bearer token produced by the authentication handshake.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wraps a raw token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AccessToken").field(&"[REDACTED]").finish()
    }
}

/// Metadata of a file in the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// Store-assigned file identifier.
    pub id: String,
    /// File name.
    pub name: String,
    /// Content size in bytes.
    pub size_bytes: u64,
    /// Creation timestamp, Unix milliseconds.
    pub created_at_ms: u64,
}

/// Errors surfaced by a [`CloudFileApi`] or [`CloudAuthenticator`].
#[derive(Debug, Error)]
pub enum CloudApiError {
    /// The token is missing, expired, or revoked.
    #[error("token rejected")]
    Unauthorized,

    /// The addressed file or folder does not exist.
    #[error("remote file not found")]
    NotFound,

    /// Any other network or service failure.
    #[error("service error: {0}")]
    Service(String),
}

/// REST surface of the remote file store.
///
/// Every call carries the bearer token. The in-crate [`MemoryCloudApi`]
/// serves tests and offline development.
#[async_trait]
pub trait CloudFileApi: Send + Sync {
    /// Returns the id of the named folder, creating it if necessary.
    async fn ensure_folder(&self, token: &AccessToken, name: &str)
        -> Result<String, CloudApiError>;

    /// Lists files in a folder whose names start with `name_prefix`.
    ///
    /// An empty prefix lists the whole folder.
    async fn list_files(
        &self,
        token: &AccessToken,
        folder_id: &str,
        name_prefix: &str,
    ) -> Result<Vec<RemoteFile>, CloudApiError>;

    /// Uploads `content` as a named file, replacing any file of the same
    /// name in the folder. Returns the file id.
    async fn upload(
        &self,
        token: &AccessToken,
        folder_id: &str,
        name: &str,
        content: Vec<u8>,
    ) -> Result<String, CloudApiError>;

    /// Downloads a file's content by id.
    async fn download(&self, token: &AccessToken, file_id: &str) -> Result<Vec<u8>, CloudApiError>;

    /// Deletes a file by id.
    async fn delete_file(&self, token: &AccessToken, file_id: &str) -> Result<(), CloudApiError>;
}

/// Interactive authentication handshake producing a bearer token.
///
/// Real implementations open a consent screen; tests use
/// [`StaticAuthenticator`].
#[async_trait]
pub trait CloudAuthenticator: Send + Sync {
    /// Runs the handshake and returns a fresh token.
    async fn authorize(&self) -> Result<AccessToken, CloudApiError>;
}

/// An authenticator that hands out a pre-issued token.
pub struct StaticAuthenticator {
    token: AccessToken,
}

impl StaticAuthenticator {
    /// Creates an authenticator around an existing token.
    pub fn new(token: AccessToken) -> Self {
        Self { token }
    }
}

#[async_trait]
impl CloudAuthenticator for StaticAuthenticator {
    async fn authorize(&self) -> Result<AccessToken, CloudApiError> {
        Ok(self.token.clone())
    }
}

/// Persists the bearer token in device-local storage across sessions.
pub struct TokenCache {
    store: Arc<dyn DeviceStore>,
}

impl TokenCache {
    /// Creates a token cache over the given device store.
    pub fn new(store: Arc<dyn DeviceStore>) -> Self {
        Self { store }
    }

    /// Loads the cached token, if any.
    pub fn load(&self) -> BackendResult<Option<AccessToken>> {
        let bytes = self.store.read(TOKEN_CACHE_KEY)?;
        match bytes {
            Some(bytes) => {
                let raw = String::from_utf8(bytes)
                    .map_err(|_| BackendError::storage("cached token is not valid UTF-8"))?;
                Ok(Some(AccessToken::new(raw)))
            }
            None => Ok(None),
        }
    }

    /// Stores a token.
    pub fn save(&self, token: &AccessToken) -> BackendResult<()> {
        self.store
            .write(TOKEN_CACHE_KEY, token.as_str().as_bytes())
            .map_err(BackendError::from)
    }

    /// Drops the cached token.
    pub fn clear(&self) -> BackendResult<()> {
        self.store.delete(TOKEN_CACHE_KEY)?;
        Ok(())
    }
}

fn record_file_name(owner_id: &str, data_type: &str, id: RecordId) -> String {
    format!("{data_type}_{owner_id}_{id}")
}

fn retrieve_prefix(owner_id: &str, data_type: &str) -> String {
    format!("{data_type}_{owner_id}_")
}

/// Storage backend over the remote file store.
pub struct CloudFileBackend<A: CloudFileApi> {
    api: A,
    token_cache: TokenCache,
    token: RwLock<Option<AccessToken>>,
    folder_name: String,
    folder_id: RwLock<Option<String>>,
}

impl<A: CloudFileApi> CloudFileBackend<A> {
    /// Connects to the file store, reusing a cached token or running the
    /// interactive handshake.
    pub async fn connect(
        api: A,
        authenticator: Box<dyn CloudAuthenticator>,
        token_cache: TokenCache,
    ) -> BackendResult<Self> {
        let token = match token_cache.load()? {
            Some(token) => token,
            None => {
                let token = authenticator
                    .authorize()
                    .await
                    .map_err(|e| BackendError::authentication(e.to_string()))?;
                token_cache.save(&token)?;
                debug!("cloud handshake complete, token cached");
                token
            }
        };

        Ok(Self {
            api,
            token_cache,
            token: RwLock::new(Some(token)),
            folder_name: DEFAULT_FOLDER.to_string(),
            folder_id: RwLock::new(None),
        })
    }

    /// Returns a reference to the underlying file API.
    pub fn api(&self) -> &A {
        &self.api
    }

    fn current_token(&self) -> BackendResult<AccessToken> {
        self.token
            .read()
            .clone()
            .ok_or_else(|| BackendError::authentication("not authenticated with the file store"))
    }

    /// Maps an API error, invalidating the cached token on rejection so
    /// the next connect re-runs the handshake.
    fn map_api_error(&self, err: CloudApiError) -> BackendError {
        match err {
            CloudApiError::Unauthorized => {
                warn!("file store rejected token, clearing cached credentials");
                *self.token.write() = None;
                let _ = self.token_cache.clear();
                BackendError::authentication("file store rejected token")
            }
            CloudApiError::NotFound => BackendError::remote("remote file not found"),
            CloudApiError::Service(message) => BackendError::remote(message),
        }
    }

    async fn folder(&self, token: &AccessToken) -> BackendResult<String> {
        if let Some(id) = self.folder_id.read().clone() {
            return Ok(id);
        }
        let id = self
            .api
            .ensure_folder(token, &self.folder_name)
            .await
            .map_err(|e| self.map_api_error(e))?;
        *self.folder_id.write() = Some(id.clone());
        Ok(id)
    }

    /// Finds the file holding a record, by the record-id suffix of its
    /// name.
    async fn find_record_file(&self, record_id: RecordId) -> BackendResult<Option<RemoteFile>> {
        let token = self.current_token()?;
        let folder = self.folder(&token).await?;
        let suffix = format!("_{record_id}");
        let files = self
            .api
            .list_files(&token, &folder, "")
            .await
            .map_err(|e| self.map_api_error(e))?;
        Ok(files.into_iter().find(|f| f.name.ends_with(&suffix)))
    }

    /// Encrypts and uploads an arbitrary binary attachment (label scans,
    /// prescription photos). Returns the remote file id.
    pub async fn store_attachment(
        &self,
        owner_id: &str,
        name: &str,
        bytes: &[u8],
        key: &CipherKey,
    ) -> BackendResult<String> {
        let token = self.current_token()?;
        let folder = self.folder(&token).await?;
        let content = CipherService::new(key).encrypt_bytes(bytes)?;
        self.api
            .upload(&token, &folder, &format!("attach_{owner_id}_{name}"), content)
            .await
            .map_err(|e| self.map_api_error(e))
    }

    /// Downloads and decrypts an attachment by file id.
    pub async fn fetch_attachment(
        &self,
        file_id: &str,
        key: &CipherKey,
    ) -> BackendResult<Vec<u8>> {
        let token = self.current_token()?;
        let content = self
            .api
            .download(&token, file_id)
            .await
            .map_err(|e| self.map_api_error(e))?;
        CipherService::new(key)
            .decrypt_bytes(&content)
            .map_err(BackendError::from)
    }
}

#[async_trait]
impl<A: CloudFileApi> StorageBackend for CloudFileBackend<A> {
    fn location(&self) -> StorageLocation {
        StorageLocation::CloudFile
    }

    async fn store(
        &self,
        owner_id: &str,
        value: &Document,
        data_type: &str,
        key: &CipherKey,
    ) -> BackendResult<RecordId> {
        let token = self.current_token()?;
        let folder = self.folder(&token).await?;

        let record_id = RecordId::new();
        let content = CipherService::new(key).encrypt(value)?;
        self.api
            .upload(
                &token,
                &folder,
                &record_file_name(owner_id, data_type, record_id),
                content,
            )
            .await
            .map_err(|e| self.map_api_error(e))?;

        debug!(owner = owner_id, data_type, id = %record_id, "uploaded record file");
        Ok(record_id)
    }

    async fn retrieve(
        &self,
        owner_id: &str,
        data_type: &str,
        key: &CipherKey,
    ) -> BackendResult<Vec<Document>> {
        let token = self.current_token()?;
        let folder = self.folder(&token).await?;

        // Listing is its own round trip; downloads follow per file.
        let files = self
            .api
            .list_files(&token, &folder, &retrieve_prefix(owner_id, data_type))
            .await
            .map_err(|e| self.map_api_error(e))?;

        let service = CipherService::new(key);
        let mut documents = Vec::with_capacity(files.len());
        for file in files {
            let content = self
                .api
                .download(&token, &file.id)
                .await
                .map_err(|e| self.map_api_error(e))?;
            documents.push(service.decrypt(&content)?);
        }
        Ok(documents)
    }

    async fn update(
        &self,
        record_id: RecordId,
        value: &Document,
        key: &CipherKey,
    ) -> BackendResult<()> {
        let file = self
            .find_record_file(record_id)
            .await?
            .ok_or_else(|| BackendError::not_found(record_id))?;

        let token = self.current_token()?;
        let folder = self.folder(&token).await?;
        let content = CipherService::new(key).encrypt(value)?;
        self.api
            .upload(&token, &folder, &file.name, content)
            .await
            .map_err(|e| self.map_api_error(e))?;
        Ok(())
    }

    async fn delete(&self, record_id: RecordId) -> BackendResult<()> {
        // Deleting something already gone is success for this backend.
        let Some(file) = self.find_record_file(record_id).await? else {
            return Ok(());
        };

        let token = self.current_token()?;
        match self.api.delete_file(&token, &file.id).await {
            Ok(()) | Err(CloudApiError::NotFound) => Ok(()),
            Err(other) => Err(self.map_api_error(other)),
        }
    }

    async fn stats(&self, owner_id: &str) -> BackendStats {
        let gather = async {
            let token = self.current_token()?;
            let folder = self.folder(&token).await?;
            let files = self
                .api
                .list_files(&token, &folder, "")
                .await
                .map_err(|e| self.map_api_error(e))?;

            let marker = format!("_{owner_id}_");
            let mine: Vec<&RemoteFile> =
                files.iter().filter(|f| f.name.contains(&marker)).collect();
            Ok::<BackendStats, BackendError>(BackendStats {
                location: StorageLocation::CloudFile,
                item_count: Some(mine.len() as u64),
                estimated_size_bytes: Some(mine.iter().map(|f| f.size_bytes).sum()),
                last_sync_ms: mine.iter().map(|f| f.created_at_ms).max(),
                error: None,
            })
        };
        gather
            .await
            .unwrap_or_else(|e| BackendStats::failed(StorageLocation::CloudFile, e.to_string()))
    }
}

pub use memory_api::MemoryCloudApi;

mod memory_api {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    struct FileEntry {
        folder_id: String,
        file: RemoteFile,
        content: Vec<u8>,
    }

    /// In-memory [`CloudFileApi`] with failure-injection switches.
    ///
    /// Tokens must be issued through [`issue_token`](Self::issue_token);
    /// anything else is rejected as unauthorized, which makes token
    /// revocation and re-handshake paths testable.
    #[derive(Default)]
    pub struct MemoryCloudApi {
        valid_tokens: RwLock<HashSet<String>>,
        online: AtomicBool,
        folders: RwLock<HashMap<String, String>>,
        files: RwLock<HashMap<String, FileEntry>>,
        counter: AtomicU64,
    }

    impl MemoryCloudApi {
        /// Creates an online store with no valid tokens.
        #[must_use]
        pub fn new() -> Self {
            let api = Self::default();
            api.online.store(true, Ordering::SeqCst);
            api
        }

        /// Issues a token the store will accept.
        pub fn issue_token(&self) -> AccessToken {
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            let raw = format!("tok-{n}");
            self.valid_tokens.write().insert(raw.clone());
            AccessToken::new(raw)
        }

        /// Revokes a previously issued token.
        pub fn revoke(&self, token: &AccessToken) {
            self.valid_tokens.write().remove(token.as_str());
        }

        /// Toggles the simulated network.
        pub fn set_online(&self, online: bool) {
            self.online.store(online, Ordering::SeqCst);
        }

        /// Number of files currently stored.
        pub fn file_count(&self) -> usize {
            self.files.read().len()
        }

        fn check(&self, token: &AccessToken) -> Result<(), CloudApiError> {
            if !self.online.load(Ordering::SeqCst) {
                return Err(CloudApiError::Service("network unreachable".into()));
            }
            if !self.valid_tokens.read().contains(token.as_str()) {
                return Err(CloudApiError::Unauthorized);
            }
            Ok(())
        }

        fn next_id(&self, prefix: &str) -> String {
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            format!("{prefix}-{n}")
        }
    }

    #[async_trait]
    impl CloudFileApi for MemoryCloudApi {
        async fn ensure_folder(
            &self,
            token: &AccessToken,
            name: &str,
        ) -> Result<String, CloudApiError> {
            self.check(token)?;
            let mut folders = self.folders.write();
            if let Some(id) = folders.get(name) {
                return Ok(id.clone());
            }
            let id = self.next_id("folder");
            folders.insert(name.to_string(), id.clone());
            Ok(id)
        }

        async fn list_files(
            &self,
            token: &AccessToken,
            folder_id: &str,
            name_prefix: &str,
        ) -> Result<Vec<RemoteFile>, CloudApiError> {
            self.check(token)?;
            Ok(self
                .files
                .read()
                .values()
                .filter(|e| e.folder_id == folder_id && e.file.name.starts_with(name_prefix))
                .map(|e| e.file.clone())
                .collect())
        }

        async fn upload(
            &self,
            token: &AccessToken,
            folder_id: &str,
            name: &str,
            content: Vec<u8>,
        ) -> Result<String, CloudApiError> {
            self.check(token)?;
            let mut files = self.files.write();
            // Upsert by (folder, name), like most sync-oriented wrappers.
            files.retain(|_, e| !(e.folder_id == folder_id && e.file.name == name));
            let id = self.next_id("file");
            files.insert(
                id.clone(),
                FileEntry {
                    folder_id: folder_id.to_string(),
                    file: RemoteFile {
                        id: id.clone(),
                        name: name.to_string(),
                        size_bytes: content.len() as u64,
                        created_at_ms: now_millis(),
                    },
                    content,
                },
            );
            Ok(id)
        }

        async fn download(
            &self,
            token: &AccessToken,
            file_id: &str,
        ) -> Result<Vec<u8>, CloudApiError> {
            self.check(token)?;
            self.files
                .read()
                .get(file_id)
                .map(|e| e.content.clone())
                .ok_or(CloudApiError::NotFound)
        }

        async fn delete_file(
            &self,
            token: &AccessToken,
            file_id: &str,
        ) -> Result<(), CloudApiError> {
            self.check(token)?;
            if self.files.write().remove(file_id).is_none() {
                return Err(CloudApiError::NotFound);
            }
            Ok(())
        }
    }
}
