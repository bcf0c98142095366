//! Identity-keyed credential persistence over a key→blob abstraction.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{BoxError, Error};
use crate::types::{CredentialRecord, Identity};

/// Default key prefix for persisted credential records.
pub const DEFAULT_KEY_PREFIX: &str = "cred:";

/// Default time-to-live for persisted credential records (renewed on write).
pub const DEFAULT_CREDENTIAL_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Key→blob persistence consumed by the credential store.
///
/// The backing store's own durability guarantees are assumed, not specified
/// here; racing writes to the same key resolve last-write-wins.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Look up a blob. Absence is `Ok(None)`, not an error.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BoxError>;

    /// Unconditionally overwrite a blob, renewing its TTL.
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), BoxError>;
}

/// In-process [`BlobStore`] used in development and tests.
///
/// Expired entries are pruned lazily on read.
#[derive(Default)]
pub struct MemoryBlobStore {
    entries: RwLock<HashMap<String, (Vec<u8>, Instant)>>,
}

impl MemoryBlobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BoxError> {
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some((_, expires_at)) if *expires_at <= Instant::now() => {
                entries.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), BoxError> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_owned(), (value, Instant::now() + ttl));
        Ok(())
    }
}

/// Maps an [`Identity`] to a [`CredentialRecord`] in a shared blob store.
///
/// Keys are derived from the canonical id when present, else the fallback id.
/// Records are serialized wholesale; the store owns every record it returns.
pub struct CredentialStore {
    blobs: Arc<dyn BlobStore>,
    prefix: String,
    ttl: Duration,
}

impl CredentialStore {
    #[must_use]
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            blobs,
            prefix: DEFAULT_KEY_PREFIX.into(),
            ttl: DEFAULT_CREDENTIAL_TTL,
        }
    }

    /// Override the storage key prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Override the record TTL applied on every save.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Derive the storage key for an identity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IdentityMissing`] when neither identifier is present.
    pub fn derive_key(&self, identity: &Identity) -> Result<String, Error> {
        if let Some(canonical) = &identity.canonical_id {
            return Ok(format!("{}{}", self.prefix, canonical));
        }
        if let Some(fallback) = &identity.fallback_id {
            return Ok(format!("{}{}", self.prefix, fallback));
        }
        Err(Error::IdentityMissing)
    }

    /// Load the record stored for an identity, if any.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IdentityMissing`] on an empty identity, or
    /// [`Error::Store`] on transport or deserialization failure.
    pub async fn load(&self, identity: &Identity) -> Result<Option<CredentialRecord>, Error> {
        let key = self.derive_key(identity)?;
        let Some(blob) = self.blobs.get(&key).await.map_err(Error::Store)? else {
            return Ok(None);
        };
        let record = serde_json::from_slice(&blob).map_err(|e| Error::Store(e.into()))?;
        Ok(Some(record))
    }

    /// Overwrite the record stored for an identity, renewing its TTL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IdentityMissing`] on an empty identity, or
    /// [`Error::Store`] on transport or serialization failure.
    pub async fn save(&self, identity: &Identity, record: &CredentialRecord) -> Result<(), Error> {
        let key = self.derive_key(identity)?;
        let blob = serde_json::to_vec(record).map_err(|e| Error::Store(e.into()))?;
        self.blobs.put(&key, blob, self.ttl).await.map_err(Error::Store)
    }

    /// Copy the record stored under `from` to `to`'s key.
    ///
    /// Copy semantics: the source record stays intact, so either identifier
    /// resolves the same credential afterwards. An existing record at the
    /// destination is left alone (a fresher write under the destination key
    /// must not be clobbered by a stale copy). Returns whether a copy
    /// occurred.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IdentityMissing`] if either identity is empty, or
    /// [`Error::Store`] on transport failure.
    pub async fn migrate(&self, from: &Identity, to: &Identity) -> Result<bool, Error> {
        let from_key = self.derive_key(from)?;
        let to_key = self.derive_key(to)?;
        if from_key == to_key {
            return Ok(false);
        }
        let Some(blob) = self.blobs.get(&from_key).await.map_err(Error::Store)? else {
            return Ok(false);
        };
        if self.blobs.get(&to_key).await.map_err(Error::Store)?.is_some() {
            return Ok(false);
        }
        self.blobs
            .put(&to_key, blob, self.ttl)
            .await
            .map_err(Error::Store)?;
        Ok(true)
    }

    /// Best-effort [`migrate`](Self::migrate) that never raises.
    ///
    /// Sits on session-setup paths where blocking on migration is
    /// unacceptable; failures are logged and swallowed.
    pub async fn migrate_if_needed(&self, from: &Identity, to: &Identity) {
        match self.migrate(from, to).await {
            Ok(true) => {
                debug!(?from, ?to, "credential migrated");
            }
            Ok(false) => {
                debug!(?from, ?to, "credential migration not needed");
            }
            Err(error) => {
                warn!(%error, ?from, ?to, "credential migration failed");
            }
        }
    }
}
