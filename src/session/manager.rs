use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{BoxError, Error};
use crate::store::CredentialStore;
use crate::types::{CredentialRecord, Identity};

/// External token-refresh engine, consumed as an opaque capability.
///
/// The engine owns the refresh mechanics; the session actor only drives its
/// lifecycle and asks for live tokens.
#[async_trait]
pub trait TokenManager: Send + Sync {
    /// Load the persisted credential and become ready to issue tokens.
    async fn initialize(&self) -> Result<(), BoxError>;

    /// Return a live access token, refreshing if necessary.
    async fn get_access_token(&self) -> Result<String, BoxError>;

    /// Exchange a one-time authorization code for a fresh credential.
    async fn exchange_code(&self, code: &str, state: &str)
    -> Result<CredentialRecord, BoxError>;
}

/// Builds a token manager bound to one session's credential accessors.
pub trait TokenManagerFactory: Send + Sync {
    fn build(&self, accessors: CredentialAccessors) -> Arc<dyn TokenManager>;
}

/// Identity-bound load/save against the shared credential store.
///
/// Handed to the token manager so it can read and persist the one record
/// belonging to its session without knowing about key derivation.
#[derive(Clone)]
pub struct CredentialAccessors {
    store: Arc<CredentialStore>,
    identity: Identity,
}

impl CredentialAccessors {
    #[must_use]
    pub fn new(store: Arc<CredentialStore>, identity: Identity) -> Self {
        Self { store, identity }
    }

    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Load the session's credential record, if any.
    ///
    /// # Errors
    ///
    /// Propagates [`Error::IdentityMissing`] and store failures untouched.
    pub async fn load(&self) -> Result<Option<CredentialRecord>, Error> {
        self.store.load(&self.identity).await
    }

    /// Replace the session's credential record.
    ///
    /// # Errors
    ///
    /// Propagates [`Error::IdentityMissing`] and store failures untouched.
    pub async fn save(&self, record: &CredentialRecord) -> Result<(), Error> {
        self.store.save(&self.identity, record).await
    }
}
