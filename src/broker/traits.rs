use std::future::Future;

use url::Url;

use crate::error::BoxError;
use crate::types::{CanonicalId, ClientId, CredentialRecord, PendingAuthorization};

/// Consumer-provided client registration lookup.
///
/// Called at initiate time to decide whether the approval surface can be
/// skipped for a returning client.
pub trait ClientRegistry: Send + Sync + 'static {
    /// Whether this client already holds a still-valid approval on record.
    fn has_valid_approval(
        &self,
        client_id: &ClientId,
    ) -> impl Future<Output = Result<bool, BoxError>> + Send;
}

/// Consumer-provided approval surface rendering.
///
/// The returned markup must carry the encoded state token back through the
/// approve endpoint unchanged.
pub trait ApprovalPage: Send + Sync + 'static {
    fn render(&self, state_token: &str, pending: &PendingAuthorization) -> String;
}

/// External authorization provider boundary.
pub trait AuthProvider: Send + Sync + 'static {
    /// Build the provider authorize redirect embedding the encoded state.
    fn authorize_url(
        &self,
        state_token: &str,
        pending: &PendingAuthorization,
    ) -> Result<Url, BoxError>;

    /// Conclude a successful handshake. Yields the final redirect target for
    /// the requesting client.
    fn complete(
        &self,
        canonical_id: &CanonicalId,
        client_id: &ClientId,
        scope: Option<&str>,
    ) -> impl Future<Output = Result<Url, BoxError>> + Send;
}

/// External one-time-code exchange capability.
pub trait CodeExchanger: Send + Sync + 'static {
    /// Exchange an authorization code (plus the raw state it arrived with)
    /// for a credential record.
    fn exchange(
        &self,
        code: &str,
        state: &str,
    ) -> impl Future<Output = Result<CredentialRecord, BoxError>> + Send;
}

/// External identity-lookup capability.
pub trait IdentityLookup: Send + Sync + 'static {
    /// Resolve the canonical user id using a freshly exchanged credential.
    /// `Ok(None)` means the provider returned no usable id.
    fn canonical_id(
        &self,
        record: &CredentialRecord,
    ) -> impl Future<Output = Result<Option<CanonicalId>, BoxError>> + Send;
}
