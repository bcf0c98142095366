use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;

/// Canonical user identifier discovered from the brokerage during callback
/// processing.
///
/// Immutable, unique per brokerage account. Once known it takes precedence
/// over the [`ClientId`] when addressing stored credentials.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into,
)]
#[serde(transparent)]
pub struct CanonicalId(pub String);

/// Requesting client identifier (OAuth `client_id`).
///
/// Serves as the provisional credential key until the canonical user id is
/// known.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into,
)]
#[serde(transparent)]
pub struct ClientId(pub String);

impl CanonicalId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ClientId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The pair of optional identifiers used to address a credential.
///
/// At least one must be present for a storage key to be derivable;
/// `canonical_id` wins when both are set. Constructed at session
/// establishment or when a callback resolves the canonical id, and not
/// modified afterwards for a given lookup.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Identity {
    pub canonical_id: Option<CanonicalId>,
    pub fallback_id: Option<ClientId>,
}

impl Identity {
    /// Identity addressed by the canonical user id.
    #[must_use]
    pub fn canonical(id: impl Into<CanonicalId>) -> Self {
        Self {
            canonical_id: Some(id.into()),
            fallback_id: None,
        }
    }

    /// Identity addressed by the requesting client id only.
    #[must_use]
    pub fn fallback(id: impl Into<ClientId>) -> Self {
        Self {
            canonical_id: None,
            fallback_id: Some(id.into()),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.canonical_id.is_none() && self.fallback_id.is_none()
    }
}

/// Opaque token payload stored per identity.
///
/// Owned exclusively by the credential store; never mutated in place, always
/// replaced wholesale on save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
}

impl CredentialRecord {
    /// Create a record with only the required access token.
    #[must_use]
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
        }
    }

    #[must_use]
    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_expires_at(mut self, at: OffsetDateTime) -> Self {
        self.expires_at = Some(at);
        self
    }
}

/// In-flight authorization request context, carried across the external
/// redirect inside a signed, expiring token.
///
/// Created at initiate time, reconstructed and validated at callback time,
/// then discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAuthorization {
    /// Requesting client id (the provisional credential key).
    pub client_id: ClientId,
    /// Requested scope; required by the external provider.
    pub scope: Option<String>,
    /// Redirect target for the client; required by the external provider.
    pub redirect_uri: Option<Url>,
    /// Random correlation value, logged but not consumed (see DESIGN.md).
    pub nonce: String,
    /// Encode time, recovered from the token's `iat` claim on decode.
    pub issued_at: Option<OffsetDateTime>,
}

impl PendingAuthorization {
    /// Name of the first provider-required field that is absent, if any.
    #[must_use]
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.scope.as_deref().map_or(true, str::is_empty) {
            return Some("scope");
        }
        if self.redirect_uri.is_none() {
            return Some("redirect_uri");
        }
        None
    }
}

/// Durable identity carried by a session across reconnects.
///
/// Set at authorization completion; read-only afterwards except for a
/// one-time backfill of `fallback_id` at first initialization.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionProps {
    #[serde(default)]
    pub canonical_id: Option<CanonicalId>,
    #[serde(default)]
    pub fallback_id: Option<ClientId>,
}

impl SessionProps {
    /// The identity this session addresses credentials with.
    #[must_use]
    pub fn identity(&self) -> Identity {
        Identity {
            canonical_id: self.canonical_id.clone(),
            fallback_id: self.fallback_id.clone(),
        }
    }
}
