//! Signed, expiring carrier for [`PendingAuthorization`] across the external
//! redirect round trip.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use pasetors::claims::{Claims, ClaimsValidationRules};
use pasetors::keys::{Generate, SymmetricKey};
use pasetors::token::UntrustedToken;
use pasetors::version4::V4;
use pasetors::{Local, local};
use rand::Rng;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use url::Url;

use crate::error::Error;
use crate::types::{ClientId, PendingAuthorization};

/// Default lifetime of an encoded state token.
pub const DEFAULT_STATE_TTL: Duration = Duration::from_secs(5 * 60);

const CLAIM_CLIENT_ID: &str = "cid";
const CLAIM_SCOPE: &str = "scope";
const CLAIM_REDIRECT_URI: &str = "redirect_uri";
const CLAIM_NONCE: &str = "nonce";

/// Generates a random correlation nonce (16 bytes, base64url).
#[must_use]
pub fn generate_nonce() -> String {
    let random_bytes: [u8; 16] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// Encodes and verifies pending-authorization state as a PASETO v4.local
/// token.
///
/// Both directions run in the same process, so the operator secret is a
/// symmetric key. Decoding fails closed: tamper, expiry, a foreign key, or a
/// missing claim all yield [`Error::InvalidOrExpiredState`] — a token is
/// never partially trusted.
pub struct StateCodec {
    key: SymmetricKey<V4>,
    ttl: Duration,
}

impl StateCodec {
    #[must_use]
    pub fn new(key: SymmetricKey<V4>) -> Self {
        Self {
            key,
            ttl: DEFAULT_STATE_TTL,
        }
    }

    /// Codec with a fresh ephemeral key. Tokens do not survive a restart.
    ///
    /// # Panics
    ///
    /// Panics if the system random source is unavailable.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(SymmetricKey::<V4>::generate().expect("system RNG available"))
    }

    /// Override the token lifetime.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Serialize and sign a pending authorization with an embedded expiry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StateEncode`] if claim construction or encryption
    /// fails.
    pub fn encode(&self, pending: &PendingAuthorization) -> Result<String, Error> {
        let mut claims = Claims::new_expires_in(&self.ttl)
            .map_err(|e| Error::StateEncode(e.to_string()))?;
        claims
            .add_additional(CLAIM_CLIENT_ID, pending.client_id.as_str())
            .map_err(|e| Error::StateEncode(e.to_string()))?;
        claims
            .add_additional(CLAIM_NONCE, pending.nonce.as_str())
            .map_err(|e| Error::StateEncode(e.to_string()))?;
        if let Some(scope) = &pending.scope {
            claims
                .add_additional(CLAIM_SCOPE, scope.as_str())
                .map_err(|e| Error::StateEncode(e.to_string()))?;
        }
        if let Some(redirect_uri) = &pending.redirect_uri {
            claims
                .add_additional(CLAIM_REDIRECT_URI, redirect_uri.as_str())
                .map_err(|e| Error::StateEncode(e.to_string()))?;
        }

        local::encrypt(&self.key, &claims, None, None)
            .map_err(|e| Error::StateEncode(e.to_string()))
    }

    /// Verify a token and reconstruct the pending authorization.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOrExpiredState`] on any verification or
    /// extraction failure.
    pub fn decode(&self, token: &str) -> Result<PendingAuthorization, Error> {
        if !token.starts_with("v4.local.") {
            return Err(Error::InvalidOrExpiredState);
        }

        // ClaimsValidationRules validates exp, nbf, iat by default
        let validation_rules = ClaimsValidationRules::new();

        let untrusted = UntrustedToken::<Local, V4>::try_from(token)
            .map_err(|_| Error::InvalidOrExpiredState)?;
        let trusted = local::decrypt(&self.key, &untrusted, &validation_rules, None, None)
            .map_err(|_| Error::InvalidOrExpiredState)?;
        let claims = trusted
            .payload_claims()
            .ok_or(Error::InvalidOrExpiredState)?;

        let client_id = claims
            .get_claim(CLAIM_CLIENT_ID)
            .and_then(|v| v.as_str())
            .ok_or(Error::InvalidOrExpiredState)?;
        let nonce = claims
            .get_claim(CLAIM_NONCE)
            .and_then(|v| v.as_str())
            .ok_or(Error::InvalidOrExpiredState)?;

        let scope = claims
            .get_claim(CLAIM_SCOPE)
            .and_then(|v| v.as_str())
            .map(str::to_owned);
        let redirect_uri = match claims.get_claim(CLAIM_REDIRECT_URI) {
            Some(value) => {
                let raw = value.as_str().ok_or(Error::InvalidOrExpiredState)?;
                Some(raw.parse::<Url>().map_err(|_| Error::InvalidOrExpiredState)?)
            }
            None => None,
        };
        let issued_at = claims
            .get_claim("iat")
            .and_then(|v| v.as_str())
            .and_then(|raw| OffsetDateTime::parse(raw, &Rfc3339).ok());

        Ok(PendingAuthorization {
            client_id: ClientId(client_id.to_owned()),
            scope,
            redirect_uri,
            nonce: nonce.to_owned(),
            issued_at,
        })
    }
}
